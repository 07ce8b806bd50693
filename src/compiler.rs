//! Derives everything the server needs from the profile, once, at startup.

use serde::{Deserialize, Serialize};

use crate::profile::{Profile, Project, Resume, SkillEntry};
use crate::tools::ToolName;

pub const CONTACT_QUESTION: &str = "How can I reach you?";
pub const NOT_SEEKING_INTERNSHIP: &str = "I'm not currently seeking internship opportunities.";
const PLACEHOLDER_IMAGE: &str = "/placeholder.jpg";

#[derive(Debug, Clone, Serialize)]
pub struct CompiledConfig {
    pub system_prompt: String,
    pub presets: PresetReplies,
    pub views: DisplayViews,
}

/// A canned answer for one quick-question button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetEntry {
    pub question: String,
    pub reply: String,
    pub tool: ToolName,
}

/// Canonical questions in button order. Lookup is exact-match only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PresetReplies {
    entries: Vec<PresetEntry>,
}

impl PresetReplies {
    pub fn get(&self, question: &str) -> Option<&PresetEntry> {
        self.entries.iter().find(|e| e.question == question)
    }

    pub fn entries(&self) -> &[PresetEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<PresetEntry>> for PresetReplies {
    fn from(entries: Vec<PresetEntry>) -> Self {
        Self { entries }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SocialLink {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactInfo {
    pub name: String,
    pub email: String,
    pub handle: String,
    pub socials: Vec<SocialLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInfo {
    pub name: String,
    pub age: String,
    pub location: String,
    pub description: String,
    pub src: String,
    pub fallback_src: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillGroup {
    pub category: String,
    pub skills: Vec<SkillEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectCard {
    pub category: String,
    pub title: String,
    pub src: String,
    pub content: Project,
}

/// Normalized data behind the display tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayViews {
    pub contact: ContactInfo,
    pub profile: ProfileInfo,
    pub skills: Vec<SkillGroup>,
    pub projects: Vec<ProjectCard>,
    pub resume: Resume,
    pub internship: String,
}

pub fn compile(profile: &Profile) -> CompiledConfig {
    CompiledConfig {
        system_prompt: system_prompt(profile),
        presets: preset_replies(profile),
        views: DisplayViews {
            contact: contact_info(profile),
            profile: profile_info(profile),
            skills: skill_groups(profile),
            projects: project_cards(profile),
            resume: profile.resume.clone(),
            internship: internship_info(profile),
        },
    }
}

fn names(entries: &[SkillEntry]) -> String {
    entries.iter().map(SkillEntry::name).collect::<Vec<_>>().join(", ")
}

/// Interview persona prompt.
pub fn system_prompt(profile: &Profile) -> String {
    let Profile {
        personal,
        education,
        experience,
        skills,
        projects,
        personality,
        internship,
        ..
    } = profile;
    let name = &personal.name;
    let mut out = String::new();

    out.push_str(&format!("# Interview Scenario: You are {name}\n\n"));
    out.push_str(&format!(
        "You are {name} - {}, currently in a professional interview setting. The person asking \
         questions is an interviewer/recruiter/HR professional, and you are the candidate being \
         interviewed. Respond authentically as if you are personally answering their questions \
         during a real interview.\n\n",
        personal.title
    ));

    out.push_str("## Interview Persona & Communication Style\n");
    out.push_str(&format!("- Speak in first person (\"I\", \"my\", \"me\") - you ARE {name}\n"));
    out.push_str(
        "- Be professional, confident, and articulate\n\
         - Show enthusiasm for opportunities and challenges\n\
         - Be humble but confident about your achievements\n\
         - Ask thoughtful questions back to the interviewer when appropriate\n\n",
    );

    out.push_str("## Response Strategy - ALWAYS Use Tools\n");
    out.push_str("CRITICAL: You must use tools to provide comprehensive information, not just text responses!\n\n");
    for (topic, tool) in [
        ("\"tell me about yourself\"", ToolName::Presentation),
        ("project-related questions", ToolName::Projects),
        ("technical skills questions", ToolName::Skills),
        ("contact/networking questions", ToolName::Contact),
        ("resume/background questions", ToolName::Resume),
        ("internship/job/career questions", ToolName::Internship),
    ] {
        out.push_str(&format!("- For {topic} -> use {tool} tool\n"));
    }

    out.push_str("\n## Your Professional Background\n\n### Personal Information\n");
    let current = &education.current;
    out.push_str(&format!("- Age: {}\n", personal.age));
    out.push_str(&format!("- Current Status: {}\n", personal.title));
    out.push_str(&format!("- Location: {}\n", personal.location));
    out.push_str(&format!(
        "- Education: {} at {} (graduating {})\n",
        current.degree, current.institution, current.graduation_date
    ));
    out.push_str(&format!("- Academic Performance: CGPA {}\n", current.cgpa));
    out.push_str(&format!("- Achievements: {}\n", education.achievements.join(", ")));

    out.push_str("\n### Technical Expertise\n");
    for category in skills.categories().iter().filter(|c| c.technical) {
        out.push_str(&format!("- {}: {}\n", category.label, names(category.entries)));
    }

    out.push_str("\n### Professional Experience\n");
    for exp in experience {
        out.push_str(&format!(
            "- {} at {} ({}): {}\n",
            exp.position, exp.company, exp.duration, exp.description
        ));
    }

    out.push_str("\n### Key Projects & Achievements\n");
    for project in projects.iter().filter(|p| p.featured) {
        out.push_str(&format!("- {}: {}\n", project.title, project.description));
    }

    out.push_str("\n### Personality & Work Style\n");
    out.push_str(&format!("- Core Motivation: {}\n", personality.motivation));
    out.push_str(&format!("- Working Style: {}\n", personality.working_style));
    out.push_str(&format!("- Key Traits: {}\n", personality.traits.join(", ")));
    out.push_str(&format!("- Professional Interests: {}\n", personality.interests.join(", ")));

    out.push_str("\n### Career Goals & Availability\n");
    if internship.seeking {
        out.push_str(&format!(
            "- Seeking: {} internship/position starting {}\n",
            internship.duration, internship.start_date
        ));
        out.push_str(&format!("- Focus Areas: {}\n", internship.focus_areas.join(", ")));
        out.push_str(&format!("- Career Goals: {}\n", internship.goals));
        out.push_str(&format!("- Availability: {}\n", internship.availability));
    }

    out.push_str(
        "\n## Interview Guidelines\n\
         - Always respond as if you're speaking directly to the interviewer\n\
         - Be specific about your experiences and achievements\n\
         - Demonstrate problem-solving abilities through examples\n\
         - Use tools to provide comprehensive, detailed responses\n\n",
    );
    out.push_str(&format!(
        "REMEMBER: You are NOT an AI assistant - you are {name} being interviewed. \
         Respond authentically and professionally!\n"
    ));
    out
}

/// The fixed quick-question list. Adding a button means adding a row here.
pub fn preset_replies(profile: &Profile) -> PresetReplies {
    let rows: [(&str, String, ToolName); 6] = [
        ("Who are you?", profile.personal.bio.clone(), ToolName::Presentation),
        (
            "What are your skills?",
            "My technical expertise spans multiple domains...".to_string(),
            ToolName::Skills,
        ),
        (
            "What projects are you most proud of?",
            "Here are some of my key projects...".to_string(),
            ToolName::Projects,
        ),
        (
            "Can I see your resume?",
            "Here's my resume with all the details...".to_string(),
            ToolName::Resume,
        ),
        (
            CONTACT_QUESTION,
            "Here's how you can reach me...".to_string(),
            ToolName::Contact,
        ),
        (
            "Am I available for opportunities?",
            "Here are my current opportunities and availability...".to_string(),
            ToolName::Internship,
        ),
    ];

    rows.into_iter()
        .map(|(question, reply, tool)| PresetEntry {
            question: question.to_string(),
            reply,
            tool,
        })
        .collect::<Vec<_>>()
        .into()
}

pub fn contact_info(profile: &Profile) -> ContactInfo {
    let social = &profile.social;
    let socials = [
        ("LinkedIn", &social.linkedin),
        ("GitHub", &social.github),
        ("Twitter", &social.twitter),
        ("Kaggle", &social.kaggle),
        ("LeetCode", &social.leetcode),
    ]
    .into_iter()
    .filter(|(_, url)| !url.is_empty())
    .map(|(name, url)| SocialLink {
        name: name.to_string(),
        url: url.clone(),
    })
    .collect();

    ContactInfo {
        name: profile.personal.name.clone(),
        email: profile.personal.email.clone(),
        handle: profile.personal.handle.clone(),
        socials,
    }
}

pub fn profile_info(profile: &Profile) -> ProfileInfo {
    let p = &profile.personal;
    ProfileInfo {
        name: p.name.clone(),
        age: format!("{} years old", p.age),
        location: p.location.clone(),
        description: p.bio.clone(),
        src: p.avatar.clone(),
        fallback_src: p.fallback_avatar.clone(),
    }
}

pub fn skill_groups(profile: &Profile) -> Vec<SkillGroup> {
    profile
        .skills
        .categories()
        .iter()
        .filter(|c| c.key != "certifications" && !c.entries.is_empty())
        .map(|c| SkillGroup {
            category: c.label.to_string(),
            skills: c.entries.to_vec(),
        })
        .collect()
}

pub fn project_cards(profile: &Profile) -> Vec<ProjectCard> {
    profile
        .projects
        .iter()
        .map(|project| ProjectCard {
            category: project.category.clone(),
            title: project.title.clone(),
            src: project
                .images
                .first()
                .map(|img| img.src.as_str())
                .filter(|src| !src.is_empty())
                .unwrap_or(PLACEHOLDER_IMAGE)
                .to_string(),
            content: project.clone(),
        })
        .collect()
}

pub fn internship_info(profile: &Profile) -> String {
    let Profile {
        internship,
        personal,
        social,
        ..
    } = profile;
    if !internship.seeking {
        return NOT_SEEKING_INTERNSHIP.to_string();
    }

    format!(
        "Here's what I'm looking for:\n\n\
         - **Duration**: {} starting **{}**\n\
         - **Location**: {}\n\
         - **Focus**: {}\n\
         - **Working Style**: {}\n\
         - **Goals**: {}\n\n\
         **Contact me** via:\n\
         - Email: {}\n\
         - LinkedIn: {}\n\
         - GitHub: {}\n\n\
         {}",
        internship.duration,
        internship.start_date,
        internship.preferred_location,
        internship.focus_areas.join(", "),
        internship.work_style,
        internship.goals,
        personal.email,
        social.linkedin,
        social.github,
        internship.availability,
    )
}
