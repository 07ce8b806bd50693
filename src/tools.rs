use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::PortfolioError;
use crate::models::{FunctionDefinition, ToolDefinition};
use crate::profile::Profile;

pub const NO_INTERNSHIP_FALLBACK: &str = "No formal internship completed yet";
pub const NO_FREELANCE_FALLBACK: &str = "Active freelancer";

// First-person framing handed to the model alongside the data.
const PRESENTATION_SUMMARY: &str = "Thank you for asking! I'm a dedicated software developer with a strong \
    passion for technology and innovation. My journey in tech has been driven by curiosity and a desire to \
    create solutions that make a real impact. Through my academic studies combined with practical experience \
    via internships and freelance work, I've developed both a solid theoretical foundation and hands-on \
    problem-solving skills. I'm particularly drawn to challenges that require creative thinking and technical \
    excellence. I thrive in collaborative environments where I can contribute to innovative projects while \
    continuously learning and growing. My ultimate goal is to work on meaningful projects that leverage \
    cutting-edge technology to solve real-world problems. I'm excited about the possibility of bringing my \
    skills and enthusiasm to your team.";
const PROJECTS_SUMMARY: &str = "I'm excited to share my project portfolio with you. These projects represent \
    my journey as a developer and demonstrate my ability to take ideas from conception to deployment. Each \
    project has taught me something different - from technical implementation to project management and \
    problem-solving. I've worked across various technology stacks and domains, which has given me a broad \
    perspective on software development. What I'm most proud of is how these projects have allowed me to \
    solve real-world problems while continuously learning and growing as a developer. I'd be happy to dive \
    deeper into any specific project that interests you or discuss how the experience from these projects \
    would apply to roles at your organization.";
const SKILLS_MESSAGE: &str = "I'd be happy to walk you through my technical skills and expertise. I've built \
    a diverse skill set across multiple domains through both my academic coursework and hands-on project \
    experience. I'm particularly passionate about machine learning and full-stack development, where I've been \
    able to apply these technologies to solve real-world problems. Each area of my expertise has been \
    strengthened through practical application - from building end-to-end web applications to developing ML \
    models for complex data analysis. I believe my combination of theoretical knowledge and practical \
    experience, along with my enthusiasm for continuous learning, would allow me to contribute effectively \
    to your team. What specific technical areas would you like me to elaborate on?";
const CONTACT_MESSAGE: &str = "I'd be happy to share my contact information with you. I'm very responsive to \
    professional communications and always excited to connect with potential employers and industry \
    professionals. Feel free to reach out to me through any of these channels - I check my email regularly \
    and am active on LinkedIn and GitHub. I'm always open to discussing opportunities, collaborations, or \
    just having a conversation about technology and innovation. What would be the best way for your team to \
    stay in touch with me?";
const RESUME_MESSAGE: &str = "I'm pleased to share my professional background with you. As you can see from \
    my resume, I've maintained a strong focus on combining academic excellence with practical experience. \
    Throughout my journey, I've consistently sought opportunities to apply what I learn in the classroom to \
    real-world projects and challenges. My academic performance, combined with my hands-on experience through \
    internships and freelance work, has given me a solid foundation in both theoretical concepts and practical \
    implementation. I believe this combination of academic rigor and real-world application has prepared me \
    well for contributing to your organization. Is there any particular aspect of my background you'd like me \
    to expand on?";
const PROJECT_EXPERIENCE: &str = "Led multiple end-to-end projects including IoT systems and ML models";
const PORTFOLIO_NOTE: &str = "This AI-powered portfolio showcases my projects and skills";
const INTERNSHIP_MESSAGE: &str = "I'm actively seeking internship and full-time opportunities where I can \
    contribute my technical skills while continuing to grow professionally. I'm particularly excited about \
    roles that offer hands-on experience with cutting-edge technologies and the chance to work on impactful \
    projects. What I'm looking for is an environment where I can combine technical challenges with \
    collaborative teamwork - somewhere I can contribute meaningfully while learning from experienced \
    professionals like yourself. I'm very adaptable and eager to take on new challenges, and I believe my \
    technical background combined with my enthusiasm for learning would make me a valuable addition to your \
    team. What kind of projects or challenges is your team currently working on that I might be able to \
    contribute to?";

/// The closed set of tools the model is allowed to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolName {
    #[serde(rename = "getPresentation")]
    Presentation,
    #[serde(rename = "getProjects")]
    Projects,
    #[serde(rename = "getSkills")]
    Skills,
    #[serde(rename = "getContact")]
    Contact,
    #[serde(rename = "getResume")]
    Resume,
    #[serde(rename = "getInternship")]
    Internship,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::Presentation,
        ToolName::Projects,
        ToolName::Skills,
        ToolName::Contact,
        ToolName::Resume,
        ToolName::Internship,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::Presentation => "getPresentation",
            ToolName::Projects => "getProjects",
            ToolName::Skills => "getSkills",
            ToolName::Contact => "getContact",
            ToolName::Resume => "getResume",
            ToolName::Internship => "getInternship",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ToolName::Presentation => {
                "Professional introduction and personal background, suitable for interviews and formal presentations."
            }
            ToolName::Projects => {
                "Project portfolio with tech stacks, status and highlights of technical achievements."
            }
            ToolName::Skills => {
                "Technical skills grouped by category, plus education and academic achievements."
            }
            ToolName::Contact => "Professional contact information, social profiles and availability.",
            ToolName::Resume => {
                "Resume information: personal details, education, experience, skills and the resume download."
            }
            ToolName::Internship => {
                "Internship and job availability, role preferences, experience summary and career goals."
            }
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = PortfolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| PortfolioError::UnknownTool(s.to_string()))
    }
}

/// Every tool takes no arguments.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct NoArguments {}

fn no_arguments_schema() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(NoArguments))
        .unwrap_or_else(|_| json!({"type": "object"}));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.entry("properties").or_insert_with(|| json!({}));
    }
    schema
}

/// Read-only lookups over the profile, invocable by name in any order.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    profile: Arc<Profile>,
}

impl ToolRegistry {
    pub fn new(profile: Arc<Profile>) -> Self {
        Self { profile }
    }

    /// Provider-facing schemas for all tools.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let parameters = no_arguments_schema();
        ToolName::ALL
            .into_iter()
            .map(|tool| ToolDefinition {
                kind: "function".to_string(),
                function: FunctionDefinition {
                    name: tool.as_str().to_string(),
                    description: tool.description().to_string(),
                    parameters: parameters.clone(),
                },
            })
            .collect()
    }

    pub fn call(&self, tool: ToolName) -> Value {
        tracing::debug!(tool = %tool, "executing tool");
        match tool {
            ToolName::Presentation => self.presentation(),
            ToolName::Projects => self.projects(),
            ToolName::Skills => self.skills(),
            ToolName::Contact => self.contact(),
            ToolName::Resume => self.resume(),
            ToolName::Internship => self.internship(),
        }
    }

    fn presentation(&self) -> Value {
        let p = &self.profile;
        json!({
            "presentation": p.personal.bio,
            "name": p.personal.name,
            "title": p.personal.title,
            "age": p.personal.age,
            "location": p.personal.location,
            "education": p.education.current,
            "traits": p.personality.traits,
            "interests": p.personality.interests,
            "motivation": p.personality.motivation,
            "professionalSummary": PRESENTATION_SUMMARY,
        })
    }

    fn projects(&self) -> Value {
        let projects: Vec<Value> = self
            .profile
            .projects
            .iter()
            .map(|project| {
                json!({
                    "title": project.title,
                    "type": project.category,
                    "date": project.date,
                    "description": project.description,
                    "techStack": project.tech_stack,
                    "status": project.status,
                    "featured": project.featured,
                    "links": project.links,
                    "highlights": project.highlights(),
                })
            })
            .collect();
        json!({ "projects": projects, "summary": PROJECTS_SUMMARY })
    }

    fn technical_skills(&self) -> Value {
        let mut map = serde_json::Map::new();
        for category in self.profile.skills.categories().iter().filter(|c| c.technical) {
            let key = match category.key {
                "ml_ai" => "machineLearning",
                "web_development" => "webDevelopment",
                "devops_cloud" => "devOpsCloud",
                "iot_hardware" => "iotHardware",
                other => other,
            };
            map.insert(key.to_string(), json!(category.entries));
        }
        Value::Object(map)
    }

    fn experience(&self) -> Value {
        json!(self.profile.experience)
    }

    fn skills(&self) -> Value {
        let p = &self.profile;
        json!({
            "technicalSkills": self.technical_skills(),
            "softSkills": p.skills.soft_skills,
            "certifications": p.skills.certifications,
            "education": {
                "degree": p.education.current.degree,
                "institution": p.education.current.institution,
                "cgpa": p.education.current.cgpa,
                "duration": p.education.current.duration,
            },
            "achievements": p.education.achievements,
            "experience": self.experience(),
            "message": SKILLS_MESSAGE,
        })
    }

    fn contact(&self) -> Value {
        let p = &self.profile;
        json!({
            "contact": {
                "email": p.personal.email,
                "location": p.personal.location,
                "availability": p.internship.availability,
            },
            "socialProfiles": p.social,
            "message": CONTACT_MESSAGE,
        })
    }

    fn resume(&self) -> Value {
        let p = &self.profile;
        json!({
            "personalInfo": {
                "name": p.personal.name,
                "email": p.personal.email,
                "location": p.personal.location,
                "title": p.personal.title,
                "profiles": {
                    "github": p.social.github,
                    "linkedin": p.social.linkedin,
                    "twitter": p.social.twitter,
                    "kaggle": p.social.kaggle,
                    "leetcode": p.social.leetcode,
                },
            },
            "summary": p.personal.bio,
            "education": p.education,
            "experience": self.experience(),
            "skills": p.skills,
            "resume": {
                "title": p.resume.title,
                "description": p.resume.description,
                "lastUpdated": p.resume.last_updated,
                "downloadUrl": p.resume.download_url,
            },
            "message": RESUME_MESSAGE,
        })
    }

    fn internship_completed(&self) -> String {
        self.profile
            .experience
            .iter()
            .find(|exp| exp.kind == "Internship")
            .map(|exp| format!("{} at {} ({})", exp.position, exp.company, exp.duration))
            .unwrap_or_else(|| NO_INTERNSHIP_FALLBACK.to_string())
    }

    fn internship(&self) -> Value {
        let p = &self.profile;
        let freelance = p
            .experience
            .iter()
            .find(|exp| exp.kind == "Freelance")
            .map(|exp| exp.description.clone())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| NO_FREELANCE_FALLBACK.to_string());
        let soft: Vec<&str> = p.skills.soft_skills.iter().map(|s| s.name()).collect();

        json!({
            "availability": p.internship.availability,
            "seeking": p.internship.seeking,
            "preferences": {
                "roleTypes": p.internship.focus_areas,
                "workMode": p.internship.preferred_location,
                "location": p.personal.location,
                "startDate": p.internship.start_date,
                "duration": p.internship.duration,
            },
            "experience": {
                "internshipCompleted": self.internship_completed(),
                "freelanceWork": freelance,
                "projectExperience": PROJECT_EXPERIENCE,
                "projectCount": p.projects.len(),
            },
            "skills": {
                "technical": p.skills.technical_names(),
                "soft": soft,
            },
            "achievements": p.education.achievements,
            "lookingFor": {
                "goals": p.internship.goals,
                "workStyle": p.internship.work_style,
                "motivation": p.personality.motivation,
                "interests": p.personality.interests,
            },
            "contact": {
                "email": p.personal.email,
                "linkedin": p.social.linkedin,
                "github": p.social.github,
                "portfolio": PORTFOLIO_NOTE,
            },
            "personality": {
                "traits": p.personality.traits,
                "funFacts": p.personality.fun_facts,
                "workingStyle": p.personality.working_style,
            },
            "professionalMessage": INTERNSHIP_MESSAGE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::fixtures::sample;

    fn registry(profile: Profile) -> ToolRegistry {
        ToolRegistry::new(Arc::new(profile))
    }

    #[test]
    fn names_round_trip_through_serde_and_from_str() {
        for tool in ToolName::ALL {
            let encoded = serde_json::to_value(tool).unwrap();
            assert_eq!(encoded, Value::String(tool.as_str().to_string()));
            assert_eq!(tool.as_str().parse::<ToolName>().unwrap(), tool);
        }
        assert!(matches!(
            "getWeather".parse::<ToolName>(),
            Err(PortfolioError::UnknownTool(_))
        ));
    }

    #[test]
    fn tools_are_pure() {
        let tools = registry(sample());
        for tool in ToolName::ALL {
            let first = serde_json::to_string(&tools.call(tool)).unwrap();
            let second = serde_json::to_string(&tools.call(tool)).unwrap();
            assert_eq!(first, second, "{tool} should be deterministic");
        }
    }

    #[test]
    fn definitions_cover_all_tools_with_empty_object_params() {
        let defs = registry(sample()).definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.function.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["getPresentation", "getProjects", "getSkills", "getContact", "getResume", "getInternship"]
        );
        for def in &defs {
            assert_eq!(def.kind, "function");
            assert_eq!(def.function.parameters["type"], "object");
            assert!(def.function.parameters.get("$schema").is_none());
        }
    }

    #[test]
    fn projects_carry_highlights() {
        let result = registry(sample()).call(ToolName::Projects);
        assert_eq!(result["projects"][0]["highlights"], json!(["94% accuracy"]));
        assert_eq!(result["projects"][1]["highlights"], json!(["Best hardware hack"]));
        assert_eq!(result["projects"][0]["type"], "Machine Learning");
    }

    #[test]
    fn internship_summarises_first_internship() {
        let result = registry(sample()).call(ToolName::Internship);
        assert_eq!(
            result["experience"]["internshipCompleted"],
            "ML Intern at Acme Robotics (Summer 2024)"
        );
        assert_eq!(
            result["experience"]["freelanceWork"],
            "Built storefronts for local businesses"
        );
        assert_eq!(
            result["skills"]["technical"],
            json!(["Rust", "Python", "PyTorch", "Next.js", "PostgreSQL", "ESP32"])
        );
    }

    #[test]
    fn internship_without_internship_experience_uses_fallback() {
        let mut profile = sample();
        profile.experience.retain(|exp| exp.kind != "Internship");
        let result = registry(profile).call(ToolName::Internship);
        assert_eq!(result["experience"]["internshipCompleted"], NO_INTERNSHIP_FALLBACK);
    }

    #[test]
    fn placeholder_profile_never_breaks_tools() {
        let tools = registry(Profile::placeholder());
        for tool in ToolName::ALL {
            assert!(tools.call(tool).is_object());
        }
        let internship = tools.call(ToolName::Internship);
        assert_eq!(internship["experience"]["freelanceWork"], NO_FREELANCE_FALLBACK);
        assert_eq!(tools.call(ToolName::Projects)["projects"], json!([]));
    }

    #[test]
    fn skills_use_camel_case_category_keys() {
        let result = registry(sample()).call(ToolName::Skills);
        let keys: Vec<&str> = result["technicalSkills"].as_object().unwrap().keys().map(String::as_str).collect();
        for key in ["programming", "machineLearning", "webDevelopment", "databases", "devOpsCloud", "iotHardware"] {
            assert!(keys.contains(&key), "missing {key}");
        }
        assert!(!keys.contains(&"ml_ai"));
        assert_eq!(result["technicalSkills"]["machineLearning"], json!(["PyTorch"]));
    }

    #[test]
    fn every_tool_carries_first_person_framing() {
        let tools = registry(sample());
        let framing = [
            (ToolName::Presentation, "professionalSummary"),
            (ToolName::Projects, "summary"),
            (ToolName::Skills, "message"),
            (ToolName::Contact, "message"),
            (ToolName::Resume, "message"),
            (ToolName::Internship, "professionalMessage"),
        ];
        for (tool, field) in framing {
            let text = tools.call(tool)[field].as_str().unwrap_or_default().to_string();
            assert!(text.contains("I'"), "{tool}.{field} should speak in first person");
        }
        let internship = tools.call(ToolName::Internship);
        assert_eq!(internship["experience"]["projectExperience"], PROJECT_EXPERIENCE);
    }

    #[test]
    fn contact_includes_availability() {
        let result = registry(sample()).call(ToolName::Contact);
        assert_eq!(result["contact"]["availability"], "Available from January 2025");
        assert_eq!(result["socialProfiles"]["github"], "https://github.com/adapark");
    }
}
