use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{PortfolioError, Result};

/// Top-level sections that must be present for a profile to be served as-is.
pub const REQUIRED_SECTIONS: [&str; 5] = ["personal", "education", "experience", "skills", "projects"];

/// Structured personal/professional record the whole application is derived from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub personal: PersonalInfo,
    pub education: Education,
    pub experience: Vec<Experience>,
    pub skills: Skills,
    pub projects: Vec<Project>,
    pub social: Social,
    pub internship: Internship,
    pub personality: Personality,
    pub resume: Resume,
    pub chatbot: Chatbot,
    pub preset_questions: PresetQuestions,
    pub meta: Meta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalInfo {
    pub name: String,
    pub age: u32,
    pub location: String,
    pub title: String,
    pub email: String,
    pub handle: String,
    pub bio: String,
    pub avatar: String,
    pub fallback_avatar: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Education {
    pub current: CurrentEducation,
    pub achievements: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CurrentEducation {
    pub degree: String,
    pub institution: String,
    pub duration: String,
    pub cgpa: String,
    pub graduation_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Experience {
    pub company: String,
    pub position: String,
    /// "Internship", "Freelance", "Full-time", ...
    #[serde(rename = "type")]
    pub kind: String,
    pub duration: String,
    pub description: String,
    pub technologies: Vec<String>,
}

/// A skill is either a bare name or a named certificate with a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SkillEntry {
    Name(String),
    Certificate { name: String, url: String },
}

impl SkillEntry {
    pub fn name(&self) -> &str {
        match self {
            SkillEntry::Name(name) => name,
            SkillEntry::Certificate { name, .. } => name,
        }
    }
}

/// Skills taxonomy. Keys stay snake_case in the profile document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Skills {
    pub programming: Vec<SkillEntry>,
    pub ml_ai: Vec<SkillEntry>,
    pub web_development: Vec<SkillEntry>,
    pub databases: Vec<SkillEntry>,
    pub devops_cloud: Vec<SkillEntry>,
    pub iot_hardware: Vec<SkillEntry>,
    pub soft_skills: Vec<SkillEntry>,
    pub certifications: Vec<SkillEntry>,
}

/// One named category of the skills taxonomy, in display order.
#[derive(Debug, Clone, Copy)]
pub struct SkillCategory<'a> {
    pub key: &'static str,
    pub label: &'static str,
    pub technical: bool,
    pub entries: &'a [SkillEntry],
}

impl Skills {
    pub fn categories(&self) -> [SkillCategory<'_>; 8] {
        [
            SkillCategory { key: "programming", label: "Programming Languages", technical: true, entries: &self.programming },
            SkillCategory { key: "ml_ai", label: "ML/AI Technologies", technical: true, entries: &self.ml_ai },
            SkillCategory { key: "web_development", label: "Web Development", technical: true, entries: &self.web_development },
            SkillCategory { key: "databases", label: "Databases", technical: true, entries: &self.databases },
            SkillCategory { key: "devops_cloud", label: "DevOps & Cloud", technical: true, entries: &self.devops_cloud },
            SkillCategory { key: "iot_hardware", label: "IoT & Hardware", technical: true, entries: &self.iot_hardware },
            SkillCategory { key: "soft_skills", label: "Soft Skills", technical: false, entries: &self.soft_skills },
            SkillCategory { key: "certifications", label: "Certifications", technical: false, entries: &self.certifications },
        ]
    }

    /// Names across every technical category, in category order.
    pub fn technical_names(&self) -> Vec<String> {
        self.categories()
            .iter()
            .filter(|c| c.technical)
            .flat_map(|c| c.entries.iter().map(|e| e.name().to_string()))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectLink {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectImage {
    pub src: String,
    pub alt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub title: String,
    pub category: String,
    pub description: String,
    pub tech_stack: Vec<String>,
    pub date: String,
    pub status: String,
    pub featured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub achievements: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<String>>,
    pub links: Vec<ProjectLink>,
    pub images: Vec<ProjectImage>,
}

impl Project {
    /// Achievements when the project lists any (even an empty list), else metrics, else nothing.
    pub fn highlights(&self) -> Vec<String> {
        self.achievements
            .as_ref()
            .or(self.metrics.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Social {
    pub linkedin: String,
    pub github: String,
    pub twitter: String,
    pub kaggle: String,
    pub leetcode: String,
    pub fiverr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Internship {
    pub seeking: bool,
    pub duration: String,
    pub start_date: String,
    pub preferred_location: String,
    pub focus_areas: Vec<String>,
    pub availability: String,
    pub work_style: String,
    pub goals: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Personality {
    pub traits: Vec<String>,
    pub interests: Vec<String>,
    pub fun_facts: Vec<String>,
    pub working_style: String,
    pub motivation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Resume {
    pub title: String,
    pub description: String,
    pub file_type: String,
    pub last_updated: String,
    pub file_size: String,
    pub download_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Chatbot {
    pub name: String,
    pub personality: String,
    pub tone: String,
    pub language: String,
    pub response_style: String,
    pub use_emojis: bool,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetQuestions {
    pub me: Vec<String>,
    pub professional: Vec<String>,
    pub projects: Vec<String>,
    pub contact: Vec<String>,
    pub fun: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Meta {
    pub config_version: String,
    pub last_updated: String,
    pub generated_by: String,
    pub description: String,
}

impl Profile {
    /// The "Configuration Error" persona served when the real profile cannot be used.
    pub fn placeholder() -> Self {
        Self {
            personal: PersonalInfo {
                name: "Configuration Error".to_string(),
                age: 0,
                location: "Unknown".to_string(),
                title: "Error Loading Config".to_string(),
                email: "error@example.com".to_string(),
                handle: "@error".to_string(),
                bio: "Configuration file could not be loaded".to_string(),
                avatar: "/placeholder.jpg".to_string(),
                fallback_avatar: "/placeholder.jpg".to_string(),
            },
            education: Education {
                current: CurrentEducation {
                    degree: "Error".to_string(),
                    institution: "Error".to_string(),
                    duration: "Error".to_string(),
                    cgpa: "Error".to_string(),
                    graduation_date: "Error".to_string(),
                },
                achievements: Vec::new(),
            },
            ..Self::default()
        }
    }

    /// Parse a profile document, rejecting it if a required section is absent or mistyped.
    pub fn from_value(mut value: serde_json::Value) -> Result<Self> {
        let sections = value
            .as_object()
            .ok_or_else(|| PortfolioError::Config("profile root must be an object".to_string()))?;

        for name in REQUIRED_SECTIONS {
            let well_formed = match sections.get(name) {
                Some(section) if matches!(name, "experience" | "projects") => section.is_array(),
                Some(section) => section.is_object(),
                None => false,
            };
            if !well_formed {
                return Err(PortfolioError::Config(format!(
                    "profile section '{name}' is missing or malformed"
                )));
            }
        }

        drop_nulls(&mut value);
        Ok(serde_json::from_value(value)?)
    }

    /// Load from disk. `.json` files are parsed as JSON, anything else as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let value: serde_json::Value = if is_json {
            serde_json::from_str(&contents)?
        } else {
            serde_yaml::from_str(&contents)?
        };
        Self::from_value(value)
    }

    /// Load the profile, degrading to the placeholder on any failure.
    ///
    /// The error is handed back so the caller decides how loudly to report it.
    pub fn load_or_placeholder(path: impl AsRef<Path>) -> (Self, Option<PortfolioError>) {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(profile) => {
                tracing::info!("Loaded profile from {}", path.display());
                (profile, None)
            }
            Err(e) => {
                tracing::error!(
                    "Failed to load profile {}: {} - serving placeholder profile",
                    path.display(),
                    e
                );
                (Self::placeholder(), Some(e))
            }
        }
    }
}

/// Treat `null` like an absent key so the field falls back to its default.
fn drop_nulls(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(drop_nulls);
        }
        serde_json::Value::Array(items) => {
            items.retain(|v| !v.is_null());
            items.iter_mut().for_each(drop_nulls);
        }
        _ => {}
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use serde_json::json;

    pub fn sample_value() -> serde_json::Value {
        json!({
            "personal": {
                "name": "Ada Park",
                "age": 22,
                "location": "Pune, India",
                "title": "Computer Engineering Student",
                "email": "ada@example.com",
                "handle": "@adapark",
                "bio": "I build ML systems and the web apps around them.",
                "avatar": "/avatar.png",
                "fallbackAvatar": "/avatar-fallback.png"
            },
            "education": {
                "current": {
                    "degree": "B.Tech Computer Engineering",
                    "institution": "State Institute of Technology",
                    "duration": "2021 - 2025",
                    "cgpa": "8.9",
                    "graduationDate": "May 2025"
                },
                "achievements": ["Hackathon winner", "Dean's list"]
            },
            "experience": [
                {
                    "company": "Freelance",
                    "position": "Web Developer",
                    "type": "Freelance",
                    "duration": "2022 - present",
                    "description": "Built storefronts for local businesses",
                    "technologies": ["Next.js", "PostgreSQL"]
                },
                {
                    "company": "Acme Robotics",
                    "position": "ML Intern",
                    "type": "Internship",
                    "duration": "Summer 2024",
                    "description": "Trained defect detection models",
                    "technologies": ["PyTorch"]
                }
            ],
            "skills": {
                "programming": ["Rust", "Python"],
                "ml_ai": ["PyTorch"],
                "web_development": ["Next.js"],
                "databases": ["PostgreSQL"],
                "devops_cloud": [],
                "iot_hardware": ["ESP32"],
                "soft_skills": ["Communication"],
                "certifications": [{"name": "AWS Cloud Practitioner", "url": "https://example.com/aws"}]
            },
            "projects": [
                {
                    "title": "Crop Doctor",
                    "category": "Machine Learning",
                    "description": "Leaf disease classifier",
                    "techStack": ["PyTorch", "FastAPI"],
                    "date": "2024",
                    "status": "Completed",
                    "featured": true,
                    "metrics": ["94% accuracy"],
                    "links": [{"name": "GitHub", "url": "https://github.com/ada/crop-doctor"}],
                    "images": [{"src": "/crop.png", "alt": "Crop Doctor"}]
                },
                {
                    "title": "Smart Meter",
                    "category": "IoT",
                    "description": "Home energy monitor",
                    "techStack": ["ESP32", "MQTT"],
                    "date": "2023",
                    "status": "Completed",
                    "featured": false,
                    "achievements": ["Best hardware hack"],
                    "metrics": ["-12% energy use"],
                    "links": [],
                    "images": []
                }
            ],
            "social": {
                "linkedin": "https://linkedin.com/in/adapark",
                "github": "https://github.com/adapark",
                "twitter": "",
                "kaggle": "",
                "leetcode": "https://leetcode.com/adapark",
                "fiverr": ""
            },
            "internship": {
                "seeking": true,
                "duration": "6 months",
                "startDate": "January 2025",
                "preferredLocation": "Remote or Pune",
                "focusAreas": ["ML Engineering", "Backend"],
                "availability": "Available from January 2025",
                "workStyle": "Async-friendly",
                "goals": "Ship ML products to real users"
            },
            "personality": {
                "traits": ["Curious", "Persistent"],
                "interests": ["Robotics"],
                "funFacts": ["Solved a Rubik's cube in 40s"],
                "workingStyle": "Small iterations",
                "motivation": "Building useful things"
            },
            "resume": {
                "title": "Ada Park - Resume",
                "description": "One-page resume",
                "fileType": "PDF",
                "lastUpdated": "2024-10-01",
                "fileSize": "120 KB",
                "downloadUrl": "/resume.pdf"
            }
        })
    }

    pub fn sample() -> Profile {
        Profile::from_value(sample_value()).expect("sample profile should parse")
    }
}
