//! Profile getters backed by a static JSON document.
//!
//! The document ships inside the binary; `PROFILE_PATH` can point at a
//! replacement with the same top-level sections.

use async_trait::async_trait;
use lazy_static::lazy_static;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::{Tool, ToolError};
use crate::config::ConfigError;

lazy_static! {
    static ref BUNDLED_PROFILE: Value =
        serde_json::from_str(include_str!("../../../../data/profile.json"))
            .expect("bundled profile.json must be valid JSON");
}

pub const EXPERIENCE_DETAILS: [&str; 5] = ["current", "previous", "startup", "research", "all"];

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    data: Value,
}

impl Profile {
    pub fn bundled() -> Self {
        Self {
            data: BUNDLED_PROFILE.clone(),
        }
    }

    pub fn from_value(data: Value) -> Self {
        Self { data }
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::bundled());
        };

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ProfileIo {
            path: path.to_path_buf(),
            source,
        })?;
        let data: Value = serde_json::from_str(&raw)?;
        info!("Loaded profile data from {}", path.display());
        Ok(Self { data })
    }

    /// Display name used in the persona prompt.
    pub fn name(&self) -> &str {
        self.data
            .pointer("/me/name")
            .and_then(Value::as_str)
            .unwrap_or("the portfolio owner")
    }

    pub fn section(&self, key: &str) -> Option<&Value> {
        self.data.get(key).filter(|v| !v.is_null())
    }

    fn require(&self, key: &str) -> Result<Value, ToolError> {
        self.section(key)
            .cloned()
            .ok_or_else(|| ToolError::Execution(format!("No {} information is available.", key)))
    }
}

fn no_arguments() -> Value {
    json!({ "type": "object", "properties": {} })
}

pub struct GetMe {
    profile: Arc<Profile>,
}

#[async_trait]
impl Tool for GetMe {
    fn name(&self) -> &str {
        "getMe"
    }

    fn description(&self) -> &str {
        "Personal information about me: background, interests, expertise, education and experience."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The user's question about me" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, _args: &Value) -> Result<Value, ToolError> {
        self.profile.require("me")
    }
}

pub struct GetExperience {
    profile: Arc<Profile>,
}

#[async_trait]
impl Tool for GetExperience {
    fn name(&self) -> &str {
        "getExperience"
    }

    fn description(&self) -> &str {
        "Professional experience: current venture, previous roles, startup work and research. \
         Use for work history, roles or career journey questions."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "detail": {
                    "type": "string",
                    "enum": EXPERIENCE_DETAILS,
                    "description": "Which experience to focus on; defaults to all"
                }
            }
        })
    }

    async fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let experience = self.profile.require("experience")?;
        let detail = args.get("detail").and_then(Value::as_str).unwrap_or("all");

        if detail == "all" {
            return Ok(experience);
        }

        experience
            .get(detail)
            .filter(|v| !v.is_null())
            .map(|section| json!({ detail: section }))
            .ok_or_else(|| ToolError::Execution(format!("No {} experience is available.", detail)))
    }
}

/// Returns one top-level profile section verbatim.
pub struct SectionTool {
    name: &'static str,
    description: &'static str,
    section: &'static str,
    profile: Arc<Profile>,
}

#[async_trait]
impl Tool for SectionTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters(&self) -> Value {
        no_arguments()
    }

    async fn execute(&self, _args: &Value) -> Result<Value, ToolError> {
        self.profile.require(self.section)
    }
}

const SECTION_TOOLS: [(&str, &str, &str); 8] = [
    ("getProjects", "projects", "List of my projects with summaries, roles and technologies."),
    ("getSkills", "skills", "My technical and soft skills, tools and certifications."),
    ("getResume", "resume", "Access to my resume: download link and highlights."),
    ("getContact", "contact", "My contact details: email, location and social links. Use when asked how to reach me."),
    ("getSports", "interests", "My sports, hobbies and interests outside of work."),
    ("getPresentation", "presentation", "A concise personal introduction. Use for \"Who are you?\" or \"Tell me about yourself\"."),
    ("getCrazy", "crazy", "The craziest thing I've ever done. Use when asked for an adventurous or surprising story."),
    ("getInternship", "internship", "What kind of internship or role I'm looking for, with availability and focus areas."),
];

pub fn profile_tools(profile: Arc<Profile>) -> Vec<Arc<dyn Tool>> {
    let mut tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(GetMe {
            profile: profile.clone(),
        }),
        Arc::new(GetExperience {
            profile: profile.clone(),
        }),
    ];

    tools.extend(SECTION_TOOLS.iter().map(|&(name, section, description)| {
        Arc::new(SectionTool {
            name,
            description,
            section,
            profile: profile.clone(),
        }) as Arc<dyn Tool>
    }));

    tools
}
