//! Script and script version models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entity::{script, script_version};

/// A stored script. `content` is always the content of its latest version.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Script {
    pub id: i32,
    pub title: String,
    /// Programming language, e.g. "python"
    pub language: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<script::Model> for Script {
    fn from(model: script::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            language: model.language,
            content: model.content,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Immutable snapshot of a script.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScriptVersion {
    pub id: i32,
    pub script_id: i32,
    /// 1-based, strictly increasing per script
    pub version: i32,
    pub content: String,
    /// What changed relative to the previous version
    pub changes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<script_version::Model> for ScriptVersion {
    fn from(model: script_version::Model) -> Self {
        Self {
            id: model.id,
            script_id: model.script_id,
            version: model.version,
            content: model.content,
            changes: model.changes,
            created_at: model.created_at,
        }
    }
}

/// Title for a generated script, derived from its requirements.
pub fn title_from_requirements(language: &str, requirements: &str) -> String {
    const MAX_TITLE_CHARS: usize = 60;

    let first_line = requirements.lines().next().unwrap_or("").trim();
    if first_line.is_empty() {
        return format!("{} script", language);
    }
    if first_line.chars().count() <= MAX_TITLE_CHARS {
        return first_line.to_string();
    }
    let truncated: String = first_line.chars().take(MAX_TITLE_CHARS).collect();
    format!("{}...", truncated.trim_end())
}
