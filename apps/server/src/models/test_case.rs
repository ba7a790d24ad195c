//! Test case model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entity::test_case;

/// Generated test code for a script.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TestCase {
    pub id: i32,
    pub script_id: i32,
    pub title: String,
    /// Test source code
    pub content: String,
    pub language: String,
    /// Requirements the tests were generated for
    pub requirements: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<test_case::Model> for TestCase {
    fn from(model: test_case::Model) -> Self {
        Self {
            id: model.id,
            script_id: model.script_id,
            title: model.title,
            content: model.content,
            language: model.language,
            requirements: model.requirements,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
