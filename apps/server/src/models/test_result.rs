//! Test result model representing one execution of a test case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entity::test_result;

/// Test execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// All tests passed
    Passed,
    /// Tests ran and at least one assertion failed
    Failed,
    /// Tests could not run to completion (import error, crash, timeout)
    Error,
}

impl TestStatus {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }

    /// Parse from string representation.
    pub fn parse(s: &str) -> Self {
        match s {
            "passed" => Self::Passed,
            "failed" => Self::Failed,
            _ => Self::Error, // Unknown statuses are treated as errors
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one test execution.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TestResult {
    pub id: i32,
    pub test_case_id: i32,
    pub status: TestStatus,
    /// Combined stdout/stderr of the run
    pub output: Option<String>,
    /// Wall-clock seconds
    pub execution_time: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl From<test_result::Model> for TestResult {
    fn from(model: test_result::Model) -> Self {
        Self {
            id: model.id,
            test_case_id: model.test_case_id,
            status: TestStatus::parse(&model.status),
            output: model.output,
            execution_time: model.execution_time,
            created_at: model.created_at,
        }
    }
}
