//! Database queries for test cases and test results.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use tracing::info;

use crate::entity::test_case::{self, ActiveModel as TestCaseActiveModel, Entity as TestCase};
use crate::entity::test_result::{
    self, ActiveModel as TestResultActiveModel, Entity as TestResult,
};
use crate::error::{AppError, AppResult};
use crate::models::TestStatus;

use super::DbPool;

/// Represents a test case to be inserted.
pub struct NewTestCase {
    pub script_id: i32,
    pub title: String,
    pub content: String,
    pub language: String,
    pub requirements: Option<String>,
}

/// Represents a test result to be recorded.
pub struct NewTestResult {
    pub test_case_id: i32,
    pub status: TestStatus,
    pub output: String,
    pub execution_time: Option<f64>,
}

impl DbPool {
    /// Insert a new test case.
    pub async fn insert_test_case(&self, new_case: NewTestCase) -> AppResult<test_case::Model> {
        let now = Utc::now();

        let model = TestCaseActiveModel {
            script_id: Set(new_case.script_id),
            title: Set(new_case.title),
            content: Set(new_case.content),
            language: Set(new_case.language),
            requirements: Set(new_case.requirements),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let result = model
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert test case: {}", e)))?;

        info!(
            "Test case created: test_case_id={}, script_id={}",
            result.id, result.script_id
        );

        Ok(result)
    }

    /// Get a single test case by ID.
    pub async fn get_test_case(&self, test_case_id: i32) -> AppResult<Option<test_case::Model>> {
        TestCase::find_by_id(test_case_id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get test case: {}", e)))
    }

    /// Get a test case or fail with NotFound.
    pub async fn require_test_case(&self, test_case_id: i32) -> AppResult<test_case::Model> {
        self.get_test_case(test_case_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Test case {}", test_case_id)))
    }

    /// List test cases, optionally restricted to one script, most recently updated first.
    pub async fn list_test_cases(&self, script_id: Option<i32>) -> AppResult<Vec<test_case::Model>> {
        let mut select = TestCase::find();

        if let Some(script_id) = script_id {
            select = select.filter(test_case::Column::ScriptId.eq(script_id));
        }

        select
            .order_by_desc(test_case::Column::UpdatedAt)
            .order_by_desc(test_case::Column::Id)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list test cases: {}", e)))
    }

    /// Replace the code of a test case.
    pub async fn update_test_case_content(
        &self,
        test_case: test_case::Model,
        content: String,
    ) -> AppResult<test_case::Model> {
        let mut active = test_case.into_active_model();
        active.content = Set(content);
        active.updated_at = Set(Utc::now());

        active
            .update(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to update test case: {}", e)))
    }

    /// Record the outcome of one test execution.
    pub async fn record_test_result(&self, result: NewTestResult) -> AppResult<test_result::Model> {
        let model = TestResultActiveModel {
            test_case_id: Set(result.test_case_id),
            status: Set(result.status.as_str().to_string()),
            output: Set(Some(result.output)),
            execution_time: Set(result.execution_time),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        let saved = model
            .insert(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to record test result: {}", e)))?;

        info!(
            "Test result recorded: test_case_id={}, status={}",
            saved.test_case_id, saved.status
        );

        Ok(saved)
    }

    /// List results of a test case, newest first.
    pub async fn list_test_results(&self, test_case_id: i32) -> AppResult<Vec<test_result::Model>> {
        TestResult::find()
            .filter(test_result::Column::TestCaseId.eq(test_case_id))
            .order_by_desc(test_result::Column::CreatedAt)
            .order_by_desc(test_result::Column::Id)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list test results: {}", e)))
    }

    /// Most recent result of a test case.
    pub async fn latest_test_result(
        &self,
        test_case_id: i32,
    ) -> AppResult<Option<test_result::Model>> {
        TestResult::find()
            .filter(test_result::Column::TestCaseId.eq(test_case_id))
            .order_by_desc(test_result::Column::CreatedAt)
            .order_by_desc(test_result::Column::Id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get latest test result: {}", e)))
    }
}
