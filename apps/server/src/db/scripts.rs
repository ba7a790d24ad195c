//! Versioned script storage.
//!
//! A script's `content` always equals the content of its highest-numbered
//! version. Every write that changes `content` appends exactly one version row
//! in the same transaction.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use tracing::{debug, info};

use crate::entity::script::{self, ActiveModel as ScriptActiveModel, Entity as Script};
use crate::entity::script_version::{
    self, ActiveModel as ScriptVersionActiveModel, Entity as ScriptVersion,
};
use crate::entity::test_case::{self, Entity as TestCase};
use crate::entity::test_result::{self, Entity as TestResult};
use crate::error::{AppError, AppResult};

use super::DbPool;

/// Represents a script to be inserted.
pub struct NewScript {
    pub title: String,
    pub language: String,
    pub content: String,
    /// Description recorded on version 1
    pub changes: Option<String>,
}

/// Result of applying an edit to a script.
#[derive(Debug, Clone)]
pub struct AppliedVersion {
    pub script: script::Model,
    pub version: script_version::Model,
}

/// Next version number for a script: `max(existing) + 1`, or 1 when none exist.
async fn next_version_number<C: ConnectionTrait>(conn: &C, script_id: i32) -> AppResult<i32> {
    let latest = ScriptVersion::find()
        .filter(script_version::Column::ScriptId.eq(script_id))
        .order_by_desc(script_version::Column::Version)
        .one(conn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to read latest version: {}", e)))?;

    Ok(latest.map_or(1, |v| v.version + 1))
}

async fn insert_version<C: ConnectionTrait>(
    conn: &C,
    script_id: i32,
    version: i32,
    content: String,
    changes: Option<String>,
) -> AppResult<script_version::Model> {
    ScriptVersionActiveModel {
        script_id: Set(script_id),
        version: Set(version),
        content: Set(content),
        changes: Set(changes),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(|e| AppError::Database(format!("Failed to insert script version: {}", e)))
}

impl DbPool {
    /// Create a script together with its version 1, atomically.
    pub async fn create_script(&self, new_script: NewScript) -> AppResult<AppliedVersion> {
        let txn = self.begin().await?;
        let now = Utc::now();

        let script = ScriptActiveModel {
            title: Set(new_script.title),
            language: Set(new_script.language),
            content: Set(new_script.content.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert script: {}", e)))?;

        let version = insert_version(
            &txn,
            script.id,
            1,
            new_script.content,
            new_script.changes.or_else(|| Some("Initial version".to_string())),
        )
        .await?;

        txn.commit().await?;

        info!("Script created: script_id={}, version=1", script.id);

        Ok(AppliedVersion { script, version })
    }

    /// Append a new version if `new_content` differs from the stored content.
    ///
    /// Returns `None` without writing anything when the content is unchanged, so
    /// repeating an identical edit never creates a spurious version.
    pub async fn apply_new_version(
        &self,
        script: &script::Model,
        new_content: &str,
        changes: &str,
    ) -> AppResult<Option<AppliedVersion>> {
        let txn = self.begin().await?;

        // Compare against the committed row, not the caller's possibly stale copy
        let current = Script::find_by_id(script.id)
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to get script: {}", e)))?
            .ok_or_else(|| AppError::NotFound(format!("Script {}", script.id)))?;

        if current.content == new_content {
            debug!(
                "Content unchanged, no version created: script_id={}",
                script.id
            );
            return Ok(None);
        }

        let number = next_version_number(&txn, current.id).await?;
        let version = insert_version(
            &txn,
            current.id,
            number,
            new_content.to_string(),
            Some(changes.to_string()),
        )
        .await?;

        let mut active = current.into_active_model();
        active.content = Set(new_content.to_string());
        active.updated_at = Set(version.created_at);
        let script = active
            .update(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to update script: {}", e)))?;

        txn.commit().await?;

        info!(
            "Script version appended: script_id={}, version={}",
            script.id, version.version
        );

        Ok(Some(AppliedVersion { script, version }))
    }

    /// Get a single script by ID.
    pub async fn get_script(&self, script_id: i32) -> AppResult<Option<script::Model>> {
        Script::find_by_id(script_id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get script: {}", e)))
    }

    /// Get a script or fail with NotFound.
    pub async fn require_script(&self, script_id: i32) -> AppResult<script::Model> {
        self.get_script(script_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Script {}", script_id)))
    }

    /// List all scripts, most recently updated first.
    pub async fn list_scripts(&self) -> AppResult<Vec<script::Model>> {
        Script::find()
            .order_by_desc(script::Column::UpdatedAt)
            .order_by_desc(script::Column::Id)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list scripts: {}", e)))
    }

    /// List the versions of a script in ascending version order.
    pub async fn list_versions(&self, script_id: i32) -> AppResult<Vec<script_version::Model>> {
        ScriptVersion::find()
            .filter(script_version::Column::ScriptId.eq(script_id))
            .order_by_asc(script_version::Column::Version)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list script versions: {}", e)))
    }

    /// Get one numbered version of a script.
    pub async fn get_version(
        &self,
        script_id: i32,
        version: i32,
    ) -> AppResult<Option<script_version::Model>> {
        ScriptVersion::find()
            .filter(script_version::Column::ScriptId.eq(script_id))
            .filter(script_version::Column::Version.eq(version))
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get script version: {}", e)))
    }

    /// Delete a script with its versions, test cases and test results.
    ///
    /// Returns false if the script did not exist.
    pub async fn delete_script(&self, script_id: i32) -> AppResult<bool> {
        let txn = self.begin().await?;

        let test_case_ids: Vec<i32> = TestCase::find()
            .filter(test_case::Column::ScriptId.eq(script_id))
            .all(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to list test cases: {}", e)))?
            .into_iter()
            .map(|tc| tc.id)
            .collect();

        if !test_case_ids.is_empty() {
            TestResult::delete_many()
                .filter(test_result::Column::TestCaseId.is_in(test_case_ids))
                .exec(&txn)
                .await
                .map_err(|e| AppError::Database(format!("Failed to delete test results: {}", e)))?;
        }

        TestCase::delete_many()
            .filter(test_case::Column::ScriptId.eq(script_id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete test cases: {}", e)))?;

        ScriptVersion::delete_many()
            .filter(script_version::Column::ScriptId.eq(script_id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete script versions: {}", e)))?;

        let deleted = Script::delete_by_id(script_id)
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete script: {}", e)))?;

        txn.commit().await?;

        if deleted.rows_affected > 0 {
            info!("Script deleted: script_id={}", script_id);
        }

        Ok(deleted.rows_affected > 0)
    }
}
