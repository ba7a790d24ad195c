//! Script generation, debugging and modification.
//!
//! When a request names a script, the resulting code is applied as a new
//! version (or not at all when unchanged). Without a script reference the
//! operation only returns content and writes nothing.

use tracing::info;

use crate::db::DbPool;
use crate::db::scripts::{AppliedVersion, NewScript};
use crate::entity::script;
use crate::error::{AppError, AppResult};
use crate::models::script::title_from_requirements;
use crate::services::diff::{self, LineDiff};
use crate::services::llm::LlmClient;
use crate::services::postprocess::{extract_code, extract_explanation_and_code};
use crate::services::prompts::{self, CODE_OPTIONS};

/// Reply of the "no changes" short-circuit in `explain_changes`.
pub const NO_CHANGES_EXPLANATION: &str = "No changes.";

/// Longest requirements excerpt kept in a version's change note.
const MAX_CHANGE_NOTE_CHARS: usize = 200;

/// Result of a debug or modify request.
#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub explanation: String,
    pub code: String,
    pub diff: LineDiff,
    /// Set only when a script was referenced and its content changed
    pub applied: Option<AppliedVersion>,
}

fn change_note(prefix: &str, detail: &str) -> String {
    let detail = detail.trim();
    if detail.is_empty() {
        return prefix.to_string();
    }
    let excerpt: String = detail.chars().take(MAX_CHANGE_NOTE_CHARS).collect();
    if excerpt.len() < detail.len() {
        format!("{}: {}...", prefix, excerpt)
    } else {
        format!("{}: {}", prefix, excerpt)
    }
}

/// Generate a new script and store it as version 1.
pub async fn generate_script(
    pool: &DbPool,
    llm: &LlmClient,
    language: &str,
    requirements: &str,
) -> AppResult<AppliedVersion> {
    let prompt = prompts::generate_script(language, requirements);
    let raw = llm.complete(&prompt.system, prompt.user, CODE_OPTIONS).await?;

    let code = extract_code(&raw).trim().to_string();
    if code.is_empty() {
        return Err(AppError::Provider("model returned no code".to_string()));
    }

    pool.create_script(NewScript {
        title: title_from_requirements(language, requirements),
        language: language.to_string(),
        content: code,
        changes: Some(change_note("Generated from requirements", requirements)),
    })
    .await
}

/// Resolve the optional script reference before any model call.
async fn referenced_script(pool: &DbPool, script_id: Option<i32>) -> AppResult<Option<script::Model>> {
    match script_id {
        Some(id) => Ok(Some(pool.require_script(id).await?)),
        None => Ok(None),
    }
}

async fn apply_edit(
    pool: &DbPool,
    script: Option<&script::Model>,
    code: &str,
    note: String,
) -> AppResult<Option<AppliedVersion>> {
    match script {
        Some(script) => pool.apply_new_version(script, code, &note).await,
        None => Ok(None),
    }
}

/// Find and fix problems in a script.
pub async fn debug_script(
    pool: &DbPool,
    llm: &LlmClient,
    script_id: Option<i32>,
    script_content: &str,
    error_log: Option<&str>,
) -> AppResult<EditOutcome> {
    let script = referenced_script(pool, script_id).await?;

    let prompt = prompts::debug_script(script_content, error_log);
    let raw = llm.complete(&prompt.system, prompt.user, CODE_OPTIONS).await?;
    let (analysis, fixed_code) = extract_explanation_and_code(&raw);
    if fixed_code.trim().is_empty() {
        return Err(AppError::Provider("model returned no code".to_string()));
    }

    let applied = apply_edit(
        pool,
        script.as_ref(),
        &fixed_code,
        change_note("Debug fix", &analysis),
    )
    .await?;

    info!(
        "Debug completed: script_id={:?}, new_version={:?}",
        script_id,
        applied.as_ref().map(|a| a.version.version)
    );

    Ok(EditOutcome {
        diff: diff::diff(script_content, &fixed_code),
        explanation: analysis,
        code: fixed_code,
        applied,
    })
}

/// Change a script according to free-text instructions.
pub async fn modify_script(
    pool: &DbPool,
    llm: &LlmClient,
    script_id: Option<i32>,
    script_content: &str,
    modification_request: &str,
) -> AppResult<EditOutcome> {
    let script = referenced_script(pool, script_id).await?;

    let prompt = prompts::modify_script(script_content, modification_request);
    let raw = llm.complete(&prompt.system, prompt.user, CODE_OPTIONS).await?;
    let (explanation, modified_code) = extract_explanation_and_code(&raw);
    if modified_code.trim().is_empty() {
        return Err(AppError::Provider("model returned no code".to_string()));
    }

    let applied = apply_edit(
        pool,
        script.as_ref(),
        &modified_code,
        change_note("Modification", modification_request),
    )
    .await?;

    info!(
        "Modify completed: script_id={:?}, new_version={:?}",
        script_id,
        applied.as_ref().map(|a| a.version.version)
    );

    Ok(EditOutcome {
        diff: diff::diff(script_content, &modified_code),
        explanation,
        code: modified_code,
        applied,
    })
}

/// Explain the differences between two texts. Identical inputs are answered
/// without calling the model.
pub async fn explain_changes(
    llm: &LlmClient,
    original: &str,
    modified: &str,
) -> AppResult<(String, LineDiff)> {
    let line_diff = diff::diff(original, modified);
    if line_diff.no_changes {
        return Ok((NO_CHANGES_EXPLANATION.to_string(), line_diff));
    }

    let prompt = prompts::explain_changes(original, modified);
    let explanation = llm.complete(&prompt.system, prompt.user, CODE_OPTIONS).await?;

    Ok((explanation.trim().to_string(), line_diff))
}

/// Diff two stored versions of a script.
pub async fn compare_versions(
    pool: &DbPool,
    script_id: i32,
    from_version: i32,
    to_version: i32,
) -> AppResult<LineDiff> {
    pool.require_script(script_id).await?;

    let from = pool
        .get_version(script_id, from_version)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Version {} of script {}", from_version, script_id)))?;
    let to = pool
        .get_version(script_id, to_version)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Version {} of script {}", to_version, script_id)))?;

    Ok(diff::diff(&from.content, &to.content))
}
