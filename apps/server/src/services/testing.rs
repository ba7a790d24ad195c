//! Test case generation, execution and improvement.

use tracing::info;

use crate::db::DbPool;
use crate::db::test_cases::{NewTestCase, NewTestResult};
use crate::entity::{script, test_case, test_result};
use crate::error::{AppError, AppResult};
use crate::services::llm::LlmClient;
use crate::services::postprocess::extract_code;
use crate::services::prompts::{self, Prompt, TEST_OPTIONS};
use crate::services::test_runner::TestRunner;

/// Output used for improvement when a test case has never run.
const NO_OUTPUT: &str = "The tests have not been executed yet.";

/// Prompt for generating tests for a stored script.
pub fn generation_prompt(script: &script::Model, requirements: Option<&str>) -> Prompt {
    prompts::generate_tests(&script.content, &script.language, requirements)
}

/// Store generated test code for a script.
pub async fn store_generated_tests(
    pool: &DbPool,
    script: &script::Model,
    requirements: Option<&str>,
    raw_reply: &str,
) -> AppResult<test_case::Model> {
    let code = extract_code(raw_reply).trim().to_string();
    if code.is_empty() {
        return Err(AppError::Provider("model returned no test code".to_string()));
    }

    pool.insert_test_case(NewTestCase {
        script_id: script.id,
        title: format!("Tests for {}", script.title),
        content: code,
        language: script.language.clone(),
        requirements: requirements
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
    })
    .await
}

/// Generate and store tests for a script.
pub async fn generate_test_case(
    pool: &DbPool,
    llm: &LlmClient,
    script_id: i32,
    requirements: Option<&str>,
) -> AppResult<test_case::Model> {
    let script = pool.require_script(script_id).await?;

    let prompt = generation_prompt(&script, requirements);
    let raw = llm.complete(&prompt.system, prompt.user, TEST_OPTIONS).await?;

    store_generated_tests(pool, &script, requirements, &raw).await
}

/// Run a test case against the current content of its script and record
/// exactly one result.
pub async fn execute_test_case(
    pool: &DbPool,
    runner: &dyn TestRunner,
    test_case_id: i32,
) -> AppResult<test_result::Model> {
    let test_case = pool.require_test_case(test_case_id).await?;
    let script = pool.require_script(test_case.script_id).await?;

    let outcome = runner
        .run(&test_case.language, &script.content, &test_case.content)
        .await;

    info!(
        "Test case executed: test_case_id={}, status={}",
        test_case.id, outcome.status
    );

    pool.record_test_result(NewTestResult {
        test_case_id: test_case.id,
        status: outcome.status,
        output: outcome.output,
        execution_time: Some(outcome.execution_time),
    })
    .await
}

/// Rewrite a test case using the output of a run.
///
/// Uses `test_output` when given, otherwise the latest recorded result.
pub async fn improve_test_case(
    pool: &DbPool,
    llm: &LlmClient,
    test_case_id: i32,
    test_output: Option<&str>,
) -> AppResult<test_case::Model> {
    let test_case = pool.require_test_case(test_case_id).await?;
    let script = pool.require_script(test_case.script_id).await?;

    let output = match test_output.filter(|o| !o.trim().is_empty()) {
        Some(output) => output.to_string(),
        None => pool
            .latest_test_result(test_case.id)
            .await?
            .and_then(|r| r.output)
            .unwrap_or_else(|| NO_OUTPUT.to_string()),
    };

    let prompt = prompts::improve_tests(
        &script.content,
        &test_case.content,
        &test_case.language,
        &output,
    );
    let raw = llm.complete(&prompt.system, prompt.user, TEST_OPTIONS).await?;

    let improved = extract_code(&raw).trim().to_string();
    if improved.is_empty() {
        return Err(AppError::Provider("model returned no test code".to_string()));
    }

    pool.update_test_case_content(test_case, improved).await
}
