//! Test case generation, execution and improvement endpoints.

use actix_web::{HttpResponse, get, post, web};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::api::{StreamQuery, optional, sse_builder, sse_event};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{TestCase, TestResult};
use crate::services::llm::Message;
use crate::services::prompts::TEST_OPTIONS;
use crate::services::{LlmClient, TestRunner, testing};

/// Request to generate tests for a stored script.
#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateTestsRequest {
    pub script_id: i32,
    /// Extra requirements the tests should cover
    pub requirements: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TestCaseResponse {
    pub success: bool,
    pub test_case: TestCase,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExecuteTestsRequest {
    pub test_case_id: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TestResultResponse {
    pub success: bool,
    pub test_result: TestResult,
}

/// Request to rewrite a test case from execution output.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ImproveTestsRequest {
    pub test_case_id: i32,
    /// Output to improve against; defaults to the latest recorded run
    pub test_output: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TestCaseQuery {
    /// Only test cases of this script
    pub script_id: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TestCaseListResponse {
    pub success: bool,
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TestCaseDetailResponse {
    pub success: bool,
    pub test_case: TestCase,
    pub latest_result: Option<TestResult>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TestResultListResponse {
    pub success: bool,
    pub results: Vec<TestResult>,
}

/// Generate tests for a script.
///
/// With `?stream=true` the model output is sent as Server-Sent Events
/// (`initializing`, `chunk`, then `done` with the stored test case, or `error`).
#[utoipa::path(
    post,
    path = "/api/testing/generate",
    tag = "Testing",
    params(StreamQuery),
    request_body = GenerateTestsRequest,
    responses(
        (status = 201, description = "Test case generated", body = TestCaseResponse),
        (status = 200, description = "Event stream (stream=true)", content_type = "text/event-stream"),
        (status = 404, description = "Script not found", body = crate::error::ErrorResponse)
    )
)]
#[post("/testing/generate")]
pub async fn generate_tests(
    pool: web::Data<DbPool>,
    llm: web::Data<LlmClient>,
    query: web::Query<StreamQuery>,
    body: web::Json<GenerateTestsRequest>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner();
    let requirements = optional(&body.requirements).map(str::to_string);

    if !query.stream {
        let test_case =
            testing::generate_test_case(&pool, &llm, body.script_id, requirements.as_deref())
                .await?;
        return Ok(HttpResponse::Created().json(TestCaseResponse {
            success: true,
            test_case: test_case.into(),
        }));
    }

    let script = pool.require_script(body.script_id).await?;
    let prompt = testing::generation_prompt(&script, requirements.as_deref());
    let messages = vec![Message::system(prompt.system), Message::user(prompt.user)];

    let events = async_stream::stream! {
        yield sse_event(&json!({"initializing": true}));

        let mut deltas = match llm.chat_stream(&messages, TEST_OPTIONS).await {
            Ok(deltas) => deltas,
            Err(e) => {
                yield sse_event(&json!({"error": AppError::from(e).public_message()}));
                return;
            }
        };

        let mut reply = String::new();
        while let Some(delta) = deltas.next().await {
            match delta {
                Ok(text) => {
                    reply.push_str(&text);
                    yield sse_event(&json!({"chunk": text}));
                }
                Err(e) => {
                    warn!("Test generation stream failed: {}", e);
                    yield sse_event(&json!({"error": AppError::from(e).public_message()}));
                    return;
                }
            }
        }

        match testing::store_generated_tests(&pool, &script, requirements.as_deref(), &reply).await {
            Ok(test_case) => {
                info!("Streamed test case stored: id={}", test_case.id);
                yield sse_event(&json!({"done": true, "test_case": TestCase::from(test_case)}));
            }
            Err(e) => {
                yield sse_event(&json!({"error": e.public_message()}));
            }
        }
    };

    Ok(sse_builder().streaming(events))
}

/// Run a test case against the current script content.
///
/// A run that cannot complete is still recorded, with status `error`.
#[utoipa::path(
    post,
    path = "/api/testing/execute",
    tag = "Testing",
    request_body = ExecuteTestsRequest,
    responses(
        (status = 200, description = "Recorded result", body = TestResultResponse),
        (status = 404, description = "Test case not found", body = crate::error::ErrorResponse)
    )
)]
#[post("/testing/execute")]
pub async fn execute_tests(
    pool: web::Data<DbPool>,
    runner: web::Data<dyn TestRunner>,
    body: web::Json<ExecuteTestsRequest>,
) -> AppResult<HttpResponse> {
    let result = testing::execute_test_case(&pool, runner.get_ref(), body.test_case_id).await?;

    Ok(HttpResponse::Ok().json(TestResultResponse {
        success: true,
        test_result: result.into(),
    }))
}

/// Rewrite a test case using execution output.
#[utoipa::path(
    post,
    path = "/api/testing/improve",
    tag = "Testing",
    request_body = ImproveTestsRequest,
    responses(
        (status = 200, description = "Updated test case", body = TestCaseResponse),
        (status = 404, description = "Test case not found", body = crate::error::ErrorResponse)
    )
)]
#[post("/testing/improve")]
pub async fn improve_tests(
    pool: web::Data<DbPool>,
    llm: web::Data<LlmClient>,
    body: web::Json<ImproveTestsRequest>,
) -> AppResult<HttpResponse> {
    let test_case = testing::improve_test_case(
        &pool,
        &llm,
        body.test_case_id,
        optional(&body.test_output),
    )
    .await?;

    Ok(HttpResponse::Ok().json(TestCaseResponse {
        success: true,
        test_case: test_case.into(),
    }))
}

/// List test cases, optionally for one script.
#[utoipa::path(
    get,
    path = "/api/testing/test-cases",
    tag = "Testing",
    params(TestCaseQuery),
    responses(
        (status = 200, description = "Test cases", body = TestCaseListResponse)
    )
)]
#[get("/testing/test-cases")]
pub async fn list_test_cases(
    pool: web::Data<DbPool>,
    query: web::Query<TestCaseQuery>,
) -> AppResult<HttpResponse> {
    let test_cases = pool.list_test_cases(query.script_id).await?;

    Ok(HttpResponse::Ok().json(TestCaseListResponse {
        success: true,
        test_cases: test_cases.into_iter().map(TestCase::from).collect(),
    }))
}

/// Get a test case with its latest result.
#[utoipa::path(
    get,
    path = "/api/testing/test-cases/{id}",
    tag = "Testing",
    params(("id" = i32, Path, description = "Test case ID")),
    responses(
        (status = 200, description = "Test case", body = TestCaseDetailResponse),
        (status = 404, description = "Test case not found", body = crate::error::ErrorResponse)
    )
)]
#[get("/testing/test-cases/{id}")]
pub async fn get_test_case(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let test_case = pool.require_test_case(path.into_inner()).await?;
    let latest_result = pool.latest_test_result(test_case.id).await?;

    Ok(HttpResponse::Ok().json(TestCaseDetailResponse {
        success: true,
        test_case: test_case.into(),
        latest_result: latest_result.map(TestResult::from),
    }))
}

/// List the results of a test case, newest first.
#[utoipa::path(
    get,
    path = "/api/testing/test-cases/{id}/results",
    tag = "Testing",
    params(("id" = i32, Path, description = "Test case ID")),
    responses(
        (status = 200, description = "Results", body = TestResultListResponse),
        (status = 404, description = "Test case not found", body = crate::error::ErrorResponse)
    )
)]
#[get("/testing/test-cases/{id}/results")]
pub async fn list_test_results(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let test_case = pool.require_test_case(path.into_inner()).await?;
    let results = pool.list_test_results(test_case.id).await?;

    Ok(HttpResponse::Ok().json(TestResultListResponse {
        success: true,
        results: results.into_iter().map(TestResult::from).collect(),
    }))
}

/// Configure testing routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(generate_tests)
        .service(execute_tests)
        .service(improve_tests)
        .service(list_test_cases)
        .service(get_test_case)
        .service(list_test_results);
}
