//! Shared test helpers for API E2E tests.

use actix_web::{App, dev::ServiceResponse, test, web};
use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tara_assistant_lib::api;
use tara_assistant_lib::config::{LlmProvider, LlmSettings};
use tara_assistant_lib::db::DbPool;
use tara_assistant_lib::middleware::RequestLogger;
use tara_assistant_lib::models::TestStatus;
use tara_assistant_lib::services::LlmClient;
use tara_assistant_lib::services::chat::ChatSettings;
use tara_assistant_lib::services::test_runner::{RunOutcome, TestRunner};

use super::mock_llm_provider::MockLlmProvider;

/// Upload limit used by the test app.
pub const TEST_MAX_UPLOAD_SIZE: usize = 64 * 1024;

/// Test runner returning a fixed outcome and recording what it ran.
pub struct FakeTestRunner {
    outcome: RunOutcome,
    pub runs: Mutex<Vec<(String, String, String)>>,
}

impl FakeTestRunner {
    pub fn new(status: TestStatus, output: &str) -> Self {
        Self {
            outcome: RunOutcome {
                status,
                output: output.to_string(),
                execution_time: 0.25,
            },
            runs: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TestRunner for FakeTestRunner {
    async fn run(&self, language: &str, script: &str, tests: &str) -> RunOutcome {
        self.runs.lock().unwrap().push((
            language.to_string(),
            script.to_string(),
            tests.to_string(),
        ));
        self.outcome.clone()
    }
}

/// Fresh in-memory database with the schema applied.
///
/// One connection keeps the in-memory database alive and shared.
pub async fn create_test_pool() -> DbPool {
    let pool = DbPool::connect("sqlite::memory:", 1)
        .await
        .expect("Failed to open in-memory database");
    pool.run_migrations()
        .await
        .expect("Failed to run migrations");
    pool
}

/// LLM settings pointing at the mock provider.
pub fn mock_llm_settings(mock: &MockLlmProvider) -> LlmSettings {
    LlmSettings {
        provider: LlmProvider::OpenAi,
        base_url: mock.base_url.clone(),
        api_key: Some(SecretString::from("test-key")),
        model: "mock-model".to_string(),
        timeout: Duration::from_secs(5),
        site_url: None,
        site_name: None,
    }
}

/// Create a test app wired like `main`.
pub async fn create_test_app(
    pool: &DbPool,
    mock: &MockLlmProvider,
    runner: Arc<dyn TestRunner>,
) -> impl actix_web::dev::Service<
    actix_http::Request,
    Response = ServiceResponse,
    Error = actix_web::Error,
> {
    create_test_app_with_llm(pool, mock_llm_settings(mock), runner).await
}

/// Create a test app with custom LLM settings.
pub async fn create_test_app_with_llm(
    pool: &DbPool,
    llm_settings: LlmSettings,
    runner: Arc<dyn TestRunner>,
) -> impl actix_web::dev::Service<
    actix_http::Request,
    Response = ServiceResponse,
    Error = actix_web::Error,
> {
    let llm = LlmClient::new(llm_settings).expect("Failed to build LLM client");
    let chat_settings = ChatSettings {
        history_limit: Some(50),
        secure_cookies: false,
    };

    test::init_service(
        App::new()
            .wrap(RequestLogger)
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(llm))
            .app_data(web::Data::from(runner))
            .app_data(web::Data::new(chat_settings))
            .app_data(web::Data::new(TEST_MAX_UPLOAD_SIZE))
            .app_data(api::json_config())
            .app_data(api::path_config())
            .app_data(api::query_config())
            .service(web::scope("/api").configure(api::configure_routes)),
    )
    .await
}

/// Default runner for tests that do not execute anything.
pub fn passing_runner() -> Arc<dyn TestRunner> {
    Arc::new(FakeTestRunner::new(TestStatus::Passed, "1 passed in 0.01s"))
}

/// POST a JSON body and decode the JSON response.
pub async fn post_json<S>(app: &S, uri: &str, body: Value) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let req = test::TestRequest::post().uri(uri).set_json(body).to_request();
    let resp = test::call_service(app, req).await;
    let status = resp.status().as_u16();
    let body: Value = test::read_body_json(resp).await;
    (status, body)
}

/// GET a URI and decode the JSON response.
pub async fn get_json<S>(app: &S, uri: &str) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let req = test::TestRequest::get().uri(uri).to_request();
    let resp = test::call_service(app, req).await;
    let status = resp.status().as_u16();
    let body: Value = test::read_body_json(resp).await;
    (status, body)
}

/// Parse the `data:` payloads of a Server-Sent Events body.
pub fn sse_payloads(body: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(body)
        .split("\n\n")
        .filter_map(|event| event.trim().strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).expect("event payload is JSON"))
        .collect()
}
