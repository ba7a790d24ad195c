//! E2E tests: test generation, execution and improvement.

use actix_web::test;
use serde_json::json;
use std::sync::Arc;

use tara_assistant_lib::models::TestStatus;

use super::mock_llm_provider::{MockLlmProvider, MockReply};
use super::test_helpers::*;

const SCRIPT_REPLY: &str = "```python\ndef add(a, b):\n    return a + b\n```";
const TESTS_REPLY: &str = "```python\nfrom script_to_test import add\n\ndef test_add():\n    assert add(1, 2) == 3\n```";
const TESTS_CODE: &str = "from script_to_test import add\n\ndef test_add():\n    assert add(1, 2) == 3";

async fn create_script<S>(app: &S, mock: &MockLlmProvider) -> i64
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
        >,
{
    mock.reply(SCRIPT_REPLY);
    let (status, body) = post_json(
        app,
        "/api/coding/generate",
        json!({"language": "python", "requirements": "add two numbers"}),
    )
    .await;
    assert_eq!(status, 201, "{}", body);
    body["script"]["id"].as_i64().unwrap()
}

#[actix_rt::test]
async fn test_generate_tests_for_script() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;
    let script_id = create_script(&app, &mock).await;

    mock.reply(TESTS_REPLY);
    let (status, body) = post_json(
        &app,
        "/api/testing/generate",
        json!({"script_id": script_id, "requirements": "cover negative numbers"}),
    )
    .await;

    assert_eq!(status, 201, "{}", body);
    assert_eq!(body["test_case"]["script_id"], script_id);
    assert_eq!(body["test_case"]["content"], TESTS_CODE);
    assert_eq!(body["test_case"]["language"], "python");
    assert_eq!(body["test_case"]["requirements"], "cover negative numbers");

    let prompt = mock.requests()[1]["messages"][1]["content"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(prompt.contains("def add(a, b)"));
    assert!(prompt.contains("cover negative numbers"));

    let (_, listed) = get_json(
        &app,
        &format!("/api/testing/test-cases?script_id={}", script_id),
    )
    .await;
    assert_eq!(listed["test_cases"].as_array().unwrap().len(), 1);
}

#[actix_rt::test]
async fn test_generate_tests_for_unknown_script() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    let (status, body) = post_json(&app, "/api/testing/generate", json!({"script_id": 77})).await;

    assert_eq!(status, 404);
    assert_eq!(body["code"], "NOT_FOUND");
    assert!(mock.requests().is_empty());
}

#[actix_rt::test]
async fn test_execute_records_error_with_trace() {
    let trace = "Traceback (most recent call last):\nImportError: cannot import name 'add'";
    let runner = Arc::new(FakeTestRunner::new(TestStatus::Error, trace));
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, runner.clone()).await;
    let script_id = create_script(&app, &mock).await;

    mock.reply(TESTS_REPLY);
    let (_, generated) =
        post_json(&app, "/api/testing/generate", json!({"script_id": script_id})).await;
    let test_case_id = generated["test_case"]["id"].as_i64().unwrap();

    let (status, body) = post_json(
        &app,
        "/api/testing/execute",
        json!({"test_case_id": test_case_id}),
    )
    .await;

    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["test_result"]["status"], "error");
    assert_eq!(body["test_result"]["output"], trace);
    assert_eq!(body["test_result"]["test_case_id"], test_case_id);

    // The runner saw the current script and the stored tests
    let runs = runner.runs.lock().unwrap().clone();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].0, "python");
    assert_eq!(runs[0].1, "def add(a, b):\n    return a + b");
    assert_eq!(runs[0].2, TESTS_CODE);

    // Exactly one result per execution
    let (_, results) = get_json(
        &app,
        &format!("/api/testing/test-cases/{}/results", test_case_id),
    )
    .await;
    assert_eq!(results["results"].as_array().unwrap().len(), 1);

    let (_, detail) = get_json(&app, &format!("/api/testing/test-cases/{}", test_case_id)).await;
    assert_eq!(detail["latest_result"]["status"], "error");
}

#[actix_rt::test]
async fn test_execute_unknown_test_case() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    let (status, body) = post_json(&app, "/api/testing/execute", json!({"test_case_id": 5})).await;

    assert_eq!(status, 404);
    assert_eq!(body["success"], false);
}

#[actix_rt::test]
async fn test_improve_uses_latest_output() {
    let trace = "E   assert 4 == 3";
    let runner = Arc::new(FakeTestRunner::new(TestStatus::Failed, trace));
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, runner).await;
    let script_id = create_script(&app, &mock).await;

    mock.reply(TESTS_REPLY);
    let (_, generated) =
        post_json(&app, "/api/testing/generate", json!({"script_id": script_id})).await;
    let test_case_id = generated["test_case"]["id"].as_i64().unwrap();
    post_json(&app, "/api/testing/execute", json!({"test_case_id": test_case_id})).await;

    let improved = "from script_to_test import add\n\ndef test_add():\n    assert add(2, 2) == 4";
    mock.reply(&format!("```python\n{}\n```", improved));
    let (status, body) = post_json(
        &app,
        "/api/testing/improve",
        json!({"test_case_id": test_case_id}),
    )
    .await;

    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["test_case"]["content"], improved);

    let requests = mock.requests();
    let prompt = requests.last().unwrap()["messages"][1]["content"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(prompt.contains(trace));
}

#[actix_rt::test]
async fn test_generate_tests_streaming() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;
    let script_id = create_script(&app, &mock).await;

    mock.push(MockReply::Chunks(vec![
        "```python\nfrom script_to_test import add\n\n".to_string(),
        "def test_add():\n    assert add(1, 2) == 3\n```".to_string(),
    ]));
    let req = test::TestRequest::post()
        .uri("/api/testing/generate?stream=true")
        .set_json(json!({"script_id": script_id}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let events = sse_payloads(&test::read_body(resp).await);
    assert_eq!(events.first().unwrap()["initializing"], true);
    let chunks: Vec<&str> = events
        .iter()
        .filter_map(|e| e["chunk"].as_str())
        .collect();
    assert_eq!(chunks.len(), 2);

    let done = events.last().unwrap();
    assert_eq!(done["done"], true);
    assert_eq!(done["test_case"]["content"], TESTS_CODE);
    assert_eq!(mock.requests().last().unwrap()["stream"], true);
}
