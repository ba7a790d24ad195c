//! E2E tests: script generation, debugging, modification and versions.

use serde_json::json;
use std::time::Duration;

use super::mock_llm_provider::{MockLlmProvider, MockReply};
use super::test_helpers::*;

const REVERSE_REPLY: &str = "```python\ndef reverse(s):\n    return s[::-1]\n```";
const REVERSE_CODE: &str = "def reverse(s):\n    return s[::-1]";

/// Generate a script and return its id.
async fn generate_reverse<S>(app: &S, mock: &MockLlmProvider) -> i64
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
        >,
{
    mock.reply(REVERSE_REPLY);
    let (status, body) = post_json(
        app,
        "/api/coding/generate",
        json!({"language": "python", "requirements": "reverse a string"}),
    )
    .await;
    assert_eq!(status, 201, "generate failed: {}", body);
    body["script"]["id"].as_i64().unwrap()
}

#[actix_rt::test]
async fn test_generate_stores_version_one() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    mock.reply(REVERSE_REPLY);
    let (status, body) = post_json(
        &app,
        "/api/coding/generate",
        json!({"language": "python", "requirements": "reverse a string"}),
    )
    .await;

    assert_eq!(status, 201, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["script"]["title"], "reverse a string");
    assert_eq!(body["script"]["language"], "python");
    assert_eq!(body["script"]["content"], REVERSE_CODE);
    assert_eq!(body["version"]["version"], 1);
    assert_eq!(body["version"]["content"], REVERSE_CODE);

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["model"], "mock-model");
    assert!(requests[0].get("stream").is_none());
    assert_eq!(requests[0]["messages"][0]["role"], "system");
    assert_eq!(requests[0]["messages"][1]["role"], "user");
    let temperature = requests[0]["temperature"].as_f64().unwrap();
    assert!((temperature - 0.7).abs() < 1e-6);
}

#[actix_rt::test]
async fn test_generate_requires_fields_before_calling_provider() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    let (status, body) = post_json(
        &app,
        "/api/coding/generate",
        json!({"language": "python", "requirements": "   "}),
    )
    .await;

    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "INVALID_INPUT");
    assert!(mock.requests().is_empty());
}

#[actix_rt::test]
async fn test_malformed_json_uses_error_envelope() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    let req = actix_web::test::TestRequest::post()
        .uri("/api/coding/diffcheck")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = actix_web::test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = actix_web::test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[actix_rt::test]
async fn test_debug_without_changes_creates_no_version() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;
    let script_id = generate_reverse(&app, &mock).await;

    mock.reply(&format!(
        "Analysis: The script is already correct.\n### FIXED CODE ###\n{}",
        REVERSE_REPLY
    ));
    let (status, body) = post_json(
        &app,
        "/api/coding/debug",
        json!({"script_id": script_id, "script_content": REVERSE_CODE}),
    )
    .await;

    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["analysis"], "The script is already correct.");
    assert_eq!(body["fixed_code"], REVERSE_CODE);
    assert!(body["new_version"].is_null());
    assert_eq!(body["no_changes"], true);
    assert!(body["diff_html"].as_str().unwrap().contains("No changes"));

    let (_, versions) = get_json(&app, &format!("/api/coding/scripts/{}/versions", script_id)).await;
    assert_eq!(versions["versions"].as_array().unwrap().len(), 1);
}

#[actix_rt::test]
async fn test_modify_appends_version_and_updates_script() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;
    let script_id = generate_reverse(&app, &mock).await;

    let modified = "def reverse(s):\n    \"\"\"Reverse s.\"\"\"\n    return s[::-1]";
    mock.reply(&format!(
        "Added a docstring.\n### MODIFIED CODE ###\n```python\n{}\n```",
        modified
    ));
    let (status, body) = post_json(
        &app,
        "/api/coding/modify",
        json!({
            "script_id": script_id,
            "script_content": REVERSE_CODE,
            "modification_request": "add a docstring"
        }),
    )
    .await;

    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["explanation"], "Added a docstring.");
    assert_eq!(body["modified_code"], modified);
    assert_eq!(body["new_version"]["version"], 2);
    assert_eq!(body["no_changes"], false);
    assert!(body["diff_html"].as_str().unwrap().contains("diff-line-added"));

    // Script content always equals its latest version
    let (_, script) = get_json(&app, &format!("/api/coding/scripts/{}", script_id)).await;
    assert_eq!(script["script"]["content"], modified);

    let (_, versions) = get_json(&app, &format!("/api/coding/scripts/{}/versions", script_id)).await;
    let numbers: Vec<i64> = versions["versions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["version"].as_i64().unwrap())
        .collect();
    assert_eq!(numbers, vec![1, 2]);

    let (status, diff) = post_json(
        &app,
        "/api/coding/compare-versions",
        json!({"script_id": script_id, "from_version": 1, "to_version": 2}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(diff["no_changes"], false);

    let (status, body) = post_json(
        &app,
        "/api/coding/compare-versions",
        json!({"script_id": script_id, "from_version": 1, "to_version": 9}),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[actix_rt::test]
async fn test_debug_without_script_id_writes_nothing() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    mock.reply("The loop is off by one.\n### FIXED CODE ###\n```python\nfor i in range(3):\n    print(i)\n```");
    let (status, body) = post_json(
        &app,
        "/api/coding/debug",
        json!({
            "script_content": "for i in range(4):\n    print(i)",
            "error_log": "printed one value too many"
        }),
    )
    .await;

    assert_eq!(status, 200, "{}", body);
    assert!(body["new_version"].is_null());
    assert_eq!(body["no_changes"], false);

    let user_prompt = mock.requests()[0]["messages"][1]["content"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(user_prompt.contains("printed one value too many"));

    let (_, scripts) = get_json(&app, "/api/coding/scripts").await;
    assert!(scripts["scripts"].as_array().unwrap().is_empty());
}

#[actix_rt::test]
async fn test_unknown_script_is_rejected_before_provider_call() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    let (status, body) = post_json(
        &app,
        "/api/coding/debug",
        json!({"script_id": 4242, "script_content": "x = 1"}),
    )
    .await;

    assert_eq!(status, 404);
    assert_eq!(body["code"], "NOT_FOUND");
    assert!(mock.requests().is_empty());
}

#[actix_rt::test]
async fn test_provider_failure_stores_nothing() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    mock.push(MockReply::Error(429, "rate limited".to_string()));
    let (status, body) = post_json(
        &app,
        "/api/coding/generate",
        json!({"language": "python", "requirements": "reverse a string"}),
    )
    .await;

    assert_eq!(status, 500);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "PROVIDER_ERROR");

    let (_, scripts) = get_json(&app, "/api/coding/scripts").await;
    assert!(scripts["scripts"].as_array().unwrap().is_empty());
}

#[actix_rt::test]
async fn test_provider_timeout_returns_504_and_keeps_versions() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;
    let script_id = generate_reverse(&app, &mock).await;

    let mut settings = mock_llm_settings(&mock);
    settings.timeout = Duration::from_millis(300);
    let slow_app = create_test_app_with_llm(&pool, settings, passing_runner()).await;

    mock.push(MockReply::Delayed(
        Duration::from_secs(3),
        "```python\ndef reverse(s):\n    return ''.join(reversed(s))\n```".to_string(),
    ));
    let (status, body) = post_json(
        &slow_app,
        "/api/coding/modify",
        json!({
            "script_id": script_id,
            "script_content": REVERSE_CODE,
            "modification_request": "avoid slicing"
        }),
    )
    .await;

    assert_eq!(status, 504, "{}", body);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "PROVIDER_TIMEOUT");
    // generate + one modify attempt, no retry
    assert_eq!(mock.requests().len(), 2);

    let versions = pool.list_versions(script_id as i32).await.unwrap();
    assert_eq!(versions.len(), 1);
    let script = pool.require_script(script_id as i32).await.unwrap();
    assert_eq!(script.content, REVERSE_CODE);
}

#[actix_rt::test]
async fn test_diffcheck_and_explain_changes() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    let (status, body) = post_json(
        &app,
        "/api/coding/diffcheck",
        json!({"original_content": "a\nb\nc", "new_content": "a\nx\nc"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["no_changes"], false);
    let tags: Vec<&str> = body["lines"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["tag"].as_str().unwrap())
        .collect();
    assert_eq!(tags, vec!["unchanged", "removed", "added", "unchanged"]);

    // Identical inputs are answered without the model
    let (status, body) = post_json(
        &app,
        "/api/coding/explain-changes",
        json!({"original_content": "same", "new_content": "same"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["explanation"], "No changes.");
    assert_eq!(body["no_changes"], true);
    assert!(mock.requests().is_empty());

    mock.reply("Line b was renamed to x.");
    let (status, body) = post_json(
        &app,
        "/api/coding/explain-changes",
        json!({"original_content": "a\nb", "new_content": "a\nx"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["explanation"], "Line b was renamed to x.");
}

#[actix_rt::test]
async fn test_delete_script() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;
    let script_id = generate_reverse(&app, &mock).await;

    let req = actix_web::test::TestRequest::delete()
        .uri(&format!("/api/coding/scripts/{}", script_id))
        .to_request();
    let resp = actix_web::test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let (status, _) = get_json(&app, &format!("/api/coding/scripts/{}", script_id)).await;
    assert_eq!(status, 404);

    let (status, _) = get_json(&app, &format!("/api/coding/scripts/{}/versions", script_id)).await;
    assert_eq!(status, 404);
}
