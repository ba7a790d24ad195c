//! E2E tests: TARA chat sessions, history and streaming.

use actix_web::test;
use serde_json::{Value, json};

use super::mock_llm_provider::{MockLlmProvider, MockReply};
use super::test_helpers::*;

/// POST a JSON body with a session header.
async fn post_in_session<S>(app: &S, uri: &str, session: &str, body: Value) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let req = test::TestRequest::post()
        .uri(uri)
        .insert_header(("X-Session-Id", session))
        .set_json(body)
        .to_request();
    let resp = test::call_service(app, req).await;
    let status = resp.status().as_u16();
    (status, test::read_body_json(resp).await)
}

async fn history_of<S>(app: &S, session: &str) -> Value
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let req = test::TestRequest::get()
        .uri("/api/chat/history")
        .insert_header(("X-Session-Id", session))
        .to_request();
    test::call_and_read_body_json(app, req).await
}

#[actix_rt::test]
async fn test_history_round_trip_and_clear() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    // First send creates the session
    mock.reply("A TARA is a threat analysis and risk assessment.");
    let req = test::TestRequest::post()
        .uri("/api/chat/send")
        .set_json(json!({"message": "What is a TARA?"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == "tara_session")
        .expect("session cookie");
    let session = cookie.value().to_string();
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["session_id"], session.as_str());
    assert_eq!(body["response"], "A TARA is a threat analysis and risk assessment.");

    mock.reply("It is required by ISO/SAE 21434.");
    let (status, _) = post_in_session(
        &app,
        "/api/chat/send",
        &session,
        json!({"message": "Which standard requires it?"}),
    )
    .await;
    assert_eq!(status, 200);

    // The second call carries the whole conversation after the system prompt
    let second = &mock.requests()[1];
    let roles: Vec<&str> = second["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);

    let history = history_of(&app, &session).await;
    let contents: Vec<&str> = history["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(
        contents,
        vec![
            "What is a TARA?",
            "A TARA is a threat analysis and risk assessment.",
            "Which standard requires it?",
            "It is required by ISO/SAE 21434.",
        ]
    );

    let (status, cleared) = post_in_session(&app, "/api/chat/clear", &session, json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(cleared["cleared"], 4);

    let history = history_of(&app, &session).await;
    assert!(history["messages"].as_array().unwrap().is_empty());
}

#[actix_rt::test]
async fn test_sessions_are_isolated() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    mock.reply("one");
    post_in_session(&app, "/api/chat/send", "session-a", json!({"message": "hello a"})).await;
    mock.reply("two");
    post_in_session(&app, "/api/chat/send", "session-b", json!({"message": "hello b"})).await;

    let history = history_of(&app, "session-a").await;
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["content"], "hello a");
    assert_eq!(messages[1]["role"], "assistant");
}

#[actix_rt::test]
async fn test_send_validation() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    let (status, body) =
        post_in_session(&app, "/api/chat/send", "s1", json!({"message": "  "})).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "INVALID_INPUT");

    let (status, body) = post_in_session(
        &app,
        "/api/chat/send",
        "s1",
        json!({"message": "hi", "query_type": "poetry"}),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "INVALID_INPUT");

    let (status, body) =
        post_in_session(&app, "/api/chat/send", "not a token!", json!({"message": "hi"})).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "INVALID_SESSION");

    assert!(mock.requests().is_empty());
}

#[actix_rt::test]
async fn test_provider_failure_keeps_only_user_message() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    mock.push(MockReply::Error(502, "upstream unavailable".to_string()));
    let (status, body) =
        post_in_session(&app, "/api/chat/send", "s-fail", json!({"message": "hello"})).await;
    assert_eq!(status, 500);
    assert_eq!(body["code"], "PROVIDER_ERROR");

    let history = history_of(&app, "s-fail").await;
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "user");
}

#[actix_rt::test]
async fn test_failed_first_send_still_returns_session_cookie() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    mock.push(MockReply::Error(502, "upstream unavailable".to_string()));
    let req = test::TestRequest::post()
        .uri("/api/chat/send")
        .set_json(json!({"message": "hello"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);
    let session = resp
        .response()
        .cookies()
        .find(|c| c.name() == "tara_session")
        .expect("session cookie on error")
        .value()
        .to_string();
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "PROVIDER_ERROR");

    // The stored user message is reachable with the returned token
    let history = history_of(&app, &session).await;
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "hello");
}

#[actix_rt::test]
async fn test_history_and_clear_without_session() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    let (status, body) = get_json(&app, "/api/chat/history").await;
    assert_eq!(status, 200);
    assert!(body["session_id"].is_null());
    assert!(body["messages"].as_array().unwrap().is_empty());

    let (status, body) = post_json(&app, "/api/chat/clear", json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
}

#[actix_rt::test]
async fn test_streaming_send_persists_reply() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    mock.push(MockReply::Chunks(vec![
        "Spoofing ".to_string(),
        "is the S ".to_string(),
        "in STRIDE.".to_string(),
    ]));
    let req = test::TestRequest::post()
        .uri("/api/chat/send?stream=true")
        .insert_header(("X-Session-Id", "stream-session"))
        .set_json(json!({"message": "What is spoofing?", "query_type": "threat"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let events = sse_payloads(&test::read_body(resp).await);
    assert_eq!(events[0]["initializing"], true);
    let streamed: String = events
        .iter()
        .filter_map(|e| e["chunk"].as_str())
        .collect();
    assert_eq!(streamed, "Spoofing is the S in STRIDE.");
    assert_eq!(events.last().unwrap()["done"], true);

    let history = history_of(&app, "stream-session").await;
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["content"], "Spoofing is the S in STRIDE.");

    let system = mock.requests()[0]["messages"][0]["content"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(system.contains("STRIDE"));
}

#[actix_rt::test]
async fn test_guided_prompts_run_in_session() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    mock.reply("The gateway ECU routes traffic between buses.");
    let (status, body) = post_in_session(
        &app,
        "/api/chat/ecu-explanation",
        "guided",
        json!({"ecu_type": "Central Gateway"}),
    )
    .await;
    assert_eq!(status, 200, "{}", body);

    mock.reply("Tampering with the brake controller...");
    let (status, _) = post_in_session(
        &app,
        "/api/chat/threat-scenario",
        "guided",
        json!({"component": "Brake ECU", "stride_aspect": "Tampering"}),
    )
    .await;
    assert_eq!(status, 200);

    let (status, body) = post_in_session(
        &app,
        "/api/chat/damage-scenario",
        "guided",
        json!({"component": "Brake ECU"}),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "INVALID_INPUT");

    let requests = mock.requests();
    assert_eq!(requests.len(), 2);
    let first_user = requests[0]["messages"][1]["content"].as_str().unwrap();
    assert!(first_user.contains("Central Gateway"));
    let second_user = requests[1]["messages"][3]["content"].as_str().unwrap();
    assert!(second_user.contains("Brake ECU"));
    assert!(second_user.contains("Tampering"));

    let history = history_of(&app, "guided").await;
    assert_eq!(history["messages"].as_array().unwrap().len(), 4);
}

#[actix_rt::test]
async fn test_start_session_returns_token() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    let (status, body) = post_json(&app, "/api/chat/session", json!({})).await;
    assert_eq!(status, 200);
    let token = body["session_id"].as_str().unwrap();
    assert!(!token.is_empty());

    let history = history_of(&app, token).await;
    assert_eq!(history["session_id"], token);
}
