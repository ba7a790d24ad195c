//! Mock LLM provider for E2E tests.
//!
//! Starts an in-process HTTP server with an OpenAI-compatible
//! `/chat/completions` endpoint. Replies are served from a queue of canned
//! responses and every request body is recorded for assertions.

use actix_web::{App, HttpResponse, HttpServer, post, web};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A canned provider response.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Successful completion with this content
    Text(String),
    /// Successful streamed completion, one delta per element
    Chunks(Vec<String>),
    /// Non-2xx status with a provider error envelope
    Error(u16, String),
    /// Successful completion sent only after a pause
    Delayed(Duration, String),
}

/// Shared state for the mock provider.
#[derive(Default)]
pub struct MockLlmState {
    pub replies: VecDeque<MockReply>,
    pub requests: Vec<Value>,
}

fn completion_body(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

fn stream_body(chunks: &[String]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        let event = json!({"choices": [{"index": 0, "delta": {"content": chunk}}]});
        body.push_str(&format!("data: {}\n\n", event));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

#[post("/chat/completions")]
async fn chat_completions(
    state: web::Data<Arc<Mutex<MockLlmState>>>,
    body: web::Json<Value>,
) -> HttpResponse {
    let body = body.into_inner();
    let streaming = body["stream"].as_bool().unwrap_or(false);

    let mut reply = {
        let mut state = state.lock().unwrap();
        state.requests.push(body);
        state.replies.pop_front()
    };

    if let Some(MockReply::Delayed(delay, text)) = reply {
        actix_rt::time::sleep(delay).await;
        reply = Some(MockReply::Text(text));
    }

    match reply {
        None => HttpResponse::InternalServerError()
            .json(json!({"error": {"message": "mock provider has no canned reply"}})),
        Some(MockReply::Error(status, message)) => {
            let status = actix_web::http::StatusCode::from_u16(status).unwrap();
            HttpResponse::build(status).json(json!({"error": {"message": message}}))
        }
        Some(MockReply::Text(text)) if streaming => HttpResponse::Ok()
            .content_type("text/event-stream")
            .body(stream_body(&[text])),
        Some(MockReply::Chunks(chunks)) if streaming => HttpResponse::Ok()
            .content_type("text/event-stream")
            .body(stream_body(&chunks)),
        Some(MockReply::Text(text)) => HttpResponse::Ok().json(completion_body(&text)),
        Some(MockReply::Chunks(chunks)) => {
            HttpResponse::Ok().json(completion_body(&chunks.concat()))
        }
        Some(MockReply::Delayed(_, text)) => HttpResponse::Ok().json(completion_body(&text)),
    }
}

/// Mock provider bound to an ephemeral port.
pub struct MockLlmProvider {
    pub base_url: String,
    pub state: Arc<Mutex<MockLlmState>>,
}

impl MockLlmProvider {
    /// Start the mock provider on the current test runtime.
    pub fn start() -> Self {
        let state = Arc::new(Mutex::new(MockLlmState::default()));

        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
        let port = listener.local_addr().unwrap().port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let state_data = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state_data.clone()))
                .service(chat_completions)
        })
        .workers(1)
        .listen(listener)
        .expect("failed to listen")
        .disable_signals()
        .run();

        // Lives as long as the test's runtime
        actix_rt::spawn(server);

        MockLlmProvider { base_url, state }
    }

    /// Queue a canned reply.
    pub fn push(&self, reply: MockReply) -> &Self {
        self.state.lock().unwrap().replies.push_back(reply);
        self
    }

    /// Queue a plain text completion.
    pub fn reply(&self, text: &str) -> &Self {
        self.push(MockReply::Text(text.to_string()))
    }

    /// Request bodies received so far.
    pub fn requests(&self) -> Vec<Value> {
        self.state.lock().unwrap().requests.clone()
    }
}
