//! TARA chat endpoints.
//!
//! The session token comes from the `X-Session-Id` header or the session
//! cookie. Sending without one starts a new session; the token is returned in
//! the body and as a cookie.

use actix_web::cookie::Cookie;
use actix_web::{HttpResponse, ResponseError, get, post, web};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::api::{StreamQuery, optional, required, sse_builder, sse_event};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::ChatMessage;
use crate::services::LlmClient;
use crate::services::chat::{self, ChatSettings};
use crate::services::prompts::{self, CHAT_OPTIONS, QueryType};
use crate::session::{SessionToken, new_token, session_cookie};

/// A chat message from the user.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub message: String,
    /// general, ecu, damage, threat or attack
    pub query_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SendMessageResponse {
    pub success: bool,
    pub session_id: String,
    /// Assistant reply
    pub response: String,
    pub message_id: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub success: bool,
    pub session_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    pub success: bool,
    /// Null when the client has no stored session
    pub session_id: Option<String>,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClearHistoryResponse {
    pub success: bool,
    /// Number of deleted messages
    pub cleared: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EcuExplanationRequest {
    #[serde(default)]
    pub ecu_type: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DamageScenarioRequest {
    #[serde(default)]
    pub component: String,
    /// Confidentiality, Integrity or Availability
    #[serde(default)]
    pub cia_aspect: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ThreatScenarioRequest {
    #[serde(default)]
    pub component: String,
    /// Spoofing, Tampering, Repudiation, Information disclosure, Denial of
    /// service or Elevation of privilege
    #[serde(default)]
    pub stride_aspect: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AttackPatternRequest {
    #[serde(default)]
    pub dataflow_description: String,
}

/// Error envelope that still sets the session cookie. The session and the user
/// message may already be stored when a send fails.
fn error_with_cookie(err: &AppError, cookie: &Cookie<'static>) -> HttpResponse {
    let mut response = err.error_response();
    if let Err(e) = response.add_cookie(cookie) {
        warn!("Failed to set session cookie on error response: {}", e);
    }
    response
}

/// Run one chat turn and render it as JSON or as an event stream.
async fn respond(
    pool: web::Data<DbPool>,
    llm: web::Data<LlmClient>,
    settings: web::Data<ChatSettings>,
    session: SessionToken,
    stream: bool,
    message: &str,
    query_type: QueryType,
) -> AppResult<HttpResponse> {
    let token = session
        .token()
        .map(str::to_string)
        .unwrap_or_else(new_token);
    let cookie = session_cookie(&token, settings.secure_cookies);

    if !stream {
        let turn =
            match chat::send_message(&pool, &llm, &settings, &token, message, query_type).await {
                Ok(turn) => turn,
                Err(e) => return Ok(error_with_cookie(&e, &cookie)),
            };
        return Ok(HttpResponse::Ok().cookie(cookie).json(SendMessageResponse {
            success: true,
            session_id: token,
            response: turn.reply.content,
            message_id: turn.reply.id,
        }));
    }

    let prepared = match chat::prepare_turn(&pool, &settings, &token, message, query_type).await {
        Ok(prepared) => prepared,
        Err(e) => return Ok(error_with_cookie(&e, &cookie)),
    };

    let events = async_stream::stream! {
        yield sse_event(&json!({"initializing": true, "session_id": token}));

        let mut deltas = match llm.chat_stream(&prepared.messages, CHAT_OPTIONS).await {
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
                    warn!("Chat stream failed: session={}, error={}", prepared.session.id, e);
                    yield sse_event(&json!({"error": AppError::from(e).public_message()}));
                    return;
                }
            }
        }

        if reply.trim().is_empty() {
            let error = AppError::Provider("model streamed an empty reply".to_string());
            yield sse_event(&json!({"error": error.public_message()}));
            return;
        }

        match chat::finish_turn(&pool, &prepared.session, &reply).await {
            Ok(stored) => {
                info!("Chat stream completed: session={}, reply_chars={}", prepared.session.id, reply.len());
                yield sse_event(&json!({"done": true, "session_id": token, "message_id": stored.id}));
            }
            Err(e) => {
                yield sse_event(&json!({"error": e.public_message()}));
            }
        }
    };

    Ok(sse_builder().cookie(cookie).streaming(events))
}

/// Start a new chat session.
#[utoipa::path(
    post,
    path = "/api/chat/session",
    tag = "Chat",
    responses(
        (status = 200, description = "Session created", body = SessionResponse)
    )
)]
#[post("/chat/session")]
pub async fn start_session(
    pool: web::Data<DbPool>,
    settings: web::Data<ChatSettings>,
) -> AppResult<HttpResponse> {
    let token = new_token();
    pool.get_or_create_chat_session(&token).await?;

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(&token, settings.secure_cookies))
        .json(SessionResponse {
            success: true,
            session_id: token,
        }))
}

/// Send a message and get the assistant reply.
///
/// With `?stream=true` the reply is sent as Server-Sent Events: `initializing`,
/// `chunk` deltas, then `done` (or `error`).
#[utoipa::path(
    post,
    path = "/api/chat/send",
    tag = "Chat",
    params(StreamQuery),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Assistant reply", body = SendMessageResponse),
        (status = 400, description = "Empty message or invalid session", body = crate::error::ErrorResponse),
        (status = 504, description = "Provider timed out", body = crate::error::ErrorResponse)
    ),
    security((), ("session" = []))
)]
#[post("/chat/send")]
pub async fn send_message(
    pool: web::Data<DbPool>,
    llm: web::Data<LlmClient>,
    settings: web::Data<ChatSettings>,
    session: SessionToken,
    query: web::Query<StreamQuery>,
    body: web::Json<SendMessageRequest>,
) -> AppResult<HttpResponse> {
    let message = required("message", &body.message)?;
    let query_type = match optional(&body.query_type) {
        Some(raw) => QueryType::parse(raw)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown query_type '{}'", raw)))?,
        None => QueryType::General,
    };

    respond(pool, llm, settings, session, query.stream, message, query_type).await
}

/// Get the message history of the current session, oldest first.
#[utoipa::path(
    get,
    path = "/api/chat/history",
    tag = "Chat",
    responses(
        (status = 200, description = "Chat history", body = HistoryResponse)
    ),
    security((), ("session" = []))
)]
#[get("/chat/history")]
pub async fn history(pool: web::Data<DbPool>, session: SessionToken) -> AppResult<HttpResponse> {
    let stored = match session.token() {
        Some(token) => pool.find_chat_session(token).await?,
        None => None,
    };

    let Some(stored) = stored else {
        return Ok(HttpResponse::Ok().json(HistoryResponse {
            success: true,
            session_id: None,
            messages: Vec::new(),
        }));
    };

    let messages = pool.chat_history(stored.id, None).await?;

    Ok(HttpResponse::Ok().json(HistoryResponse {
        success: true,
        session_id: Some(stored.session_id),
        messages: messages
            .into_iter()
            .filter_map(ChatMessage::from_model)
            .collect(),
    }))
}

/// Delete the messages of the current session.
#[utoipa::path(
    post,
    path = "/api/chat/clear",
    tag = "Chat",
    responses(
        (status = 200, description = "History cleared", body = ClearHistoryResponse),
        (status = 400, description = "No session supplied", body = crate::error::ErrorResponse)
    ),
    security(("session" = []))
)]
#[post("/chat/clear")]
pub async fn clear_history(
    pool: web::Data<DbPool>,
    session: SessionToken,
) -> AppResult<HttpResponse> {
    let token = session
        .token()
        .ok_or_else(|| AppError::InvalidInput("no chat session supplied".to_string()))?;

    let cleared = match pool.find_chat_session(token).await? {
        Some(stored) => pool.clear_chat_history(stored.id).await?,
        None => 0,
    };

    info!("Chat history cleared: messages={}", cleared);

    Ok(HttpResponse::Ok().json(ClearHistoryResponse {
        success: true,
        cleared,
    }))
}

/// Explain an ECU type.
#[utoipa::path(
    post,
    path = "/api/chat/ecu-explanation",
    tag = "Chat",
    params(StreamQuery),
    request_body = EcuExplanationRequest,
    responses(
        (status = 200, description = "Assistant reply", body = SendMessageResponse)
    ),
    security((), ("session" = []))
)]
#[post("/chat/ecu-explanation")]
pub async fn ecu_explanation(
    pool: web::Data<DbPool>,
    llm: web::Data<LlmClient>,
    settings: web::Data<ChatSettings>,
    session: SessionToken,
    query: web::Query<StreamQuery>,
    body: web::Json<EcuExplanationRequest>,
) -> AppResult<HttpResponse> {
    let ecu_type = required("ecu_type", &body.ecu_type)?.trim();
    let message = prompts::ecu_explanation(ecu_type);

    respond(pool, llm, settings, session, query.stream, &message, QueryType::Ecu).await
}

/// Generate damage scenarios for a component.
#[utoipa::path(
    post,
    path = "/api/chat/damage-scenario",
    tag = "Chat",
    params(StreamQuery),
    request_body = DamageScenarioRequest,
    responses(
        (status = 200, description = "Assistant reply", body = SendMessageResponse)
    ),
    security((), ("session" = []))
)]
#[post("/chat/damage-scenario")]
pub async fn damage_scenario(
    pool: web::Data<DbPool>,
    llm: web::Data<LlmClient>,
    settings: web::Data<ChatSettings>,
    session: SessionToken,
    query: web::Query<StreamQuery>,
    body: web::Json<DamageScenarioRequest>,
) -> AppResult<HttpResponse> {
    let component = required("component", &body.component)?.trim();
    let cia_aspect = required("cia_aspect", &body.cia_aspect)?.trim();
    let message = prompts::damage_scenario(component, cia_aspect);

    respond(pool, llm, settings, session, query.stream, &message, QueryType::Damage).await
}

/// Generate STRIDE threat scenarios for a component.
#[utoipa::path(
    post,
    path = "/api/chat/threat-scenario",
    tag = "Chat",
    params(StreamQuery),
    request_body = ThreatScenarioRequest,
    responses(
        (status = 200, description = "Assistant reply", body = SendMessageResponse)
    ),
    security((), ("session" = []))
)]
#[post("/chat/threat-scenario")]
pub async fn threat_scenario(
    pool: web::Data<DbPool>,
    llm: web::Data<LlmClient>,
    settings: web::Data<ChatSettings>,
    session: SessionToken,
    query: web::Query<StreamQuery>,
    body: web::Json<ThreatScenarioRequest>,
) -> AppResult<HttpResponse> {
    let component = required("component", &body.component)?.trim();
    let stride_aspect = required("stride_aspect", &body.stride_aspect)?.trim();
    let message = prompts::threat_scenario(component, stride_aspect);

    respond(pool, llm, settings, session, query.stream, &message, QueryType::Threat).await
}

/// Describe attack patterns for a data flow.
#[utoipa::path(
    post,
    path = "/api/chat/attack-pattern",
    tag = "Chat",
    params(StreamQuery),
    request_body = AttackPatternRequest,
    responses(
        (status = 200, description = "Assistant reply", body = SendMessageResponse)
    ),
    security((), ("session" = []))
)]
#[post("/chat/attack-pattern")]
pub async fn attack_pattern(
    pool: web::Data<DbPool>,
    llm: web::Data<LlmClient>,
    settings: web::Data<ChatSettings>,
    session: SessionToken,
    query: web::Query<StreamQuery>,
    body: web::Json<AttackPatternRequest>,
) -> AppResult<HttpResponse> {
    let dataflow = required("dataflow_description", &body.dataflow_description)?.trim();
    let message = prompts::attack_pattern(dataflow);

    respond(pool, llm, settings, session, query.stream, &message, QueryType::Attack).await
}

/// Configure chat routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(start_session)
        .service(send_message)
        .service(history)
        .service(clear_history)
        .service(ecu_explanation)
        .service(damage_scenario)
        .service(threat_scenario)
        .service(attack_pattern);
}
