//! Chat orchestration.
//!
//! One turn: resolve (or lazily create) the session, append and commit the
//! user message, load the ordered history, ask the model, then append the
//! assistant reply. The reply is only stored after the model answered, so a
//! failed call leaves the user message without a reply and nothing else.

use tracing::{debug, info};

use crate::db::DbPool;
use crate::entity::{chat_message, chat_session};
use crate::error::{AppError, AppResult};
use crate::models::ChatRole;
use crate::services::llm::{LlmClient, Message};
use crate::services::prompts::{self, CHAT_OPTIONS, QueryType};

/// Chat settings shared with handlers.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Most recent messages sent to the model; `None` sends the whole history
    pub history_limit: Option<u64>,
    /// Mark the session cookie `Secure`
    pub secure_cookies: bool,
}

/// A completed turn.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub session: chat_session::Model,
    pub reply: chat_message::Model,
}

/// A turn whose user message is stored and whose model input is ready.
#[derive(Debug, Clone)]
pub struct PreparedTurn {
    pub session: chat_session::Model,
    pub messages: Vec<Message>,
}

/// Build the model input: system prompt followed by the stored history.
pub fn build_messages(query_type: QueryType, history: &[chat_message::Model]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(Message::system(prompts::chat_system(query_type)));

    for entry in history {
        match ChatRole::parse(&entry.role) {
            Some(role) => messages.push(Message::new(role.into(), entry.content.clone())),
            None => debug!("Skipping chat message {} with role {}", entry.id, entry.role),
        }
    }

    messages
}

/// Store the user message and assemble the model input.
pub async fn prepare_turn(
    pool: &DbPool,
    settings: &ChatSettings,
    token: &str,
    user_message: &str,
    query_type: QueryType,
) -> AppResult<PreparedTurn> {
    if user_message.trim().is_empty() {
        return Err(AppError::InvalidInput("message must not be empty".to_string()));
    }

    let session = pool.get_or_create_chat_session(token).await?;
    pool.append_chat_message(&session, ChatRole::User, user_message)
        .await?;

    let history = pool.chat_history(session.id, settings.history_limit).await?;
    let messages = build_messages(query_type, &history);

    debug!(
        "Chat turn prepared: session={}, history={}",
        session.id,
        history.len()
    );

    Ok(PreparedTurn { session, messages })
}

/// Store the assistant reply of a turn.
pub async fn finish_turn(
    pool: &DbPool,
    session: &chat_session::Model,
    reply: &str,
) -> AppResult<chat_message::Model> {
    pool.append_chat_message(session, ChatRole::Assistant, reply.trim())
        .await
}

/// Run one full non-streaming turn.
pub async fn send_message(
    pool: &DbPool,
    llm: &LlmClient,
    settings: &ChatSettings,
    token: &str,
    user_message: &str,
    query_type: QueryType,
) -> AppResult<ChatTurn> {
    let prepared = prepare_turn(pool, settings, token, user_message, query_type).await?;

    let reply = llm.chat(&prepared.messages, CHAT_OPTIONS).await?;
    let reply = finish_turn(pool, &prepared.session, &reply).await?;

    info!(
        "Chat turn completed: session={}, reply_chars={}",
        prepared.session.id,
        reply.content.len()
    );

    Ok(ChatTurn {
        session: prepared.session,
        reply,
    })
}
