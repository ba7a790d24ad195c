//! Database queries for chat sessions and messages.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use tracing::{info, warn};

use crate::entity::chat_message::{
    self, ActiveModel as ChatMessageActiveModel, Entity as ChatMessage,
};
use crate::entity::chat_session::{
    self, ActiveModel as ChatSessionActiveModel, Entity as ChatSession,
};
use crate::error::{AppError, AppResult};
use crate::models::ChatRole;

use super::DbPool;

impl DbPool {
    /// Find a session by its external token.
    pub async fn find_chat_session(&self, token: &str) -> AppResult<Option<chat_session::Model>> {
        ChatSession::find()
            .filter(chat_session::Column::SessionId.eq(token))
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get chat session: {}", e)))
    }

    /// Get the session for a token, creating it on first use.
    pub async fn get_or_create_chat_session(&self, token: &str) -> AppResult<chat_session::Model> {
        if let Some(existing) = self.find_chat_session(token).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let inserted = ChatSessionActiveModel {
            session_id: Set(token.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.connection())
        .await;

        match inserted {
            Ok(session) => {
                info!("Chat session created: id={}", session.id);
                Ok(session)
            }
            Err(e) => {
                // A concurrent request may have created it between find and insert
                warn!("Chat session insert failed, retrying lookup: {}", e);
                self.find_chat_session(token)
                    .await?
                    .ok_or_else(|| AppError::Database(format!("Failed to create chat session: {}", e)))
            }
        }
    }

    /// Append a message to a session and bump the session's `updated_at`.
    pub async fn append_chat_message(
        &self,
        session: &chat_session::Model,
        role: ChatRole,
        content: &str,
    ) -> AppResult<chat_message::Model> {
        let txn = self.begin().await?;
        let now = Utc::now();

        let message = ChatMessageActiveModel {
            session_id: Set(session.id),
            role: Set(role.as_str().to_string()),
            content: Set(content.to_string()),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert chat message: {}", e)))?;

        let mut active = session.clone().into_active_model();
        active.updated_at = Set(now);
        active
            .update(&txn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to touch chat session: {}", e)))?;

        txn.commit().await?;

        Ok(message)
    }

    /// Ordered history of a session, oldest first.
    ///
    /// With a limit, only the most recent `limit` messages are returned (still
    /// oldest first).
    pub async fn chat_history(
        &self,
        session_id: i32,
        limit: Option<u64>,
    ) -> AppResult<Vec<chat_message::Model>> {
        let select = ChatMessage::find().filter(chat_message::Column::SessionId.eq(session_id));

        let messages = match limit {
            Some(limit) => {
                let mut recent = select
                    .order_by_desc(chat_message::Column::CreatedAt)
                    .order_by_desc(chat_message::Column::Id)
                    .limit(limit)
                    .all(self.connection())
                    .await
                    .map_err(|e| AppError::Database(format!("Failed to get chat history: {}", e)))?;
                recent.reverse();
                recent
            }
            None => select
                .order_by_asc(chat_message::Column::CreatedAt)
                .order_by_asc(chat_message::Column::Id)
                .all(self.connection())
                .await
                .map_err(|e| AppError::Database(format!("Failed to get chat history: {}", e)))?,
        };

        Ok(messages)
    }

    /// Delete every message of a session; the session row is kept.
    pub async fn clear_chat_history(&self, session_id: i32) -> AppResult<u64> {
        let result = ChatMessage::delete_many()
            .filter(chat_message::Column::SessionId.eq(session_id))
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to clear chat history: {}", e)))?;

        info!(
            "Chat history cleared: session={}, deleted={}",
            session_id, result.rows_affected
        );

        Ok(result.rows_affected)
    }
}
