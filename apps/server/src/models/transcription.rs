//! FA diagram transcription models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::transcriptions::StoredTranscription;
use crate::entity::{fa_transcription, fa_transcription_item};

/// One row of a transcribed diagram. Missing cells are empty strings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TranscriptionItem {
    pub id: i32,
    pub sheet_name: String,
    pub message: String,
    pub start_ecu: String,
    pub end_ecu: String,
    pub sending_ecu: String,
    pub receiving_ecu: String,
    pub dashed_line: String,
}

impl From<fa_transcription_item::Model> for TranscriptionItem {
    fn from(model: fa_transcription_item::Model) -> Self {
        Self {
            id: model.id,
            sheet_name: model.sheet_name.unwrap_or_default(),
            message: model.message.unwrap_or_default(),
            start_ecu: model.start_ecu.unwrap_or_default(),
            end_ecu: model.end_ecu.unwrap_or_default(),
            sending_ecu: model.sending_ecu.unwrap_or_default(),
            receiving_ecu: model.receiving_ecu.unwrap_or_default(),
            dashed_line: model.dashed_line.unwrap_or_default(),
        }
    }
}

/// A transcription run without its rows.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TranscriptionSummary {
    pub id: i32,
    pub image_id: i32,
    pub processed_at: DateTime<Utc>,
}

impl From<fa_transcription::Model> for TranscriptionSummary {
    fn from(model: fa_transcription::Model) -> Self {
        Self {
            id: model.id,
            image_id: model.image_id,
            processed_at: model.processed_at,
        }
    }
}

/// A transcription run with its rows.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Transcription {
    pub id: i32,
    pub image_id: i32,
    pub processed_at: DateTime<Utc>,
    pub items: Vec<TranscriptionItem>,
}

impl From<StoredTranscription> for Transcription {
    fn from(stored: StoredTranscription) -> Self {
        Self {
            id: stored.transcription.id,
            image_id: stored.image_id,
            processed_at: stored.transcription.processed_at,
            items: stored.items.into_iter().map(TranscriptionItem::from).collect(),
        }
    }
}
