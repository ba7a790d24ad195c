//! Database queries for uploaded diagrams and their transcriptions.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use tracing::info;

use crate::entity::fa_transcription::{
    self, ActiveModel as FaTranscriptionActiveModel, Entity as FaTranscription,
};
use crate::entity::fa_transcription_item::{
    self, ActiveModel as FaTranscriptionItemActiveModel, Entity as FaTranscriptionItem,
};
use crate::entity::image::{self, ActiveModel as ImageActiveModel, Entity as Image};
use crate::error::{AppError, AppResult};
use crate::services::postprocess::TranscriptionRecord;

use super::DbPool;

/// An uploaded diagram to be stored.
pub struct NewImage {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A stored transcription run with its rows.
#[derive(Debug, Clone)]
pub struct StoredTranscription {
    pub image_id: i32,
    pub transcription: fa_transcription::Model,
    pub items: Vec<fa_transcription_item::Model>,
}

/// Store an empty string as NULL.
fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

impl DbPool {
    /// Persist an image, one transcription run and all of its items atomically.
    pub async fn save_transcription(
        &self,
        new_image: NewImage,
        records: Vec<TranscriptionRecord>,
    ) -> AppResult<StoredTranscription> {
        let txn = self.begin().await?;
        let now = Utc::now();

        let image = ImageActiveModel {
            filename: Set(new_image.filename),
            content_type: Set(new_image.content_type),
            data: Set(new_image.data),
            uploaded_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert image: {}", e)))?;

        let transcription = FaTranscriptionActiveModel {
            image_id: Set(image.id),
            processed_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert transcription: {}", e)))?;

        let mut items = Vec::with_capacity(records.len());
        for record in records {
            let item = FaTranscriptionItemActiveModel {
                transcription_id: Set(transcription.id),
                sheet_name: Set(non_empty(record.sheet_name)),
                message: Set(non_empty(record.message)),
                start_ecu: Set(non_empty(record.start_ecu)),
                end_ecu: Set(non_empty(record.end_ecu)),
                sending_ecu: Set(non_empty(record.sending_ecu)),
                receiving_ecu: Set(non_empty(record.receiving_ecu)),
                dashed_line: Set(non_empty(record.dashed_line)),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to insert transcription item: {}", e))
            })?;
            items.push(item);
        }

        txn.commit().await?;

        info!(
            "Transcription stored: image_id={}, transcription_id={}, items={}",
            image.id,
            transcription.id,
            items.len()
        );

        Ok(StoredTranscription {
            image_id: image.id,
            transcription,
            items,
        })
    }

    /// Get a transcription run with its items.
    pub async fn get_transcription(
        &self,
        transcription_id: i32,
    ) -> AppResult<Option<StoredTranscription>> {
        let Some(transcription) = FaTranscription::find_by_id(transcription_id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get transcription: {}", e)))?
        else {
            return Ok(None);
        };

        let items = FaTranscriptionItem::find()
            .filter(fa_transcription_item::Column::TranscriptionId.eq(transcription.id))
            .order_by_asc(fa_transcription_item::Column::Id)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get transcription items: {}", e)))?;

        Ok(Some(StoredTranscription {
            image_id: transcription.image_id,
            transcription,
            items,
        }))
    }

    /// Get image metadata and bytes.
    pub async fn get_image(&self, image_id: i32) -> AppResult<Option<image::Model>> {
        Image::find_by_id(image_id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get image: {}", e)))
    }

    /// List transcription runs of an image, newest first.
    pub async fn list_transcriptions_for_image(
        &self,
        image_id: i32,
    ) -> AppResult<Vec<fa_transcription::Model>> {
        FaTranscription::find()
            .filter(fa_transcription::Column::ImageId.eq(image_id))
            .order_by_desc(fa_transcription::Column::ProcessedAt)
            .order_by_desc(fa_transcription::Column::Id)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list transcriptions: {}", e)))
    }
}
