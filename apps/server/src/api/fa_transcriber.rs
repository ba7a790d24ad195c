//! FA diagram transcription endpoints.

use actix_multipart::Multipart;
use actix_web::{HttpResponse, get, post, web};
use futures_util::StreamExt;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::DbPool;
use crate::db::transcriptions::NewImage;
use crate::error::{AppError, AppResult};
use crate::models::{Transcription, TranscriptionItem, TranscriptionSummary};
use crate::services::LlmClient;
use crate::services::transcriber::{self, resolve_content_type};

/// Form field carrying the diagram.
const IMAGE_FIELD: &str = "image";

/// Multipart form for a diagram upload.
#[derive(ToSchema)]
pub struct UploadDiagramForm {
    /// PNG, JPEG, GIF or WebP image
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TranscribeResponse {
    pub success: bool,
    pub transcription_id: i32,
    pub image_id: i32,
    pub items: Vec<TranscriptionItem>,
    /// Set when the model output could not be parsed into rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TranscriptionResponse {
    pub success: bool,
    pub transcription: Transcription,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TranscriptionListResponse {
    pub success: bool,
    pub image_id: i32,
    pub transcriptions: Vec<TranscriptionSummary>,
}

/// Read the `image` field of the form, enforcing the size limit while streaming.
async fn read_image(payload: &mut Multipart, max_upload_size: usize) -> AppResult<NewImage> {
    let mut image: Option<NewImage> = None;

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::InvalidInput(format!("Multipart error: {}", e)))?;

        let content_disposition = field
            .content_disposition()
            .ok_or_else(|| AppError::InvalidInput("Missing content disposition".to_string()))?;

        if content_disposition.get_name() != Some(IMAGE_FIELD) || image.is_some() {
            // Drain fields we do not use
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| AppError::InvalidInput(format!("Read error: {}", e)))?;
            }
            continue;
        }

        let filename = content_disposition
            .get_filename()
            .map(|name| name.replace('\\', "/"))
            .and_then(|name| name.rsplit('/').next().map(str::to_string))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "diagram".to_string());
        let declared = field.content_type().map(|mime| mime.essence_str().to_string());

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::InvalidInput(format!("Read error: {}", e)))?;
            if data.len() + chunk.len() > max_upload_size {
                return Err(AppError::InvalidInput(format!(
                    "Image exceeds the maximum upload size of {} bytes",
                    max_upload_size
                )));
            }
            data.extend_from_slice(&chunk);
        }

        let content_type = resolve_content_type(declared.as_deref(), &data)?;
        image = Some(NewImage {
            filename,
            content_type: content_type.to_string(),
            data,
        });
    }

    image.ok_or_else(|| {
        AppError::InvalidInput(format!("Missing '{}' file in multipart form", IMAGE_FIELD))
    })
}

/// Transcribe an uploaded FA diagram into table rows.
///
/// The rows are stored with the image. When the model output cannot be
/// parsed the run is stored without rows and `warning` explains why.
#[utoipa::path(
    post,
    path = "/api/fa-transcriber/transcribe",
    tag = "FA Transcriber",
    request_body(content = UploadDiagramForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Diagram transcribed", body = TranscribeResponse),
        (status = 400, description = "Missing, empty, oversized or unsupported image", body = crate::error::ErrorResponse),
        (status = 504, description = "Provider timed out", body = crate::error::ErrorResponse)
    )
)]
#[post("/fa-transcriber/transcribe")]
pub async fn transcribe(
    pool: web::Data<DbPool>,
    llm: web::Data<LlmClient>,
    max_upload_size: web::Data<usize>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let image = read_image(&mut payload, **max_upload_size).await?;

    let outcome = transcriber::transcribe(&pool, &llm, image).await?;
    let transcription = Transcription::from(outcome.stored);

    Ok(HttpResponse::Ok().json(TranscribeResponse {
        success: true,
        transcription_id: transcription.id,
        image_id: transcription.image_id,
        items: transcription.items,
        warning: outcome.warning,
    }))
}

/// Get a transcription with its rows.
#[utoipa::path(
    get,
    path = "/api/fa-transcriber/transcriptions/{id}",
    tag = "FA Transcriber",
    params(("id" = i32, Path, description = "Transcription ID")),
    responses(
        (status = 200, description = "Transcription", body = TranscriptionResponse),
        (status = 404, description = "Transcription not found", body = crate::error::ErrorResponse)
    )
)]
#[get("/fa-transcriber/transcriptions/{id}")]
pub async fn get_transcription(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let transcription_id = path.into_inner();
    let stored = pool
        .get_transcription(transcription_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transcription {}", transcription_id)))?;

    Ok(HttpResponse::Ok().json(TranscriptionResponse {
        success: true,
        transcription: stored.into(),
    }))
}

/// List the transcription runs of an image, newest first.
#[utoipa::path(
    get,
    path = "/api/fa-transcriber/images/{id}/transcriptions",
    tag = "FA Transcriber",
    params(("id" = i32, Path, description = "Image ID")),
    responses(
        (status = 200, description = "Transcription runs", body = TranscriptionListResponse),
        (status = 404, description = "Image not found", body = crate::error::ErrorResponse)
    )
)]
#[get("/fa-transcriber/images/{id}/transcriptions")]
pub async fn list_image_transcriptions(
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let image_id = path.into_inner();
    let image = pool
        .get_image(image_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Image {}", image_id)))?;

    let runs = pool.list_transcriptions_for_image(image.id).await?;

    Ok(HttpResponse::Ok().json(TranscriptionListResponse {
        success: true,
        image_id: image.id,
        transcriptions: runs.into_iter().map(TranscriptionSummary::from).collect(),
    }))
}

/// Configure FA transcriber routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(transcribe)
        .service(get_transcription)
        .service(list_image_transcriptions);
}
