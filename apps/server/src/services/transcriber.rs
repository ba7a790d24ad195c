//! FA diagram transcription: image in, table rows out.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::info;

use crate::db::DbPool;
use crate::db::transcriptions::{NewImage, StoredTranscription};
use crate::error::{AppError, AppResult};
use crate::services::llm::{ContentPart, LlmClient};
use crate::services::postprocess::parse_transcription_json;
use crate::services::prompts::{TRANSCRIBE_INSTRUCTION, TRANSCRIBE_OPTIONS, TRANSCRIBE_SYSTEM};

/// Image types accepted for transcription.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

/// Stored transcription plus a parse warning, if any.
#[derive(Debug, Clone)]
pub struct TranscriptionOutcome {
    pub stored: StoredTranscription,
    pub warning: Option<String>,
}

/// Detect the image type from its leading bytes.
pub fn sniff_image_type(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Resolve the content type of an upload: a declared allowed type wins,
/// otherwise the sniffed type.
pub fn resolve_content_type(declared: Option<&str>, data: &[u8]) -> AppResult<&'static str> {
    if data.is_empty() {
        return Err(AppError::InvalidInput("image file is empty".to_string()));
    }

    let declared = declared.map(|d| {
        let essence = d.split(';').next().unwrap_or(d).trim().to_lowercase();
        if essence == "image/jpg" {
            "image/jpeg".to_string()
        } else {
            essence
        }
    });

    if let Some(declared) = declared.as_deref()
        && let Some(allowed) = ALLOWED_CONTENT_TYPES.iter().find(|t| **t == declared)
    {
        return Ok(*allowed);
    }

    sniff_image_type(data).ok_or_else(|| {
        AppError::InvalidInput(format!(
            "unsupported image type {}; expected one of {}",
            declared.as_deref().unwrap_or("(none)"),
            ALLOWED_CONTENT_TYPES.join(", ")
        ))
    })
}

/// Ask the model to transcribe a diagram and store the rows.
///
/// Nothing is stored when the model call fails. An unparseable reply is
/// stored as a run with no rows and reported through `warning`.
pub async fn transcribe(
    pool: &DbPool,
    llm: &LlmClient,
    image: NewImage,
) -> AppResult<TranscriptionOutcome> {
    let encoded = STANDARD.encode(&image.data);
    let parts = vec![
        ContentPart::text(TRANSCRIBE_INSTRUCTION),
        ContentPart::image_data(&image.content_type, &encoded),
    ];

    let raw = llm
        .complete(TRANSCRIBE_SYSTEM, parts, TRANSCRIBE_OPTIONS)
        .await?;
    let parsed = parse_transcription_json(&raw);

    let stored = pool.save_transcription(image, parsed.records).await?;

    info!(
        "Diagram transcribed: image_id={}, rows={}, warning={}",
        stored.image_id,
        stored.items.len(),
        parsed.warning.is_some()
    );

    Ok(TranscriptionOutcome {
        stored,
        warning: parsed.warning,
    })
}
