//! API endpoint modules.
//!
//! Every route lives under the `/api` scope. Handlers return `AppResult`, so
//! failures always leave as the `{success: false, error, code}` envelope.

pub mod chat;
pub mod coding;
pub mod fa_transcriber;
pub mod health;
pub mod openapi;
pub mod testing;

use std::convert::Infallible;

use actix_web::HttpResponseBuilder;
use actix_web::http::{StatusCode, header};
use actix_web::web::{self, Bytes};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, AppResult};

pub use openapi::ApiDoc;

/// Largest accepted JSON body (scripts and test suites are sent inline).
const MAX_JSON_BODY: usize = 2 * 1024 * 1024;

/// Configure all API routes (mounted under `/api`).
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(health::configure_health_routes)
        .configure(coding::configure_routes)
        .configure(testing::configure_routes)
        .configure(chat::configure_routes)
        .configure(fa_transcriber::configure_routes);
}

/// JSON extractor config that reports malformed bodies through `AppError`.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(MAX_JSON_BODY)
        .error_handler(|err, _req| AppError::InvalidInput(err.to_string()).into())
}

/// Path extractor config that reports malformed ids through `AppError`.
pub fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _req| AppError::InvalidInput(err.to_string()).into())
}

/// Query extractor config that reports malformed parameters through `AppError`.
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| AppError::InvalidInput(err.to_string()).into())
}

/// Reject a missing or blank text field.
pub(crate) fn required<'a>(field: &str, value: &'a str) -> AppResult<&'a str> {
    if value.trim().is_empty() {
        Err(AppError::InvalidInput(format!("{} is required", field)))
    } else {
        Ok(value)
    }
}

/// Treat a blank optional field as absent.
pub(crate) fn optional(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// `?stream=true` switch for endpoints with a Server-Sent Events variant.
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct StreamQuery {
    /// Stream the model output as Server-Sent Events
    #[serde(default)]
    pub stream: bool,
}

/// Encode one Server-Sent Event carrying a JSON payload.
pub(crate) fn sse_event<T: Serialize>(payload: &T) -> Result<Bytes, Infallible> {
    let data = serde_json::to_string(payload)
        .unwrap_or_else(|e| format!(r#"{{"error":"failed to encode event: {}"}}"#, e));
    Ok(Bytes::from(format!("data: {}\n\n", data)))
}

/// Response builder for a `text/event-stream` body.
pub(crate) fn sse_builder() -> HttpResponseBuilder {
    let mut builder = HttpResponseBuilder::new(StatusCode::OK);
    builder
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"));
    builder
}
