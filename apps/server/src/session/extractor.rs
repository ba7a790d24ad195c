//! Actix-web extractor for the chat session token.

use actix_web::dev::Payload;
use actix_web::http::StatusCode;
use actix_web::{FromRequest, HttpRequest, HttpResponse, ResponseError};
use std::future::{Ready, ready};

use super::is_valid_token;
use crate::config::{SESSION_COOKIE, SESSION_HEADER};
use crate::error::ErrorResponse;

/// Rejection for a malformed session token.
#[derive(Debug)]
pub struct SessionError {
    message: String,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ResponseError for SessionError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            success: false,
            error: self.message.clone(),
            code: "INVALID_SESSION".to_string(),
        })
    }
}

/// Session token supplied by the client, if any.
///
/// The header wins over the cookie. A present but malformed token is rejected
/// with 400 rather than silently replaced.
///
/// ```ignore
/// async fn handler(session: SessionToken) -> impl Responder {
///     let token = session.token(); // Option<&str>
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SessionToken(Option<String>);

impl SessionToken {
    pub fn token(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl FromRequest for SessionToken {
    type Error = SessionError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let from_header = req
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let token = from_header.or_else(|| {
            req.cookie(SESSION_COOKIE)
                .map(|c| c.value().to_string())
                .filter(|s| !s.is_empty())
        });

        match token {
            Some(token) if !is_valid_token(&token) => ready(Err(SessionError {
                message: format!(
                    "Invalid session id. Use up to {} letters, digits, '-' or '_'.",
                    super::MAX_TOKEN_LEN
                ),
            })),
            token => ready(Ok(SessionToken(token))),
        }
    }
}
