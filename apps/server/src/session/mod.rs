//! Chat session identity.
//!
//! A chat session is identified by an opaque token carried in the
//! `X-Session-Id` header or the `tara_session` cookie. The token is passed
//! explicitly to the chat service; nothing here touches the database.

mod extractor;

use actix_web::cookie::{Cookie, SameSite};
use uuid::Uuid;

use crate::config::SESSION_COOKIE;

pub use extractor::{SessionError, SessionToken};

/// Maximum token length (matches the `chat_sessions.session_id` column).
pub const MAX_TOKEN_LEN: usize = 50;

/// Whether a client-supplied token is acceptable.
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_TOKEN_LEN
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Generate a fresh session token.
pub fn new_token() -> String {
    Uuid::new_v4().to_string()
}

/// Cookie carrying the session token back to browser clients.
pub fn session_cookie(token: &str, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(secure);
    cookie
}
