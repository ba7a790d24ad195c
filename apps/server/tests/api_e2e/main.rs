//! API E2E test suite.
//!
//! Drives the HTTP API end-to-end against an in-memory SQLite database and an
//! in-process mock LLM provider. No external services are needed.
//!
//! Run with: cargo test --test api_e2e

mod mock_llm_provider;
mod test_helpers;

mod test_chat;
mod test_coding;
mod test_testing;
mod test_transcriber;
