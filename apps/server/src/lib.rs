//! TARA Assistant server library.
//!
//! This library provides the core functionality for the assistant server:
//! LLM access, prompt construction, response post-processing, versioned script
//! storage, test execution, TARA chat and FA diagram transcription, plus the
//! HTTP API over them.

pub mod api;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
pub mod session;
