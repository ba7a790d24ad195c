//! Business logic services.

pub mod chat;
pub mod coding;
pub mod diff;
pub mod llm;
pub mod postprocess;
pub mod prompts;
pub mod test_runner;
pub mod testing;
pub mod transcriber;

pub use llm::LlmClient;
pub use test_runner::{PythonTestRunner, TestRunner};
