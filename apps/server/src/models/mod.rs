//! Resource representations returned by the TARA Assistant API.

pub mod chat;
pub mod script;
pub mod test_case;
pub mod test_result;
pub mod transcription;

// Re-export commonly used types
pub use chat::{ChatMessage, ChatRole};
pub use script::{Script, ScriptVersion};
pub use test_case::TestCase;
pub use test_result::{TestResult, TestStatus};
pub use transcription::{Transcription, TranscriptionItem, TranscriptionSummary};
