//! SeaORM entity definitions.

pub mod chat_message;
pub mod chat_session;
pub mod fa_transcription;
pub mod fa_transcription_item;
pub mod image;
pub mod script;
pub mod script_version;
pub mod test_case;
pub mod test_result;
