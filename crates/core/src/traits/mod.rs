//! Collaborator traits
//!
//! Everything the pipeline consumes from the outside world is reached
//! through one of these boundaries, so tests and degraded modes can swap
//! implementations freely.

pub mod directory;
pub mod llm;
pub mod speech;
pub mod store;

pub use directory::TenantDirectory;
pub use llm::LanguageModel;
pub use speech::{SpeechToText, SttSink, SttStreamHandle, TextToSpeech};
pub use store::{CallLogSink, SessionStore};
