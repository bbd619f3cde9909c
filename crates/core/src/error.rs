//! Shared error taxonomy for collaborator boundaries

use thiserror::Error;

use crate::tool::ToolError;

/// Errors crossing collaborator boundaries.
///
/// Protocol and server errors have their own enums in their crates; this
/// type covers the external services the turn controller talks to.
#[derive(Error, Debug)]
pub enum Error {
    #[error("speech-to-text error: {0}")]
    Stt(String),

    #[error("language model error: {0}")]
    Llm(String),

    #[error("text-to-speech error: {0}")]
    Tts(String),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("session store error: {0}")]
    Store(String),

    #[error("call log sink error: {0}")]
    Sink(String),

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid input: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures of an external service that warrant the
    /// retry-once-then-fallback policy.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Error::Stt(_) | Error::Llm(_) | Error::Tts(_) | Error::Tool(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_classification() {
        assert!(Error::Llm("down".into()).is_external());
        assert!(!Error::Store("down".into()).is_external());
        assert!(!Error::Cancelled.is_external());
    }
}
