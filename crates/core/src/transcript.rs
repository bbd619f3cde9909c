//! Transcript events from the speech-to-text collaborator

use serde::{Deserialize, Serialize};

/// An incremental or final transcript for the current caller utterance.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TranscriptEvent {
    /// Recognized text so far (full utterance for final events)
    pub text: String,
    /// Recognition confidence, 0.0 - 1.0
    pub confidence: f32,
    /// True when the collaborator has endpointed the utterance
    pub is_final: bool,
    /// Collaborator-reported recognition latency
    pub latency_ms: u64,
}

impl TranscriptEvent {
    pub fn partial(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            is_final: false,
            latency_ms: 0,
        }
    }

    pub fn final_result(text: impl Into<String>, confidence: f32, latency_ms: u64) -> Self {
        Self {
            text: text.into(),
            confidence,
            is_final: true,
            latency_ms,
        }
    }
}
