//! Speech bridge
//!
//! Adapter boundary to the streaming STT, LLM, and TTS collaborators. The
//! bridge owns the retry-once policy and the TTS phrase cache; the concrete
//! backends here speak HTTP to sidecar services, and tests swap in scripted
//! implementations of the core traits.

pub mod bridge;
pub mod llm_backend;
pub mod stt;
pub mod tts;

pub use bridge::SpeechBridge;
pub use llm_backend::{HttpLlm, HttpLlmConfig};
pub use stt::{HttpStt, HttpSttConfig, SttTuning};
pub use tts::{CachedTts, HttpTts, HttpTtsConfig};
