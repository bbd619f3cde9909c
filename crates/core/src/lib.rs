//! Core traits and types for the call-center voice agent
//!
//! This crate provides the foundational types used across all other crates:
//! - Audio frame types for the telephony wire format
//! - Call session lifecycle, turns, and tool-call records
//! - Transcript and LLM request/response types
//! - Tenant configuration
//! - Collaborator traits (STT, LLM, TTS, tools, session store, call log sink,
//!   tenant directory)
//! - Error types

pub mod audio;
pub mod error;
pub mod llm_types;
pub mod session;
pub mod tenant;
pub mod tool;
pub mod traits;
pub mod transcript;

pub use audio::{
    pcm16_to_wire_frames, AudioFrame, FRAME_BYTES, FRAME_DURATION_MS, FRAME_SAMPLES,
    SAMPLE_RATE_HZ,
};
pub use error::{Error, Result};
pub use llm_types::{GenerateRequest, GenerateResponse, Message, Role, ToolDefinition, ToolInvocation};
pub use session::{
    CallFinalRecord, CallOutcome, CallSession, CallSnapshot, CallState, Speaker, StageLatency,
    ToolCallLogRecord, ToolCallRecord, Turn, TurnRecord,
};
pub use tenant::TenantConfig;
pub use tool::{Tool, ToolError, ToolOutput, ToolSchema};
pub use traits::{
    CallLogSink, LanguageModel, SessionStore, SpeechToText, SttSink, SttStreamHandle,
    TenantDirectory, TextToSpeech,
};
pub use transcript::TranscriptEvent;
