//! Speech collaborator traits

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::audio::AudioFrame;
use crate::error::Result;
use crate::transcript::TranscriptEvent;

/// Live STT stream for one caller utterance window.
///
/// The controller pushes audio through `sink` and receives transcripts on
/// `transcripts`. Dropping the handle closes the stream; a late transcript
/// from a closed stream is discarded by the receiver side going away.
pub struct SttStreamHandle {
    pub sink: Box<dyn SttSink>,
    pub transcripts: mpsc::Receiver<TranscriptEvent>,
}

/// Audio-in half of a streaming STT session.
#[async_trait]
pub trait SttSink: Send {
    /// Feed one frame of caller audio
    async fn push(&mut self, frame: &AudioFrame) -> Result<()>;

    /// Force endpointing of the current utterance; a final transcript is
    /// emitted on the transcript channel if any speech was seen.
    async fn finalize(&mut self) -> Result<()>;

    /// Release the stream. Idempotent.
    async fn close(&mut self);
}

/// Speech-to-text collaborator.
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    /// Open a streaming recognition session for a call
    async fn open_stream(&self, session_id: Uuid, language: &str) -> Result<SttStreamHandle>;

    /// Backend name for logging
    fn model_name(&self) -> &str;
}

/// Text-to-speech collaborator.
///
/// Returns 8 kHz 16-bit mono PCM bytes ready for wire framing. Callers front
/// this with a phrase-keyed cache to avoid redundant synthesis of scripted
/// lines.
#[async_trait]
pub trait TextToSpeech: Send + Sync + 'static {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>>;

    /// Backend name for logging
    fn model_name(&self) -> &str;
}
