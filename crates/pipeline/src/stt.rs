//! HTTP speech-to-text backend
//!
//! Streams caller audio to a recognition sidecar. The sink half only hands
//! frames to a per-stream worker task over a bounded channel, so the call's
//! frame loop never waits on the network; the worker does endpointing,
//! posts utterance audio, and emits transcripts.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

use call_agent_core::{
    AudioFrame, Error, Result, SpeechToText, SttSink, SttStreamHandle, TranscriptEvent,
    FRAME_DURATION_MS,
};

/// Endpointing and partial-emission tuning.
#[derive(Debug, Clone)]
pub struct SttTuning {
    /// Frames above this energy count as speech
    pub energy_threshold_db: f32,
    /// Trailing silence that endpoints an utterance
    pub endpoint_silence_ms: u64,
    /// Utterances shorter than this are discarded as noise
    pub min_utterance_ms: u64,
    /// Cadence of interim recognition posts while speech continues
    pub partial_interval_ms: u64,
}

impl Default for SttTuning {
    fn default() -> Self {
        Self {
            energy_threshold_db: -45.0,
            endpoint_silence_ms: 700,
            min_utterance_ms: 200,
            partial_interval_ms: 1500,
        }
    }
}

/// HTTP STT configuration
#[derive(Debug, Clone)]
pub struct HttpSttConfig {
    /// Base URL of the recognition service
    pub endpoint: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    pub tuning: SttTuning,
}

#[derive(Debug, Deserialize)]
struct SttResponse {
    text: String,
    #[serde(default)]
    confidence: f32,
}

/// Speech-to-text over HTTP.
pub struct HttpStt {
    config: HttpSttConfig,
    client: reqwest::Client,
}

impl HttpStt {
    pub fn new(config: HttpSttConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Stt(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl SpeechToText for HttpStt {
    async fn open_stream(&self, session_id: Uuid, language: &str) -> Result<SttStreamHandle> {
        let (command_tx, command_rx) = mpsc::channel::<SttCommand>(64);
        let (transcript_tx, transcript_rx) = mpsc::channel::<TranscriptEvent>(16);

        let worker = SttWorker {
            client: self.client.clone(),
            url: format!("{}/transcribe", self.config.endpoint),
            language: language.to_string(),
            session_id,
            tuning: self.config.tuning.clone(),
            buf: Vec::new(),
            speech_seen: false,
            silent_ms: 0,
            speech_ms: 0,
            since_partial_ms: 0,
            utterance_start: Instant::now(),
            transcripts: transcript_tx,
        };
        tokio::spawn(worker.run(command_rx));

        Ok(SttStreamHandle {
            sink: Box::new(HttpSttSink { tx: Some(command_tx) }),
            transcripts: transcript_rx,
        })
    }

    fn model_name(&self) -> &str {
        "http-stt"
    }
}

enum SttCommand {
    Frame(AudioFrame),
    Finalize,
}

struct HttpSttSink {
    tx: Option<mpsc::Sender<SttCommand>>,
}

#[async_trait]
impl SttSink for HttpSttSink {
    async fn push(&mut self, frame: &AudioFrame) -> Result<()> {
        if let Some(ref tx) = self.tx {
            // try_send: a backed-up worker sheds frames instead of stalling
            // the frame loop
            if tx.try_send(SttCommand::Frame(frame.clone())).is_err() {
                tracing::trace!("stt worker busy, frame shed");
            }
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        if let Some(ref tx) = self.tx {
            tx.send(SttCommand::Finalize)
                .await
                .map_err(|_| Error::Stt("stt stream closed".into()))?;
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.tx.take();
    }
}

struct SttWorker {
    client: reqwest::Client,
    url: String,
    language: String,
    session_id: Uuid,
    tuning: SttTuning,
    buf: Vec<u8>,
    speech_seen: bool,
    silent_ms: u64,
    speech_ms: u64,
    since_partial_ms: u64,
    utterance_start: Instant,
    transcripts: mpsc::Sender<TranscriptEvent>,
}

impl SttWorker {
    async fn run(mut self, mut commands: mpsc::Receiver<SttCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                SttCommand::Frame(frame) => self.on_frame(frame).await,
                SttCommand::Finalize => self.flush(true).await,
            }
        }
        tracing::trace!(session_id = %self.session_id, "stt worker finished");
    }

    async fn on_frame(&mut self, frame: AudioFrame) {
        let is_speech = !frame.is_likely_silence(self.tuning.energy_threshold_db);

        if is_speech {
            if !self.speech_seen {
                self.utterance_start = Instant::now();
            }
            self.speech_seen = true;
            self.speech_ms += FRAME_DURATION_MS;
            self.silent_ms = 0;
        } else if self.speech_seen {
            self.silent_ms += FRAME_DURATION_MS;
        }

        if self.speech_seen {
            self.buf.extend_from_slice(&frame.to_pcm16());
            self.since_partial_ms += FRAME_DURATION_MS;
        }

        if self.speech_seen && self.silent_ms >= self.tuning.endpoint_silence_ms {
            self.flush(true).await;
        } else if self.speech_seen
            && is_speech
            && self.since_partial_ms >= self.tuning.partial_interval_ms
        {
            self.flush(false).await;
        }
    }

    /// Post the buffered utterance. Final flushes reset the utterance
    /// state; partial flushes keep accumulating.
    async fn flush(&mut self, is_final: bool) {
        if !self.speech_seen || self.speech_ms < self.tuning.min_utterance_ms {
            self.reset_if_final(is_final);
            return;
        }
        self.since_partial_ms = 0;

        let started = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .query(&[
                ("session_id", self.session_id.to_string()),
                ("language", self.language.clone()),
                ("sample_rate", "8000".to_string()),
                ("final", is_final.to_string()),
            ])
            .header("content-type", "application/octet-stream")
            .body(self.buf.clone())
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.json::<SttResponse>().await {
                Ok(body) if !body.text.is_empty() => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    let event = if is_final {
                        TranscriptEvent::final_result(body.text, body.confidence, latency_ms)
                    } else {
                        TranscriptEvent::partial(body.text, body.confidence)
                    };
                    let _ = self.transcripts.send(event).await;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(session_id = %self.session_id, error = %e, "stt payload malformed");
                }
            },
            Ok(resp) => {
                tracing::warn!(session_id = %self.session_id, status = %resp.status(), "stt request rejected");
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "stt request failed");
            }
        }

        self.reset_if_final(is_final);
    }

    fn reset_if_final(&mut self, is_final: bool) {
        if is_final {
            self.buf.clear();
            self.speech_seen = false;
            self.silent_ms = 0;
            self.speech_ms = 0;
            self.since_partial_ms = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuning_defaults() {
        let tuning = SttTuning::default();
        assert!(tuning.endpoint_silence_ms < 10_000); // endpoints well before the silence reprompt
        assert!(tuning.min_utterance_ms > 0);
    }

    #[tokio::test]
    async fn test_sink_push_never_blocks() {
        let stt = HttpStt::new(HttpSttConfig {
            endpoint: "http://127.0.0.1:1".to_string(), // nothing listens here
            request_timeout: Duration::from_millis(100),
            tuning: SttTuning::default(),
        })
        .unwrap();

        let mut handle = stt.open_stream(Uuid::new_v4(), "uk").await.unwrap();
        // Push a burst of loud frames; push must return immediately even
        // though the backend is unreachable.
        let frame = AudioFrame::new(vec![0.5; call_agent_core::FRAME_SAMPLES], 0);
        for _ in 0..200 {
            handle.sink.push(&frame).await.unwrap();
        }
        handle.sink.close().await;
    }
}
