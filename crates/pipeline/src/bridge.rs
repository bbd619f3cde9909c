//! Speech bridge
//!
//! The turn controller's single entry point to STT, LLM, and TTS. Owns the
//! retry-once policy for external-service failures and the synthesized
//! phrase cache; anything that fails twice is surfaced to the controller,
//! which falls back to a scripted response.

use std::sync::Arc;
use uuid::Uuid;

use call_agent_core::{
    GenerateRequest, GenerateResponse, LanguageModel, Result, SpeechToText, SttStreamHandle,
    TextToSpeech,
};

use crate::tts::CachedTts;

pub struct SpeechBridge {
    stt: Arc<dyn SpeechToText>,
    llm: Arc<dyn LanguageModel>,
    tts: CachedTts,
}

impl SpeechBridge {
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        llm: Arc<dyn LanguageModel>,
        tts: Arc<dyn TextToSpeech>,
        tts_cache_entries: usize,
    ) -> Self {
        Self {
            stt,
            llm,
            tts: CachedTts::new(tts, tts_cache_entries),
        }
    }

    /// Open a streaming recognition session, retrying once.
    pub async fn open_stt(&self, session_id: Uuid, language: &str) -> Result<SttStreamHandle> {
        match self.stt.open_stream(session_id, language).await {
            Ok(handle) => Ok(handle),
            Err(first) => {
                tracing::warn!(session_id = %session_id, error = %first, "stt open failed, retrying once");
                self.stt.open_stream(session_id, language).await
            }
        }
    }

    /// One model call, retrying once on failure.
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        match self.llm.generate(request.clone()).await {
            Ok(response) => Ok(response),
            Err(first) => {
                tracing::warn!(model = self.llm.model_name(), error = %first, "llm call failed, retrying once");
                self.llm.generate(request).await
            }
        }
    }

    /// Synthesize a line, consulting the phrase cache first and retrying
    /// the backend once.
    pub async fn synthesize(&self, text: &str, language: &str) -> Result<Arc<Vec<u8>>> {
        match self.tts.synthesize(text, language).await {
            Ok(audio) => Ok(audio),
            Err(first) => {
                tracing::warn!(backend = self.tts.backend_name(), error = %first, "tts call failed, retrying once");
                self.tts.synthesize(text, language).await
            }
        }
    }

    pub fn llm_name(&self) -> &str {
        self.llm.model_name()
    }

    pub fn stt_name(&self) -> &str {
        self.stt.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use call_agent_core::{Error, SttSink, TranscriptEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct FlakyLlm {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl LanguageModel for FlakyLlm {
        async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(Error::Llm("unavailable".into()));
            }
            Ok(GenerateResponse {
                text: Some("ok".into()),
                tool_calls: Vec::new(),
            })
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    struct NullStt;

    #[async_trait]
    impl SpeechToText for NullStt {
        async fn open_stream(&self, _session_id: Uuid, _language: &str) -> Result<SttStreamHandle> {
            let (_tx, rx) = mpsc::channel::<TranscriptEvent>(1);
            Ok(SttStreamHandle {
                sink: Box::new(NullSink),
                transcripts: rx,
            })
        }

        fn model_name(&self) -> &str {
            "null"
        }
    }

    struct NullSink;

    #[async_trait]
    impl SttSink for NullSink {
        async fn push(&mut self, _frame: &call_agent_core::AudioFrame) -> Result<()> {
            Ok(())
        }
        async fn finalize(&mut self) -> Result<()> {
            Ok(())
        }
        async fn close(&mut self) {}
    }

    struct NullTts;

    #[async_trait]
    impl TextToSpeech for NullTts {
        async fn synthesize(&self, text: &str, _language: &str) -> Result<Vec<u8>> {
            Ok(text.as_bytes().to_vec())
        }
        fn model_name(&self) -> &str {
            "null"
        }
    }

    fn bridge(fail_first: usize) -> (SpeechBridge, Arc<FlakyLlm>) {
        let llm = Arc::new(FlakyLlm {
            calls: AtomicUsize::new(0),
            fail_first,
        });
        let bridge = SpeechBridge::new(Arc::new(NullStt), llm.clone(), Arc::new(NullTts), 16);
        (bridge, llm)
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            system: "rules".into(),
            messages: Vec::new(),
            tools: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_generate_retries_once() {
        let (bridge, llm) = bridge(1);
        let response = bridge.generate(request()).await.unwrap();
        assert_eq!(response.text.as_deref(), Some("ok"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_generate_gives_up_after_second_failure() {
        let (bridge, llm) = bridge(5);
        assert!(bridge.generate(request()).await.is_err());
        // Exactly one retry, not a loop
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
    }
}
