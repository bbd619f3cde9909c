//! HTTP text-to-speech backend and phrase cache

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use call_agent_core::{Error, Result, TextToSpeech};

/// HTTP TTS configuration
#[derive(Debug, Clone)]
pub struct HttpTtsConfig {
    /// Base URL of the synthesis service
    pub endpoint: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

/// Text-to-speech over HTTP. Returns 8 kHz PCM16 bytes.
pub struct HttpTts {
    config: HttpTtsConfig,
    client: reqwest::Client,
}

impl HttpTts {
    pub fn new(config: HttpTtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Tts(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl TextToSpeech for HttpTts {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(format!("{}/synthesize", self.config.endpoint))
            .json(&serde_json::json!({
                "text": text,
                "language": language,
                "sample_rate": 8000,
                "format": "pcm16",
            }))
            .send()
            .await
            .map_err(|e| Error::Tts(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Tts(format!(
                "synthesis rejected with status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Tts(e.to_string()))?;
        if bytes.is_empty() {
            return Err(Error::Tts("synthesis returned no audio".into()));
        }
        Ok(bytes.to_vec())
    }

    fn model_name(&self) -> &str {
        "http-tts"
    }
}

/// Phrase-keyed synthesis cache.
///
/// Greetings, reprompts, and fallback lines repeat across calls; caching
/// them skips the synthesis round-trip entirely. The cache stops inserting
/// at capacity — the scripted phrase set is small and stable, so churn-based
/// eviction buys nothing.
pub struct CachedTts {
    inner: Arc<dyn TextToSpeech>,
    cache: DashMap<String, Arc<Vec<u8>>>,
    capacity: usize,
}

impl CachedTts {
    pub fn new(inner: Arc<dyn TextToSpeech>, capacity: usize) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub async fn synthesize(&self, text: &str, language: &str) -> Result<Arc<Vec<u8>>> {
        let key = format!("{language}:{text}");
        if let Some(hit) = self.cache.get(&key) {
            tracing::trace!(len = hit.len(), "tts cache hit");
            return Ok(Arc::clone(&hit));
        }

        let audio = Arc::new(self.inner.synthesize(text, language).await?);
        if self.cache.len() < self.capacity {
            self.cache.insert(key, Arc::clone(&audio));
        }
        Ok(audio)
    }

    pub fn cached_phrases(&self) -> usize {
        self.cache.len()
    }

    pub fn backend_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTts {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextToSpeech for CountingTts {
        async fn synthesize(&self, text: &str, _language: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.as_bytes().to_vec())
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_cache_avoids_redundant_synthesis() {
        let backend = Arc::new(CountingTts {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedTts::new(backend.clone(), 16);

        cached.synthesize("Вітаю!", "uk").await.unwrap();
        cached.synthesize("Вітаю!", "uk").await.unwrap();
        cached.synthesize("Вітаю!", "uk").await.unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.cached_phrases(), 1);
    }

    #[tokio::test]
    async fn test_cache_keys_include_language() {
        let backend = Arc::new(CountingTts {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedTts::new(backend.clone(), 16);

        cached.synthesize("Hello", "uk").await.unwrap();
        cached.synthesize("Hello", "en").await.unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_capacity_bound() {
        let backend = Arc::new(CountingTts {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedTts::new(backend, 2);

        for i in 0..10 {
            cached.synthesize(&format!("phrase {i}"), "uk").await.unwrap();
        }
        assert!(cached.cached_phrases() <= 2);
    }
}
