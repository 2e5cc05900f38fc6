//! Engine backed by an OpenAI-compatible speech server
//! (`POST /v1/audio/speech`), e.g. Kokoro-FastAPI or a Coqui server shim.
//!
//! Loading checks reachability, then runs one warm-up request for the model.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use voxroute_core::LanguageKey;
use voxroute_core::types::{AUDIO_FORMAT, Device};
use voxroute_core::wav::fix_wav_sizes;

use super::{EngineError, EngineFactory, SpeechEngine, warm_up};

const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpEngineFactory {
    base_url: String,
    voice: Option<String>,
    concurrency_safe: bool,
    warmup_language: Option<LanguageKey>,
    client: reqwest::Client,
}

impl HttpEngineFactory {
    pub fn new(base_url: String, voice: Option<String>, concurrency_safe: bool) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            voice,
            concurrency_safe,
            warmup_language: None,
            client: reqwest::Client::new(),
        }
    }

    /// Language sent with the load-time warm-up request.
    pub fn with_warmup_language(mut self, language: Option<LanguageKey>) -> Self {
        self.warmup_language = language;
        self
    }
}

#[async_trait]
impl EngineFactory for HttpEngineFactory {
    async fn load(
        &self,
        model_id: &str,
        device: Device,
    ) -> Result<Arc<dyn SpeechEngine>, EngineError> {
        // Any response means the server is up; model errors surface per request.
        self.client
            .get(format!("{}/", self.base_url))
            .timeout(REACHABILITY_TIMEOUT)
            .send()
            .await
            .map_err(|e| EngineError::Unavailable(format!("{} unreachable: {e}", self.base_url)))?;

        debug!(url = %self.base_url, model_id, %device, "speech server reachable");

        let engine = HttpEngine {
            url: format!("{}/v1/audio/speech", self.base_url),
            model_id: model_id.to_string(),
            voice: self.voice.clone(),
            concurrency_safe: self.concurrency_safe,
            client: self.client.clone(),
        };
        warm_up(&engine, self.warmup_language.as_ref()).await?;
        Ok(Arc::new(engine))
    }
}

pub struct HttpEngine {
    url: String,
    model_id: String,
    voice: Option<String>,
    concurrency_safe: bool,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SpeechBody<'a> {
    input: &'a str,
    model: &'a str,
    response_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

#[async_trait]
impl SpeechEngine for HttpEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn concurrency_safe(&self) -> bool {
        self.concurrency_safe
    }

    async fn synthesize_to(
        &self,
        text: &str,
        language: Option<&LanguageKey>,
        out: &Path,
    ) -> Result<(), EngineError> {
        let body = SpeechBody {
            input: text,
            model: &self.model_id,
            response_format: AUDIO_FORMAT,
            voice: self.voice.as_deref(),
            language: language.map(LanguageKey::as_str),
        };

        debug!(url = %self.url, chars = text.len(), "POST speech");
        let resp = self.client.post(&self.url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(EngineError::Failed(format!("speech server returned {status}: {detail}")));
        }

        let wav = fix_wav_sizes(resp.bytes().await?.to_vec());
        tokio::fs::write(out, wav).await?;
        Ok(())
    }
}
