//! Job validation and the error → envelope boundary.
//!
//! Job shape:
//!
//! ```json
//! { "id": "optional", "input": { "text": "Hello world", "language": "en" } }
//! ```
//!
//! `lang` is accepted as an alias for `language`. Whatever happens below
//! this point, [`RequestDispatcher::handle`] returns an envelope.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use serde_json::Value;
use tracing::{Instrument, error, info_span, warn};
use uuid::Uuid;

use voxroute_core::LanguageKey;
use voxroute_core::error::{WorkerError, WorkerResult};
use voxroute_core::types::{ResponseEnvelope, SynthesisRequest, SynthesisResult};

use crate::service::SynthesisService;

pub struct RequestDispatcher {
    service: SynthesisService,
    default_language: LanguageKey,
    include_model: bool,
}

impl RequestDispatcher {
    pub fn new(service: SynthesisService, default_language: LanguageKey) -> Self {
        Self {
            service,
            default_language,
            include_model: false,
        }
    }

    /// Report the serving model in success envelopes.
    pub fn include_model(mut self, include: bool) -> Self {
        self.include_model = include;
        self
    }

    pub fn service(&self) -> &SynthesisService {
        &self.service
    }

    pub fn default_language(&self) -> &LanguageKey {
        &self.default_language
    }

    /// Run one job to completion.
    pub async fn handle(&self, job: &Value) -> ResponseEnvelope {
        let job_id = job
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        async {
            match self.run(job).await {
                Ok(result) => ResponseEnvelope::success(result, self.include_model),
                Err(err) => {
                    if err.is_client_error() {
                        warn!(error = %err, "job rejected");
                    } else {
                        error!(error = %err, "job failed");
                    }
                    ResponseEnvelope::failure(&err)
                }
            }
        }
        .instrument(info_span!("job", id = %job_id))
        .await
    }

    async fn run(&self, job: &Value) -> WorkerResult<SynthesisResult> {
        let request = self.parse(job)?;
        AssertUnwindSafe(self.service.synthesize(&request))
            .catch_unwind()
            .await
            .map_err(|panic| WorkerError::internal(panic_message(&*panic)))?
    }

    /// Validate a job into a request without touching any engine.
    pub fn parse(&self, job: &Value) -> WorkerResult<SynthesisRequest> {
        let input = job.get("input").filter(|v| v.is_object());
        let field = |name: &str| input.and_then(|i| i.get(name));

        let text = field("text").and_then(Value::as_str).unwrap_or_default();
        if text.trim().is_empty() {
            return Err(WorkerError::text_required());
        }

        let present = |name: &str| field(name).filter(|v| !v.is_null());
        let language = match present("language").or_else(|| present("lang")) {
            None => self.default_language.clone(),
            Some(Value::String(s)) if s.trim().is_empty() => self.default_language.clone(),
            Some(Value::String(s)) => LanguageKey::parse(s)?,
            Some(other) => return Err(WorkerError::UnsupportedLanguage(other.to_string())),
        };

        SynthesisRequest::new(text, language)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("engine panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("engine panicked: {s}")
    } else {
        "engine panicked".to_string()
    }
}
