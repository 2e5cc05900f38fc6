//! Resolve an engine, run it against a scratch artifact, read the audio back.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use voxroute_core::error::{WorkerError, WorkerResult};
use voxroute_core::types::{AUDIO_FORMAT, SynthesisRequest, SynthesisResult};
use voxroute_core::wav::parse_wav_header;

use crate::registry::ModelRegistry;
use crate::scratch::ScratchSpace;

pub struct SynthesisService {
    registry: Arc<ModelRegistry>,
    scratch: ScratchSpace,
}

impl SynthesisService {
    pub fn new(registry: Arc<ModelRegistry>, scratch: ScratchSpace) -> Self {
        Self { registry, scratch }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Synthesize one request.
    ///
    /// Fails with `UnsupportedLanguage` when the registry has no engine for
    /// the language and `SynthesisFailure` for anything the engine or the
    /// artifact round-trip gets wrong.
    pub async fn synthesize(&self, request: &SynthesisRequest) -> WorkerResult<SynthesisResult> {
        let resolved = self.registry.resolve(&request.language)?;
        let handle = resolved.handle;

        let artifact = self
            .scratch
            .artifact()
            .map_err(|e| WorkerError::synthesis(format!("cannot create scratch artifact: {e}")))?;
        debug!(artifact = %artifact.id(), model = handle.model_id(), "invoking engine");

        let started = Instant::now();
        let language = resolved.pass_language.then_some(&request.language);
        handle
            .invoke(&request.text, language, artifact.path())
            .await
            .map_err(|e| WorkerError::synthesis(e.to_string()))?;

        let audio = artifact
            .read()
            .await
            .map_err(|e| WorkerError::synthesis(format!("cannot read engine output: {e}")))?;
        parse_wav_header(&audio)
            .map_err(|e| WorkerError::synthesis(format!("engine output is not WAV: {e}")))?;

        info!(
            language = %request.language,
            model = handle.model_id(),
            chars = request.text.chars().count(),
            bytes = audio.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "synthesized"
        );

        Ok(SynthesisResult {
            audio,
            format: AUDIO_FORMAT,
            language: request.language.clone(),
            model: Some(handle.model_id().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use voxroute_core::LanguageKey;
    use voxroute_core::types::Device;

    use super::*;
    use crate::registry::RegistryBuilder;
    use crate::test_support::{Behavior, StubEngine, StubFactory, key, marker_wav};

    async fn service_with(
        engines: Vec<std::sync::Arc<StubEngine>>,
        scratch: &Path,
    ) -> SynthesisService {
        let models: Vec<String> = engines.iter().map(|e| e.model.clone()).collect();
        let f = StubFactory { engines };
        let mut b = RegistryBuilder::per_language(Device::General);
        for (lang, model) in ["en", "ar", "de"].iter().zip(&models) {
            b.register(key(lang), model, &f).await.unwrap();
        }
        let space = ScratchSpace::new(Some(scratch.to_path_buf())).unwrap();
        SynthesisService::new(Arc::new(b.build().unwrap()), space)
    }

    fn request(text: &str, lang: &str) -> SynthesisRequest {
        SynthesisRequest::new(text, key(lang)).unwrap()
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn returns_engine_audio() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service_with(vec![StubEngine::new("a", Behavior::Ok)], tmp.path()).await;
        let result = svc.synthesize(&request("Hello world", "en")).await.unwrap();
        assert_eq!(result.audio, marker_wav("a", "Hello world", None));
        assert_eq!(result.format, "wav");
        assert_eq!(result.language, key("en"));
        assert_eq!(result.model.as_deref(), Some("a"));
        assert_eq!(files_in(tmp.path()), 0, "scratch artifact left behind");
    }

    #[tokio::test]
    async fn unknown_language_never_touches_engines() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = StubEngine::new("a", Behavior::Ok);
        let svc = service_with(vec![engine.clone()], tmp.path()).await;
        let err = svc.synthesize(&request("hi", "fr")).await.unwrap_err();
        assert!(matches!(err, WorkerError::UnsupportedLanguage(_)));
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn engine_error_is_synthesis_failure_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service_with(vec![StubEngine::new("a", Behavior::Fail)], tmp.path()).await;
        let err = svc.synthesize(&request("hi", "en")).await.unwrap_err();
        assert_eq!(err.to_string(), "synthesis failed: stub engine failure");
        assert_eq!(files_in(tmp.path()), 0);
    }

    #[tokio::test]
    async fn non_wav_output_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let svc = service_with(vec![StubEngine::new("a", Behavior::NotWav)], tmp.path()).await;
        let err = svc.synthesize(&request("hi", "en")).await.unwrap_err();
        assert!(err.to_string().contains("not WAV"), "{err}");
        assert_eq!(files_in(tmp.path()), 0);
    }

    #[tokio::test]
    async fn per_language_engines_get_no_language() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = StubEngine::new("a", Behavior::Ok);
        let svc = service_with(vec![engine.clone()], tmp.path()).await;
        svc.synthesize(&request("hi", "en")).await.unwrap();
        assert_eq!(*engine.seen_language.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn multilingual_engine_receives_language() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = StubEngine::new("xtts", Behavior::Ok);
        let f = StubFactory {
            engines: vec![engine.clone()],
        };
        let mut b = RegistryBuilder::multilingual(Device::Accelerated, [key("en"), key("es")]);
        b.register(LanguageKey::multi(), "xtts", &f).await.unwrap();
        let space = ScratchSpace::new(Some(tmp.path().to_path_buf())).unwrap();
        let svc = SynthesisService::new(Arc::new(b.build().unwrap()), space);

        let result = svc.synthesize(&request("hola", "es")).await.unwrap();
        assert_eq!(result.audio, marker_wav("xtts", "hola", Some(&key("es"))));
        assert_eq!(*engine.seen_language.lock().unwrap(), vec![Some("es".to_string())]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn unsafe_engine_is_serialized() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = StubEngine::unsafe_slow("a", Duration::from_millis(20));
        let svc = Arc::new(service_with(vec![engine.clone()], tmp.path()).await);

        let tasks: Vec<_> = (0..6)
            .map(|i| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.synthesize(&request(&format!("n{i}"), "en")).await })
            })
            .collect();
        for t in tasks {
            t.await.unwrap().unwrap();
        }
        assert_eq!(engine.calls(), 6);
        assert_eq!(engine.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn safe_engine_runs_concurrently() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = StubEngine::safe_slow("a", Duration::from_millis(50));
        let svc = Arc::new(service_with(vec![engine.clone()], tmp.path()).await);

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.synthesize(&request(&format!("n{i}"), "en")).await })
            })
            .collect();
        for t in tasks {
            t.await.unwrap().unwrap();
        }
        assert!(engine.max_in_flight.load(Ordering::SeqCst) > 1);
    }
}
