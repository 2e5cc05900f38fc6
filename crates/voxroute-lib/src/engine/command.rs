//! Engine backed by an external synthesis program, one process per request.
//!
//! The default argument template drives the Coqui `tts` CLI:
//!
//! ```text
//! tts --text=<text> --model_name=<model> --out_path=<out> \
//!     [--language_idx=<lang>] [--use_cuda true]
//! ```
//!
//! Text is passed inside a single argv element, never through a shell.
//! Loading runs one warm-up synthesis, so a missing model fails startup.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use voxroute_core::LanguageKey;
use voxroute_core::types::Device;

use super::{EngineError, EngineFactory, SpeechEngine, warm_up};

/// Number of stderr lines kept in a failure message.
const STDERR_TAIL_LINES: usize = 5;

pub struct CommandEngineFactory {
    program: String,
    args: Vec<String>,
    language_args: Vec<String>,
    gpu_args: Vec<String>,
    warmup_language: Option<LanguageKey>,
}

impl CommandEngineFactory {
    pub fn new(
        program: String,
        args: Vec<String>,
        language_args: Vec<String>,
        gpu_args: Vec<String>,
    ) -> Self {
        Self {
            program,
            args,
            language_args,
            gpu_args,
            warmup_language: None,
        }
    }

    /// Language handed to the engine during the load-time warm-up.
    pub fn with_warmup_language(mut self, language: Option<LanguageKey>) -> Self {
        self.warmup_language = language;
        self
    }
}

#[async_trait]
impl EngineFactory for CommandEngineFactory {
    async fn load(
        &self,
        model_id: &str,
        device: Device,
    ) -> Result<Arc<dyn SpeechEngine>, EngineError> {
        let program = resolve_program(&self.program, std::env::var_os("PATH"))?;
        debug!(program = %program.display(), model_id, %device, "command engine resolved");

        let mut args = self.args.clone();
        if device.is_accelerated() {
            args.extend(self.gpu_args.iter().cloned());
        }

        let engine = CommandEngine {
            program,
            model_id: model_id.to_string(),
            args,
            language_args: self.language_args.clone(),
        };
        warm_up(&engine, self.warmup_language.as_ref()).await?;
        Ok(Arc::new(engine))
    }
}

pub struct CommandEngine {
    program: PathBuf,
    model_id: String,
    args: Vec<String>,
    language_args: Vec<String>,
}

impl CommandEngine {
    fn render_args(&self, text: &str, language: Option<&LanguageKey>, out: &Path) -> Vec<String> {
        let out = out.to_string_lossy();
        let lang = language.map(LanguageKey::as_str).unwrap_or_default();
        let extra = if language.is_some() {
            self.language_args.as_slice()
        } else {
            &[]
        };

        self.args
            .iter()
            .chain(extra)
            .map(|arg| {
                // `{text}` last so user text containing braces is never re-expanded
                arg.replace("{model}", &self.model_id)
                    .replace("{out}", &out)
                    .replace("{language}", lang)
                    .replace("{text}", text)
            })
            .collect()
    }
}

#[async_trait]
impl SpeechEngine for CommandEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Each call is its own process.
    fn concurrency_safe(&self) -> bool {
        true
    }

    async fn synthesize_to(
        &self,
        text: &str,
        language: Option<&LanguageKey>,
        out: &Path,
    ) -> Result<(), EngineError> {
        let args = self.render_args(text, language, out);
        debug!(program = %self.program.display(), chars = text.len(), "spawning synthesis");

        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                EngineError::Unavailable(format!(
                    "failed to spawn {}: {e}",
                    self.program.display()
                ))
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join(" | ");
        Err(EngineError::Failed(format!(
            "{} exited with {}: {tail}",
            self.program.display(),
            output.status
        )))
    }
}

/// Locate `name` the way a shell would: as a path if it contains a
/// separator, otherwise in each `PATH` entry.
fn resolve_program(
    name: &str,
    path_var: Option<std::ffi::OsString>,
) -> Result<PathBuf, EngineError> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return if candidate.is_file() {
            Ok(candidate.to_path_buf())
        } else {
            Err(EngineError::Unavailable(format!("{name} does not exist")))
        };
    }

    path_var
        .iter()
        .flat_map(std::env::split_paths)
        .flat_map(|dir| {
            let plain = dir.join(name);
            let exe = dir.join(format!("{name}.exe"));
            [plain, exe]
        })
        .find(|p| p.is_file())
        .ok_or_else(|| EngineError::Unavailable(format!("{name} not found on PATH")))
}

#[cfg(test)]
mod tests {
    use voxroute_core::config::EngineConfig;
    use voxroute_core::wav::encode_pcm16;

    use super::*;

    fn engine(args: &[&str], language_args: &[&str]) -> CommandEngine {
        CommandEngine {
            program: PathBuf::from("tts"),
            model_id: "tts_models/en/vctk/vits".into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            language_args: language_args.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn default_engine() -> CommandEngine {
        let EngineConfig::Command {
            args, language_args, ..
        } = EngineConfig::default()
        else {
            unreachable!()
        };
        CommandEngine {
            program: PathBuf::from("tts"),
            model_id: "tts_models/en/vctk/vits".into(),
            args,
            language_args,
        }
    }

    /// `sh -c <script> <args...>`: the first trailing arg is `$0`.
    #[cfg(unix)]
    fn sh_factory(script: &str, trailing: &[&str]) -> CommandEngineFactory {
        let mut args = vec!["-c".to_string(), script.to_string()];
        args.extend(trailing.iter().map(|s| s.to_string()));
        CommandEngineFactory::new("/bin/sh".into(), args, vec![], vec![])
    }

    #[test]
    fn renders_placeholders() {
        let args = default_engine().render_args("Hello world", None, Path::new("/tmp/a.wav"));
        assert_eq!(
            args,
            vec![
                "--text=Hello world",
                "--model_name=tts_models/en/vctk/vits",
                "--out_path=/tmp/a.wav"
            ]
        );
    }

    #[test]
    fn leading_dash_text_stays_inside_the_flag() {
        let args = default_engine().render_args("-5 degrees", None, Path::new("/tmp/a.wav"));
        assert_eq!(args[0], "--text=-5 degrees");
        assert!(args.iter().all(|a| a.starts_with("--")));
    }

    #[test]
    fn language_args_only_with_language() {
        let es = LanguageKey::parse("es").unwrap();
        let args = default_engine().render_args("hola", Some(&es), Path::new("/tmp/b.wav"));
        assert_eq!(args.last().unwrap(), "--language_idx=es");

        let e = engine(&["{text}"], &["--language_idx", "{language}"]);
        assert_eq!(e.render_args("hola", None, Path::new("/tmp/b.wav")), vec!["hola"]);
    }

    #[test]
    fn user_text_is_not_expanded() {
        let e = engine(&["{text}"], &[]);
        let args = e.render_args("say {model} and {out}", None, Path::new("/tmp/c.wav"));
        assert_eq!(args, vec!["say {model} and {out}"]);
    }

    #[test]
    fn resolve_program_missing() {
        let err = resolve_program("definitely-not-a-tts-binary", Some("/nonexistent".into()))
            .unwrap_err();
        assert!(err.to_string().contains("not found on PATH"));
        assert!(resolve_program("/nonexistent/tts", None).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn resolve_program_on_path() {
        let found = resolve_program("sh", std::env::var_os("PATH")).unwrap();
        assert!(found.ends_with("sh"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_process_reports_stderr() {
        let e = CommandEngine {
            program: PathBuf::from("/bin/sh"),
            model_id: "m".into(),
            args: vec!["-c".into(), "echo model exploded >&2; exit 3".into()],
            language_args: vec![],
        };
        let err = e
            .synthesize_to("hi", None, Path::new("/tmp/unused.wav"))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("model exploded"), "{msg}");
        assert!(msg.contains("exit status: 3"), "{msg}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn load_fails_when_model_cannot_synthesize() {
        let f = sh_factory("echo 'Model file not found: {model}' >&2; exit 1", &[]);
        let err = f
            .load("tts_models/xx/does-not-exist", Device::General)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Unavailable(_)), "{err}");
        assert!(err.to_string().contains("tts_models/xx/does-not-exist"), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn load_rejects_non_wav_warmup_output() {
        let f = sh_factory("echo not-audio > \"$0\"", &["{out}"]);
        let err = f.load("m", Device::General).await.err().unwrap();
        assert!(err.to_string().contains("not WAV"), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn synthesizes_through_the_service() {
        use crate::registry::RegistryBuilder;
        use crate::scratch::ScratchSpace;
        use crate::service::SynthesisService;
        use voxroute_core::types::SynthesisRequest;

        let tmp = tempfile::tempdir().unwrap();
        let fixture = tmp.path().join("fixture.wav");
        let wav = encode_pcm16(&[0, 1000, -1000, 0], 22_050);
        std::fs::write(&fixture, &wav).unwrap();

        let script = format!("cp '{}' \"$0\"", fixture.display());
        let f = sh_factory(&script, &["{out}"]);
        let mut b = RegistryBuilder::per_language(Device::General);
        b.register(LanguageKey::parse("en").unwrap(), "fixture", &f)
            .await
            .unwrap();
        let scratch_dir = tmp.path().join("scratch");
        let svc = SynthesisService::new(
            Arc::new(b.build().unwrap()),
            ScratchSpace::new(Some(scratch_dir.clone())).unwrap(),
        );

        let request = SynthesisRequest::new("-hello", LanguageKey::parse("en").unwrap()).unwrap();
        let result = svc.synthesize(&request).await.unwrap();
        assert_eq!(result.audio, wav);
        assert_eq!(result.model.as_deref(), Some("fixture"));
        assert_eq!(std::fs::read_dir(&scratch_dir).unwrap().count(), 0);
    }
}
