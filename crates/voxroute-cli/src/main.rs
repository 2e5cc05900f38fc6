//! voxroute CLI — text-to-speech synthesis worker.
//!
//! ```text
//! voxroute serve [--port 8000] [--host 0.0.0.0] [--config worker.json]
//! voxroute run "hello world" [--language en] [--out hello.wav]
//! voxroute speak "hello world" [--server http://localhost:8000] --out hello.wav
//! voxroute concurrency [--current 4]
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voxroute_core::LanguageKey;
use voxroute_core::admission::ConcurrencyAdvice;
use voxroute_core::codec::decode_audio;
use voxroute_core::config::{EngineConfig, WorkerConfig};
use voxroute_core::types::{DevicePreference, RegistryMode, ResponseEnvelope};
use voxroute_lib::worker::Worker;

const DEFAULT_LOG_FILTER: &str = "voxroute_lib=info,voxroute_cli=info";

/// voxroute: multi-model text-to-speech worker
#[derive(Parser)]
#[command(name = "voxroute", version, about)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load every engine and serve jobs over HTTP
    Serve {
        /// Listen port
        #[arg(long, default_value = "8000")]
        port: u16,
        /// Listen host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[command(flatten)]
        worker: WorkerArgs,
    },
    /// Load the engines and run a single job locally
    Run {
        /// Text to synthesize
        text: String,
        /// Language key; the configured default when omitted
        #[arg(long)]
        language: Option<String>,
        /// Write decoded WAV here instead of printing the envelope
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        worker: WorkerArgs,
    },
    /// Submit a job to a running server and save the audio
    Speak {
        /// Text to synthesize
        text: String,
        #[arg(long)]
        language: Option<String>,
        /// Server URL
        #[arg(long, default_value = "http://localhost:8000")]
        server: String,
        /// Output WAV path
        #[arg(long, default_value = "speech.wav")]
        out: PathBuf,
    },
    /// Print the concurrency recommendation for this configuration
    Concurrency {
        /// The scheduler's current setting
        #[arg(long, default_value = "0")]
        current: usize,
        #[command(flatten)]
        worker: WorkerArgs,
    },
}

/// Worker configuration: an optional JSON file, then flag overrides.
#[derive(Args, Debug)]
struct WorkerArgs {
    /// JSON worker configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// auto, accelerated (gpu) or general (cpu)
    #[arg(long)]
    device: Option<DevicePreference>,
    #[arg(long)]
    default_language: Option<LanguageKey>,
    /// Language → model mapping; repeat per language. Replaces the configured table.
    #[arg(long = "model", value_name = "KEY=MODEL", value_parser = parse_model_pair)]
    models: Vec<(LanguageKey, String)>,
    /// Serve every language from this one model
    #[arg(long, value_name = "MODEL")]
    multilingual: Option<String>,
    /// Languages the multilingual model accepts; repeatable
    #[arg(long = "allow", value_name = "KEY")]
    allow: Vec<LanguageKey>,
    /// Override the recommended concurrency
    #[arg(long)]
    max_concurrency: Option<usize>,
    /// Report the serving model in success envelopes
    #[arg(long)]
    include_model: bool,
    /// Directory for engine output files
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
    /// Use an OpenAI-compatible speech server instead of a local program
    #[arg(long, conflicts_with = "engine_program")]
    engine_url: Option<String>,
    /// Synthesis program for the command engine
    #[arg(long)]
    engine_program: Option<String>,
}

fn parse_model_pair(raw: &str) -> Result<(LanguageKey, String), String> {
    let (key, model) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=MODEL, got '{raw}'"))?;
    let key = LanguageKey::parse(key).map_err(|e| e.to_string())?;
    let model = model.trim();
    if model.is_empty() {
        return Err(format!("empty model for {key}"));
    }
    Ok((key, model.to_string()))
}

impl WorkerArgs {
    fn into_config(self) -> anyhow::Result<WorkerConfig> {
        let mut config = match &self.config {
            Some(path) => WorkerConfig::from_file(path)?,
            None => WorkerConfig::default(),
        };

        if let Some(device) = self.device {
            config.device = device;
        }
        if let Some(lang) = self.default_language {
            config.default_language = lang;
        }
        if !self.models.is_empty() {
            config.mode = RegistryMode::PerLanguage;
            config.models = self.models.into_iter().collect();
        }
        if let Some(model) = self.multilingual {
            config.mode = RegistryMode::Multilingual;
            config.multilingual_model = Some(model);
        }
        if !self.allow.is_empty() {
            config.allowed_languages = self.allow;
        }
        if self.max_concurrency.is_some() {
            config.max_concurrency = self.max_concurrency;
        }
        config.include_model |= self.include_model;
        if self.scratch_dir.is_some() {
            config.scratch_dir = self.scratch_dir;
        }
        if let Some(url) = self.engine_url {
            config.engine = EngineConfig::Http {
                url,
                voice: None,
                concurrency_safe: false,
            };
        }
        if let Some(program) = self.engine_program {
            if !matches!(config.engine, EngineConfig::Command { .. }) {
                config.engine = EngineConfig::default();
            }
            if let EngineConfig::Command { program: p, .. } = &mut config.engine {
                *p = program;
            }
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn job(text: String, language: Option<String>) -> serde_json::Value {
    let mut input = json!({ "text": text });
    if let Some(lang) = language {
        input["language"] = json!(lang);
    }
    json!({ "input": input })
}

fn write_audio(envelope: &ResponseEnvelope, out: &Path) -> anyhow::Result<()> {
    match envelope {
        ResponseEnvelope::Success { audio, .. } => {
            let bytes = decode_audio(audio).context("server returned invalid base64 audio")?;
            std::fs::write(out, &bytes).with_context(|| format!("writing {}", out.display()))?;
            eprintln!("wrote {} bytes to {}", bytes.len(), out.display());
            Ok(())
        }
        ResponseEnvelope::Failure { error } => bail!("{error}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    match cli.command {
        Command::Serve { port, host, worker } => {
            let config = worker.into_config()?;
            let worker = Worker::start(&config).await?;

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            info!(%addr, "voxroute listening");

            let ctrl_c = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            voxroute_lib::server::serve(listener, worker, ctrl_c)
                .await
                .context("server error")?;
        }

        Command::Run {
            text,
            language,
            out,
            worker,
        } => {
            let config = worker.into_config()?;
            let worker = Worker::start(&config).await?;
            let envelope = worker.dispatcher.handle(&job(text, language)).await;
            match out {
                Some(path) => write_audio(&envelope, &path)?,
                None => {
                    println!("{}", serde_json::to_string(&envelope)?);
                    if !envelope.is_success() {
                        std::process::exit(1);
                    }
                }
            }
        }

        Command::Speak {
            text,
            language,
            server,
            out,
        } => {
            let envelope: ResponseEnvelope = reqwest::Client::new()
                .post(format!("{}/runsync", server.trim_end_matches('/')))
                .json(&job(text, language))
                .send()
                .await
                .context("request failed")?
                .json()
                .await
                .context("server returned a malformed envelope")?;
            write_audio(&envelope, &out)?;
        }

        Command::Concurrency { current, worker } => {
            let config = worker.into_config()?;
            let admission = config.admission(config.device.resolve());
            let advice = ConcurrencyAdvice {
                current,
                recommended: admission.recommend_concurrency(current),
            };
            println!("{}", serde_json::to_string(&advice)?);
        }
    }

    Ok(())
}
