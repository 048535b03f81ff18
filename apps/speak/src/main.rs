//! `speak`: text on stdin → cached 16 kHz mono WAV on stdout.
//!
//! Diagnostics go to stderr; stdout carries audio only.

mod config;

use speechcache_core::{Outcome, Pipeline, PipelineConfig, PollySynthesizer};
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, error};

#[tokio::main]
async fn main() -> ExitCode {
    // Logging / tracing (stderr only)
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,speechcache_core=info,speak=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .init();

    let cfg = config::load();
    debug!(target: "speak", voice = %cfg.voice, cache_dir = %cfg.cache_dir.display(), "Configuration loaded");

    match run(cfg).await {
        Ok(outcome) => {
            debug!(target: "speak", key = %outcome.key, hit = outcome.hit, bytes = outcome.bytes, "Done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(target: "speak", error = %e, "speak failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: PipelineConfig) -> speechcache_core::Result<Outcome> {
    let text = read_stdin().await?;

    let synth = PollySynthesizer::new(cfg.polly.clone());
    let pipeline = Pipeline::new(cfg, Arc::new(synth));

    let mut stdout = tokio::io::stdout();
    pipeline.run(&text, &mut stdout).await
}

async fn read_stdin() -> speechcache_core::Result<String> {
    let mut buf = Vec::new();
    tokio::io::stdin().read_to_end(&mut buf).await?;
    Ok(decode_input(&buf))
}

/// Stdin is taken as UTF-8; invalid sequences become U+FFFD.
fn decode_input(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
