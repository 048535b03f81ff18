//! Speech synthesis boundary.
//!
//! The pipeline only sees [`SpeechSynthesizer`]; [`PollySynthesizer`] is the
//! production implementation backed by Amazon Polly's SynthesizeSpeech API.
//! Credentials come from the AWS default provider chain (env vars, shared
//! credentials file, instance profile).

use crate::config::PollyConfig;
use crate::{Result, SpeechCacheError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_polly::config::Region;
use aws_sdk_polly::error::DisplayErrorContext;
use aws_sdk_polly::types::{Engine, OutputFormat, VoiceId};
use aws_sdk_polly::Client;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Format requested from the provider before conversion.
pub const SOURCE_FORMAT: &str = "mp3";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    /// Encoding the provider should return, e.g. `mp3`
    pub format: String,
}

#[derive(Clone, Debug, Default)]
pub struct SynthesisResult {
    /// Encoded audio; empty when the provider returned no payload
    pub audio: Vec<u8>,
    pub content_type: Option<String>,
    pub request_characters: i32,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisResult>;
}

/// Polly client. Shared AWS config (credentials, region) is only loaded on
/// the first `synthesize` call, so cache hits never touch the network.
pub struct PollySynthesizer {
    cfg: PollyConfig,
    client: OnceCell<Client>,
}

impl PollySynthesizer {
    pub fn new(cfg: PollyConfig) -> Self {
        Self {
            cfg,
            client: OnceCell::new(),
        }
    }

    /// Uses an already built client instead of loading AWS config.
    pub fn with_client(client: Client, cfg: PollyConfig) -> Self {
        Self {
            cfg,
            client: OnceCell::new_with(Some(client)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.initialized()
    }

    async fn client(&self) -> &Client {
        self.client
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest());
                if let Some(region) = &self.cfg.region {
                    loader = loader.region(Region::new(region.clone()));
                }
                let sdk_config = loader.load().await;
                debug!(target: "synth", region = ?sdk_config.region(), "Loaded AWS config");
                Client::new(&sdk_config)
            })
            .await
    }
}

#[async_trait]
impl SpeechSynthesizer for PollySynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisResult> {
        debug!(
            target: "synth",
            voice = %request.voice,
            format = %request.format,
            chars = request.text.chars().count(),
            "Requesting speech from Polly"
        );

        let mut call = self
            .client()
            .await
            .synthesize_speech()
            .output_format(OutputFormat::from(request.format.as_str()))
            .text(request.text.clone())
            .voice_id(VoiceId::from(request.voice.as_str()));
        if let Some(engine) = self.cfg.engine.as_deref() {
            call = call.engine(Engine::from(engine));
        }

        let output = call.send().await.map_err(|e| {
            let ctx = DisplayErrorContext(&e).to_string();
            warn!(target: "synth", error = %ctx, "Polly request failed");
            SpeechCacheError::Synthesis(ctx)
        })?;

        let content_type = output.content_type().map(str::to_string);
        let request_characters = output.request_characters();
        let audio = output
            .audio_stream
            .collect()
            .await
            .map_err(|e| {
                warn!(target: "synth", error = %e, "Failed to read Polly audio stream");
                SpeechCacheError::Synthesis(format!("Failed to read audio stream: {}", e))
            })?
            .into_bytes()
            .to_vec();

        debug!(
            target: "synth",
            bytes = audio.len(),
            content_type = ?content_type,
            request_characters,
            "Polly response received"
        );

        Ok(SynthesisResult {
            audio,
            content_type,
            request_characters,
        })
    }
}
