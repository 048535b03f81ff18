//! Read-or-populate pipeline.
//!
//! Per invocation, strictly in order:
//! 1. derive the key for `(text, voice, output_format)` and check the store
//! 2. on a miss: synthesize → convert → persist (temp file + rename)
//! 3. stream the cache entry to the caller
//!
//! Step 3 always reads the entry back from disk, on a miss as well as a hit,
//! so the caller receives exactly the bytes that are cached.

use crate::config::PipelineConfig;
use crate::convert::FormatConverter;
use crate::key::{derive_key, CacheKey};
use crate::store::CacheStore;
use crate::synth::{SpeechSynthesizer, SynthesisRequest, SOURCE_FORMAT};
use crate::{Result, SpeechCacheError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Result of one successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub key: CacheKey,
    pub path: PathBuf,
    /// True when the entry was already cached and no synthesis happened
    pub hit: bool,
    /// Bytes streamed to the output
    pub bytes: u64,
}

pub struct Pipeline {
    cfg: PipelineConfig,
    store: CacheStore,
    converter: FormatConverter,
    synth: Arc<dyn SpeechSynthesizer>,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig, synth: Arc<dyn SpeechSynthesizer>) -> Self {
        let store = CacheStore::new(cfg.cache_dir.clone());
        let converter = FormatConverter::new(cfg.converter.clone());
        Self {
            cfg,
            store,
            converter,
            synth,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn key_for(&self, text: &str) -> CacheKey {
        derive_key(text, &self.cfg.voice, &self.cfg.output_format)
    }

    /// Streams audio for `text` into `out`, synthesizing and caching it first
    /// if needed. Nothing is written to `out` unless the invocation succeeds.
    pub async fn run<W>(&self, text: &str, out: &mut W) -> Result<Outcome>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if text.is_empty() {
            return Err(SpeechCacheError::EmptyInput);
        }

        let key = self.key_for(text);
        let path = self.store.entry_path(&key);
        let hit = self.store.exists(&key).await?;

        if hit {
            info!(target: "pipeline", "Found cached file!");
            info!(target: "pipeline", path = %path.display(), "Cache file");
        } else {
            info!(target: "pipeline", voice = %self.cfg.voice, "No cached file found. Requesting speech data from Polly...");
            self.populate(text, &key).await?;
            info!(target: "pipeline", path = %path.display(), "Cache file");
        }

        let bytes = self.stream_entry(&key, out).await?;
        debug!(target: "pipeline", key = %key, hit, bytes, "Streamed cache entry");

        Ok(Outcome {
            key,
            path,
            hit,
            bytes,
        })
    }

    /// Miss path: synthesize, convert and commit the entry for `key`.
    async fn populate(&self, text: &str, key: &CacheKey) -> Result<PathBuf> {
        let request = SynthesisRequest {
            text: text.to_string(),
            voice: self.cfg.voice.clone(),
            format: SOURCE_FORMAT.to_string(),
        };
        let result = self.synth.synthesize(&request).await?;
        if result.audio.is_empty() {
            warn!(target: "pipeline", "Could not retrieve audio stream.");
            return Err(SpeechCacheError::MissingAudio);
        }

        self.store.ensure_root_exists().await?;

        let mut converted = self.converter.convert(result.audio)?;
        let mut writer = self.store.open_for_write(key).await?;
        tokio::io::copy(&mut converted, &mut writer).await?;
        converted.finish().await?;

        if writer.bytes_written() == 0 {
            return Err(SpeechCacheError::Conversion(format!(
                "{} produced no output",
                self.converter.config().program.display()
            )));
        }

        writer.commit().await
    }

    async fn stream_entry<W>(&self, key: &CacheKey, out: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut file = self.store.open_for_read(key).await?;
        let n = tokio::io::copy(&mut file, out).await?;
        out.flush().await?;
        Ok(n)
    }
}
