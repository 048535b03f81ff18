//! Process-wide settings, resolved once at startup and passed explicitly into
//! the pipeline.
//!
//! Env overrides:
//! - SPEECHCACHE_VOICE, SPEECHCACHE_CACHE_DIR
//! - FFMPEG_BIN
//! - POLLY_REGION, POLLY_ENGINE

use std::path::PathBuf;

pub const DEFAULT_VOICE: &str = "Vicki";
pub const OUTPUT_FORMAT: &str = "wav";

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Voice identifier sent to the provider and used as the key prefix
    pub voice: String,
    /// Extension of cache entries; also the format streamed to the caller
    pub output_format: String,
    /// Flat directory holding every cache entry
    pub cache_dir: PathBuf,
    pub converter: ConverterConfig,
    pub polly: PollyConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let voice = env_non_empty("SPEECHCACHE_VOICE").unwrap_or_else(|| DEFAULT_VOICE.to_string());
        let cache_dir = env_non_empty("SPEECHCACHE_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_dir);

        Self {
            voice,
            output_format: OUTPUT_FORMAT.to_string(),
            cache_dir,
            converter: ConverterConfig::default(),
            polly: PollyConfig::default(),
        }
    }
}

/// `<system temp>/speechcache/cache`
pub fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("speechcache").join("cache")
}

/// External transcoder invocation. The default reads MP3 on stdin and writes
/// 16 kHz mono signed 16-bit little-endian WAV on stdout.
#[derive(Clone, Debug)]
pub struct ConverterConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ConverterConfig {
    pub fn ffmpeg(program: impl Into<PathBuf>) -> Self {
        let args = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "mp3",
            "-i",
            "-",
            "-f",
            "wav",
            "-ac",
            "1",
            "-ar",
            "16k",
            "-c:a",
            "pcm_s16le",
            "-",
        ];
        Self {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        let program = env_non_empty("FFMPEG_BIN").unwrap_or_else(|| "ffmpeg".to_string());
        Self::ffmpeg(program)
    }
}

#[derive(Clone, Debug)]
pub struct PollyConfig {
    /// Region override; `None` uses the AWS default provider chain
    pub region: Option<String>,
    /// Engine name (`standard`, `neural`, ...); `None` lets Polly pick
    pub engine: Option<String>,
}

impl Default for PollyConfig {
    fn default() -> Self {
        Self {
            region: env_non_empty("POLLY_REGION"),
            engine: env_non_empty("POLLY_ENGINE"),
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}
