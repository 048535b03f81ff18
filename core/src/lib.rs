// Speechcache Core Library
// Content-addressed text-to-speech cache: key derivation, cache store,
// synthesis client, format conversion and the pipeline tying them together.

pub mod config;
pub mod convert;
pub mod key;
pub mod pipeline;
pub mod store;
pub mod synth;

// Export core types
pub use config::{ConverterConfig, PipelineConfig, PollyConfig};
pub use convert::{ConvertedAudio, FormatConverter};
pub use key::{derive_key, CacheKey};
pub use pipeline::{Outcome, Pipeline};
pub use store::{CacheStore, EntryWriter};
pub use synth::{PollySynthesizer, SpeechSynthesizer, SynthesisRequest, SynthesisResult};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeechCacheError {
    #[error("Expected text on stdin")]
    EmptyInput,

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Could not retrieve audio stream from synthesis provider")]
    MissingAudio,

    #[error("Converter '{program}' could not be started: {source}")]
    ConverterUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SpeechCacheError>;
