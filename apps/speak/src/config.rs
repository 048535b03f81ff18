use std::fs;
use std::path::{Path, PathBuf};

use speechcache_core::PipelineConfig;

/// Load configuration from a TOML file (path via SPEECHCACHE_CONFIG or ./speechcache.toml),
/// overlaying values onto env-driven defaults.
pub fn load() -> PipelineConfig {
    let default = PipelineConfig::default();
    let path = std::env::var("SPEECHCACHE_CONFIG").unwrap_or_else(|_| "speechcache.toml".into());
    load_from(Path::new(&path), default)
}

fn load_from(p: &Path, default: PipelineConfig) -> PipelineConfig {
    if !p.exists() {
        tracing::debug!(target: "speak", path = %p.display(), "No TOML config found; using defaults/env");
        return default;
    }
    match fs::read_to_string(p) {
        Ok(s) => match toml::from_str::<SpeakToml>(&s) {
            Ok(t) => t.overlay(default),
            Err(e) => {
                tracing::warn!(target: "speak", error = %e, "Failed to parse TOML; using defaults");
                default
            }
        },
        Err(e) => {
            tracing::warn!(target: "speak", error = %e, "Failed to read TOML; using defaults");
            default
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct SpeakToml {
    pub voice: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub converter: Option<ConverterToml>,
    pub polly: Option<PollyToml>,
}

impl SpeakToml {
    fn overlay(self, mut base: PipelineConfig) -> PipelineConfig {
        if let Some(v) = self.voice.filter(|v| !v.is_empty()) {
            base.voice = v;
        }
        if let Some(d) = self.cache_dir {
            base.cache_dir = d;
        }
        if let Some(c) = self.converter {
            if let Some(p) = c.program {
                base.converter.program = p;
            }
            if let Some(a) = c.args {
                base.converter.args = a;
            }
        }
        if let Some(p) = self.polly {
            if p.region.is_some() {
                base.polly.region = p.region;
            }
            if p.engine.is_some() {
                base.polly.engine = p.engine;
            }
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ConverterToml {
    pub program: Option<PathBuf>,
    pub args: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct PollyToml {
    pub region: Option<String>,
    pub engine: Option<String>,
}
