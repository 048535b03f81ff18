//! Cache key derivation.
//!
//! A key names one cache entry: `{voice}_{sha1(text)}.{format}`. Only the text is
//! hashed; voice and format are carried as literal filename components so keys
//! stay compatible with caches written by earlier versions of the tool.

use sha1::{Digest, Sha1};
use std::fmt;

/// Filename of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hex-encoded SHA-1 of the raw UTF-8 bytes of `text`.
pub fn text_digest(text: &str) -> String {
    let mut h = Sha1::new();
    h.update(text.as_bytes());
    format!("{:x}", h.finalize())
}

pub fn derive_key(text: &str, voice: &str, format: &str) -> CacheKey {
    CacheKey(format!("{}_{}.{}", voice, text_digest(text), format))
}
