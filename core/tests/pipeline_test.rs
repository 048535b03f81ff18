//! Pipeline integration tests
//!
//! The synthesizer is faked and the converter is a plain passthrough (`cat`),
//! so these run without network access or ffmpeg.

#![cfg(unix)]

use async_trait::async_trait;
use speechcache_core::{
    derive_key, ConverterConfig, Pipeline, PipelineConfig, PollyConfig, SpeechCacheError,
    SpeechSynthesizer, SynthesisRequest, SynthesisResult,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::fs;

const FAKE_WAV: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt \x10\x00\x00\x00\x01\x00\x01\x00\x80\x3e\x00\x00";

struct FakeSynth {
    audio: Vec<u8>,
    calls: AtomicUsize,
    last_request: Mutex<Option<SynthesisRequest>>,
}

impl FakeSynth {
    fn returning(audio: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            audio: audio.to_vec(),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynth {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> speechcache_core::Result<SynthesisResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        Ok(SynthesisResult {
            audio: self.audio.clone(),
            content_type: Some("audio/mpeg".to_string()),
            request_characters: request.text.chars().count() as i32,
        })
    }
}

struct FailingSynth;

#[async_trait]
impl SpeechSynthesizer for FailingSynth {
    async fn synthesize(
        &self,
        _request: &SynthesisRequest,
    ) -> speechcache_core::Result<SynthesisResult> {
        Err(SpeechCacheError::Synthesis("service unavailable".to_string()))
    }
}

fn config(cache_dir: &Path, program: &str, args: &[&str]) -> PipelineConfig {
    PipelineConfig {
        voice: "Vicki".to_string(),
        output_format: "wav".to_string(),
        cache_dir: cache_dir.to_path_buf(),
        converter: ConverterConfig {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
        },
        polly: PollyConfig {
            region: None,
            engine: None,
        },
    }
}

fn create_temp_workspace() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

async fn file_names(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let mut rd = fs::read_dir(dir).await.unwrap();
    while let Some(entry) = rd.next_entry().await.unwrap() {
        names.push(entry.file_name().to_string_lossy().to_string());
    }
    names
}

#[tokio::test]
async fn test_miss_then_hit_returns_identical_bytes() {
    let workspace = create_temp_workspace();
    let cache_dir = workspace.path().join("cache");
    let synth = FakeSynth::returning(FAKE_WAV);
    let pipeline = Pipeline::new(config(&cache_dir, "cat", &[]), synth.clone());

    let mut first = Vec::new();
    let outcome = pipeline.run("Hello world", &mut first).await.unwrap();
    assert!(!outcome.hit);
    assert_eq!(
        outcome.key.as_str(),
        "Vicki_7b502c3a1f48c8609ae212cdfb639dee39673f5e.wav"
    );
    assert_eq!(outcome.path, cache_dir.join(outcome.key.as_str()));
    assert_eq!(outcome.bytes, FAKE_WAV.len() as u64);
    assert_eq!(first, FAKE_WAV);
    assert_eq!(synth.calls(), 1);

    let mut second = Vec::new();
    let outcome = pipeline.run("Hello world", &mut second).await.unwrap();
    assert!(outcome.hit);
    assert_eq!(second, first);
    assert_eq!(synth.calls(), 1);

    let on_disk = fs::read(&outcome.path).await.unwrap();
    assert_eq!(on_disk, first);
    assert_eq!(
        file_names(&cache_dir).await,
        vec!["Vicki_7b502c3a1f48c8609ae212cdfb639dee39673f5e.wav".to_string()]
    );
}

#[tokio::test]
async fn test_synthesis_request_uses_voice_and_mp3() {
    let workspace = create_temp_workspace();
    let synth = FakeSynth::returning(FAKE_WAV);
    let pipeline = Pipeline::new(config(workspace.path(), "cat", &[]), synth.clone());

    let text = "multi\nline ünïcode";
    let mut out = Vec::new();
    pipeline.run(text, &mut out).await.unwrap();

    let request = synth.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request.text, text);
    assert_eq!(request.voice, "Vicki");
    assert_eq!(request.format, "mp3");
}

#[tokio::test]
async fn test_existing_entry_is_passed_through_without_synthesis() {
    let workspace = create_temp_workspace();
    let cache_dir = workspace.path().join("cache");
    fs::create_dir_all(&cache_dir).await.unwrap();
    let key = derive_key("already here", "Vicki", "wav");
    fs::write(cache_dir.join(key.as_str()), b"not even audio")
        .await
        .unwrap();

    let synth = FakeSynth::returning(FAKE_WAV);
    let pipeline = Pipeline::new(config(&cache_dir, "cat", &[]), synth.clone());

    let mut out = Vec::new();
    let outcome = pipeline.run("already here", &mut out).await.unwrap();
    assert!(outcome.hit);
    assert_eq!(out, b"not even audio");
    assert_eq!(synth.calls(), 0);
}

#[tokio::test]
async fn test_different_text_gets_its_own_entry() {
    let workspace = create_temp_workspace();
    let synth = FakeSynth::returning(FAKE_WAV);
    let pipeline = Pipeline::new(config(workspace.path(), "cat", &[]), synth.clone());

    let mut out = Vec::new();
    let a = pipeline.run("first", &mut out).await.unwrap();
    let b = pipeline.run("second", &mut out).await.unwrap();

    assert_ne!(a.key, b.key);
    assert!(!a.hit && !b.hit);
    assert_eq!(synth.calls(), 2);
    assert_eq!(file_names(workspace.path()).await.len(), 2);
}

#[tokio::test]
async fn test_empty_input_touches_nothing() {
    let workspace = create_temp_workspace();
    let cache_dir = workspace.path().join("cache");
    let synth = FakeSynth::returning(FAKE_WAV);
    let pipeline = Pipeline::new(config(&cache_dir, "cat", &[]), synth.clone());

    let mut out = Vec::new();
    let err = pipeline.run("", &mut out).await.unwrap_err();
    assert!(matches!(err, SpeechCacheError::EmptyInput));
    assert!(out.is_empty());
    assert!(!cache_dir.exists());
    assert_eq!(synth.calls(), 0);
}

#[tokio::test]
async fn test_missing_audio_writes_no_entry() {
    let workspace = create_temp_workspace();
    let cache_dir = workspace.path().join("cache");
    let synth = FakeSynth::returning(&[]);
    let pipeline = Pipeline::new(config(&cache_dir, "cat", &[]), synth.clone());

    let mut out = Vec::new();
    let err = pipeline.run("Hello world", &mut out).await.unwrap_err();
    assert!(matches!(err, SpeechCacheError::MissingAudio));
    assert!(out.is_empty());
    assert!(!cache_dir.exists());
    assert_eq!(synth.calls(), 1);
}

#[tokio::test]
async fn test_synthesis_error_propagates() {
    let workspace = create_temp_workspace();
    let cache_dir = workspace.path().join("cache");
    let pipeline = Pipeline::new(config(&cache_dir, "cat", &[]), Arc::new(FailingSynth));

    let mut out = Vec::new();
    let err = pipeline.run("Hello world", &mut out).await.unwrap_err();
    match err {
        SpeechCacheError::Synthesis(msg) => assert!(msg.contains("service unavailable")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(out.is_empty());
    assert!(!cache_dir.exists());
}

#[tokio::test]
async fn test_failed_conversion_leaves_no_readable_entry() {
    let workspace = create_temp_workspace();
    let cache_dir = workspace.path().join("cache");
    let synth = FakeSynth::returning(FAKE_WAV);
    // Emits some output, then fails
    let pipeline = Pipeline::new(
        config(&cache_dir, "sh", &["-c", "cat; echo bad input >&2; exit 3"]),
        synth.clone(),
    );

    let mut out = Vec::new();
    let err = pipeline.run("Hello world", &mut out).await.unwrap_err();
    match err {
        SpeechCacheError::Conversion(msg) => assert!(msg.contains("bad input"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(out.is_empty());
    assert!(!pipeline.store().exists(&pipeline.key_for("Hello world")).await.unwrap());
    assert!(file_names(&cache_dir).await.is_empty());
}

#[tokio::test]
async fn test_missing_converter_is_reported() {
    let workspace = create_temp_workspace();
    let cache_dir = workspace.path().join("cache");
    let synth = FakeSynth::returning(FAKE_WAV);
    let pipeline = Pipeline::new(
        config(&cache_dir, "/nonexistent/ffmpeg", &[]),
        synth.clone(),
    );

    let mut out = Vec::new();
    let err = pipeline.run("Hello world", &mut out).await.unwrap_err();
    assert!(matches!(err, SpeechCacheError::ConverterUnavailable { .. }));
    assert!(out.is_empty());
    assert!(file_names(&cache_dir).await.is_empty());
}

#[tokio::test]
async fn test_empty_conversion_output_is_not_cached() {
    let workspace = create_temp_workspace();
    let cache_dir = workspace.path().join("cache");
    let synth = FakeSynth::returning(FAKE_WAV);
    let pipeline = Pipeline::new(
        config(&cache_dir, "sh", &["-c", "cat > /dev/null"]),
        synth.clone(),
    );

    let mut out = Vec::new();
    let err = pipeline.run("Hello world", &mut out).await.unwrap_err();
    assert!(matches!(err, SpeechCacheError::Conversion(_)));
    assert!(out.is_empty());
    assert!(file_names(&cache_dir).await.is_empty());
}
