//! Test doubles shared by unit tests

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::processing::JobInput;
use crate::providers::{
    EngineFactory, FormatConverter, SegmentStream, Transcript, TranscriptionEngine,
};
use crate::types::{Segment, TranscriptMetadata};

/// Engine that replays fixed segments, optionally slowly
#[derive(Clone)]
pub struct ScriptedEngine {
    segments: Vec<Segment>,
    duration: f64,
    segment_delay: Duration,
    failure: Option<String>,
}

impl ScriptedEngine {
    pub fn new(segments: Vec<Segment>, duration: f64) -> Self {
        Self {
            segments,
            duration,
            segment_delay: Duration::ZERO,
            failure: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), 0.0)
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::empty()
        }
    }

    pub fn with_segment_delay(mut self, delay: Duration) -> Self {
        self.segment_delay = delay;
        self
    }
}

impl TranscriptionEngine for ScriptedEngine {
    fn transcribe(&self, _audio_path: &Path) -> Result<Transcript> {
        if let Some(message) = &self.failure {
            return Err(Error::engine(message.clone()));
        }

        let delay = self.segment_delay;
        let segments: SegmentStream = Box::new(self.segments.clone().into_iter().map(move |s| {
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            Ok(s)
        }));

        Ok(Transcript::new(
            TranscriptMetadata {
                duration: self.duration,
                language: Some("en".to_string()),
            },
            segments,
        ))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Factory counting how many constructions were attempted
pub struct CountingFactory {
    engine: Arc<ScriptedEngine>,
    delay: Duration,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
}

impl CountingFactory {
    pub fn new(engine: ScriptedEngine, delay: Duration) -> Self {
        Self {
            engine: Arc::new(engine),
            delay,
            failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail the first `n` constructions
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn constructions(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineFactory for CountingFactory {
    async fn load(&self) -> Result<Arc<dyn TranscriptionEngine>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(Error::engine_load("model file is corrupt"));
        }

        let engine: Arc<dyn TranscriptionEngine> = self.engine.clone();
        Ok(engine)
    }
}

/// Converter that copies the input to `<input>.wav`
pub struct PassThroughConverter;

impl PassThroughConverter {
    pub fn output_for(input: &Path) -> PathBuf {
        let mut name = input.as_os_str().to_owned();
        name.push(".wav");
        PathBuf::from(name)
    }
}

#[async_trait]
impl FormatConverter for PassThroughConverter {
    async fn convert(&self, input: &Path) -> Result<PathBuf> {
        let output = Self::output_for(input);
        tokio::fs::copy(input, &output).await?;
        Ok(output)
    }
}

/// Converter whose external process always exits non-zero
pub struct FailingConverter;

#[async_trait]
impl FormatConverter for FailingConverter {
    async fn convert(&self, _input: &Path) -> Result<PathBuf> {
        Err(Error::conversion("ffmpeg exited with 1"))
    }
}

/// Stage a small upload on disk, returning the input and its path
pub fn staged_upload(filename: &str) -> (JobInput, PathBuf) {
    let suffix = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    let mut file = tempfile::Builder::new()
        .prefix("media-screen-test-")
        .suffix(&suffix)
        .tempfile()
        .unwrap();
    file.write_all(b"RIFF\0\0\0\0WAVEfmt ").unwrap();

    let upload = file.into_temp_path();
    let path = upload.to_path_buf();
    (
        JobInput {
            filename: filename.to_string(),
            upload,
        },
        path,
    )
}
