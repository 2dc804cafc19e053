//! Transcription engine traits

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{Segment, TranscriptMetadata};

/// Lazy, finite, single-pass sequence of decoded segments
pub type SegmentStream = Box<dyn Iterator<Item = Result<Segment>> + Send>;

/// A transcription in progress
pub struct Transcript {
    pub metadata: TranscriptMetadata,
    pub segments: SegmentStream,
}

impl Transcript {
    pub fn new(metadata: TranscriptMetadata, segments: SegmentStream) -> Self {
        Self { metadata, segments }
    }
}

/// A loaded speech-to-text engine
///
/// Calls are blocking and stateless; the pipeline runs them on the
/// blocking thread pool.
pub trait TranscriptionEngine: Send + Sync {
    /// Transcribe normalized audio with word-level timestamps
    fn transcribe(&self, audio_path: &Path) -> Result<Transcript>;

    /// Engine name for logging
    fn name(&self) -> &str;
}

/// Builds the shared engine; invoked at most once per successful load
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn TranscriptionEngine>>;
}
