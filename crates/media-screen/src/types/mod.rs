//! Core data types

pub mod job;
pub mod transcript;

pub use job::{Job, JobId, JobStats, JobStatus, ScanResult, TermMatch};
pub use transcript::{Segment, TranscriptMetadata, WordSpan};
