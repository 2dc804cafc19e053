//! media-screen: asynchronous screening of uploaded audio for disallowed terms
//!
//! Uploads are admitted as jobs, normalized to mono 16 kHz audio, transcribed
//! with word-level timestamps by a lazily loaded shared engine, and scanned
//! against a term lexicon. Clients poll job status until a result with the
//! timing of every match (or a failure cause) is available.

pub mod config;
pub mod error;
pub mod processing;
pub mod providers;
pub mod server;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::ScreenConfig;
pub use error::{Error, Result};
pub use processing::{Dispatcher, EngineLoader, JobStore, ProcessingPipeline};
pub use types::{Job, JobId, JobStatus, ScanResult, TermMatch};
