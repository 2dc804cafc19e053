//! Collaborator abstractions for conversion, transcription and term matching
//!
//! The pipeline only talks to these traits, so deployments can swap the
//! ffmpeg/whisper command-line backends for in-process ones.

pub mod converter;
pub mod lexicon;
pub mod transcription;
pub mod whisper_cli;

pub use converter::{FfmpegConverter, FormatConverter};
pub use lexicon::{Lexicon, TermMatcher};
pub use transcription::{EngineFactory, SegmentStream, Transcript, TranscriptionEngine};
pub use whisper_cli::{WhisperCliEngine, WhisperCliFactory};
