//! Timed transcript spans produced by a transcription engine

use serde::{Deserialize, Serialize};

/// A single word with its position in the audio, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordSpan {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl WordSpan {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }
}

/// One decoded segment; words are in playback order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub words: Vec<WordSpan>,
}

impl Segment {
    /// Build a segment whose bounds are taken from its first and last word
    pub fn from_words(words: Vec<WordSpan>) -> Self {
        let start = words.first().map(|w| w.start).unwrap_or(0.0);
        let end = words.last().map(|w| w.end).unwrap_or(start);
        Self { start, end, words }
    }

    /// Move the segment and its words `offset` seconds later
    pub fn shifted(mut self, offset: f64) -> Self {
        self.start += offset;
        self.end += offset;
        for word in &mut self.words {
            word.start += offset;
            word.end += offset;
        }
        self
    }
}

/// Information about the whole input, known before segments are consumed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMetadata {
    /// Total audio duration in seconds
    pub duration: f64,
    /// Detected or forced language code
    pub language: Option<String>,
}
