//! Whisper command-line backend
//!
//! The normalized input is split into fixed-length chunks with ffmpeg. The
//! segment stream runs whisper on one chunk at a time, only when the consumer
//! asks for more segments, and shifts the timings by the chunk's offset in
//! the full recording.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Instant;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tempfile::TempDir;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::types::{Segment, TranscriptMetadata, WordSpan};

use super::transcription::{EngineFactory, Transcript, TranscriptionEngine};

const CHUNK_PREFIX: &str = "chunk_";

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    #[serde(default)]
    words: Vec<WhisperWord>,
}

#[derive(Debug, Deserialize)]
struct WhisperWord {
    word: String,
    start: f64,
    end: f64,
}

impl From<WhisperSegment> for Segment {
    fn from(seg: WhisperSegment) -> Self {
        Segment {
            start: seg.start,
            end: seg.end,
            words: seg
                .words
                .into_iter()
                .map(|w| WordSpan::new(w.word, w.start, w.end))
                .collect(),
        }
    }
}

/// Builds the whisper engine after a warm-up run.
///
/// The warm-up transcribes a second of generated silence, which fetches and
/// caches the model weights and fails fast on a bad model name or device.
pub struct WhisperCliFactory {
    config: EngineConfig,
    ffmpeg_path: String,
}

impl WhisperCliFactory {
    pub fn new(config: EngineConfig, ffmpeg_path: impl Into<String>) -> Self {
        Self {
            config,
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

#[async_trait]
impl EngineFactory for WhisperCliFactory {
    async fn load(&self) -> Result<Arc<dyn TranscriptionEngine>> {
        tracing::info!(
            "Loading whisper engine (command: {}, model: {}, device: {})",
            self.config.command,
            self.config.model,
            self.config.device
        );
        let started = Instant::now();

        let engine = WhisperCliEngine {
            config: self.config.clone(),
            ffmpeg_path: self.ffmpeg_path.clone(),
        };
        let warm = engine.clone();
        tokio::task::spawn_blocking(move || warm.warm_up())
            .await
            .map_err(|e| Error::engine_load(format!("warm-up task failed: {}", e)))?
            .map_err(|e| match e {
                Error::Engine(message) => Error::engine_load(message),
                other => Error::engine_load(other.to_string()),
            })?;

        tracing::info!(
            "Whisper model '{}' warmed up in {:.1}s",
            self.config.model,
            started.elapsed().as_secs_f64()
        );
        Ok(Arc::new(engine))
    }
}

/// Whisper CLI engine
#[derive(Clone)]
pub struct WhisperCliEngine {
    config: EngineConfig,
    ffmpeg_path: String,
}

impl WhisperCliEngine {
    fn warm_up(&self) -> Result<()> {
        let dir = tempfile::Builder::new()
            .prefix("media-screen-warmup-")
            .tempdir()?;
        let silence = dir.path().join("silence.wav");

        let status = Command::new(&self.ffmpeg_path)
            .args(["-y", "-f", "lavfi", "-i", "anullsrc=r=16000:cl=mono", "-t", "1"])
            .arg(&silence)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| Error::engine(format!("cannot run {}: {}", self.ffmpeg_path, e)))?;
        if !status.success() {
            return Err(Error::engine(format!(
                "{} could not render warm-up audio ({})",
                self.ffmpeg_path, status
            )));
        }

        run_whisper(&self.config, &silence).map(|_| ())
    }

    /// Split `audio_path` into chunks under `workdir`, with running offsets
    fn split(&self, audio_path: &Path, workdir: &Path) -> Result<VecDeque<AudioChunk>> {
        let pattern = workdir.join(format!("{}%04d.wav", CHUNK_PREFIX));
        let chunk_secs = self.config.chunk_secs.to_string();

        let status = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(audio_path)
            .args(["-f", "segment", "-segment_time", &chunk_secs, "-c", "copy"])
            .arg(&pattern)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| Error::engine(format!("cannot run {}: {}", self.ffmpeg_path, e)))?;
        if !status.success() {
            return Err(Error::engine(format!(
                "splitting audio failed: {} exited with {}",
                self.ffmpeg_path, status
            )));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(workdir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(CHUNK_PREFIX) && n.ends_with(".wav"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut offset = 0.0;
        let mut chunks = VecDeque::with_capacity(paths.len());
        for path in paths {
            let length = wav_duration(&path)?;
            chunks.push_back(AudioChunk { path, offset });
            offset += length;
        }
        Ok(chunks)
    }
}

impl TranscriptionEngine for WhisperCliEngine {
    fn transcribe(&self, audio_path: &Path) -> Result<Transcript> {
        let duration = wav_duration(audio_path)?;
        let workdir = tempfile::Builder::new()
            .prefix("media-screen-chunks-")
            .tempdir()?;
        let chunks = self.split(audio_path, workdir.path())?;
        tracing::debug!(
            "Split {:.1}s of audio into {} chunks of {}s",
            duration,
            chunks.len(),
            self.config.chunk_secs
        );

        let config = self.config.clone();
        let segments = ChunkedSegments::new(
            chunks,
            move |chunk: &Path| run_whisper(&config, chunk),
            Some(workdir),
        );

        Ok(Transcript::new(
            TranscriptMetadata {
                duration,
                language: self.config.language.clone(),
            },
            Box::new(segments),
        ))
    }

    fn name(&self) -> &str {
        "whisper-cli"
    }
}

/// One piece of the split input and where it starts in the full recording
struct AudioChunk {
    path: PathBuf,
    offset: f64,
}

/// Segment iterator that transcribes the next chunk only once the segments
/// of the previous one are consumed. The first error ends the stream.
struct ChunkedSegments<F> {
    chunks: VecDeque<AudioChunk>,
    pending: VecDeque<Segment>,
    transcribe_chunk: F,
    // Chunk files live here until the stream is dropped
    _workdir: Option<TempDir>,
}

impl<F> ChunkedSegments<F>
where
    F: FnMut(&Path) -> Result<Vec<Segment>>,
{
    fn new(chunks: VecDeque<AudioChunk>, transcribe_chunk: F, workdir: Option<TempDir>) -> Self {
        Self {
            chunks,
            pending: VecDeque::new(),
            transcribe_chunk,
            _workdir: workdir,
        }
    }
}

impl<F> Iterator for ChunkedSegments<F>
where
    F: FnMut(&Path) -> Result<Vec<Segment>>,
{
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(segment) = self.pending.pop_front() {
                return Some(Ok(segment));
            }

            let chunk = self.chunks.pop_front()?;
            tracing::debug!("Transcribing chunk at {:.1}s", chunk.offset);
            let transcribed = (self.transcribe_chunk)(&chunk.path);

            if let Err(e) = std::fs::remove_file(&chunk.path) {
                tracing::debug!("Could not remove chunk {}: {}", chunk.path.display(), e);
            }

            match transcribed {
                Ok(segments) => self
                    .pending
                    .extend(segments.into_iter().map(|s| s.shifted(chunk.offset))),
                Err(e) => {
                    self.chunks.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Run whisper on one file and return its segments with word timings
fn run_whisper(config: &EngineConfig, audio_path: &Path) -> Result<Vec<Segment>> {
    let out_dir = tempfile::Builder::new()
        .prefix("media-screen-whisper-")
        .tempdir()?;

    let mut command = Command::new(&config.command);
    command
        .arg(audio_path)
        .args(["--model", &config.model])
        .args(["--device", &config.device])
        .args(["--word_timestamps", "True"])
        .args(["--output_format", "json"])
        .args(["--verbose", "False"])
        .arg("--output_dir")
        .arg(out_dir.path());
    if let Some(language) = &config.language {
        command.args(["--language", language]);
    }

    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| Error::engine(format!("cannot run {}: {}", config.command, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::engine(format!(
            "whisper exited with {}: {}",
            output.status,
            stderr.lines().last().unwrap_or("")
        )));
    }

    let stem = audio_path
        .file_stem()
        .ok_or_else(|| Error::engine("audio path has no file name"))?;
    // whisper keeps inner dots: `a.mp3.wav` -> `a.mp3.json`
    let mut json_name = stem.to_os_string();
    json_name.push(".json");
    let json_path = out_dir.path().join(json_name);
    let content = std::fs::read_to_string(&json_path).map_err(|e| {
        Error::engine(format!("missing whisper output {}: {}", json_path.display(), e))
    })?;

    parse_segments(&content)
}

fn parse_segments(content: &str) -> Result<Vec<Segment>> {
    let output: WhisperOutput = serde_json::from_str(content)
        .map_err(|e| Error::engine(format!("unreadable whisper output: {}", e)))?;
    Ok(output.segments.into_iter().map(Segment::from).collect())
}

/// Length of a WAV file in seconds, read from its header
fn wav_duration(path: &Path) -> Result<f64> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    hint.with_extension("wav");

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::engine(format!("unreadable audio {}: {}", path.display(), e)))?;
    let track = probed
        .format
        .default_track()
        .ok_or_else(|| Error::engine(format!("no audio track in {}", path.display())))?;

    match (track.codec_params.n_frames, track.codec_params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => Ok(frames as f64 / f64::from(rate)),
        _ => Err(Error::engine(format!(
            "cannot determine duration of {}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{scan_segments, Deadline};
    use crate::providers::{Lexicon, SegmentStream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn fake_chunks(count: usize, length: f64) -> VecDeque<AudioChunk> {
        (0..count)
            .map(|i| AudioChunk {
                path: PathBuf::from(format!("/nonexistent/{CHUNK_PREFIX}{i:04}.wav")),
                offset: i as f64 * length,
            })
            .collect()
    }

    fn counting_transcriber(
        calls: Arc<AtomicUsize>,
    ) -> impl FnMut(&Path) -> Result<Vec<Segment>> + Send + 'static {
        move |_chunk: &Path| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Segment::from_words(vec![WordSpan::new(" damn", 1.0, 1.5)])])
        }
    }

    /// 16-bit mono PCM WAV of silence
    fn write_wav(path: &Path, sample_rate: u32, samples: u32) {
        let data_len = samples * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(44 + data_len as usize, 0);
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_parse_segments() {
        let json = r#"{
            "text": " hello there",
            "language": "en",
            "segments": [
                {"id": 0, "start": 0.0, "end": 1.0, "text": " hello",
                 "words": [{"word": " hello", "start": 0.0, "end": 0.5, "probability": 0.9}]},
                {"id": 1, "start": 1.0, "end": 2.5, "text": " there"}
            ]
        }"#;

        let segments = parse_segments(json).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].words, vec![WordSpan::new(" hello", 0.0, 0.5)]);
        assert_eq!(segments[1].end, 2.5);
        assert!(segments[1].words.is_empty());
    }

    #[test]
    fn test_parse_segments_rejects_garbage() {
        let err = parse_segments("not json").unwrap_err();
        assert!(matches!(err, Error::Engine(_)));
    }

    #[test]
    fn test_chunks_transcribed_only_when_pulled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut segments = ChunkedSegments::new(
            fake_chunks(3, 60.0),
            counting_transcriber(Arc::clone(&calls)),
            None,
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let first = segments.next().unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.words[0].start, 1.0);

        let second = segments.next().unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(second.start, 61.0);
        assert_eq!(second.words[0].end, 61.5);

        drop(segments);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_chunk_error_ends_stream() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut segments = ChunkedSegments::new(
            fake_chunks(3, 60.0),
            move |_chunk: &Path| {
                if counter.fetch_add(1, Ordering::SeqCst) == 1 {
                    Err(Error::engine("decoder crashed"))
                } else {
                    Ok(Vec::new())
                }
            },
            None,
        );

        assert!(matches!(segments.next(), Some(Err(Error::Engine(_)))));
        assert!(segments.next().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_expired_deadline_skips_chunk_work() {
        let calls = Arc::new(AtomicUsize::new(0));
        let segments: SegmentStream = Box::new(ChunkedSegments::new(
            fake_chunks(4, 60.0),
            counting_transcriber(Arc::clone(&calls)),
            None,
        ));
        let expired = Deadline::start(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));

        let metadata = TranscriptMetadata {
            duration: 240.0,
            language: None,
        };
        let err = scan_segments(segments, &metadata, &Lexicon::builtin(), &expired, 1, |_| {})
            .unwrap_err();

        assert!(matches!(err, Error::TimeoutExceeded));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wav_duration_from_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("half-second.wav");
        write_wav(&path, 16_000, 8_000);

        let duration = wav_duration(&path).unwrap();
        assert!((duration - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_wav_duration_rejects_non_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.wav");
        std::fs::write(&path, b"plain text, not audio").unwrap();

        assert!(matches!(wav_duration(&path), Err(Error::Engine(_))));
    }

    #[tokio::test]
    async fn test_missing_tools_fail_load() {
        let factory = WhisperCliFactory::new(
            EngineConfig {
                command: "/nonexistent/whisper-binary".to_string(),
                ..Default::default()
            },
            "/nonexistent/ffmpeg-binary",
        );
        let err = factory.load().await.err().unwrap();
        assert!(matches!(err, Error::EngineLoad(_)));
    }
}
