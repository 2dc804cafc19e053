//! Staged processing of one job
//!
//! Stages run in order (normalize, acquire engine, transcribe, scan,
//! finalize), each recording its progress and message before it starts. A
//! single wall-clock deadline covers the whole run and is checked between
//! stages and every `scan_check_interval` segments. The check is cooperative:
//! an engine call that is already running is never interrupted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempPath;

use crate::error::{Error, Result};
use crate::providers::{FormatConverter, SegmentStream, TermMatcher, TranscriptionEngine};
use crate::types::{job::round2, Job, JobId, ScanResult, TermMatch, TranscriptMetadata};

use super::{EngineLoader, JobStore};

const SCAN_START_PROGRESS: u8 = 70;
const SCAN_END_PROGRESS: u8 = 95;

/// Wall-clock budget for one job
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_exceeded(&self) -> bool {
        self.elapsed() > self.limit
    }

    pub fn check(&self) -> Result<()> {
        if self.is_exceeded() {
            Err(Error::TimeoutExceeded)
        } else {
            Ok(())
        }
    }
}

/// An upload handed to the pipeline; the pipeline owns and deletes it
pub struct JobInput {
    pub filename: String,
    pub upload: TempPath,
}

/// Files created for one job, deleted once when the job ends
struct StagedFiles {
    upload: TempPath,
    normalized: Option<PathBuf>,
}

impl StagedFiles {
    async fn release(self, job_id: JobId) {
        let upload_path = self.upload.to_path_buf();
        if let Err(e) = self.upload.close() {
            tracing::warn!("[{}] Failed to delete upload {}: {}", job_id, upload_path.display(), e);
        }

        if let Some(path) = self.normalized {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!("[{}] Failed to delete {}: {}", job_id, path.display(), e);
            }
        }
    }
}

/// Apply a job transition, treating a missing record as a no-op.
///
/// The record may be deleted while the pipeline is still running; later
/// writes must not recreate it.
fn record<F>(store: &JobStore, job_id: JobId, mutate: F)
where
    F: FnOnce(&mut Job) -> Result<()>,
{
    match store.update(job_id, mutate) {
        Ok(()) => {}
        Err(Error::JobNotFound(_)) => {
            tracing::debug!("[{}] Job no longer tracked, dropping update", job_id);
        }
        Err(e) => {
            tracing::warn!("[{}] Rejected job update: {}", job_id, e);
        }
    }
}

/// Scan progress derived from how far into the audio a segment ends
fn scan_progress(segment_end: f64, duration: f64) -> u8 {
    if duration <= 0.0 || !segment_end.is_finite() {
        return SCAN_START_PROGRESS;
    }
    let span = f64::from(SCAN_END_PROGRESS - SCAN_START_PROGRESS);
    let fraction = (segment_end / duration).clamp(0.0, 1.0);
    SCAN_START_PROGRESS + (fraction * span) as u8
}

/// Walk the segment stream and collect disallowed-term matches in order.
///
/// Every `check_interval` segments the deadline is checked before the next
/// segment is pulled, and `on_progress` receives a value in `70..=95`.
pub fn scan_segments<P>(
    mut segments: SegmentStream,
    metadata: &TranscriptMetadata,
    matcher: &dyn TermMatcher,
    deadline: &Deadline,
    check_interval: usize,
    mut on_progress: P,
) -> Result<Vec<TermMatch>>
where
    P: FnMut(u8),
{
    let check_interval = check_interval.max(1);
    let mut matches = Vec::new();

    for idx in 0.. {
        // Pulling may run the engine
        if idx % check_interval == 0 {
            deadline.check()?;
        }

        let segment = match segments.next() {
            Some(segment) => segment.map_err(into_engine_error)?,
            None => break,
        };

        if idx % check_interval == 0 {
            on_progress(scan_progress(segment.end, metadata.duration));
        }

        for word in &segment.words {
            let term = word.text.trim();
            if term.is_empty() {
                continue;
            }
            if matcher.is_match(term) {
                matches.push(TermMatch {
                    term: term.to_string(),
                    start: round2(word.start),
                    end: round2(word.end),
                });
            }
        }
    }

    Ok(matches)
}

fn into_engine_error(err: Error) -> Error {
    match err {
        Error::Engine(_) | Error::TimeoutExceeded => err,
        other => Error::engine(other.to_string()),
    }
}

fn into_conversion_error(err: Error) -> Error {
    match err {
        Error::Conversion(_) => err,
        other => Error::conversion(other.to_string()),
    }
}

/// Drives queued jobs through every stage to a terminal state
pub struct ProcessingPipeline {
    store: Arc<JobStore>,
    loader: Arc<EngineLoader>,
    converter: Arc<dyn FormatConverter>,
    matcher: Arc<dyn TermMatcher>,
    deadline: Duration,
    scan_check_interval: usize,
}

impl ProcessingPipeline {
    pub fn new(
        store: Arc<JobStore>,
        loader: Arc<EngineLoader>,
        converter: Arc<dyn FormatConverter>,
        matcher: Arc<dyn TermMatcher>,
        deadline: Duration,
        scan_check_interval: usize,
    ) -> Self {
        tracing::info!(
            "Pipeline configured: {}s deadline, checks every {} segments",
            deadline.as_secs(),
            scan_check_interval
        );

        Self {
            store,
            loader,
            converter,
            matcher,
            deadline,
            scan_check_interval: scan_check_interval.max(1),
        }
    }

    /// Process one job to completion or failure, then release its files
    pub async fn run(&self, job_id: JobId, input: JobInput) {
        let deadline = Deadline::start(self.deadline);
        tracing::info!("[{}] Processing '{}'", job_id, input.filename);

        let mut staged = StagedFiles {
            upload: input.upload,
            normalized: None,
        };

        match self.execute(job_id, &deadline, &mut staged).await {
            Ok(result) => {
                tracing::info!(
                    "[{}] COMPLETE in {:.2}s: {} matches",
                    job_id,
                    result.elapsed_time,
                    result.match_count
                );
                record(&self.store, job_id, |job| job.complete(result));
            }
            Err(e) => {
                tracing::error!(
                    "[{}] Failed after {:.1}s: {}",
                    job_id,
                    deadline.elapsed().as_secs_f64(),
                    e
                );
                let cause = e.to_string();
                record(&self.store, job_id, |job| job.fail(cause));
            }
        }

        staged.release(job_id).await;
    }

    async fn execute(
        &self,
        job_id: JobId,
        deadline: &Deadline,
        staged: &mut StagedFiles,
    ) -> Result<ScanResult> {
        // Stage 1: normalize
        record(&self.store, job_id, |job| job.advance(10, "Preparing audio..."));
        let upload_path = staged.upload.to_path_buf();
        let audio_path = if self.converter.needs_conversion(&upload_path) {
            record(&self.store, job_id, |job| job.advance(20, "Converting audio..."));
            tracing::info!("[{}] Converting audio...", job_id);
            let converted = self
                .converter
                .convert(&upload_path)
                .await
                .map_err(into_conversion_error)?;
            staged.normalized = Some(converted.clone());
            converted
        } else {
            upload_path
        };
        deadline.check()?;

        // Stage 2: acquire engine
        record(&self.store, job_id, |job| job.advance(30, "Loading AI model..."));
        let engine = self.loader.acquire().await?;
        deadline.check()?;

        // Stages 3 and 4 block on the engine, so they run off the async workers
        record(&self.store, job_id, |job| job.advance(40, "Transcribing audio..."));
        tracing::info!("[{}] Transcribing with {}...", job_id, engine.name());

        let store = Arc::clone(&self.store);
        let matcher = Arc::clone(&self.matcher);
        let interval = self.scan_check_interval;
        let deadline_copy = *deadline;

        let matches = tokio::task::spawn_blocking(move || {
            transcribe_and_scan(
                engine.as_ref(),
                &audio_path,
                matcher.as_ref(),
                &deadline_copy,
                interval,
                |progress, message| {
                    record(&store, job_id, |job| match message {
                        Some(message) => job.advance(progress, message),
                        None => job.report_progress(progress),
                    })
                },
            )
        })
        .await
        .map_err(|e| Error::internal(format!("scan task failed: {}", e)))??;

        // Stage 5: finalize
        Ok(ScanResult::new(matches, deadline.elapsed()))
    }
}

fn transcribe_and_scan<R>(
    engine: &dyn TranscriptionEngine,
    audio_path: &Path,
    matcher: &dyn TermMatcher,
    deadline: &Deadline,
    check_interval: usize,
    mut report: R,
) -> Result<Vec<TermMatch>>
where
    R: FnMut(u8, Option<&str>),
{
    let transcript = engine.transcribe(audio_path).map_err(into_engine_error)?;
    deadline.check()?;

    report(SCAN_START_PROGRESS, Some("Detecting disallowed terms..."));
    scan_segments(
        transcript.segments,
        &transcript.metadata,
        matcher,
        deadline,
        check_interval,
        |progress| report(progress, None),
    )
}
