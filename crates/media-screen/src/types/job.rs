//! Job record and its lifecycle
//!
//! A job moves `Queued -> Processing -> Completed | Failed`. Fields are private;
//! every change goes through a transition method so a terminal job can never be
//! reopened and progress never moves backwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Highest progress value reachable before the job is completed
const MAX_IN_FLIGHT_PROGRESS: u8 = 99;

/// Opaque job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A disallowed term found in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermMatch {
    pub term: String,
    pub start: f64,
    pub end: f64,
}

/// Output of a completed analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub match_count: usize,
    pub matches: Vec<TermMatch>,
    /// Wall-clock processing time in seconds
    pub elapsed_time: f64,
}

impl ScanResult {
    pub fn new(matches: Vec<TermMatch>, elapsed: Duration) -> Self {
        Self {
            match_count: matches.len(),
            matches,
            elapsed_time: round2(elapsed.as_secs_f64()),
        }
    }
}

/// One submitted unit of work
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    id: JobId,
    status: JobStatus,
    progress: u8,
    message: String,
    filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ScanResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a queued job for an upload
    pub fn new(filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            status: JobStatus::Queued,
            progress: 0,
            message: "Job queued...".to_string(),
            filename: filename.into(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn result(&self) -> Option<&ScanResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the job is older than `retention` at `now`
    pub fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age.to_std().map(|age| age > retention).unwrap_or(false)
    }

    /// Enter a new stage: sets the message and raises progress.
    ///
    /// A queued job moves to `Processing` on its first stage.
    pub fn advance(&mut self, progress: u8, message: impl Into<String>) -> Result<()> {
        self.ensure_open("advance")?;
        self.status = JobStatus::Processing;
        self.raise_progress(progress);
        self.message = message.into();
        self.touch();
        Ok(())
    }

    /// Raise progress without changing the stage message
    pub fn report_progress(&mut self, progress: u8) -> Result<()> {
        self.ensure_open("report_progress")?;
        self.status = JobStatus::Processing;
        self.raise_progress(progress);
        self.touch();
        Ok(())
    }

    /// Commit a successful result
    pub fn complete(&mut self, result: ScanResult) -> Result<()> {
        if self.status != JobStatus::Processing {
            return Err(Error::InvalidTransition {
                from: self.status,
                attempted: "complete",
            });
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.message = "Analysis complete!".to_string();
        self.result = Some(result);
        self.touch();
        Ok(())
    }

    /// Commit a failure; progress stays at its last committed value
    pub fn fail(&mut self, cause: impl Into<String>) -> Result<()> {
        self.ensure_open("fail")?;
        self.status = JobStatus::Failed;
        self.message = "Analysis failed".to_string();
        self.error = Some(cause.into());
        self.touch();
        Ok(())
    }

    fn ensure_open(&self, attempted: &'static str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::InvalidTransition {
                from: self.status,
                attempted,
            });
        }
        Ok(())
    }

    fn raise_progress(&mut self, progress: u8) {
        let capped = progress.min(MAX_IN_FLIGHT_PROGRESS);
        if capped > self.progress {
            self.progress = capped;
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        self.created_at = self.created_at - delta;
    }
}

/// Aggregate job statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobStats {
    pub total_jobs: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    /// Mean elapsed time over completed jobs, in seconds
    pub average_processing_time: Option<f64>,
}

impl JobStats {
    /// Summarize a snapshot of jobs
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut stats = JobStats::default();
        let mut elapsed_total = 0.0;

        for job in jobs {
            stats.total_jobs += 1;
            match job.status() {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
            if let Some(result) = job.result() {
                elapsed_total += result.elapsed_time;
            }
        }

        if stats.completed > 0 {
            stats.average_processing_time = Some(round2(elapsed_total / stats.completed as f64));
        }

        stats
    }
}

/// Round to two decimals, matching the precision reported to clients
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
