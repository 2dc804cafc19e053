//! Job submission, status and statistics endpoints

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header::CONTENT_LENGTH, HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{Job, JobId, JobStatus, ScanResult};

/// Name of the multipart field carrying the media file
const FILE_FIELD: &str = "file";

/// Response from a submission
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: String,
}

/// Client view of one job
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ScanResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id(),
            status: job.status(),
            progress: job.progress(),
            message: job.message().to_string(),
            filename: job.filename().to_string(),
            result: job.result().cloned(),
            error: job.error().map(String::from),
            created_at: job.created_at().to_rfc3339(),
            updated_at: job.updated_at().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub job_id: JobId,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobStatusResponse>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub model_loaded: bool,
    pub active_jobs: usize,
    pub jobs_by_status: StatusCounts,
    pub average_processing_time: Option<f64>,
}

/// POST /api/analyze - Upload a file for asynchronous screening
pub async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>> {
    let limit = state.dispatcher().max_upload_size();
    let declared_size = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    let read_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Error::PayloadTooLarge {
                size: declared_size.unwrap_or(limit.saturating_add(1)),
                limit,
            }
        } else {
            Error::BadRequest(format!("Failed to read multipart body: {}", e.body_text()))
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(read_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(String::from)
            .unwrap_or_else(|| "upload.bin".to_string());
        let data = field.bytes().await.map_err(read_error)?;
        tracing::info!("Received upload: {} ({} bytes)", filename, data.len());

        let job_id = state.dispatcher().submit(filename, data).await?;
        return Ok(Json(AnalyzeResponse {
            job_id,
            status: JobStatus::Queued,
            message: format!(
                "Processing started. Use /api/status/{} to check progress.",
                job_id
            ),
        }));
    }

    Err(Error::BadRequest(format!(
        "Missing multipart field '{}'",
        FILE_FIELD
    )))
}

/// Any id that is not a UUID cannot name a job, so it is simply not found
fn parse_job_id(raw: &str) -> Result<JobId> {
    raw.parse::<JobId>().map_err(|_| Error::job_not_found(raw))
}

/// GET /api/status/:id - Get job status, plus result or error once finished
pub async fn get_status(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<JobStatusResponse>> {
    let job = state.store().get(parse_job_id(&raw_id)?)?;
    Ok(Json(job.into()))
}

/// DELETE /api/jobs/:id - Remove a job record
pub async fn delete_job(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let job_id = parse_job_id(&raw_id)?;
    state.store().delete(job_id)?;
    tracing::info!("[{}] Job deleted", job_id);

    Ok(Json(DeleteResponse {
        job_id,
        message: "Job deleted".to_string(),
    }))
}

/// GET /api/jobs - List all tracked jobs, newest first
pub async fn list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    let mut jobs = state.store().list();
    jobs.sort_by_key(|job| std::cmp::Reverse(job.created_at()));

    let jobs: Vec<JobStatusResponse> = jobs.into_iter().map(Into::into).collect();
    Json(JobListResponse {
        total: jobs.len(),
        jobs,
    })
}

/// GET /api/stats - Job counts by status and mean processing time
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.store().stats();

    Json(StatsResponse {
        model_loaded: state.model_loaded(),
        active_jobs: stats.total_jobs,
        jobs_by_status: StatusCounts {
            queued: stats.queued,
            processing: stats.processing,
            completed: stats.completed,
            failed: stats.failed,
        },
        average_processing_time: stats.average_processing_time,
    })
}
