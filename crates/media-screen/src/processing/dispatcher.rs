//! Admission of uploads into the job system
//!
//! `submit` validates the payload, stages it on disk, records a queued job
//! and spawns the pipeline. It never waits for processing, so the caller gets
//! the job id back as soon as the upload is written.

use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;

use crate::error::{Error, Result};
use crate::types::JobId;

use super::{Janitor, JobInput, JobStore, ProcessingPipeline};

/// Longest file extension carried over to the staged upload
const MAX_SUFFIX_LEN: usize = 10;

/// Accepts uploads and schedules their processing
pub struct Dispatcher {
    store: Arc<JobStore>,
    pipeline: Arc<ProcessingPipeline>,
    janitor: Janitor,
    max_upload_size: usize,
    retention: Duration,
    upload_dir: PathBuf,
}

impl Dispatcher {
    pub fn new(
        store: Arc<JobStore>,
        pipeline: Arc<ProcessingPipeline>,
        max_upload_size: usize,
        retention: Duration,
        upload_dir: PathBuf,
    ) -> Self {
        let janitor = Janitor::new(Arc::clone(&store));
        Self {
            store,
            pipeline,
            janitor,
            max_upload_size,
            retention,
            upload_dir,
        }
    }

    pub fn max_upload_size(&self) -> usize {
        self.max_upload_size
    }

    /// Admit one upload and return its job id without waiting for processing.
    ///
    /// Expired jobs are swept first. An empty or oversized payload is
    /// rejected before any job record exists.
    pub async fn submit(&self, filename: impl Into<String>, data: Bytes) -> Result<JobId> {
        let filename = filename.into();
        self.janitor.sweep(self.retention);

        if data.is_empty() {
            return Err(Error::EmptyPayload);
        }
        if data.len() > self.max_upload_size {
            return Err(Error::PayloadTooLarge {
                size: data.len(),
                limit: self.max_upload_size,
            });
        }

        let size = data.len();
        let upload = self.stage(&filename, data).await?;
        let job_id = self.store.create(filename.clone());
        tracing::info!("[{}] Queued '{}' ({} bytes)", job_id, filename, size);

        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(async move {
            pipeline.run(job_id, JobInput { filename, upload }).await;
        });

        Ok(job_id)
    }

    /// Write the payload to a temp file that keeps the original extension
    async fn stage(&self, filename: &str, data: Bytes) -> Result<TempPath> {
        let suffix = upload_suffix(filename);
        let dir = self.upload_dir.clone();

        tokio::task::spawn_blocking(move || -> Result<TempPath> {
            let mut file = tempfile::Builder::new()
                .prefix("upload-")
                .suffix(&suffix)
                .tempfile_in(&dir)?;
            file.write_all(&data)?;
            file.flush()?;
            Ok(file.into_temp_path())
        })
        .await
        .map_err(|e| Error::internal(format!("staging task failed: {}", e)))?
    }
}

/// `.ext` from the client filename, or empty when it has no usable extension
fn upload_suffix(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_SUFFIX_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::EngineLoader;
    use crate::providers::Lexicon;
    use crate::test_support::{CountingFactory, PassThroughConverter, ScriptedEngine};
    use crate::types::{JobStatus, Segment, WordSpan};
    use std::time::Instant;

    struct Harness {
        store: Arc<JobStore>,
        factory: Arc<CountingFactory>,
        dispatcher: Dispatcher,
        _dir: tempfile::TempDir,
    }

    fn harness(load_delay: Duration, max_upload_size: usize) -> Harness {
        let segments = vec![Segment::from_words(vec![
            WordSpan::new(" hello", 0.0, 0.5),
            WordSpan::new(" damn", 0.6, 1.0),
            WordSpan::new(" world", 1.1, 1.5),
        ])];
        let factory = Arc::new(CountingFactory::new(
            ScriptedEngine::new(segments, 5.0),
            load_delay,
        ));
        let store = Arc::new(JobStore::new());
        let loader = Arc::new(EngineLoader::new(factory.clone(), Duration::from_secs(10)));
        let pipeline = Arc::new(ProcessingPipeline::new(
            Arc::clone(&store),
            loader,
            Arc::new(PassThroughConverter),
            Arc::new(Lexicon::builtin()),
            Duration::from_secs(60),
            10,
        ));
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            pipeline,
            max_upload_size,
            Duration::from_secs(3600),
            dir.path().to_path_buf(),
        );

        Harness {
            store,
            factory,
            dispatcher,
            _dir: dir,
        }
    }

    async fn wait_until_terminal(store: &JobStore, job_id: JobId) -> JobStatus {
        for _ in 0..200 {
            let status = store.get(job_id).unwrap().status();
            if status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish", job_id);
    }

    #[test]
    fn test_upload_suffix() {
        assert_eq!(upload_suffix("clip.MP3"), ".mp3");
        assert_eq!(upload_suffix("archive.tar.gz"), ".gz");
        assert_eq!(upload_suffix("noext"), "");
        assert_eq!(upload_suffix("weird.m p3"), "");
        assert_eq!(upload_suffix("long.abcdefghijklmnop"), "");
    }

    #[tokio::test]
    async fn test_empty_payload_creates_no_job() {
        let h = harness(Duration::ZERO, 1024);

        let err = h.dispatcher.submit("empty.wav", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, Error::EmptyPayload));
        assert!(h.store.is_empty());
        assert_eq!(h.factory.constructions(), 0);
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let h = harness(Duration::ZERO, 8);

        let err = h
            .dispatcher
            .submit("big.wav", Bytes::from(vec![0u8; 9]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { size: 9, limit: 8 }));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_submit_returns_before_processing() {
        let h = harness(Duration::from_millis(500), 1024);

        let started = Instant::now();
        let job_id = h
            .dispatcher
            .submit("clip.wav", Bytes::from_static(b"RIFF data"))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(400));

        let job = h.store.get(job_id).unwrap();
        assert!(!job.is_terminal());
        assert_eq!(job.filename(), "clip.wav");

        assert_eq!(wait_until_terminal(&h.store, job_id).await, JobStatus::Completed);
        let result = h.store.get(job_id).unwrap().result().cloned().unwrap();
        assert_eq!(result.match_count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_submits_build_engine_once() {
        let h = harness(Duration::from_millis(100), 1024);

        let mut ids = Vec::new();
        for i in 0..8 {
            let id = h
                .dispatcher
                .submit(format!("clip-{i}.mp3"), Bytes::from_static(b"ID3 data"))
                .await
                .unwrap();
            ids.push(id);
        }

        for id in ids {
            assert_eq!(wait_until_terminal(&h.store, id).await, JobStatus::Completed);
        }
        assert_eq!(h.factory.constructions(), 1);
    }

    #[tokio::test]
    async fn test_submit_sweeps_expired_jobs() {
        let h = harness(Duration::ZERO, 1024);
        let stale = h.store.create("stale.wav");
        h.store
            .update(stale, |job| {
                job.backdate(Duration::from_secs(7200));
                Ok(())
            })
            .unwrap();

        let _ = h.dispatcher.submit("empty.wav", Bytes::new()).await;
        assert!(matches!(h.store.get(stale), Err(Error::JobNotFound(_))));
    }
}
