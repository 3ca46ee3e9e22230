//! In-memory job registry
//!
//! Tracks status and progress for jobs submitted by an outer service. Each
//! entry is created on submit, updated only by the worker running it, and
//! removed when the caller acknowledges the finished result.

use crate::error::{LoopError, Result as LoopResult};
use crate::progress::ProgressSink;
use crate::{JobOutput, LoopToMidi, OutputMode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use uuid::Uuid;

/// Unique identifier for a job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

/// Snapshot of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    /// What the job was submitted with, usually the input file name
    pub source: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub result: Option<JobOutput>,
    pub error: Option<String>,
    #[serde(skip)]
    started_at: Option<Instant>,
    #[serde(skip)]
    finished_at: Option<Instant>,
}

impl JobInfo {
    fn new(id: JobId, source: String) -> Self {
        Self {
            id,
            source,
            status: JobStatus::Pending,
            progress: 0,
            message: "Queued".to_string(),
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Seconds between start and finish (or now, while running)
    pub fn duration_secs(&self) -> Option<f64> {
        let start = self.started_at?;
        let end = self.finished_at.unwrap_or_else(Instant::now);
        Some(end.duration_since(start).as_secs_f64())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStoreStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Shared, lock-protected map of jobs
#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<Mutex<HashMap<JobId, JobInfo>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, JobInfo>> {
        // a worker that panicked mid-update leaves the map usable
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_job<T>(&self, job_id: &JobId, f: impl FnOnce(&mut JobInfo) -> LoopResult<T>) -> LoopResult<T> {
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| LoopError::JobNotFound(job_id.to_string()))?;
        f(job)
    }

    /// Create a new job and return its ID
    pub fn create_job(&self, source: impl Into<String>) -> JobId {
        let job_id = JobId::new();
        let source = source.into();
        self.lock()
            .insert(job_id.clone(), JobInfo::new(job_id.clone(), source.clone()));

        tracing::info!(job.id = %job_id, job.source = %source, "Job created");
        job_id
    }

    /// Mark a pending job as running
    pub fn mark_running(&self, job_id: &JobId) -> LoopResult<()> {
        self.with_job(job_id, |job| {
            if job.status != JobStatus::Pending {
                return Err(LoopError::JobStateError(format!(
                    "job {} is {:?}, not pending",
                    job_id, job.status
                )));
            }
            job.status = JobStatus::Running;
            job.started_at = Some(Instant::now());
            tracing::info!(job.id = %job_id, job.source = %job.source, "Job started");
            Ok(())
        })
    }

    /// Record progress on a running job; lower percentages are ignored
    pub fn update_progress(&self, job_id: &JobId, percent: u8, message: &str) -> LoopResult<()> {
        self.with_job(job_id, |job| {
            if job.status != JobStatus::Running {
                return Err(LoopError::JobStateError(format!(
                    "job {} is {:?}, not running",
                    job_id, job.status
                )));
            }
            let percent = percent.min(100);
            if percent >= job.progress {
                job.progress = percent;
                job.message = message.to_string();
            }
            Ok(())
        })
    }

    /// Mark a job as complete with its output
    pub fn mark_complete(&self, job_id: &JobId, output: JobOutput) -> LoopResult<()> {
        self.with_job(job_id, |job| {
            job.status = JobStatus::Complete;
            job.progress = 100;
            job.message = "Complete".to_string();
            job.result = Some(output);
            job.finished_at = Some(Instant::now());
            tracing::info!(
                job.id = %job_id,
                job.source = %job.source,
                job.duration_secs = ?job.duration_secs(),
                "Job completed successfully"
            );
            Ok(())
        })
    }

    /// Mark a job as failed with error
    pub fn mark_failed(&self, job_id: &JobId, error: String) -> LoopResult<()> {
        self.with_job(job_id, |job| {
            job.status = JobStatus::Failed;
            job.message = "Failed".to_string();
            job.finished_at = Some(Instant::now());
            tracing::error!(
                job.id = %job_id,
                job.source = %job.source,
                job.duration_secs = ?job.duration_secs(),
                job.error = %error,
                "Job failed"
            );
            job.error = Some(error);
            Ok(())
        })
    }

    /// Get job information
    pub fn get_job(&self, job_id: &JobId) -> LoopResult<JobInfo> {
        self.lock()
            .get(job_id)
            .cloned()
            .ok_or_else(|| LoopError::JobNotFound(job_id.to_string()))
    }

    /// List all jobs
    pub fn list_jobs(&self) -> Vec<JobInfo> {
        self.lock().values().cloned().collect()
    }

    /// Remove a finished job, handing back its final state
    pub fn acknowledge(&self, job_id: &JobId) -> LoopResult<JobInfo> {
        let mut jobs = self.lock();
        let finished = jobs
            .get(job_id)
            .map(|job| job.status.is_finished())
            .ok_or_else(|| LoopError::JobNotFound(job_id.to_string()))?;
        if !finished {
            return Err(LoopError::JobStateError(format!(
                "job {} has not finished",
                job_id
            )));
        }
        tracing::debug!(job.id = %job_id, "Job acknowledged");
        jobs.remove(job_id)
            .ok_or_else(|| LoopError::JobNotFound(job_id.to_string()))
    }

    /// Progress sink that writes into this store
    pub fn progress_sink<'a>(&'a self, job_id: &'a JobId) -> impl ProgressSink + 'a {
        move |percent: u8, message: &str| {
            if let Err(e) = self.update_progress(job_id, percent, message) {
                tracing::warn!(job.id = %job_id, error = %e, "Dropped progress update");
            }
        }
    }

    /// Run one job to completion on the calling thread
    ///
    /// The job must be pending. Its final status is recorded in the store and
    /// the pipeline result is also returned to the caller.
    pub fn run_job(
        &self,
        job_id: &JobId,
        processor: &LoopToMidi,
        input: &Path,
        output_dir: &Path,
        mode: OutputMode,
    ) -> LoopResult<JobOutput> {
        self.mark_running(job_id)?;

        let mut sink = self.progress_sink(job_id);
        let result = processor.process(input, output_dir, mode, &mut sink);

        match &result {
            Ok(output) => self.mark_complete(job_id, output.clone())?,
            Err(e) => self.mark_failed(job_id, e.to_string())?,
        }
        result
    }

    /// Get job store statistics for monitoring
    pub fn stats(&self) -> JobStoreStats {
        let jobs = self.lock();
        let mut stats = JobStoreStats::default();

        for job in jobs.values() {
            stats.total += 1;
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Complete => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let store = JobStore::new();
        let id = store.create_job("song.wav");
        assert_eq!(store.get_job(&id).unwrap().status, JobStatus::Pending);

        store.mark_running(&id).unwrap();
        store.update_progress(&id, 50, "Tempo found").unwrap();
        store.update_progress(&id, 30, "late update").unwrap();
        let job = store.get_job(&id).unwrap();
        assert_eq!(job.progress, 50);
        assert_eq!(job.message, "Tempo found");

        assert!(matches!(store.acknowledge(&id), Err(LoopError::JobStateError(_))));

        store.mark_failed(&id, "boom".to_string()).unwrap();
        let stats = store.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.failed, 1);

        let finished = store.acknowledge(&id).unwrap();
        assert_eq!(finished.error.as_deref(), Some("boom"));
        assert!(matches!(store.get_job(&id), Err(LoopError::JobNotFound(_))));
    }

    #[test]
    fn test_progress_requires_running_job() {
        let store = JobStore::new();
        let id = store.create_job("a.wav");
        assert!(matches!(
            store.update_progress(&id, 10, "early"),
            Err(LoopError::JobStateError(_))
        ));
        store.mark_running(&id).unwrap();
        assert!(matches!(store.mark_running(&id), Err(LoopError::JobStateError(_))));
    }

    #[test]
    fn test_progress_sink_updates_store() {
        let store = JobStore::new();
        let id = store.create_job("b.wav");
        store.mark_running(&id).unwrap();
        {
            let mut sink = store.progress_sink(&id);
            sink.report(30, "Stem separated");
        }
        assert_eq!(store.get_job(&id).unwrap().progress, 30);
    }

    #[test]
    fn test_unknown_job() {
        let store = JobStore::new();
        assert!(matches!(
            store.mark_running(&JobId::new()),
            Err(LoopError::JobNotFound(_))
        ));
    }
}
