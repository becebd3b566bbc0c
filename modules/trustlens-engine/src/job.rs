//! Research job state and the single-flight registry.
//!
//! A `ResearchJob` is mutated only by the pipeline task executing it;
//! pollers read consistent snapshots through `JobStatus`. The registry
//! guarantees at most one in-flight pipeline per subject key via atomic
//! check-and-create under the map's write lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use trustlens_common::{InfluencerSnapshot, ProgressEntry, ResearchStage};

pub type SharedJob = Arc<RwLock<ResearchJob>>;

#[derive(Debug)]
pub struct ResearchJob {
    pub id: Uuid,
    pub subject_key: String,
    pub subject: String,
    pub stage: ResearchStage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub progress: Vec<ProgressEntry>,
    pub result: Option<InfluencerSnapshot>,
    pub error_detail: Option<String>,
}

impl ResearchJob {
    pub fn new(subject_key: &str, subject: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subject_key: subject_key.to_string(),
            subject: subject.to_string(),
            stage: ResearchStage::Queued,
            created_at: now,
            updated_at: now,
            progress: Vec::new(),
            result: None,
            error_detail: None,
        }
    }

    /// Transition to a stage and append a progress entry. The log is
    /// append-only with non-decreasing timestamps; once a job is
    /// terminal no further transitions are recorded.
    pub fn log_stage(&mut self, stage: ResearchStage, message: impl Into<String>) {
        if self.stage.is_terminal() {
            return;
        }
        let message = message.into();
        let at = self
            .progress
            .last()
            .map(|e| e.at.max(Utc::now()))
            .unwrap_or_else(Utc::now);

        info!(subject = %self.subject, stage = %stage, message = %message);
        self.progress.push(ProgressEntry { stage, message, at });
        self.stage = stage;
        self.updated_at = at;
    }

    pub fn fail(&mut self, detail: impl Into<String>) {
        let detail = detail.into();
        self.log_stage(ResearchStage::Failed, detail.clone());
        if self.error_detail.is_none() {
            self.error_detail = Some(detail);
        }
    }

    pub fn complete(&mut self, snapshot: InfluencerSnapshot) {
        // An abort can race completion; the first terminal state wins.
        if self.stage.is_terminal() {
            return;
        }
        self.log_stage(ResearchStage::Complete, "Research completed successfully");
        self.result = Some(snapshot);
    }
}

/// Consistent point-in-time view of a job, safe to hand to pollers.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub subject_key: String,
    pub subject: String,
    pub stage: ResearchStage,
    pub progress: Vec<ProgressEntry>,
    pub result: Option<InfluencerSnapshot>,
    pub error_detail: Option<String>,
}

impl From<&ResearchJob> for JobStatus {
    fn from(job: &ResearchJob) -> Self {
        Self {
            job_id: job.id,
            subject_key: job.subject_key.clone(),
            subject: job.subject.clone(),
            stage: job.stage,
            progress: job.progress.clone(),
            result: job.result.clone(),
            error_detail: job.error_detail.clone(),
        }
    }
}

/// Keyed store of research jobs. Jobs are retained after completion so
/// status stays queryable; a terminal job is replaced by a fresh one on
/// resubmission (completed jobs are normally short-circuited by the
/// snapshot cache before reaching the registry).
pub struct JobRegistry {
    by_key: RwLock<HashMap<String, SharedJob>>,
    by_id: RwLock<HashMap<Uuid, SharedJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            by_key: RwLock::new(HashMap::new()),
            by_id: RwLock::new(HashMap::new()),
        }
    }

    /// Atomic check-and-create. Returns the in-flight job for the key if
    /// one exists, otherwise registers a new one. The bool is true when
    /// a new job was created (the caller owns starting its pipeline).
    pub async fn get_or_create(&self, subject_key: &str, subject: &str) -> (SharedJob, bool) {
        let mut by_key = self.by_key.write().await;

        if let Some(existing) = by_key.get(subject_key) {
            if !existing.read().await.stage.is_terminal() {
                return (existing.clone(), false);
            }
        }

        let job = ResearchJob::new(subject_key, subject);
        let id = job.id;
        let shared: SharedJob = Arc::new(RwLock::new(job));
        by_key.insert(subject_key.to_string(), shared.clone());
        self.by_id.write().await.insert(id, shared.clone());
        (shared, true)
    }

    /// Register an already-terminal job (cache-hit short circuit).
    pub async fn insert(&self, job: ResearchJob) -> SharedJob {
        let key = job.subject_key.clone();
        let id = job.id;
        let shared: SharedJob = Arc::new(RwLock::new(job));
        self.by_key.write().await.insert(key, shared.clone());
        self.by_id.write().await.insert(id, shared.clone());
        shared
    }

    /// Look up by subject key, or by job id when the string parses as a
    /// UUID.
    pub async fn get(&self, subject_key_or_id: &str) -> Option<SharedJob> {
        if let Some(job) = self.by_key.read().await.get(subject_key_or_id) {
            return Some(job.clone());
        }
        if let Ok(id) = subject_key_or_id.parse::<Uuid>() {
            return self.by_id.read().await.get(&id).cloned();
        }
        None
    }

    pub async fn status(&self, subject_key_or_id: &str) -> Option<JobStatus> {
        let job = self.get(subject_key_or_id).await?;
        let guard = job.read().await;
        Some(JobStatus::from(&*guard))
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
