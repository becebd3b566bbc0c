//! Bulk discovery: resolve candidate influencer names for a set of
//! health categories, then run the full research pipeline over each
//! candidate with bounded concurrency. Per-candidate failures reduce
//! the result set, they never fail the batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use trustlens_common::{HealthCategory, InfluencerSnapshot, ResearchRequest, VerificationOptions};

use crate::orchestrator::Orchestrator;
use crate::traits::ContentGateway;

/// How often a discovery task re-reads a spawned research job's status.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStage {
    Queued,
    ResolvingCandidates,
    Researching,
    Complete,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryProgress {
    pub stage: DiscoveryStage,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// State of one discovery batch. Snapshots are appended as individual
/// research jobs finish, so a status read mid-batch sees partial results.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryJob {
    pub id: Uuid,
    pub stage: DiscoveryStage,
    pub categories: Vec<HealthCategory>,
    pub requested: usize,
    pub candidates: Vec<String>,
    pub excluded: usize,
    pub results: Vec<InfluencerSnapshot>,
    pub progress: Vec<DiscoveryProgress>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiscoveryJob {
    fn new(categories: Vec<HealthCategory>, requested: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            stage: DiscoveryStage::Queued,
            categories,
            requested,
            candidates: vec![],
            excluded: 0,
            results: vec![],
            progress: vec![DiscoveryProgress {
                stage: DiscoveryStage::Queued,
                message: "Discovery batch accepted".into(),
                at: now,
            }],
            created_at: now,
            updated_at: now,
        }
    }

    fn log_stage(&mut self, stage: DiscoveryStage, message: impl Into<String>) {
        let now = Utc::now();
        self.stage = stage;
        self.updated_at = now;
        self.progress.push(DiscoveryProgress {
            stage,
            message: message.into(),
            at: now,
        });
    }
}

type SharedDiscovery = Arc<RwLock<DiscoveryJob>>;

pub struct DiscoveryCoordinator {
    orchestrator: Arc<Orchestrator>,
    gateway: Arc<dyn ContentGateway>,
    jobs: RwLock<HashMap<Uuid, SharedDiscovery>>,
    concurrency: usize,
}

impl DiscoveryCoordinator {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        gateway: Arc<dyn ContentGateway>,
        concurrency: usize,
    ) -> Self {
        Self {
            orchestrator,
            gateway,
            jobs: RwLock::new(HashMap::new()),
            concurrency,
        }
    }

    /// Start a discovery batch and return its id. Candidate resolution
    /// and per-candidate research run as a spawned task.
    pub async fn submit(
        self: &Arc<Self>,
        categories: Vec<HealthCategory>,
        count: usize,
        options: VerificationOptions,
    ) -> Uuid {
        let job = Arc::new(RwLock::new(DiscoveryJob::new(categories.clone(), count)));
        let id = job.read().await.id;
        self.jobs.write().await.insert(id, job.clone());

        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.run(job, categories, count, options).await;
        });
        id
    }

    pub async fn status(&self, id: Uuid) -> Option<DiscoveryJob> {
        let jobs = self.jobs.read().await;
        match jobs.get(&id) {
            Some(job) => Some(job.read().await.clone()),
            None => None,
        }
    }

    async fn run(
        &self,
        job: SharedDiscovery,
        categories: Vec<HealthCategory>,
        count: usize,
        options: VerificationOptions,
    ) {
        job.write()
            .await
            .log_stage(DiscoveryStage::ResolvingCandidates, "Resolving candidate influencers");

        // A category whose resolution fails contributes nothing; the
        // others still count.
        let per_category: Vec<Vec<String>> = stream::iter(categories.into_iter().map(|category| {
            let gateway = self.gateway.clone();
            async move {
                match gateway.discover_candidates(category, count).await {
                    Ok(names) => names,
                    Err(e) => {
                        warn!(category = %category, error = %e, "Candidate resolution failed");
                        vec![]
                    }
                }
            }
        }))
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        let candidates = dedupe_candidates(per_category.into_iter().flatten(), count);
        {
            let mut guard = job.write().await;
            guard.candidates = candidates.clone();
            guard.log_stage(
                DiscoveryStage::Researching,
                format!("Researching {} candidates", candidates.len()),
            );
        }

        let outcomes: Vec<Option<InfluencerSnapshot>> =
            stream::iter(candidates.into_iter().map(|name| {
                let job = job.clone();
                let options = options.clone();
                async move {
                    let snapshot = self.research_candidate(&name, options).await;
                    match snapshot {
                        Some(snapshot) => {
                            let mut guard = job.write().await;
                            guard.results.push(snapshot.clone());
                            guard
                                .results
                                .sort_by(|a, b| {
                                    b.current_trust_score
                                        .partial_cmp(&a.current_trust_score)
                                        .unwrap_or(std::cmp::Ordering::Equal)
                                });
                            guard.updated_at = Utc::now();
                            Some(snapshot)
                        }
                        None => {
                            job.write().await.excluded += 1;
                            None
                        }
                    }
                }
            }))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let succeeded = outcomes.iter().filter(|o| o.is_some()).count();
        let mut guard = job.write().await;
        let excluded = guard.excluded;
        guard.log_stage(
            DiscoveryStage::Complete,
            format!("Discovery complete: {succeeded} researched, {excluded} excluded"),
        );
        info!(id = %guard.id, succeeded, excluded, "Discovery batch finished");
    }

    /// Run one candidate through the research pipeline and wait for a
    /// terminal state. Returns None when the job fails or produces no
    /// snapshot.
    async fn research_candidate(
        &self,
        name: &str,
        options: VerificationOptions,
    ) -> Option<InfluencerSnapshot> {
        let request = ResearchRequest::builder()
            .influencer_name(name)
            .options(options)
            .build();
        let outcome = match self.orchestrator.submit(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(candidate = name, error = %e, "Research submission failed");
                return None;
            }
        };

        loop {
            let Some(status) = self.orchestrator.status(&outcome.subject_key).await else {
                warn!(candidate = name, "Research job disappeared from registry");
                return None;
            };
            if status.stage.is_terminal() {
                if status.result.is_none() {
                    warn!(
                        candidate = name,
                        detail = status.error_detail.as_deref().unwrap_or("unknown"),
                        "Candidate research failed, excluding from results"
                    );
                }
                return status.result;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Case-insensitive dedupe keeping first occurrence, truncated to `count`.
fn dedupe_candidates(names: impl Iterator<Item = String>, count: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for name in names {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            out.push(trimmed.to_string());
            if out.len() == count {
                break;
            }
        }
    }
    out
}
