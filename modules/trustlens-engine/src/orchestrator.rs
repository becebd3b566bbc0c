//! The research orchestrator: a stateful pipeline driver that sequences
//! gathering → extraction → verification → aggregation for one job,
//! records progress after each transition, and caches the completed
//! snapshot exactly once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use trustlens_common::{
    research_cache_key, subject_slug, Claim, ClaimStatus, Config, InfluencerSnapshot, Journal,
    ResearchError, ResearchRequest, ResearchStage,
};

use crate::aggregator;
use crate::cache::{self, SnapshotCache};
use crate::extractor::CandidateClaim;
use crate::job::{JobRegistry, JobStatus, ResearchJob, SharedJob};
use crate::traits::{ClaimExtraction, ClaimVerification, ContentGateway};

/// Immutable dependencies shared by every pipeline task.
pub struct PipelineDeps {
    pub config: Config,
    pub cache: Arc<dyn SnapshotCache>,
    pub gateway: Arc<dyn ContentGateway>,
    pub extractor: Arc<dyn ClaimExtraction>,
    pub verifier: Arc<dyn ClaimVerification>,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub job_id: Uuid,
    pub subject_key: String,
    /// True when this call started a new pipeline run.
    pub created: bool,
}

pub struct Orchestrator {
    deps: Arc<PipelineDeps>,
    registry: Arc<JobRegistry>,
}

impl Orchestrator {
    pub fn new(deps: PipelineDeps) -> Self {
        Self {
            deps: Arc::new(deps),
            registry: Arc::new(JobRegistry::new()),
        }
    }

    /// Submit a research request. Idempotent per subject key: while a job
    /// is in-flight, resubmission attaches to it; a cached snapshot
    /// short-circuits the pipeline entirely. Returns immediately; the
    /// pipeline runs as a spawned task.
    pub async fn submit(&self, request: ResearchRequest) -> Result<SubmitOutcome, ResearchError> {
        if let Some(range) = &request.date_range {
            range.validate(Utc::now())?;
        }
        let request = ResearchRequest {
            options: request.options.clamped(),
            ..request
        };
        let subject_key = request.subject_key();
        let cache_key = research_cache_key(&subject_key);

        // A live job wins over the cache: the cache is only written at
        // completion, so an in-flight subject never has a fresh entry.
        if let Some(job) = self.registry.get(&subject_key).await {
            let guard = job.read().await;
            if !guard.stage.is_terminal() {
                return Ok(SubmitOutcome {
                    job_id: guard.id,
                    subject_key,
                    created: false,
                });
            }
        }

        if let Some(mut snapshot) = cache::read_snapshot(self.deps.cache.as_ref(), &cache_key).await
        {
            info!(subject = %request.influencer_name, "Cache hit, short-circuiting pipeline");
            snapshot.from_cache = true;
            let mut job = ResearchJob::new(&subject_key, &request.influencer_name);
            job.log_stage(ResearchStage::Queued, "Serving cached snapshot");
            job.complete(snapshot);
            let shared = self.registry.insert(job).await;
            let job_id = shared.read().await.id;
            return Ok(SubmitOutcome {
                job_id,
                subject_key,
                created: false,
            });
        }

        let (job, created) = self
            .registry
            .get_or_create(&subject_key, &request.influencer_name)
            .await;
        let job_id = job.read().await.id;

        if created {
            job.write()
                .await
                .log_stage(ResearchStage::Queued, "Research job accepted");
            let deps = self.deps.clone();
            let job = job.clone();
            tokio::spawn(async move {
                run_pipeline(deps, job, request).await;
            });
        }

        Ok(SubmitOutcome {
            job_id,
            subject_key,
            created,
        })
    }

    /// Latest consistent view of a job, by subject key or job id.
    /// Never blocks on in-progress work.
    pub async fn status(&self, subject_key_or_id: &str) -> Option<JobStatus> {
        self.registry.status(subject_key_or_id).await
    }

    /// Operator-level abort. The job moves to `failed`; the pipeline
    /// task notices at its next stage boundary, drops any outstanding
    /// upstream results, and never writes to cache.
    pub async fn abort(&self, subject_key_or_id: &str) -> bool {
        if let Some(job) = self.registry.get(subject_key_or_id).await {
            let mut guard = job.write().await;
            if !guard.stage.is_terminal() {
                guard.fail("Aborted by operator request");
                return true;
            }
        }
        false
    }

    /// Unexpired cached snapshot for a subject key, flagged `from_cache`.
    pub async fn cached_snapshot(&self, subject_key: &str) -> Option<InfluencerSnapshot> {
        let key = research_cache_key(subject_key);
        let mut snapshot = cache::read_snapshot(self.deps.cache.as_ref(), &key).await?;
        snapshot.from_cache = true;
        Some(snapshot)
    }
}

async fn run_pipeline(deps: Arc<PipelineDeps>, job: SharedJob, request: ResearchRequest) {
    let subject_key = job.read().await.subject_key.clone();

    match execute(&deps, &job, &request).await {
        Ok(Some(snapshot)) => {
            // Exactly one cache write, gated behind the complete
            // transition; an aborted job never reaches it. The write
            // happens before the job lock is released so a terminal
            // status is never observable ahead of the cache entry.
            let mut guard = job.write().await;
            guard.complete(snapshot.clone());
            if guard.stage == ResearchStage::Complete {
                let ttl = Duration::from_secs(deps.config.cache_ttl_hours * 3600);
                cache::write_snapshot(
                    deps.cache.as_ref(),
                    &research_cache_key(&subject_key),
                    &snapshot,
                    ttl,
                )
                .await;
            }
        }
        Ok(None) => {
            info!(subject_key, "Pipeline stopped: job aborted");
        }
        Err(e) => {
            warn!(subject_key, error = %e, "Research job failed");
            job.write().await.fail(e.to_string());
        }
    }
}

/// Run the four pipeline stages. Returns Ok(None) when the job was
/// aborted out from under the task.
async fn execute(
    deps: &Arc<PipelineDeps>,
    job: &SharedJob,
    request: &ResearchRequest,
) -> Result<Option<InfluencerSnapshot>, ResearchError> {
    let config = &deps.config;
    let subject = request.influencer_name.clone();
    let journals = request.options.enabled_journals();
    let attempts = config.stage_retries;
    let base = Duration::from_secs(config.retry_base_secs);

    // --- gathering_content ---
    if aborted(job).await {
        return Ok(None);
    }
    log(job, ResearchStage::GatheringContent, "Gathering influencer content and profile").await;
    let items = with_retry("gathering_content", attempts, base, ResearchError::is_transient, || {
        deps.gateway
            .fetch_content(&subject, request.date_range.as_ref(), &request.options.keywords)
    })
    .await?;
    let profile = with_retry("gathering_content", attempts, base, ResearchError::is_transient, || {
        deps.gateway.fetch_profile(&subject)
    })
    .await?;

    // --- extracting_claims ---
    if aborted(job).await {
        return Ok(None);
    }
    log(
        job,
        ResearchStage::ExtractingClaims,
        format!("Extracting claims from {} content items", items.len()),
    )
    .await;
    // Extraction failures get one retry before the job is terminal.
    let candidates = with_retry(
        "extracting_claims",
        2,
        base,
        |e| e.is_transient() || matches!(e, ResearchError::ExtractionFailed(_)),
        || {
            deps.extractor
                .extract(&subject, &items, request.options.claims_to_analyze as usize)
        },
    )
    .await?;

    // --- verifying_claims ---
    if aborted(job).await {
        return Ok(None);
    }
    log(
        job,
        ResearchStage::VerifyingClaims,
        format!(
            "Verifying {} claims against {} journals",
            candidates.len(),
            journals.len()
        ),
    )
    .await;
    let claims = verify_all(deps, &candidates, &journals).await;

    // --- aggregating ---
    if aborted(job).await {
        return Ok(None);
    }
    log(
        job,
        ResearchStage::Aggregating,
        format!("Aggregating trust score from {} verified claims", claims.len()),
    )
    .await;
    let now = Utc::now();
    let current_trust_score = aggregator::current_score(&claims, now);
    let mut trust_score_history = Vec::new();
    aggregator::append_history(&mut trust_score_history, now.date_naive(), current_trust_score);

    let snapshot = InfluencerSnapshot {
        id: subject_slug(&subject),
        name: subject.clone(),
        category: profile.category,
        topics: profile.topics,
        followers: profile.followers,
        yearly_revenue_estimate: profile.yearly_revenue_estimate,
        products_count: profile.products_count,
        claims,
        trust_score_history,
        current_trust_score,
        from_cache: false,
    };

    if aborted(job).await {
        return Ok(None);
    }
    Ok(Some(snapshot))
}

/// Fan out claim verification bounded by `verify_concurrency`, fan in
/// before the caller logs the next stage. Failures are isolated at claim
/// granularity: a claim that times out or errors past its retry budget
/// is recorded as questionable with zero citations, it never aborts the
/// batch. Input order is preserved.
async fn verify_all(
    deps: &Arc<PipelineDeps>,
    candidates: &[CandidateClaim],
    journals: &[Journal],
) -> Vec<Claim> {
    let claim_timeout = Duration::from_secs(deps.config.claim_timeout_secs);
    let attempts = deps.config.stage_retries;
    let base = Duration::from_secs(deps.config.retry_base_secs);

    let mut results: Vec<(usize, Claim)> =
        stream::iter(candidates.iter().cloned().enumerate().map(|(idx, candidate)| {
            let verifier = deps.verifier.clone();
            let journals = journals.to_vec();
            async move {
                let verdict = with_retry(
                    "verifying_claims",
                    attempts,
                    base,
                    |e| {
                        e.is_transient() || matches!(e, ResearchError::VerificationTimeout(_))
                    },
                    || async {
                        match timeout(claim_timeout, verifier.verify(&candidate, &journals)).await
                        {
                            Ok(result) => result,
                            Err(_) => {
                                Err(ResearchError::VerificationTimeout(claim_timeout.as_secs()))
                            }
                        }
                    },
                )
                .await;

                let claim = match verdict {
                    Ok(claim) => claim,
                    Err(e) => {
                        warn!(
                            claim = %candidate.text,
                            error = %e,
                            "Claim unverifiable, recording as questionable"
                        );
                        unverifiable(&candidate)
                    }
                };
                (idx, claim)
            }
        }))
        .buffer_unordered(deps.config.verify_concurrency)
        .collect()
        .await;

    results.sort_by_key(|(idx, _)| *idx);
    results.into_iter().map(|(_, claim)| claim).collect()
}

/// A claim whose verification could not finish: questionable, no
/// citations, scored below neutral.
fn unverifiable(candidate: &CandidateClaim) -> Claim {
    Claim {
        id: Uuid::new_v4(),
        text: candidate.text.clone(),
        category: candidate.category,
        observed_at: candidate.observed_at,
        status: ClaimStatus::Questionable,
        trust_score: aggregator::TIMEOUT_SCORE,
        citations: vec![],
    }
}

/// Retry a stage operation with `base * 3^attempt + jitter` backoff, up
/// to `attempts` total tries, for errors the predicate marks retryable.
async fn with_retry<T, F, Fut, P>(
    stage: &str,
    attempts: u32,
    base: Duration,
    retryable: P,
    f: F,
) -> Result<T, ResearchError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ResearchError>>,
    P: Fn(&ResearchError) -> bool,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < attempts && retryable(&e) => {
                let backoff = base * 3u32.pow(attempt);
                let jitter_cap = (base.as_millis() as u64).min(1000);
                let jitter = Duration::from_millis(rand::random_range(0..=jitter_cap));
                warn!(
                    stage,
                    attempt = attempt + 1,
                    backoff_secs = backoff.as_secs(),
                    error = %e,
                    "Stage failed, retrying after backoff"
                );
                tokio::time::sleep(backoff + jitter).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn log(job: &SharedJob, stage: ResearchStage, message: impl Into<String>) {
    job.write().await.log_stage(stage, message);
}

async fn aborted(job: &SharedJob) -> bool {
    job.read().await.stage.is_terminal()
}
