//! Public entry point: wires the Perplexity gateway, extractor,
//! evidence verifier and snapshot cache into one orchestrator plus a
//! discovery coordinator, and exposes the operations callers use.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use pubmed_client::PubMedClient;
use sonar_client::SonarClient;
use trustlens_common::{
    subject_key, Config, HealthCategory, InfluencerSnapshot, ResearchError, ResearchRequest,
    VerificationOptions,
};

use crate::cache::{MemoryCache, SnapshotCache};
use crate::discovery::{DiscoveryCoordinator, DiscoveryJob};
use crate::extractor::SonarExtractor;
use crate::gateway::SonarGateway;
use crate::job::JobStatus;
use crate::orchestrator::{Orchestrator, PipelineDeps, SubmitOutcome};
use crate::traits::{ClaimExtraction, ClaimVerification, ContentGateway};
use crate::verifier::EvidenceVerifier;

/// Result of a by-name influencer lookup.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum InfluencerLookup {
    /// An unexpired cached snapshot, flagged `from_cache`.
    Snapshot(InfluencerSnapshot),
    /// Research is still running; here is where it stands.
    InProgress(JobStatus),
}

pub struct ResearchService {
    orchestrator: Arc<Orchestrator>,
    discovery: Arc<DiscoveryCoordinator>,
    config: Config,
}

impl ResearchService {
    /// Build the service with live upstream clients from configuration.
    pub fn new(config: Config) -> Self {
        let sonar = SonarClient::new(config.sonar_api_key.clone());
        let pubmed = PubMedClient::new(
            config.entrez_email.clone(),
            config.entrez_api_key.clone(),
        );
        let gateway: Arc<dyn ContentGateway> = Arc::new(SonarGateway::new(sonar.clone()));
        let extractor: Arc<dyn ClaimExtraction> = Arc::new(SonarExtractor::new(sonar.clone()));
        let verifier: Arc<dyn ClaimVerification> = Arc::new(EvidenceVerifier::new(sonar, pubmed));
        let cache: Arc<dyn SnapshotCache> = Arc::new(MemoryCache::new());
        Self::with_deps(config, cache, gateway, extractor, verifier)
    }

    /// Build the service with explicit dependencies. Tests inject mocks
    /// here.
    pub fn with_deps(
        config: Config,
        cache: Arc<dyn SnapshotCache>,
        gateway: Arc<dyn ContentGateway>,
        extractor: Arc<dyn ClaimExtraction>,
        verifier: Arc<dyn ClaimVerification>,
    ) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(PipelineDeps {
            config: config.clone(),
            cache,
            gateway: gateway.clone(),
            extractor,
            verifier,
        }));
        let discovery = Arc::new(DiscoveryCoordinator::new(
            orchestrator.clone(),
            gateway,
            config.discovery_concurrency,
        ));
        Self {
            orchestrator,
            discovery,
            config,
        }
    }

    /// Start (or attach to) a research run for one influencer.
    pub async fn submit_research(
        &self,
        request: ResearchRequest,
    ) -> Result<SubmitOutcome, ResearchError> {
        self.orchestrator.submit(request).await
    }

    /// Status by subject key or job id.
    pub async fn research_status(&self, subject_key_or_id: &str) -> Option<JobStatus> {
        self.orchestrator.status(subject_key_or_id).await
    }

    /// Abort a running research job. Returns false when the job is
    /// unknown or already terminal.
    pub async fn abort_research(&self, subject_key_or_id: &str) -> bool {
        self.orchestrator.abort(subject_key_or_id).await
    }

    /// Start a discovery batch over health categories.
    pub async fn submit_discovery(
        &self,
        categories: Vec<HealthCategory>,
        count: usize,
        options: VerificationOptions,
    ) -> Uuid {
        self.discovery.submit(categories, count, options).await
    }

    pub async fn discovery_status(&self, id: Uuid) -> Option<DiscoveryJob> {
        self.discovery.status(id).await
    }

    /// Look up one influencer by name with default verification options.
    /// An unexpired cached snapshot is served with zero upstream calls;
    /// otherwise research is submitted (or attached to, if already
    /// in flight) and the current job status is returned.
    pub async fn get_influencer(
        &self,
        name: &str,
    ) -> Result<InfluencerLookup, ResearchError> {
        let key = subject_key(name, None, &VerificationOptions::default());
        if let Some(snapshot) = self.orchestrator.cached_snapshot(&key).await {
            return Ok(InfluencerLookup::Snapshot(snapshot));
        }
        let request = ResearchRequest::builder().influencer_name(name).build();
        let outcome = self.orchestrator.submit(request).await?;
        match self.orchestrator.status(&outcome.subject_key).await {
            Some(status) => match status.result.clone() {
                Some(snapshot) if status.stage.is_terminal() => {
                    Ok(InfluencerLookup::Snapshot(snapshot))
                }
                _ => Ok(InfluencerLookup::InProgress(status)),
            },
            None => Err(ResearchError::Anyhow(anyhow::anyhow!(
                "job {} not found after submission",
                outcome.subject_key
            ))),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
