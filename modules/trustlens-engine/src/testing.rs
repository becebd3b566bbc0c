//! Deterministic in-memory doubles for the pipeline's external
//! dependencies. Built in the builder style: construct, chain `on_*`
//! expectations, wrap in Arc, inject via `ResearchService::with_deps`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use trustlens_common::{
    Citation, Claim, ClaimStatus, Config, ContentItem, DateRange, HealthCategory, Journal,
    ResearchError, SubjectProfile,
};

use crate::cache::SnapshotCache;
use crate::extractor::CandidateClaim;
use crate::job::JobStatus;
use crate::service::ResearchService;
use crate::traits::{ClaimExtraction, ClaimVerification, ContentGateway};

/// Config tuned for tests: no backoff sleeps, short claim timeout.
pub fn test_config() -> Config {
    let mut config = Config::offline();
    config.retry_base_secs = 0;
    config.claim_timeout_secs = 1;
    config.stage_retries = 3;
    config
}

/// A content item published `days_ago` days before now.
pub fn content_item(text: &str, days_ago: i64) -> ContentItem {
    ContentItem {
        text: text.to_string(),
        source_url: format!("https://example.com/{}", text.len()),
        published_at: Utc::now() - chrono::Duration::days(days_ago),
    }
}

pub fn candidate_claim(text: &str) -> CandidateClaim {
    CandidateClaim {
        text: text.to_string(),
        category: HealthCategory::Nutrition,
        observed_at: Utc::now(),
    }
}

/// Poll a job until it reaches a terminal stage.
///
/// # Panics
///
/// Panics after ten seconds without a terminal state.
pub async fn wait_for_terminal(service: &ResearchService, subject_key: &str) -> JobStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(status) = service.research_status(subject_key).await {
            if status.stage.is_terminal() {
                return status;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {subject_key} did not reach a terminal stage within 10s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// --- Cache ---

/// Cache whose every operation fails, for exercising degraded mode.
#[derive(Default)]
pub struct FailingCache;

#[async_trait]
impl SnapshotCache for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, ResearchError> {
        Err(ResearchError::CacheUnavailable("mock cache outage".to_string()))
    }

    async fn put(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), ResearchError> {
        Err(ResearchError::CacheUnavailable("mock cache outage".to_string()))
    }
}

// --- Gateway ---

#[derive(Default)]
pub struct MockGateway {
    content: Mutex<HashMap<String, Vec<ContentItem>>>,
    profiles: Mutex<HashMap<String, SubjectProfile>>,
    candidates: Mutex<HashMap<HealthCategory, Vec<String>>>,
    failing: Mutex<HashMap<String, ResearchErrorKind>>,
    // Remaining transient failures per subject, decremented per call.
    transient: Mutex<HashMap<String, u32>>,
    pub fetch_calls: AtomicU32,
    pub profile_calls: AtomicU32,
    pub discover_calls: AtomicU32,
}

/// Cloneable stand-in for the error a mock should produce.
#[derive(Debug, Clone, Copy)]
pub enum ResearchErrorKind {
    UpstreamUnavailable,
    NoContentFound,
}

impl ResearchErrorKind {
    fn to_error(self, subject: &str) -> ResearchError {
        match self {
            Self::UpstreamUnavailable => {
                ResearchError::UpstreamUnavailable(format!("mock outage for {subject}"))
            }
            Self::NoContentFound => ResearchError::NoContentFound(subject.to_string()),
        }
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_subject(self, subject: &str, items: Vec<ContentItem>) -> Self {
        self.content
            .lock()
            .unwrap()
            .insert(subject.to_string(), items);
        self
    }

    pub fn on_profile(self, subject: &str, profile: SubjectProfile) -> Self {
        self.profiles
            .lock()
            .unwrap()
            .insert(subject.to_string(), profile);
        self
    }

    pub fn on_candidates(self, category: HealthCategory, names: Vec<&str>) -> Self {
        self.candidates
            .lock()
            .unwrap()
            .insert(category, names.into_iter().map(String::from).collect());
        self
    }

    /// Every fetch for this subject fails with the given error kind.
    pub fn fail_subject(self, subject: &str, kind: ResearchErrorKind) -> Self {
        self.failing
            .lock()
            .unwrap()
            .insert(subject.to_string(), kind);
        self
    }

    /// The first `n` content fetches for this subject fail transiently,
    /// later ones succeed.
    pub fn transient_failures(self, subject: &str, n: u32) -> Self {
        self.transient.lock().unwrap().insert(subject.to_string(), n);
        self
    }

    fn default_profile() -> SubjectProfile {
        SubjectProfile {
            category: "Health & Wellness".to_string(),
            topics: vec!["general health".to_string()],
            followers: 100_000,
            yearly_revenue_estimate: 500_000,
            products_count: 2,
        }
    }
}

#[async_trait]
impl ContentGateway for MockGateway {
    async fn fetch_content(
        &self,
        subject: &str,
        _date_range: Option<&DateRange>,
        _keywords: &[String],
    ) -> Result<Vec<ContentItem>, ResearchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut transient = self.transient.lock().unwrap();
            if let Some(remaining) = transient.get_mut(subject) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ResearchError::UpstreamUnavailable(format!(
                        "mock transient failure for {subject}"
                    )));
                }
            }
        }
        if let Some(kind) = self.failing.lock().unwrap().get(subject) {
            return Err(kind.to_error(subject));
        }
        match self.content.lock().unwrap().get(subject) {
            Some(items) => Ok(items.clone()),
            None => Err(ResearchError::NoContentFound(subject.to_string())),
        }
    }

    async fn fetch_profile(&self, subject: &str) -> Result<SubjectProfile, ResearchError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.failing.lock().unwrap().get(subject) {
            return Err(kind.to_error(subject));
        }
        let profiles = self.profiles.lock().unwrap();
        Ok(profiles
            .get(subject)
            .cloned()
            .unwrap_or_else(Self::default_profile))
    }

    async fn discover_candidates(
        &self,
        category: HealthCategory,
        limit: usize,
    ) -> Result<Vec<String>, ResearchError> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        let candidates = self.candidates.lock().unwrap();
        match candidates.get(&category) {
            Some(names) => Ok(names.iter().take(limit).cloned().collect()),
            None => Err(ResearchError::UpstreamUnavailable(format!(
                "no mock candidates for {category}"
            ))),
        }
    }
}

// --- Extractor ---

#[derive(Default)]
pub struct MockExtractor {
    claims: Mutex<HashMap<String, Vec<CandidateClaim>>>,
    // Remaining extraction failures before success.
    fail_times: Mutex<u32>,
    pub calls: AtomicU32,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_subject(self, subject: &str, claims: Vec<CandidateClaim>) -> Self {
        self.claims
            .lock()
            .unwrap()
            .insert(subject.to_string(), claims);
        self
    }

    pub fn fail_times(self, n: u32) -> Self {
        *self.fail_times.lock().unwrap() = n;
        self
    }
}

#[async_trait]
impl ClaimExtraction for MockExtractor {
    async fn extract(
        &self,
        subject: &str,
        items: &[ContentItem],
        limit: usize,
    ) -> Result<Vec<CandidateClaim>, ResearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut fail_times = self.fail_times.lock().unwrap();
            if *fail_times > 0 {
                *fail_times -= 1;
                return Err(ResearchError::ExtractionFailed(
                    "mock extraction failure".to_string(),
                ));
            }
        }
        if let Some(claims) = self.claims.lock().unwrap().get(subject) {
            return Ok(claims.iter().take(limit).cloned().collect());
        }
        // One claim per content item by default.
        Ok(items
            .iter()
            .take(limit)
            .map(|item| CandidateClaim {
                text: format!("claim from: {}", item.text),
                category: HealthCategory::Nutrition,
                observed_at: item.published_at,
            })
            .collect())
    }
}

// --- Verifier ---

/// Scripted outcome for one claim text.
#[derive(Debug, Clone)]
pub enum VerifyBehavior {
    Verified(f64),
    Debunked(f64),
    Questionable(f64),
    /// Never resolves; the caller's per-claim timeout fires.
    Hang,
    /// Fail transiently this many times, then verify at the given score.
    FlakyThenVerified(u32, f64),
}

#[derive(Default)]
pub struct MockVerifier {
    behaviors: Mutex<HashMap<String, VerifyBehavior>>,
    pub calls: AtomicU32,
}

impl MockVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_claim(self, text: &str, behavior: VerifyBehavior) -> Self {
        self.behaviors
            .lock()
            .unwrap()
            .insert(text.to_string(), behavior);
        self
    }

    fn claim(candidate: &CandidateClaim, status: ClaimStatus, score: f64) -> Claim {
        let citations = match status {
            ClaimStatus::Questionable => vec![],
            _ => vec![Citation {
                title: "Randomized controlled trial".to_string(),
                source: "Nature".to_string(),
                url: "https://pubmed.ncbi.nlm.nih.gov/12345678/".to_string(),
            }],
        };
        Claim {
            id: Uuid::new_v4(),
            text: candidate.text.clone(),
            category: candidate.category,
            observed_at: candidate.observed_at,
            status,
            trust_score: score,
            citations,
        }
    }
}

#[async_trait]
impl ClaimVerification for MockVerifier {
    async fn verify(
        &self,
        candidate: &CandidateClaim,
        _journals: &[Journal],
    ) -> Result<Claim, ResearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behaviors.lock().unwrap().get(&candidate.text).cloned();
        match behavior {
            None => Ok(Self::claim(candidate, ClaimStatus::Verified, 80.0)),
            Some(VerifyBehavior::Verified(score)) => {
                Ok(Self::claim(candidate, ClaimStatus::Verified, score))
            }
            Some(VerifyBehavior::Debunked(score)) => {
                Ok(Self::claim(candidate, ClaimStatus::Debunked, score))
            }
            Some(VerifyBehavior::Questionable(score)) => {
                Ok(Self::claim(candidate, ClaimStatus::Questionable, score))
            }
            Some(VerifyBehavior::Hang) => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
            Some(VerifyBehavior::FlakyThenVerified(n, score)) => {
                if n > 0 {
                    self.behaviors.lock().unwrap().insert(
                        candidate.text.clone(),
                        VerifyBehavior::FlakyThenVerified(n - 1, score),
                    );
                    Err(ResearchError::UpstreamUnavailable(
                        "mock verifier outage".to_string(),
                    ))
                } else {
                    Ok(Self::claim(candidate, ClaimStatus::Verified, score))
                }
            }
        }
    }
}
