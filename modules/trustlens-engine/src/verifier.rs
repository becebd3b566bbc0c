use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use pubmed_client::{ArticleSummary, PubMedClient};
use sonar_client::{truncate_to_char_boundary, SonarClient};
use trustlens_common::{Citation, Claim, ClaimStatus, Journal, ResearchError};

use crate::extractor::CandidateClaim;
use crate::traits::ClaimVerification;
use crate::util::response_schema;

/// Per-corroborating-citation score contribution.
const SUPPORT_WEIGHT: f64 = 12.0;
/// Per-contradicting-citation score penalty. Heavier than support so one
/// strong contradiction cannot be outvoted by one weak corroboration.
const CONTRADICT_WEIGHT: f64 = 16.0;

/// Max PubMed articles considered per claim.
const MAX_ARTICLES: u32 = 10;

/// How long a verification verdict is reused before the literature is
/// searched again.
const VERDICT_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// A verification outcome detached from any one subject's claim, so the
/// same assertion repeated across influencers resolves once.
#[derive(Debug, Clone)]
struct Verdict {
    status: ClaimStatus,
    trust_score: f64,
    citations: Vec<Citation>,
}

/// In-memory verdict store keyed on normalized claim text plus journal
/// set. Entries expire after their TTL; stale hits read as misses.
struct VerdictCache {
    entries: Mutex<HashMap<String, (Instant, Verdict)>>,
    ttl: Duration,
}

impl VerdictCache {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    async fn get(&self, key: &str) -> Option<Verdict> {
        let entries = self.entries.lock().await;
        match entries.get(key) {
            Some((stored_at, verdict)) if stored_at.elapsed() < self.ttl => {
                Some(verdict.clone())
            }
            _ => None,
        }
    }

    async fn put(&self, key: String, verdict: Verdict) {
        self.entries
            .lock()
            .await
            .insert(key, (Instant::now(), verdict));
    }
}

/// Cache key for one claim against one journal set. Case and padding do
/// not split entries; the journal set does.
fn verdict_key(text: &str, journals: &[Journal]) -> String {
    let journals = journals
        .iter()
        .map(|j| j.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("{}|{journals}", text.trim().to_lowercase())
}

/// How the provider classifies the retrieved evidence for one claim.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct EvidenceAssessment {
    /// Zero-based indices of studies that support the claim
    #[serde(default)]
    pub supporting: Vec<usize>,
    /// Zero-based indices of studies with findings contradicting the claim
    #[serde(default)]
    pub contradicting: Vec<usize>,
    /// True when at least one study directly contradicts the claim with
    /// high confidence
    #[serde(default)]
    pub strong_contradiction: bool,
}

/// Claim verifier backed by PubMed evidence search plus provider-side
/// evidence classification.
pub struct EvidenceVerifier {
    sonar: SonarClient,
    pubmed: PubMedClient,
    verdicts: VerdictCache,
}

impl EvidenceVerifier {
    pub fn new(sonar: SonarClient, pubmed: PubMedClient) -> Self {
        Self {
            sonar,
            pubmed,
            verdicts: VerdictCache::new(VERDICT_TTL),
        }
    }
}

#[async_trait]
impl ClaimVerification for EvidenceVerifier {
    async fn verify(
        &self,
        claim: &CandidateClaim,
        journals: &[Journal],
    ) -> Result<Claim, ResearchError> {
        let key = verdict_key(&claim.text, journals);
        if let Some(verdict) = self.verdicts.get(&key).await {
            debug!(claim = %claim.text, "Verdict served from cache");
            return Ok(build_claim(
                claim,
                verdict.status,
                verdict.trust_score,
                verdict.citations,
            ));
        }

        let term = truncate_to_char_boundary(&claim.text, 300);

        let articles = self
            .pubmed
            .search_articles(term, MAX_ARTICLES)
            .await
            .map_err(|e| ResearchError::UpstreamUnavailable(e.to_string()))?;

        let articles: Vec<ArticleSummary> = articles
            .into_iter()
            .filter(|a| journal_enabled(&a.fulljournalname, journals))
            .collect();

        if articles.is_empty() {
            debug!(claim = %claim.text, "No evidence found, claim is questionable");
            let verdict = Verdict {
                status: ClaimStatus::Questionable,
                trust_score: score(0, 0),
                citations: vec![],
            };
            self.verdicts.put(key, verdict.clone()).await;
            return Ok(build_claim(claim, verdict.status, verdict.trust_score, verdict.citations));
        }

        let studies = articles
            .iter()
            .enumerate()
            .map(|(i, a)| format!("[{i}] {} ({}, {})", a.title, a.fulljournalname, a.pubdate))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Classify the scientific evidence for this health claim.\n\
             Claim: {}\n\nStudies:\n{studies}\n\
             Respond with JSON matching this schema:\n{}",
            claim.text,
            response_schema::<EvidenceAssessment>()
        );

        let assessment: EvidenceAssessment = self
            .sonar
            .query_json(&prompt)
            .await
            .map_err(|e| ResearchError::UpstreamUnavailable(e.to_string()))?;

        let supporting: Vec<&ArticleSummary> = assessment
            .supporting
            .iter()
            .filter_map(|&i| articles.get(i))
            .collect();
        let contradicting: Vec<&ArticleSummary> = assessment
            .contradicting
            .iter()
            .filter_map(|&i| articles.get(i))
            .collect();

        let status = classify(
            supporting.len(),
            contradicting.len(),
            assessment.strong_contradiction,
        );
        let trust_score = score(supporting.len(), contradicting.len());

        // Corroborating citations first, then contradicting.
        let citations: Vec<Citation> = supporting
            .iter()
            .chain(contradicting.iter())
            .map(|a| Citation {
                title: a.title.clone(),
                source: a.fulljournalname.clone(),
                url: a.url(),
            })
            .collect();

        info!(
            claim = %claim.text,
            %status,
            trust_score,
            citations = citations.len(),
            "Claim verified"
        );
        self.verdicts
            .put(
                key,
                Verdict {
                    status,
                    trust_score,
                    citations: citations.clone(),
                },
            )
            .await;
        Ok(build_claim(claim, status, trust_score, citations))
    }
}

fn build_claim(
    candidate: &CandidateClaim,
    status: ClaimStatus,
    trust_score: f64,
    citations: Vec<Citation>,
) -> Claim {
    Claim {
        id: Uuid::new_v4(),
        text: candidate.text.clone(),
        category: candidate.category,
        observed_at: candidate.observed_at,
        status,
        trust_score,
        citations,
    }
}

/// Decision policy:
/// - debunked requires a high-confidence direct contradiction;
/// - verified requires at least one corroborating citation and no
///   stronger contradicting evidence;
/// - everything else is questionable.
pub fn classify(supporting: usize, contradicting: usize, strong_contradiction: bool) -> ClaimStatus {
    if strong_contradiction && contradicting > 0 {
        ClaimStatus::Debunked
    } else if supporting > 0 && contradicting <= supporting {
        ClaimStatus::Verified
    } else {
        ClaimStatus::Questionable
    }
}

/// Trust score, monotonic with net evidence strength and clamped to
/// [0, 100]. Zero citations sits at the neutral 50.
pub fn score(supporting: usize, contradicting: usize) -> f64 {
    let raw = 50.0 + SUPPORT_WEIGHT * supporting as f64 - CONTRADICT_WEIGHT * contradicting as f64;
    raw.clamp(0.0, 100.0)
}

/// Whether an article's journal is within the user-enabled set.
/// PubMed Central acts as the catch-all: when enabled, every indexed
/// article qualifies.
pub fn journal_enabled(journal_name: &str, enabled: &[Journal]) -> bool {
    if enabled.is_empty() || enabled.contains(&Journal::PubMedCentral) {
        return true;
    }
    let name = journal_name.to_lowercase();
    enabled.iter().any(|j| {
        let needle = match j {
            Journal::PubMedCentral => return true,
            Journal::Nature => "nature",
            Journal::Science => "science",
            Journal::Cell => "cell",
            Journal::TheLancet => "lancet",
            Journal::Nejm => "new england journal of medicine",
            Journal::JamaNetwork => "jama",
        };
        name.contains(needle)
    })
}
