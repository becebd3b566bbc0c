// Trait abstractions for the research pipeline's external dependencies.
//
// ContentGateway wraps the research provider, ClaimExtraction the
// content-to-claims step, ClaimVerification the literature check.
//
// These enable deterministic testing with MockGateway, MockExtractor and
// MockVerifier: no network, no API keys. `cargo test` in seconds.

use async_trait::async_trait;

use trustlens_common::{
    Claim, ContentItem, DateRange, HealthCategory, Journal, ResearchError, SubjectProfile,
};

use crate::extractor::CandidateClaim;

/// Wraps the external content-research provider.
/// Must not touch cache or job state; that is the orchestrator's job.
#[async_trait]
pub trait ContentGateway: Send + Sync {
    /// Fetch raw public content for a subject, optionally scoped to a
    /// date range and keyword hints.
    async fn fetch_content(
        &self,
        subject: &str,
        date_range: Option<&DateRange>,
        keywords: &[String],
    ) -> Result<Vec<ContentItem>, ResearchError>;

    /// Research profile metadata (category, topics, audience, revenue).
    async fn fetch_profile(&self, subject: &str) -> Result<SubjectProfile, ResearchError>;

    /// Resolve candidate influencer names for a health category.
    /// Candidate discovery only, no full research.
    async fn discover_candidates(
        &self,
        category: HealthCategory,
        limit: usize,
    ) -> Result<Vec<String>, ResearchError>;
}

/// Converts raw content into normalized candidate claims.
#[async_trait]
pub trait ClaimExtraction: Send + Sync {
    async fn extract(
        &self,
        subject: &str,
        items: &[ContentItem],
        limit: usize,
    ) -> Result<Vec<CandidateClaim>, ResearchError>;
}

/// Verifies one candidate claim against the enabled scientific sources.
#[async_trait]
pub trait ClaimVerification: Send + Sync {
    async fn verify(
        &self,
        claim: &CandidateClaim,
        journals: &[Journal],
    ) -> Result<Claim, ResearchError>;
}
