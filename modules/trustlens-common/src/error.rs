use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("No content found for subject: {0}")]
    NoContentFound(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Claim verification timed out after {0}s")]
    VerificationTimeout(u64),

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl ResearchError {
    /// Whether a stage failure with this error is worth retrying.
    /// Only upstream outages are transient; everything else is either
    /// terminal for the subject or handled at claim granularity.
    pub fn is_transient(&self) -> bool {
        matches!(self, ResearchError::UpstreamUnavailable(_))
    }
}
