use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::error::ResearchError;

// --- Taxonomy ---

/// Fixed health claim taxonomy. Claims that don't fit a specific bucket
/// land in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCategory {
    Nutrition,
    Fitness,
    MentalHealth,
    Supplements,
    Medicine,
    Sleep,
    Longevity,
    Other,
}

impl std::fmt::Display for HealthCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthCategory::Nutrition => write!(f, "nutrition"),
            HealthCategory::Fitness => write!(f, "fitness"),
            HealthCategory::MentalHealth => write!(f, "mental_health"),
            HealthCategory::Supplements => write!(f, "supplements"),
            HealthCategory::Medicine => write!(f, "medicine"),
            HealthCategory::Sleep => write!(f, "sleep"),
            HealthCategory::Longevity => write!(f, "longevity"),
            HealthCategory::Other => write!(f, "other"),
        }
    }
}

impl HealthCategory {
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "nutrition" | "diet" | "food" => Self::Nutrition,
            "fitness" | "exercise" | "training" => Self::Fitness,
            "mental_health" | "psychology" | "mindfulness" => Self::MentalHealth,
            "supplements" | "supplement" => Self::Supplements,
            "medicine" | "medical" | "medical_information" => Self::Medicine,
            "sleep" => Self::Sleep,
            "longevity" | "aging" | "anti_aging" => Self::Longevity,
            _ => Self::Other,
        }
    }
}

/// The scientific journals a user can enable for verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Journal {
    PubMedCentral,
    Nature,
    Science,
    Cell,
    TheLancet,
    Nejm,
    JamaNetwork,
}

impl std::fmt::Display for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Journal::PubMedCentral => write!(f, "PubMed Central"),
            Journal::Nature => write!(f, "Nature"),
            Journal::Science => write!(f, "Science"),
            Journal::Cell => write!(f, "Cell"),
            Journal::TheLancet => write!(f, "The Lancet"),
            Journal::Nejm => write!(f, "New England Journal of Medicine"),
            Journal::JamaNetwork => write!(f, "JAMA Network"),
        }
    }
}

impl Journal {
    /// Loose parse for operator-facing inputs. Unknown names are None.
    pub fn from_str_loose(s: &str) -> Option<Journal> {
        match s.trim().to_lowercase().replace([' ', '-', '_', '.'], "").as_str() {
            "pubmedcentral" | "pubmed" | "pmc" => Some(Journal::PubMedCentral),
            "nature" => Some(Journal::Nature),
            "science" => Some(Journal::Science),
            "cell" => Some(Journal::Cell),
            "thelancet" | "lancet" => Some(Journal::TheLancet),
            "nejm" | "newenglandjournalofmedicine" => Some(Journal::Nejm),
            "jamanetwork" | "jama" => Some(Journal::JamaNetwork),
            _ => None,
        }
    }

    pub fn all() -> Vec<Journal> {
        vec![
            Journal::PubMedCentral,
            Journal::Nature,
            Journal::Science,
            Journal::Cell,
            Journal::TheLancet,
            Journal::Nejm,
            Journal::JamaNetwork,
        ]
    }
}

// --- Claims and evidence ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Verified,
    Questionable,
    Debunked,
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimStatus::Verified => write!(f, "verified"),
            ClaimStatus::Questionable => write!(f, "questionable"),
            ClaimStatus::Debunked => write!(f, "debunked"),
        }
    }
}

/// A piece of evidence backing a claim's verification status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub source: String,
    pub url: String,
}

/// A verified claim. Immutable once verification completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub text: String,
    pub category: HealthCategory,
    pub observed_at: DateTime<Utc>,
    pub status: ClaimStatus,
    /// 0-100, monotonic with net evidence strength.
    pub trust_score: f64,
    pub citations: Vec<Citation>,
}

// --- Raw content ---

/// One raw content item returned by the content source gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub text: String,
    pub source_url: String,
    pub published_at: DateTime<Utc>,
}

/// Profile metadata researched alongside content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub category: String,
    pub topics: Vec<String>,
    pub followers: u64,
    pub yearly_revenue_estimate: u64,
    pub products_count: u32,
}

// --- Snapshot ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustPoint {
    pub date: NaiveDate,
    pub score: f64,
}

/// The complete, cached result for one subject at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluencerSnapshot {
    pub id: String,
    pub name: String,
    pub category: String,
    pub topics: Vec<String>,
    pub followers: u64,
    pub yearly_revenue_estimate: u64,
    pub products_count: u32,
    pub claims: Vec<Claim>,
    pub trust_score_history: Vec<TrustPoint>,
    pub current_trust_score: f64,
    /// Set when served from the snapshot cache rather than a live run.
    #[serde(default)]
    pub from_cache: bool,
}

// --- Pipeline stages ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStage {
    Queued,
    GatheringContent,
    ExtractingClaims,
    VerifyingClaims,
    Aggregating,
    Complete,
    Failed,
}

impl std::fmt::Display for ResearchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResearchStage::Queued => write!(f, "queued"),
            ResearchStage::GatheringContent => write!(f, "gathering_content"),
            ResearchStage::ExtractingClaims => write!(f, "extracting_claims"),
            ResearchStage::VerifyingClaims => write!(f, "verifying_claims"),
            ResearchStage::Aggregating => write!(f, "aggregating"),
            ResearchStage::Complete => write!(f, "complete"),
            ResearchStage::Failed => write!(f, "failed"),
        }
    }
}

impl ResearchStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResearchStage::Complete | ResearchStage::Failed)
    }

    /// Position in the fixed pipeline order. `Failed` has no position;
    /// it is reachable from any non-terminal stage.
    pub fn position(&self) -> Option<u8> {
        match self {
            ResearchStage::Queued => Some(0),
            ResearchStage::GatheringContent => Some(1),
            ResearchStage::ExtractingClaims => Some(2),
            ResearchStage::VerifyingClaims => Some(3),
            ResearchStage::Aggregating => Some(4),
            ResearchStage::Complete => Some(5),
            ResearchStage::Failed => None,
        }
    }
}

/// One append-only progress log entry. The only channel through which
/// pollers observe partial progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub stage: ResearchStage,
    pub message: String,
    pub at: DateTime<Utc>,
}

// --- Requests ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Reject ranges before they enter the pipeline: start must precede
    /// end, end cannot be in the future, and the span is capped at 24
    /// months.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), ResearchError> {
        if self.start > self.end {
            return Err(ResearchError::InvalidDateRange(
                "start date must be before end date".to_string(),
            ));
        }
        if self.end > now {
            return Err(ResearchError::InvalidDateRange(
                "end date cannot be in the future".to_string(),
            ));
        }
        let duration_months = (self.end - self.start).num_days() as f64 / 30.0;
        if duration_months > 24.0 {
            return Err(ResearchError::InvalidDateRange(
                "date range cannot exceed 24 months".to_string(),
            ));
        }
        Ok(())
    }

    /// Day-precision normalization used for subject-key hashing, so two
    /// requests for the same calendar window share a job.
    pub fn normalized(&self) -> String {
        format!(
            "{}..{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOptions {
    /// Enabled journals. Empty means the full fixed list.
    pub journals: Vec<Journal>,
    /// Bounded to 10..=100 claims per run.
    pub claims_to_analyze: u32,
    /// Optional keyword hints for content gathering.
    pub keywords: Vec<String>,
}

impl Default for VerificationOptions {
    fn default() -> Self {
        Self {
            journals: Vec::new(),
            claims_to_analyze: 50,
            keywords: Vec::new(),
        }
    }
}

impl VerificationOptions {
    /// Journals to verify against, falling back to the full list.
    pub fn enabled_journals(&self) -> Vec<Journal> {
        if self.journals.is_empty() {
            Journal::all()
        } else {
            let mut js = self.journals.clone();
            js.sort();
            js.dedup();
            js
        }
    }

    pub fn clamped(mut self) -> Self {
        self.claims_to_analyze = self.claims_to_analyze.clamp(10, 100);
        self
    }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct ResearchRequest {
    #[builder(setter(into))]
    pub influencer_name: String,
    #[builder(default)]
    pub date_range: Option<DateRange>,
    #[builder(default)]
    pub options: VerificationOptions,
}

impl ResearchRequest {
    pub fn subject_key(&self) -> String {
        subject_key(&self.influencer_name, self.date_range.as_ref(), &self.options)
    }
}

// --- Subject keys ---

/// Lowercase, whitespace-collapsed slug of a subject name.
pub fn subject_slug(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Derive the single-flight key for a research request. Every parameter
/// that changes the research outcome feeds the hash: date range, journal
/// set, claim budget, keywords. Submissions differing in any of them run
/// as distinct jobs rather than attaching to each other.
pub fn subject_key(
    name: &str,
    date_range: Option<&DateRange>,
    options: &VerificationOptions,
) -> String {
    let range = date_range.map(|r| r.normalized()).unwrap_or_default();
    let journals = options
        .enabled_journals()
        .iter()
        .map(|j| j.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let keywords = options
        .keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect::<Vec<_>>()
        .join(",");

    let mut hasher = Sha256::new();
    hasher.update(range.as_bytes());
    hasher.update(b"|");
    hasher.update(journals.as_bytes());
    hasher.update(b"|");
    hasher.update(options.claims_to_analyze.to_le_bytes());
    hasher.update(b"|");
    hasher.update(keywords.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();

    format!("{}:{}", subject_slug(name), hex)
}

/// Cache key for a subject's snapshot.
pub fn research_cache_key(subject_key: &str) -> String {
    format!("research:{subject_key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn range(days_ago_start: i64, days_ago_end: i64) -> DateRange {
        let now = Utc::now();
        DateRange {
            start: now - Duration::days(days_ago_start),
            end: now - Duration::days(days_ago_end),
        }
    }

    #[test]
    fn subject_key_normalizes_case_and_whitespace() {
        let opts = VerificationOptions::default();
        let a = subject_key("Dr.  Example", None, &opts);
        let b = subject_key("  dr. example ", None, &opts);
        assert_eq!(a, b);
    }

    #[test]
    fn subject_key_distinguishes_date_ranges() {
        let opts = VerificationOptions::default();
        let a = subject_key("Dr. Example", Some(&range(90, 0)), &opts);
        let b = subject_key("Dr. Example", Some(&range(180, 0)), &opts);
        assert_ne!(a, b);
    }

    #[test]
    fn subject_key_distinguishes_journal_sets() {
        let all = VerificationOptions::default();
        let nature_only = VerificationOptions {
            journals: vec![Journal::Nature],
            ..Default::default()
        };
        assert_ne!(
            subject_key("Dr. Example", None, &all),
            subject_key("Dr. Example", None, &nature_only)
        );
    }

    #[test]
    fn subject_key_distinguishes_keywords() {
        let plain = VerificationOptions::default();
        let with_keywords = VerificationOptions {
            keywords: vec!["sleep".to_string(), "supplements".to_string()],
            ..Default::default()
        };
        assert_ne!(
            subject_key("Dr. Example", None, &plain),
            subject_key("Dr. Example", None, &with_keywords)
        );
        // Keyword casing and padding do not split the key.
        let shouty = VerificationOptions {
            keywords: vec![" SLEEP ".to_string(), "Supplements".to_string()],
            ..Default::default()
        };
        assert_eq!(
            subject_key("Dr. Example", None, &with_keywords),
            subject_key("Dr. Example", None, &shouty)
        );
    }

    #[test]
    fn subject_key_distinguishes_claim_budgets() {
        let fifty = VerificationOptions::default();
        let twenty = VerificationOptions {
            claims_to_analyze: 20,
            ..Default::default()
        };
        assert_ne!(
            subject_key("Dr. Example", None, &fifty),
            subject_key("Dr. Example", None, &twenty)
        );
    }

    #[test]
    fn date_range_rejects_inverted() {
        let now = Utc::now();
        let r = DateRange {
            start: now - Duration::days(1),
            end: now - Duration::days(2),
        };
        assert!(matches!(
            r.validate(now),
            Err(ResearchError::InvalidDateRange(_))
        ));
    }

    #[test]
    fn date_range_rejects_future_end() {
        let now = Utc::now();
        let r = DateRange {
            start: now - Duration::days(1),
            end: now + Duration::days(1),
        };
        assert!(r.validate(now).is_err());
    }

    #[test]
    fn date_range_rejects_over_24_months() {
        let now = Utc::now();
        assert!(range(800, 0).validate(now).is_err());
    }

    #[test]
    fn date_range_accepts_valid_window() {
        let r = range(180, 0);
        let now = Utc::now();
        assert!(r.validate(now).is_ok());
    }

    #[test]
    fn options_clamp_claim_count() {
        let low = VerificationOptions {
            claims_to_analyze: 3,
            ..Default::default()
        };
        assert_eq!(low.clamped().claims_to_analyze, 10);

        let high = VerificationOptions {
            claims_to_analyze: 500,
            ..Default::default()
        };
        assert_eq!(high.clamped().claims_to_analyze, 100);
    }

    #[test]
    fn stage_positions_are_ordered() {
        let stages = [
            ResearchStage::Queued,
            ResearchStage::GatheringContent,
            ResearchStage::ExtractingClaims,
            ResearchStage::VerifyingClaims,
            ResearchStage::Aggregating,
            ResearchStage::Complete,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].position().unwrap() < pair[1].position().unwrap());
        }
        assert!(ResearchStage::Failed.position().is_none());
        assert!(ResearchStage::Failed.is_terminal());
    }

    #[test]
    fn category_from_str_loose() {
        assert_eq!(
            HealthCategory::from_str_loose("Mental Health"),
            HealthCategory::MentalHealth
        );
        assert_eq!(
            HealthCategory::from_str_loose("medical information"),
            HealthCategory::Medicine
        );
        assert_eq!(
            HealthCategory::from_str_loose("crystals"),
            HealthCategory::Other
        );
    }

    #[test]
    fn snapshot_from_cache_defaults_false() {
        let json = r#"{
            "id": "dr-example",
            "name": "Dr. Example",
            "category": "Health & Wellness",
            "topics": [],
            "followers": 0,
            "yearly_revenue_estimate": 0,
            "products_count": 0,
            "claims": [],
            "trust_score_history": [],
            "current_trust_score": 0.0
        }"#;
        let snap: InfluencerSnapshot = serde_json::from_str(json).unwrap();
        assert!(!snap.from_cache);
    }
}
