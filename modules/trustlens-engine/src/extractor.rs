use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sonar_client::{truncate_to_char_boundary, SonarClient};
use trustlens_common::{ContentItem, HealthCategory, ResearchError};

use crate::traits::ClaimExtraction;
use crate::util::{parse_datetime_loose, response_schema};

/// Truncation bound for the combined content block sent to the model.
const MAX_CONTENT_BYTES: usize = 30_000;

/// A normalized candidate claim, ready for verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateClaim {
    pub text: String,
    pub category: HealthCategory,
    pub observed_at: DateTime<Utc>,
}

/// What the model returns for each extracted claim.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExtractedClaim {
    /// The discrete factual claim, one assertion per entry
    pub text: String,
    /// Category: nutrition, fitness, mental_health, supplements,
    /// medicine, sleep, longevity, or other
    #[serde(default)]
    pub category: String,
    /// Zero-based index of the content item the claim came from
    #[serde(default)]
    pub source_index: Option<usize>,
    /// ISO date the claim was made, if stated in the content
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ExtractionResponse {
    #[serde(default)]
    pub claims: Vec<ExtractedClaim>,
}

const EXTRACTION_PROMPT_HEADER: &str = "Extract every discrete health-related factual claim from the \
content below. One assertion per claim; split compound statements. Skip opinions, personal \
anecdotes and promotional copy without a factual assertion. Remove duplicate claims.";

/// Claim extractor backed by the Sonar research API.
pub struct SonarExtractor {
    client: SonarClient,
}

impl SonarExtractor {
    pub fn new(client: SonarClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClaimExtraction for SonarExtractor {
    async fn extract(
        &self,
        subject: &str,
        items: &[ContentItem],
        limit: usize,
    ) -> Result<Vec<CandidateClaim>, ResearchError> {
        let mut block = String::new();
        for (i, item) in items.iter().enumerate() {
            block.push_str(&format!(
                "[{i}] ({} | {})\n{}\n\n",
                item.published_at.format("%Y-%m-%d"),
                item.source_url,
                item.text
            ));
        }
        let block = truncate_to_char_boundary(&block, MAX_CONTENT_BYTES);

        let prompt = format!(
            "{EXTRACTION_PROMPT_HEADER}\n\nSubject: {subject}\n\n{block}\n\
             Respond with JSON matching this schema:\n{}",
            response_schema::<ExtractionResponse>()
        );

        let response: ExtractionResponse = self
            .client
            .query_json(&prompt)
            .await
            .map_err(|e| ResearchError::ExtractionFailed(e.to_string()))?;

        let claims = normalize_claims(response, items, limit);
        info!(subject, count = claims.len(), "Extracted candidate claims");
        Ok(claims)
    }
}

/// Case/whitespace-insensitive normalization used for dedup.
pub fn normalize_claim_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map raw extracted claims to candidates: infer the taxonomy category,
/// resolve the observed date from the source item, dedup, and drop
/// malformed entries (a claim either has text + category + date or it is
/// dropped, never partially emitted).
pub fn normalize_claims(
    response: ExtractionResponse,
    items: &[ContentItem],
    limit: usize,
) -> Vec<CandidateClaim> {
    let fallback_date = items
        .iter()
        .map(|i| i.published_at)
        .max()
        .unwrap_or_else(Utc::now);

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    for raw in response.claims {
        let text = raw.text.trim().to_string();
        if text.is_empty() {
            warn!("Dropping claim with empty text");
            continue;
        }

        let key = normalize_claim_text(&text);
        if !seen.insert(key) {
            continue;
        }

        let observed_at = raw
            .source_index
            .and_then(|i| items.get(i))
            .map(|item| item.published_at)
            .or_else(|| raw.date.as_deref().and_then(parse_datetime_loose))
            .unwrap_or(fallback_date);

        out.push(CandidateClaim {
            text,
            category: HealthCategory::from_str_loose(&raw.category),
            observed_at,
        });

        if out.len() >= limit {
            break;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn items() -> Vec<ContentItem> {
        let now = Utc::now();
        vec![
            ContentItem {
                text: "post one".to_string(),
                source_url: "https://example.com/1".to_string(),
                published_at: now - Duration::days(10),
            },
            ContentItem {
                text: "post two".to_string(),
                source_url: "https://example.com/2".to_string(),
                published_at: now - Duration::days(2),
            },
        ]
    }

    fn raw(text: &str, category: &str, source_index: Option<usize>) -> ExtractedClaim {
        ExtractedClaim {
            text: text.to_string(),
            category: category.to_string(),
            source_index,
            date: None,
        }
    }

    #[test]
    fn dedup_is_case_and_whitespace_insensitive() {
        let response = ExtractionResponse {
            claims: vec![
                raw("Creatine improves memory", "supplements", Some(0)),
                raw("creatine  improves   MEMORY", "supplements", Some(1)),
            ],
        };
        let claims = normalize_claims(response, &items(), 50);
        assert_eq!(claims.len(), 1);
    }

    #[test]
    fn empty_text_is_dropped_not_partially_emitted() {
        let response = ExtractionResponse {
            claims: vec![raw("   ", "nutrition", Some(0)), raw("Real claim", "nutrition", Some(0))],
        };
        let claims = normalize_claims(response, &items(), 50);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].text, "Real claim");
    }

    #[test]
    fn observed_date_comes_from_source_item() {
        let its = items();
        let response = ExtractionResponse {
            claims: vec![raw("Sleep 8 hours", "sleep", Some(1))],
        };
        let claims = normalize_claims(response, &its, 50);
        assert_eq!(claims[0].observed_at, its[1].published_at);
    }

    #[test]
    fn out_of_range_index_falls_back_to_latest_item() {
        let its = items();
        let response = ExtractionResponse {
            claims: vec![raw("Sunlight cures colds", "medicine", Some(99))],
        };
        let claims = normalize_claims(response, &its, 50);
        assert_eq!(claims[0].observed_at, its[1].published_at);
    }

    #[test]
    fn unknown_category_lands_in_other() {
        let response = ExtractionResponse {
            claims: vec![raw("Magnet therapy works", "energy healing", Some(0))],
        };
        let claims = normalize_claims(response, &items(), 50);
        assert_eq!(claims[0].category, HealthCategory::Other);
    }

    #[test]
    fn limit_caps_claim_count() {
        let response = ExtractionResponse {
            claims: (0..30)
                .map(|i| raw(&format!("claim number {i}"), "fitness", Some(0)))
                .collect(),
        };
        let claims = normalize_claims(response, &items(), 10);
        assert_eq!(claims.len(), 10);
    }
}
