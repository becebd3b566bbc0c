use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};

use sonar_client::{SonarClient, SonarError};
use trustlens_common::{ContentItem, DateRange, HealthCategory, ResearchError, SubjectProfile};

use crate::traits::ContentGateway;
use crate::util::{parse_datetime_loose, response_schema};

/// What the provider returns for a content-gathering query.
#[derive(Debug, Deserialize, JsonSchema)]
struct ContentResponse {
    #[serde(default)]
    items: Vec<RawContentItem>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RawContentItem {
    /// Verbatim or closely paraphrased content snippet
    text: String,
    /// URL of the post/video/article the snippet came from
    #[serde(default)]
    source_url: String,
    /// ISO date the content was published
    #[serde(default)]
    published_at: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ProfileResponse {
    /// Primary content category, e.g. "Health & Wellness"
    #[serde(default)]
    category: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    followers: u64,
    /// Estimated yearly revenue in USD
    #[serde(default)]
    yearly_revenue_estimate: u64,
    /// Number of products sold or promoted
    #[serde(default)]
    products_count: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DiscoverResponse {
    /// Influencer names, most prominent first
    #[serde(default)]
    influencers: Vec<String>,
}

/// Content source gateway backed by the Sonar research API.
pub struct SonarGateway {
    client: SonarClient,
}

impl SonarGateway {
    pub fn new(client: SonarClient) -> Self {
        Self { client }
    }

    fn map_err(err: SonarError) -> ResearchError {
        // Any provider-side failure (transport, 5xx, malformed body) is an
        // upstream outage from the pipeline's point of view.
        ResearchError::UpstreamUnavailable(err.to_string())
    }
}

#[async_trait]
impl ContentGateway for SonarGateway {
    async fn fetch_content(
        &self,
        subject: &str,
        date_range: Option<&DateRange>,
        keywords: &[String],
    ) -> Result<Vec<ContentItem>, ResearchError> {
        let focus = if keywords.is_empty() {
            "all health topics".to_string()
        } else {
            keywords.join(", ")
        };
        let window = date_range
            .map(|r| format!("Focus on content published between {}.", r.normalized()))
            .unwrap_or_default();

        let prompt = format!(
            "Gather recent public content from health influencer {subject}: \
             social media posts, video transcripts, podcast statements, articles. \
             Keywords to focus on: {focus}. {window}\n\
             Respond with JSON matching this schema:\n{}",
            response_schema::<ContentResponse>()
        );

        info!(subject, "Gathering content via research provider");
        let response: ContentResponse =
            self.client.query_json(&prompt).await.map_err(Self::map_err)?;

        let now = chrono::Utc::now();
        let items: Vec<ContentItem> = response
            .items
            .into_iter()
            .filter(|raw| !raw.text.trim().is_empty())
            .map(|raw| ContentItem {
                published_at: parse_datetime_loose(&raw.published_at).unwrap_or(now),
                text: raw.text,
                source_url: raw.source_url,
            })
            .collect();

        if items.is_empty() {
            return Err(ResearchError::NoContentFound(subject.to_string()));
        }

        info!(subject, count = items.len(), "Gathered content items");
        Ok(items)
    }

    async fn fetch_profile(&self, subject: &str) -> Result<SubjectProfile, ResearchError> {
        let prompt = format!(
            "Return factual profile data for health influencer {subject}: \
             primary category, main topics, follower count across platforms, \
             estimated yearly revenue in USD, and number of products sold. \
             Use real data only.\n\
             Respond with JSON matching this schema:\n{}",
            response_schema::<ProfileResponse>()
        );

        let response: ProfileResponse =
            self.client.query_json(&prompt).await.map_err(Self::map_err)?;

        Ok(SubjectProfile {
            category: if response.category.is_empty() {
                "Health & Wellness".to_string()
            } else {
                response.category
            },
            topics: response.topics,
            followers: response.followers,
            yearly_revenue_estimate: response.yearly_revenue_estimate,
            products_count: response.products_count,
        })
    }

    async fn discover_candidates(
        &self,
        category: HealthCategory,
        limit: usize,
    ) -> Result<Vec<String>, ResearchError> {
        let prompt = format!(
            "List up to {limit} prominent health influencers currently active \
             in the {category} field. Names only, no commentary.\n\
             Respond with JSON matching this schema:\n{}",
            response_schema::<DiscoverResponse>()
        );

        info!(%category, limit, "Discovering candidate influencers");
        let response: DiscoverResponse =
            self.client.query_json(&prompt).await.map_err(Self::map_err)?;

        let names: Vec<String> = response
            .influencers
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .take(limit)
            .collect();

        if names.is_empty() {
            warn!(%category, "Provider returned no candidates");
        }
        Ok(names)
    }
}
