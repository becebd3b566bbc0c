pub mod error;
pub mod types;

pub use error::{PubMedError, Result};
pub use types::{ArticleSummary, ESearchResponse, ESummaryResponse};

const BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Client for NCBI Entrez E-utilities, scoped to the `pubmed` database.
#[derive(Clone)]
pub struct PubMedClient {
    http: reqwest::Client,
    base_url: String,
    email: String,
    api_key: Option<String>,
}

impl PubMedClient {
    pub fn new(email: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: BASE_URL.to_string(),
            email: email.into(),
            api_key,
        }
    }

    /// Override the API base URL (for tests against a local stub).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    fn common_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("retmode", "json".to_string()),
            ("email", self.email.clone()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    /// Search PubMed for article IDs, sorted by relevance.
    pub async fn search(&self, term: &str, max_results: u32) -> Result<Vec<String>> {
        let url = format!("{}/esearch.fcgi", self.base_url);
        let mut params = self.common_params();
        params.push(("term", term.to_string()));
        params.push(("retmax", max_results.to_string()));
        params.push(("sort", "relevance".to_string()));

        let resp = self.http.get(&url).query(&params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PubMedError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: ESearchResponse = resp.json().await?;
        Ok(parsed.esearchresult.idlist)
    }

    /// Fetch document summaries for a set of PMIDs.
    pub async fn summaries(&self, ids: &[String]) -> Result<Vec<ArticleSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/esummary.fcgi", self.base_url);
        let mut params = self.common_params();
        params.push(("id", ids.join(",")));

        let resp = self.http.get(&url).query(&params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PubMedError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: ESummaryResponse = resp.json().await?;
        let mut articles = Vec::new();
        for uid in &parsed.result.uids {
            if let Some(doc) = parsed.result.docs.get(uid) {
                match serde_json::from_value::<ArticleSummary>(doc.clone()) {
                    Ok(mut article) => {
                        if article.uid.is_empty() {
                            article.uid = uid.clone();
                        }
                        articles.push(article);
                    }
                    Err(e) => {
                        tracing::warn!(uid, error = %e, "Skipping unparseable article summary");
                    }
                }
            }
        }
        Ok(articles)
    }

    /// Search PubMed end-to-end: find IDs, then fetch their summaries.
    pub async fn search_articles(
        &self,
        term: &str,
        max_results: u32,
    ) -> Result<Vec<ArticleSummary>> {
        tracing::info!(term, max_results, "Searching PubMed");

        let ids = self.search(term, max_results).await?;
        if ids.is_empty() {
            tracing::info!(term, "No PubMed results");
            return Ok(Vec::new());
        }

        let articles = self.summaries(&ids).await?;
        tracing::info!(count = articles.len(), "Fetched PubMed article summaries");
        Ok(articles)
    }
}
