use std::collections::HashMap;

use serde::Deserialize;

/// `esearch.fcgi?retmode=json` envelope.
#[derive(Debug, Deserialize)]
pub struct ESearchResponse {
    pub esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
pub struct ESearchResult {
    #[serde(default)]
    pub idlist: Vec<String>,
}

/// `esummary.fcgi?retmode=json` envelope. The `result` object maps each
/// pmid to a document summary, plus a `uids` index entry.
#[derive(Debug, Deserialize)]
pub struct ESummaryResponse {
    pub result: ESummaryResult,
}

#[derive(Debug, Deserialize)]
pub struct ESummaryResult {
    #[serde(default)]
    pub uids: Vec<String>,
    #[serde(flatten)]
    pub docs: HashMap<String, serde_json::Value>,
}

/// One article summary, flattened from the esummary document map.
#[derive(Debug, Clone, Deserialize)]
pub struct ArticleSummary {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fulljournalname: String,
    #[serde(default)]
    pub pubdate: String,
}

impl ArticleSummary {
    /// Canonical PubMed URL for this article.
    pub fn url(&self) -> String {
        format!("https://pubmed.ncbi.nlm.nih.gov/{}/", self.uid)
    }
}
