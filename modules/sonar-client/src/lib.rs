pub mod error;
pub mod types;
pub mod util;

pub use error::{Result, SonarError};
pub use types::{ChatMessage, ChatRequest, ChatResponse};
pub use util::{strip_code_blocks, truncate_to_char_boundary};

use serde::de::DeserializeOwned;
use tracing::debug;

const SONAR_API_URL: &str = "https://api.perplexity.ai";

const DEFAULT_MODEL: &str = "sonar-pro";

/// System preamble that keeps the model answering in bare JSON. Every
/// structured call goes through this; analysis belongs inside JSON fields.
const JSON_SYSTEM_PROMPT: &str = "You are a JSON-focused API that always responds with valid JSON. \
Never include explanatory text outside the JSON structure. All analysis and \
explanations should be contained within the JSON fields.";

/// Client for the Sonar chat-completions research API.
#[derive(Clone)]
pub struct SonarClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl SonarClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: SONAR_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Override the API base URL (for tests against a local stub).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Send a prompt and return the raw text of the first choice.
    pub async fn query(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(JSON_SYSTEM_PROMPT),
                ChatMessage::user(prompt),
            ],
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %request.model, "Sonar chat request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SonarError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(SonarError::EmptyResponse)?;

        if content.trim().is_empty() {
            return Err(SonarError::EmptyResponse);
        }

        Ok(content)
    }

    /// Send a prompt and deserialize the JSON body of the response.
    /// Tolerates markdown code fences around the JSON.
    pub async fn query_json<T: DeserializeOwned>(&self, prompt: &str) -> Result<T> {
        let text = self.query(prompt).await?;
        let json = strip_code_blocks(&text);
        Ok(serde_json::from_str(json)?)
    }
}
