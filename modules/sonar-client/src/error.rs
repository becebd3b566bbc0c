use thiserror::Error;

pub type Result<T> = std::result::Result<T, SonarError>;

#[derive(Debug, Error)]
pub enum SonarError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Empty response from model")]
    EmptyResponse,
}

impl From<reqwest::Error> for SonarError {
    fn from(err: reqwest::Error) -> Self {
        SonarError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SonarError {
    fn from(err: serde_json::Error) -> Self {
        SonarError::Parse(err.to_string())
    }
}
