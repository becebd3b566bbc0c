use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Research provider
    pub sonar_api_key: String,

    // PubMed / Entrez
    pub entrez_email: String,
    pub entrez_api_key: Option<String>,

    // Cache
    pub cache_ttl_hours: u64,

    // Pipeline tunables
    pub stage_retries: u32,
    pub retry_base_secs: u64,
    pub claim_timeout_secs: u64,
    pub verify_concurrency: usize,
    pub discovery_concurrency: usize,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            sonar_api_key: required_env("SONAR_API_KEY"),
            entrez_email: env::var("ENTREZ_EMAIL")
                .unwrap_or_else(|_| "research@trustlens.local".to_string()),
            entrez_api_key: env::var("ENTREZ_API_KEY").ok(),
            cache_ttl_hours: parsed_env("CACHE_TTL_HOURS", 24),
            stage_retries: parsed_env("STAGE_RETRIES", 3),
            retry_base_secs: parsed_env("RETRY_BASE_SECS", 2),
            claim_timeout_secs: parsed_env("CLAIM_TIMEOUT_SECS", 30),
            verify_concurrency: parsed_env("VERIFY_CONCURRENCY", 4),
            discovery_concurrency: parsed_env("DISCOVERY_CONCURRENCY", 3),
        }
    }

    /// Defaults with no provider keys, for offline/mock-backed use.
    pub fn offline() -> Self {
        Self {
            sonar_api_key: String::new(),
            entrez_email: "research@trustlens.local".to_string(),
            entrez_api_key: None,
            cache_ttl_hours: 24,
            stage_retries: 3,
            retry_base_secs: 2,
            claim_timeout_secs: 30,
            verify_concurrency: 4,
            discovery_concurrency: 3,
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number")),
        Err(_) => default,
    }
}
