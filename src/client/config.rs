use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::client::error::ClientError;
use crate::listing::DEFAULT_PAGE_LIMIT;

pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(800);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub api_prefix: String,
    pub search_debounce: Duration,
    pub default_limit: u32,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: Url::parse(base_url).map_err(ClientError::InvalidUrl)?,
            api_prefix: "/api".to_string(),
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            default_limit: DEFAULT_PAGE_LIMIT,
            request_timeout: Duration::from_secs(30),
        })
    }

    /// `HR_PORTAL_URL` (required), `HR_PORTAL_API_PREFIX`, `HR_PORTAL_SEARCH_DEBOUNCE_MS`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let base = env::var("HR_PORTAL_URL").context("HR_PORTAL_URL must be set")?;
        let mut config = Self::new(&base).with_context(|| format!("HR_PORTAL_URL is invalid: {base}"))?;

        if let Ok(prefix) = env::var("HR_PORTAL_API_PREFIX") {
            config.api_prefix = prefix;
        }
        if let Ok(ms) = env::var("HR_PORTAL_SEARCH_DEBOUNCE_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .with_context(|| format!("HR_PORTAL_SEARCH_DEBOUNCE_MS has an invalid value: {ms}"))?;
            config.search_debounce = Duration::from_millis(ms);
        }
        Ok(config)
    }

    /// Absolute URL of an API path such as `leave/mine`.
    pub fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        let full = format!(
            "{}/{}",
            self.api_prefix.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        self.base_url.join(&full).map_err(ClientError::InvalidUrl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_prefix_and_path() {
        let config = ClientConfig::new("http://localhost:8080").unwrap();
        assert_eq!(
            config.endpoint("leave/mine").unwrap().as_str(),
            "http://localhost:8080/api/leave/mine"
        );
        assert_eq!(
            config.endpoint("/employees").unwrap().as_str(),
            "http://localhost:8080/api/employees"
        );
    }

    #[test]
    fn defaults_match_table_conventions() {
        let config = ClientConfig::new("http://localhost:8080").unwrap();
        assert_eq!(config.search_debounce, Duration::from_millis(800));
        assert_eq!(config.default_limit, 10);
    }

    #[test]
    fn rejects_relative_base_url() {
        assert!(matches!(
            ClientConfig::new("localhost"),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
