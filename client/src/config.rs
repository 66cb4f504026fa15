use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolved connection settings for [`crate::ScriboClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the document, section and agent endpoints (`/api/...`)
    pub api_url: String,
    /// Base URL of `/login` and `/user/...`; usually the same host
    pub auth_url: String,
    /// Per-request timeout enforced by the transport
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url = trim_base(api_url.into());
        Self {
            auth_url: api_url.clone(),
            api_url,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = trim_base(auth_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Directory holding the cached user and session token.
///
/// `SCRIBO_CONFIG_DIR` wins; otherwise `<config dir>/scribo`.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SCRIBO_CONFIG_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scribo")
}

pub fn user_cache_path() -> PathBuf {
    config_dir().join("user.json")
}

pub fn session_token_path() -> PathBuf {
    config_dir().join("session.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_url_defaults_to_api_url() {
        let config = ClientConfig::new("http://api.example.com/");
        assert_eq!(config.api_url, "http://api.example.com");
        assert_eq!(config.auth_url, "http://api.example.com");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn auth_url_override_is_trimmed() {
        let config = ClientConfig::new("http://api").with_auth_url("http://auth:8081//");
        assert_eq!(config.auth_url, "http://auth:8081");
    }
}
