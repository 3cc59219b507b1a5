use std::fmt;
use std::time::Duration;

use url::Url;

use crate::cli::FetchArgs;

pub const DEFAULT_API_BASE_URL: &str = "https://api.themoviedb.org/3";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("catalog API key is missing (set TMDB_API_KEY or pass --api-key)")]
    MissingApiKey,

    #[error("invalid catalog API base url `{url}`: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("catalog API base url must be http/https: {0}")]
    UnsupportedScheme(String),

    #[error("max attempts must be > 0")]
    ZeroAttempts,
}

/// Settings for [`crate::fetch::FetchClient`], validated once at startup.
#[derive(Clone)]
pub struct FetchConfig {
    pub api_key: String,
    pub base_url: String,
    pub max_attempts: u32,
    pub success_delay: Duration,
    pub default_retry_after: Duration,
    pub request_timeout: Duration,
}

impl FetchConfig {
    pub fn new(api_key: Option<&str>, base_url: &str) -> Result<Self, ConfigError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let parsed = Url::parse(base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: base_url.to_owned(),
            source,
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::UnsupportedScheme(base_url.to_owned()));
        }

        Ok(Self {
            api_key: api_key.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            max_attempts: 3,
            success_delay: Duration::from_millis(500),
            default_retry_after: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        })
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        self.max_attempts = max_attempts;
        Ok(self)
    }

    pub fn with_success_delay(mut self, delay: Duration) -> Self {
        self.success_delay = delay;
        self
    }

    pub fn with_default_retry_after(mut self, wait: Duration) -> Self {
        self.default_retry_after = wait;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn endpoint_url(&self, endpoint_path: &str) -> String {
        let path = endpoint_path.trim_start_matches('/');
        format!("{}/{path}", self.base_url)
    }
}

impl TryFrom<&FetchArgs> for FetchConfig {
    type Error = ConfigError;

    fn try_from(args: &FetchArgs) -> Result<Self, Self::Error> {
        Ok(Self::new(args.api_key.as_deref(), &args.api_base_url)?
            .with_max_attempts(args.max_attempts)?
            .with_success_delay(Duration::from_millis(args.success_delay_ms))
            .with_default_retry_after(Duration::from_secs(args.default_retry_after_secs))
            .with_request_timeout(Duration::from_secs(args.timeout_secs)))
    }
}

impl fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("max_attempts", &self.max_attempts)
            .field("success_delay", &self.success_delay)
            .field("default_retry_after", &self.default_retry_after)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
