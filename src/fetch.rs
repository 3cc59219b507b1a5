use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::config::FetchConfig;

/// Blocks the calling stage between attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("{method} {url} returned {status}")]
    Status {
        method: Method,
        url: String,
        status: StatusCode,
    },

    #[error("{method} {url}: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("decode json from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

enum Attempt {
    Success(Value),
    NoData(StatusCode),
    Retryable { error: FetchError, wait: Duration },
    Fatal(FetchError),
}

pub struct FetchClient<S = ThreadSleeper> {
    http: reqwest::blocking::Client,
    config: FetchConfig,
    sleeper: S,
}

impl FetchClient<ThreadSleeper> {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        Self::with_sleeper(config, ThreadSleeper)
    }
}

impl<S: Sleeper> FetchClient<S> {
    pub fn with_sleeper(config: FetchConfig, sleeper: S) -> Result<Self, FetchError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            http,
            config,
            sleeper,
        })
    }

    pub fn get(
        &self,
        endpoint_path: &str,
        params: &[(&str, String)],
    ) -> Result<Option<Value>, FetchError> {
        self.fetch(endpoint_path, params, Method::GET)
    }

    /// Calls `endpoint_path` with the API key injected and returns the JSON body.
    ///
    /// `Ok(None)` means the API answered 401 or 404. 429 and 5xx responses are
    /// retried after a wait, other failures are retried immediately, and the
    /// last error is returned once `max_attempts` is used up.
    pub fn fetch(
        &self,
        endpoint_path: &str,
        params: &[(&str, String)],
        method: Method,
    ) -> Result<Option<Value>, FetchError> {
        let url = self.config.endpoint_url(endpoint_path);
        let query = self.authenticated_query(params);
        let max_attempts = self.config.max_attempts.max(1);

        let mut attempt = 1_u32;
        loop {
            match self.attempt(&method, &url, &query, attempt) {
                Attempt::Success(value) => {
                    if !self.config.success_delay.is_zero() {
                        self.sleeper.sleep(self.config.success_delay);
                    }
                    return Ok(Some(value));
                }
                Attempt::NoData(status) => {
                    tracing::warn!(%method, %url, %status, "catalog returned no data; not retrying");
                    return Ok(None);
                }
                Attempt::Fatal(error) => return Err(error),
                Attempt::Retryable { error, wait } => {
                    if attempt >= max_attempts {
                        tracing::error!(attempt, max_attempts, error = %error, "request failed; attempts exhausted");
                        return Err(error);
                    }
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        wait_secs = wait.as_secs_f64(),
                        error = %error,
                        "request failed; retrying"
                    );
                    if !wait.is_zero() {
                        self.sleeper.sleep(wait);
                    }
                }
            }
            attempt += 1;
        }
    }

    fn attempt(
        &self,
        method: &Method,
        url: &str,
        query: &[(&str, String)],
        attempt: u32,
    ) -> Attempt {
        let transport = |source: reqwest::Error| FetchError::Transport {
            method: method.clone(),
            url: url.to_owned(),
            source: source.without_url(),
        };

        let response = match self
            .http
            .request(method.clone(), url)
            .query(query)
            .header(USER_AGENT, concat!("kdrama-pipeline/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "application/json")
            .send()
        {
            Ok(response) => response,
            Err(err) => {
                return Attempt::Retryable {
                    error: transport(err),
                    wait: Duration::ZERO,
                };
            }
        };

        let status = response.status();
        if status.is_success() {
            let body = match response.bytes() {
                Ok(body) => body,
                Err(err) => {
                    return Attempt::Retryable {
                        error: transport(err),
                        wait: Duration::ZERO,
                    };
                }
            };
            return match serde_json::from_slice(&body) {
                Ok(value) => Attempt::Success(value),
                Err(source) => Attempt::Fatal(FetchError::Decode {
                    url: url.to_owned(),
                    source,
                }),
            };
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::NOT_FOUND {
            return Attempt::NoData(status);
        }

        let wait = if status == StatusCode::TOO_MANY_REQUESTS {
            retry_after(response.headers()).unwrap_or(self.config.default_retry_after)
        } else if status.is_server_error() {
            Duration::from_secs(u64::from(attempt) * 2)
        } else {
            Duration::ZERO
        };

        Attempt::Retryable {
            error: FetchError::Status {
                method: method.clone(),
                url: url.to_owned(),
                status,
            },
            wait,
        }
    }

    fn authenticated_query<'a>(&self, params: &[(&'a str, String)]) -> Vec<(&'a str, String)> {
        let mut query = params.to_vec();
        if !query.iter().any(|(key, _)| *key == "api_key") {
            query.push(("api_key", self.config.api_key.clone()));
        }
        query
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
