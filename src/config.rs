//! Client configuration.

use std::env;
use std::fmt;
use std::time::Duration;

/// Region used when neither the configuration nor the AWS region chain
/// provides one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Configuration for a [`Client`](crate::Client).
///
/// Re-initializing a client replaces the whole configuration, fields are
/// never merged.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct Config {
    /// Resolved through the AWS region chain when absent.
    pub region: Option<String>,
    /// Endpoint override, e.g. `http://localhost:4566` for LocalStack.
    pub endpoint: Option<String>,
    /// Static credentials. When absent the AWS default credential chain
    /// (environment, profiles, SSO, web identity, container and instance
    /// roles) is used.
    pub credentials: Option<Credentials>,
    pub timeout: Option<Duration>,
    pub batch_submit: BatchSubmit,
}

impl Config {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
            endpoint: None,
            credentials: None,
            timeout: None,
            batch_submit: BatchSubmit::default(),
        }
    }

    /// Load region and endpoint from the environment.
    ///
    /// Reads `AWS_REGION` / `AWS_DEFAULT_REGION` and `KINESIS_ENDPOINT` /
    /// `AWS_ENDPOINT_URL_KINESIS`. Credentials are left to the AWS default
    /// credential chain.
    pub fn from_env() -> Self {
        Self {
            region: non_empty_var("AWS_REGION").or_else(|| non_empty_var("AWS_DEFAULT_REGION")),
            endpoint: non_empty_var("KINESIS_ENDPOINT")
                .or_else(|| non_empty_var("AWS_ENDPOINT_URL_KINESIS")),
            ..Self::default()
        }
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn batch_submit(mut self, mode: BatchSubmit) -> Self {
        self.batch_submit = mode;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: None,
            endpoint: None,
            credentials: None,
            timeout: None,
            batch_submit: BatchSubmit::default(),
        }
    }
}

/// How the batches of one write are submitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BatchSubmit {
    /// One batch at a time, in input order.
    #[default]
    Sequential,
    /// Up to `max_in_flight` batches at once.
    Concurrent { max_in_flight: usize },
}

/// Static AWS credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

// Keep secrets out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("has_session_token", &self.session_token.is_some())
            .finish()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_setters() {
        let config = Config::default()
            .region("eu-west-1")
            .endpoint("http://localhost:4566")
            .timeout(Duration::from_secs(5));
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:4566"));
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(Config::new("eu-west-1").region, config.region);
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let creds = Credentials::new("AKID", "super-secret").session_token("tok");
        let printed = format!("{creds:?}");
        assert!(printed.contains("AKID"));
        assert!(!printed.contains("super-secret"));
        assert!(!printed.contains("tok\""));
    }

    #[test]
    fn test_builder_defaults() {
        let config = Config::default();
        assert!(config.region.is_none());
        assert!(config.endpoint.is_none());
        assert_eq!(config.batch_submit, BatchSubmit::Sequential);
        assert!(config.credentials.is_none());
    }
}
