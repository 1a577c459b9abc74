use std::time::Duration;

use crate::errors::ClientError;

/// Server used when `DEALSCOPE_BASE_URL` is unset.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Configuration shared by the analysis stream and the history client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the DealScope server.
    pub base_url: String,
    /// Optional limit on establishing the TCP/TLS connection.
    ///
    /// No request timeout is applied; a run streams for minutes.
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl ClientConfig {
    /// Creates a config pointing at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Builds a config from `DEALSCOPE_BASE_URL` and
    /// `DEALSCOPE_CONNECT_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ClientError> {
        let mut config = match std::env::var("DEALSCOPE_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => Self::new(url.trim()),
            _ => Self::default(),
        };
        if let Ok(raw) = std::env::var("DEALSCOPE_CONNECT_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                ClientError::Config(format!(
                    "DEALSCOPE_CONNECT_TIMEOUT_SECS must be a whole number of seconds, got {raw:?}"
                ))
            })?;
            config.connect_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the connect timeout (`None` disables it).
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(ClientError::Config("base_url must not be empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "base_url must start with http:// or https://, got {url}"
            )));
        }
        Ok(())
    }

    /// Builds the shared HTTP client. No overall timeout is set.
    pub fn http_client(&self) -> Result<reqwest::Client, ClientError> {
        self.validate()?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim().trim_end_matches('/'), path)
    }

    pub(crate) fn analyze_url(&self) -> String {
        self.url("analyze")
    }

    pub(crate) fn analyses_url(&self) -> String {
        self.url("analyses")
    }

    pub(crate) fn analysis_url(&self, id: i64) -> String {
        self.url(&format!("analyses/{id}"))
    }

    pub(crate) fn health_url(&self) -> String {
        self.url("health")
    }
}
