//! Thin client for the server's saved-analysis store and health probe.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::errors::{ClientError, TransportError};

/// One row of `GET /analyses`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AnalysisSummary {
    pub id: i64,
    pub company_name: String,
    #[serde(default)]
    pub sector: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Response of `POST /analyses`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SavedAnalysis {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

/// Full record of `GET /analyses/{id}`. `result` is the terminal payload as
/// it was saved.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StoredAnalysis {
    pub id: i64,
    pub company_name: String,
    #[serde(default)]
    pub sector: Option<String>,
    pub created_at: DateTime<Utc>,
    pub result: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthStatus {
    pub status: String,
    pub openai_configured: bool,
    pub tavily_configured: bool,
    pub neo4j_enabled: bool,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Serialize)]
struct SaveBody<'a> {
    company_name: &'a str,
    sector: Option<&'a str>,
    result: &'a Value,
}

/// Reads `company_info.sector` from a terminal payload, when present.
pub fn sector_of(result: &Value) -> Option<&str> {
    result
        .get("company_info")
        .and_then(|info| info.get("sector"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Formats the age of `created_at` relative to `now` the way the history
/// list shows it: `just now`, `5m ago`, `3h ago`, `2d ago`.
pub fn relative_time(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let mins = (now - created_at).num_minutes();
    if mins < 1 {
        return "just now".to_string();
    }
    if mins < 60 {
        return format!("{mins}m ago");
    }
    let hours = mins / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    format!("{}d ago", hours / 24)
}

#[derive(Clone)]
pub struct HistoryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HistoryClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = config.http_client()?;
        Ok(Self { client, config })
    }

    pub fn with_client(client: reqwest::Client, config: ClientConfig) -> Self {
        Self { client, config }
    }

    /// Lists saved analyses, newest first as returned by the server.
    pub async fn list(&self) -> Result<Vec<AnalysisSummary>, ClientError> {
        let response = send(self.client.get(self.config.analyses_url())).await?;
        let entries: Vec<AnalysisSummary> = decode(check(response, None).await?).await?;
        debug!(
            event = "history.listed",
            domain = "history",
            count = entries.len() as u64
        );
        Ok(entries)
    }

    /// Stores a terminal payload under `company_name`.
    pub async fn save(
        &self,
        company_name: &str,
        sector: Option<&str>,
        result: &Value,
    ) -> Result<SavedAnalysis, ClientError> {
        let company_name = company_name.trim();
        if company_name.is_empty() {
            return Err(ClientError::Validation(
                "company name must not be empty".into(),
            ));
        }
        let body = SaveBody {
            company_name,
            sector,
            result,
        };
        let response = send(self.client.post(self.config.analyses_url()).json(&body)).await?;
        let saved: SavedAnalysis = decode(check(response, None).await?).await?;
        info!(
            event = "history.saved",
            domain = "history",
            id = saved.id,
            company = %company_name
        );
        Ok(saved)
    }

    pub async fn load(&self, id: i64) -> Result<StoredAnalysis, ClientError> {
        let response = send(self.client.get(self.config.analysis_url(id))).await?;
        decode(check(response, Some(id)).await?).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ClientError> {
        let response = send(self.client.delete(self.config.analysis_url(id))).await?;
        check(response, Some(id)).await?;
        info!(event = "history.deleted", domain = "history", id = id);
        Ok(())
    }

    /// Probes `GET /health`.
    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        let response = send(self.client.get(self.config.health_url())).await?;
        decode(check(response, None).await?).await
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<reqwest::Response, ClientError> {
    request
        .send()
        .await
        .map_err(|e| TransportError::Request(e.to_string()).into())
}

/// Maps non-success statuses; a 404 on an id-addressed route is `NotFound`.
async fn check(
    response: reqwest::Response,
    id: Option<i64>,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND
        && let Some(id) = id
    {
        return Err(ClientError::NotFound { id });
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    }
    .into())
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| TransportError::Read(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}
