use std::pin::Pin;

use futures::StreamExt as _;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::errors::{ClientError, TransportError};
use crate::model::RunRequest;

/// Raw response body chunks, in arrival order.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

const EVENT_STREAM: &str = "text/event-stream";

/// Opens the byte stream for one analysis run.
///
/// `HttpEventSource` is the production implementation; tests plug in
/// in-memory sources.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    async fn open(&self, request: &RunRequest) -> Result<ByteStream, TransportError>;
}

/// Streams `POST /analyze` responses from a DealScope server.
#[derive(Clone)]
pub struct HttpEventSource {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpEventSource {
    /// Creates a source with its own HTTP client.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = config.http_client()?;
        Ok(Self { client, config })
    }

    /// Creates a source sharing an existing HTTP client.
    pub fn with_client(client: reqwest::Client, config: ClientConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait::async_trait]
impl EventSource for HttpEventSource {
    async fn open(&self, request: &RunRequest) -> Result<ByteStream, TransportError> {
        let url = self.config.analyze_url();
        debug!(
            event = "transport.request_started",
            domain = "transport",
            url = %url,
            company = %request.company,
            stage = %request.stage
        );
        let response = self
            .client
            .post(&url)
            .header(ACCEPT, EVENT_STREAM)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!(
                event = "transport.request_rejected",
                domain = "transport",
                status = status.as_u16(),
                body_len = body.len() as u64
            );
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            && !content_type.trim_start().starts_with(EVENT_STREAM)
        {
            return Err(TransportError::UnsupportedBody {
                content_type: content_type.to_string(),
            });
        }

        debug!(
            event = "transport.stream_opened",
            domain = "transport",
            status = status.as_u16()
        );
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Read(e.to_string())));
        Ok(Box::pin(bytes))
    }
}
