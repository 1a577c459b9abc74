//! Streaming client for the DealScope diligence server.
//!
//! A run posts a [`RunRequest`] to `/analyze`, decodes the `text/event-stream`
//! response into [`DecodedEvent`]s and folds them into a [`RunSnapshot`] that
//! observers read through a `watch` channel.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dealscope_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let source = HttpEventSource::new(ClientConfig::from_env()?)?;
//! let runner = AnalysisRunner::new(Arc::new(source));
//!
//! let mut run = runner
//!     .submit(RunRequest::new("Acme Robotics").stage("Seed"))
//!     .await?;
//! while let Some(snapshot) = run.next_update().await {
//!     println!("{} phase records", snapshot.phases.len());
//! }
//! let done = run.finish().await?;
//! println!("{:?}", done.state);
//! # Ok(())
//! # }
//! ```

/// Pipeline phase catalog and per-phase progress summaries.
pub mod catalog;
/// Client configuration and URL building.
pub mod config;
/// Incremental `event:`/`data:` frame decoding.
pub mod decoder;
/// Public error types.
pub mod errors;
/// Decoded events and their typed interpretation.
pub mod event;
/// Saved-analysis store and health probe.
pub mod history;
/// Run state, phase records and the fold over events.
pub mod ledger;
/// Run request model.
pub mod model;
/// Tracing subscriber setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Run lifecycle, supersede and cancellation.
pub mod run;
/// Event source seam and the HTTP implementation.
pub mod transport;

pub use catalog::{PhaseCatalog, PhaseSpec, PhaseStatus, PhaseView, ProgressSummary};
pub use config::ClientConfig;
pub use decoder::{FrameDecoder, decode_events};
pub use errors::{ClientError, TransportError};
pub use event::{AnalysisEvent, DecodedEvent, StatusUpdate};
pub use history::{
    AnalysisSummary, HealthStatus, HistoryClient, SavedAnalysis, StoredAnalysis, relative_time,
};
pub use ledger::{PhaseRecord, ProgressLedger, RunSnapshot, RunState};
pub use model::RunRequest;
pub use run::{AbortHandle, AnalysisRunner, RunHandle};
pub use transport::{ByteStream, EventSource, HttpEventSource};
