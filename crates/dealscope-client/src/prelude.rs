//! Common imports for driving a run and reading its progress.
pub use crate::{
    AbortHandle, AnalysisEvent, AnalysisRunner, ClientConfig, ClientError, DecodedEvent,
    HistoryClient, HttpEventSource, PhaseCatalog, ProgressSummary, RunHandle, RunRequest,
    RunSnapshot, RunState,
};
