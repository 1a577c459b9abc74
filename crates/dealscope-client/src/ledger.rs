//! Folds decoded events into the externally visible run snapshot.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::event::{AnalysisEvent, DecodedEvent, StatusUpdate};

/// Lifecycle of one run as seen by the ledger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No run started, or explicitly reset.
    #[default]
    Idle,
    Running,
    /// A `complete` event arrived; `result` is set.
    Completed,
    /// An `error` event or a transport failure; `error` is set.
    Failed,
    /// Cancelled by the user or superseded by a newer run.
    Cancelled,
    /// The server closed the stream without `complete` or `error`.
    Incomplete,
}

impl RunState {
    pub fn is_running(self) -> bool {
        self == Self::Running
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Incomplete
        )
    }
}

/// Progress of one pipeline phase.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct PhaseRecord {
    /// Phase identity. `None` for synthetic records such as the graph marker.
    pub step: Option<u32>,
    pub message: String,
    pub icon: Option<String>,
    pub done: bool,
    pub elapsed_seconds: Option<f64>,
    /// Total phase count announced by the server, if any.
    pub total: Option<u32>,
}

impl PhaseRecord {
    fn from_status(update: StatusUpdate) -> Self {
        let done = update.is_done();
        Self {
            step: update.phase_step(),
            message: update.message,
            icon: update.icon,
            done,
            elapsed_seconds: update.elapsed,
            total: update.total,
        }
    }

    fn graph_marker(neo4j_available: bool) -> Self {
        let message = if neo4j_available {
            "Relationship graph built in Neo4j"
        } else {
            "Relationship graph ready (local mode)"
        };
        Self {
            step: None,
            message: message.to_string(),
            icon: Some(StatusUpdate::DONE_ICON.to_string()),
            done: true,
            elapsed_seconds: None,
            total: None,
        }
    }
}

/// Immutable view of a run handed to presentation.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct RunSnapshot {
    pub run_id: Option<uuid::Uuid>,
    pub state: RunState,
    /// Phase records in arrival order.
    pub phases: Vec<PhaseRecord>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl RunSnapshot {
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Snapshot of a run that has just started.
    pub(crate) fn started(run_id: uuid::Uuid) -> Self {
        Self {
            run_id: Some(run_id),
            state: RunState::Running,
            ..Self::default()
        }
    }
}

/// Mutable ledger behind a [`RunSnapshot`].
///
/// Besides the snapshot it keeps `step -> index` of the record currently open
/// for each step, so a finishing update lands on the right record without
/// scanning.
#[derive(Clone, Debug, Default)]
pub struct ProgressLedger {
    snapshot: RunSnapshot,
    open_steps: HashMap<u32, usize>,
}

impl ProgressLedger {
    /// Creates an idle ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger for a run that is starting now.
    pub fn started(run_id: uuid::Uuid) -> Self {
        let mut ledger = Self::new();
        ledger.start(run_id);
        ledger
    }

    pub fn snapshot(&self) -> &RunSnapshot {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> RunSnapshot {
        self.snapshot
    }

    /// Clears all state of the previous run and enters `Running`.
    pub fn start(&mut self, run_id: uuid::Uuid) {
        self.snapshot = RunSnapshot::started(run_id);
        self.open_steps.clear();
    }

    /// Back to `Idle` with nothing recorded.
    pub fn reset(&mut self) {
        self.snapshot = RunSnapshot::default();
        self.open_steps.clear();
    }

    /// Pure form of [`ProgressLedger::apply`].
    pub fn fold(mut self, event: &DecodedEvent) -> Self {
        self.apply(event);
        self
    }

    /// Applies one event. Returns whether the snapshot changed.
    ///
    /// Events are ignored unless the run is `Running`.
    pub fn apply(&mut self, event: &DecodedEvent) -> bool {
        if !self.snapshot.is_running() {
            debug!(
                event = "ledger.event_ignored",
                domain = "ledger",
                event_type = %event.event_type,
                state = ?self.snapshot.state
            );
            return false;
        }
        match event.to_analysis_event() {
            AnalysisEvent::Status(update) => {
                self.record_status(update);
                true
            }
            AnalysisEvent::GraphReady { neo4j_available } => {
                self.snapshot
                    .phases
                    .push(PhaseRecord::graph_marker(neo4j_available));
                true
            }
            AnalysisEvent::Complete(result) => {
                self.snapshot.result = Some(result);
                self.finish(RunState::Completed)
            }
            AnalysisEvent::Error { message } => {
                self.snapshot.error = Some(message);
                self.finish(RunState::Failed)
            }
            AnalysisEvent::Other { event_type } => {
                debug!(
                    event = "ledger.event_unhandled",
                    domain = "ledger",
                    event_type = %event_type
                );
                false
            }
        }
    }

    /// Marks the run failed with a transport-level message.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.snapshot.is_running() {
            return false;
        }
        self.snapshot.error = Some(message.into());
        self.finish(RunState::Failed)
    }

    /// Marks the run cancelled. Result and error stay empty.
    pub fn cancel(&mut self) -> bool {
        if !self.snapshot.is_running() {
            return false;
        }
        self.finish(RunState::Cancelled)
    }

    /// The stream closed; without a terminal event the run is `Incomplete`.
    pub fn close_stream(&mut self) -> bool {
        if !self.snapshot.is_running() {
            return false;
        }
        self.finish(RunState::Incomplete)
    }

    fn record_status(&mut self, update: StatusUpdate) {
        let record = PhaseRecord::from_status(update);
        let step = record.step;
        let done = record.done;

        if let Some(step) = step
            && let Some(&idx) = self.open_steps.get(&step)
        {
            self.snapshot.phases[idx] = record;
            if done {
                self.open_steps.remove(&step);
            }
            debug!(
                event = "ledger.phase_updated",
                domain = "ledger",
                step,
                index = idx as u64,
                done
            );
            return;
        }

        let idx = self.snapshot.phases.len();
        self.snapshot.phases.push(record);
        if let Some(step) = step
            && !done
        {
            self.open_steps.insert(step, idx);
        }
        debug!(
            event = "ledger.phase_appended",
            domain = "ledger",
            step = ?step,
            index = idx as u64,
            done
        );
    }

    fn finish(&mut self, state: RunState) -> bool {
        self.snapshot.state = state;
        self.open_steps.clear();
        debug!(
            event = "ledger.run_finished",
            domain = "ledger",
            run_id = ?self.snapshot.run_id,
            state = ?state,
            phases = self.snapshot.phases.len() as u64
        );
        true
    }
}
