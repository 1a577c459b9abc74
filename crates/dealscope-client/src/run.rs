use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument as _, debug, info, warn};

use crate::decoder::{abort_requested, aborted, decode_events};
use crate::errors::ClientError;
use crate::ledger::{ProgressLedger, RunSnapshot};
use crate::model::RunRequest;
use crate::observability::run_span;
use crate::transport::EventSource;

/// Handle used to request cancellation of a running analysis.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, rx)
    }

    /// Requests cancellation.
    ///
    /// The run ends as `RunState::Cancelled`; cancellation is never reported
    /// as an error.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

struct ActiveRun {
    run_id: uuid::Uuid,
    abort: AbortHandle,
    task: JoinHandle<()>,
}

impl ActiveRun {
    /// Cancels the run if it is still going and waits for its task to stop.
    async fn retire(self) {
        if !self.task.is_finished() && !self.abort.is_aborted() {
            debug!(event = "run.retiring", domain = "run", run_id = %self.run_id);
            self.abort.abort();
        }
        if let Err(err) = self.task.await {
            warn!(event = "run.task_failed", domain = "run", run_id = %self.run_id, error = %err);
        }
    }
}

struct RunnerInner {
    source: Arc<dyn EventSource>,
    snapshots: Arc<watch::Sender<RunSnapshot>>,
    active: Mutex<Option<ActiveRun>>,
}

/// Owns the single active analysis run of one client.
///
/// Submitting while a run is active supersedes it: the previous run is
/// cancelled and its task has stopped before the new run's empty snapshot is
/// published.
#[derive(Clone)]
pub struct AnalysisRunner {
    inner: Arc<RunnerInner>,
}

impl AnalysisRunner {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        let (snapshots, _) = watch::channel(RunSnapshot::default());
        Self {
            inner: Arc::new(RunnerInner {
                source,
                snapshots: Arc::new(snapshots),
                active: Mutex::new(None),
            }),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> RunSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    /// Receiver that observes every published snapshot, across runs.
    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Starts a run, superseding any run still in flight.
    pub async fn submit(&self, request: RunRequest) -> Result<RunHandle, ClientError> {
        let request = request.validated()?;

        let mut active = self.inner.active.lock().await;
        if let Some(previous) = active.take() {
            previous.retire().await;
        }

        let run_id = uuid::Uuid::new_v4();
        let ledger = ProgressLedger::started(run_id);
        self.inner.snapshots.send_replace(ledger.snapshot().clone());
        // Nothing else publishes until the task below is spawned.
        let updates = self.inner.snapshots.subscribe();

        let (abort, abort_rx) = AbortHandle::new();
        let (final_tx, final_rx) = oneshot::channel();
        info!(
            event = "run.started",
            domain = "run",
            run_id = %run_id,
            company = %request.company,
            stage = %request.stage,
            exit_type = %request.exit_type
        );
        let span = run_span(run_id, &request);
        let task = tokio::spawn(
            drive_run(
                self.inner.source.clone(),
                request,
                ledger,
                self.inner.snapshots.clone(),
                abort_rx,
                final_tx,
            )
            .instrument(span),
        );
        *active = Some(ActiveRun {
            run_id,
            abort: abort.clone(),
            task,
        });

        Ok(RunHandle {
            run_id,
            updates,
            final_rx,
            abort,
            saw_terminal: false,
        })
    }

    /// Cancels the active run, if any, and waits for it to stop.
    pub async fn cancel(&self) {
        let previous = self.inner.active.lock().await.take();
        if let Some(previous) = previous {
            previous.retire().await;
        }
    }

    /// Cancels the active run and returns to an idle snapshot.
    pub async fn reset(&self) {
        let mut active = self.inner.active.lock().await;
        if let Some(previous) = active.take() {
            previous.retire().await;
        }
        self.inner.snapshots.send_replace(RunSnapshot::default());
    }
}

/// Per-run view returned by [`AnalysisRunner::submit`].
pub struct RunHandle {
    run_id: uuid::Uuid,
    updates: watch::Receiver<RunSnapshot>,
    final_rx: oneshot::Receiver<RunSnapshot>,
    abort: AbortHandle,
    saw_terminal: bool,
}

impl RunHandle {
    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    /// Returns a handle that can cancel this run.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Waits for the next published snapshot of this run.
    ///
    /// Intermediate snapshots may be coalesced. Returns `None` after the
    /// terminal snapshot was delivered or once a newer run replaced this one.
    pub async fn next_update(&mut self) -> Option<RunSnapshot> {
        if self.saw_terminal {
            return None;
        }
        self.updates.changed().await.ok()?;
        let snapshot = self.updates.borrow_and_update().clone();
        if snapshot.run_id != Some(self.run_id) {
            self.saw_terminal = true;
            return None;
        }
        if !snapshot.is_running() {
            self.saw_terminal = true;
        }
        Some(snapshot)
    }

    /// Waits for the run to end and returns its final snapshot.
    pub async fn finish(self) -> Result<RunSnapshot, ClientError> {
        self.final_rx.await.map_err(|_| {
            ClientError::protocol_msg(format!(
                "run task {} ended without a final snapshot",
                self.run_id
            ))
        })
    }
}

/// Publishes `ledger` unless a newer run already owns the channel.
fn publish(snapshots: &watch::Sender<RunSnapshot>, ledger: &ProgressLedger) -> bool {
    snapshots.send_if_modified(|current| {
        if current.run_id != ledger.snapshot().run_id {
            return false;
        }
        *current = ledger.snapshot().clone();
        true
    })
}

async fn drive_run(
    source: Arc<dyn EventSource>,
    request: RunRequest,
    mut ledger: ProgressLedger,
    snapshots: Arc<watch::Sender<RunSnapshot>>,
    mut abort_rx: watch::Receiver<bool>,
    final_tx: oneshot::Sender<RunSnapshot>,
) {
    let run_id = ledger.snapshot().run_id;

    let opened = tokio::select! {
        biased;
        _ = aborted(&mut abort_rx) => None,
        opened = source.open(&request) => Some(opened),
    };
    match opened {
        None => {
            ledger.cancel();
        }
        Some(Err(err)) => {
            warn!(event = "run.transport_failed", domain = "run", run_id = ?run_id, error = %err);
            ledger.fail(err.to_string());
        }
        Some(Ok(bytes)) => {
            let mut events = Box::pin(decode_events(bytes, abort_rx.clone()));
            loop {
                match events.next().await {
                    Some(Ok(event)) => {
                        if !ledger.apply(&event) {
                            continue;
                        }
                        if ledger.snapshot().state.is_terminal() {
                            break;
                        }
                        if !publish(&snapshots, &ledger) {
                            debug!(event = "run.superseded", domain = "run", run_id = ?run_id);
                            ledger.cancel();
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        warn!(event = "run.transport_failed", domain = "run", run_id = ?run_id, error = %err);
                        ledger.fail(err.to_string());
                        break;
                    }
                    None => {
                        if abort_requested(&abort_rx) {
                            ledger.cancel();
                        } else {
                            ledger.close_stream();
                        }
                        break;
                    }
                }
            }
        }
    }

    publish(&snapshots, &ledger);
    let snapshot = ledger.into_snapshot();
    info!(
        event = "run.finished",
        domain = "run",
        run_id = ?run_id,
        state = ?snapshot.state,
        phases = snapshot.phases.len() as u64,
        has_result = snapshot.result.is_some()
    );
    let _ = final_tx.send(snapshot);
}
