use serde_json::Value;

/// Event type of an incremental phase update.
pub const STATUS: &str = "status";
/// Event type sent once the relationship graph is built.
pub const GRAPH_READY: &str = "graph_ready";
/// Terminal success event carrying the full analysis result.
pub const COMPLETE: &str = "complete";
/// Terminal failure event.
pub const ERROR: &str = "error";

/// One complete frame decoded from the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedEvent {
    /// Value of the frame's `event:` line.
    pub event_type: String,
    /// Parsed value of the frame's `data:` line.
    pub payload: Value,
}

impl DecodedEvent {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    /// Interprets the frame as one of the known pipeline events.
    pub fn to_analysis_event(&self) -> AnalysisEvent {
        AnalysisEvent::from_decoded(self)
    }
}

/// Progress update for one pipeline phase.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub step: Option<u32>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub done: Option<bool>,
    #[serde(default)]
    pub elapsed: Option<f64>,
    #[serde(default)]
    pub total: Option<u32>,
}

impl StatusUpdate {
    /// Icon value the server uses for a finished phase.
    pub const DONE_ICON: &'static str = "check";

    /// Whether this update marks its phase as finished.
    pub fn is_done(&self) -> bool {
        self.done.unwrap_or(false) || self.icon.as_deref() == Some(Self::DONE_ICON)
    }

    /// Phase identity; step `0` has none.
    pub fn phase_step(&self) -> Option<u32> {
        self.step.filter(|step| *step >= 1)
    }
}

/// Typed view of a [`DecodedEvent`].
#[derive(Clone, Debug, PartialEq)]
pub enum AnalysisEvent {
    Status(StatusUpdate),
    GraphReady { neo4j_available: bool },
    Complete(Value),
    Error { message: String },
    /// Unknown event type, or a known type whose payload has the wrong shape.
    Other { event_type: String },
}

impl AnalysisEvent {
    pub fn from_decoded(event: &DecodedEvent) -> Self {
        match event.event_type.as_str() {
            STATUS => match serde_json::from_value::<StatusUpdate>(event.payload.clone()) {
                Ok(update) => Self::Status(update),
                Err(err) => {
                    tracing::warn!(
                        event = "ledger.status_rejected",
                        domain = "ledger",
                        error = %err,
                        "status payload has an unexpected shape"
                    );
                    Self::Other {
                        event_type: event.event_type.clone(),
                    }
                }
            },
            GRAPH_READY => Self::GraphReady {
                neo4j_available: event
                    .payload
                    .get("neo4j_available")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            COMPLETE => Self::Complete(event.payload.clone()),
            ERROR => Self::Error {
                message: error_message(&event.payload),
            },
            other => Self::Other {
                event_type: other.to_string(),
            },
        }
    }

    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error { .. })
    }
}

fn error_message(payload: &Value) -> String {
    payload
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| payload.as_str())
        .map(str::trim)
        .filter(|msg| !msg.is_empty())
        .unwrap_or("analysis failed")
        .to_string()
}
