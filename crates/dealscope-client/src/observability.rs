use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::model::RunRequest;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "dealscope.logs.jsonl";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Where log lines go.
#[derive(Debug, PartialEq, Eq)]
enum LogSink {
    Disabled,
    /// Compact human-readable lines on stderr; stdout carries command output.
    Stderr,
    /// One JSON object per line, with the enclosing `analysis_run` span.
    JsonFile { dir: PathBuf, file_name: String },
}

impl LogSink {
    fn resolve(enabled: Option<&str>, json_path: Option<&str>) -> Self {
        if enabled.and_then(parse_bool_env) == Some(false) {
            return Self::Disabled;
        }
        let Some(raw) = json_path.map(str::trim).filter(|p| !p.is_empty()) else {
            return Self::Stderr;
        };
        let path = Path::new(raw);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_LOG_FILE)
            .to_string();
        Self::JsonFile { dir, file_name }
    }

    fn from_env() -> Self {
        Self::resolve(
            std::env::var("DEALSCOPE_LOG_ENABLED").ok().as_deref(),
            std::env::var("DEALSCOPE_JSON_LOG_PATH").ok().as_deref(),
        )
    }
}

fn resolve_env_filter(default_level: &str) -> tracing_subscriber::EnvFilter {
    if let Ok(level) = std::env::var("DEALSCOPE_LOG_LEVEL")
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level))
}

/// Installs the process-wide tracing subscriber. Later calls are no-ops.
///
/// Environment variables:
/// - `DEALSCOPE_LOG_ENABLED`: `false`/`0`/`off` disables logging (default enabled).
/// - `DEALSCOPE_LOG_LEVEL`: filter directive, takes precedence over `RUST_LOG`.
/// - `DEALSCOPE_JSON_LOG_PATH`: write JSON lines to this file instead of stderr.
pub fn init_logging(default_level: &str) {
    INIT.get_or_init(|| {
        let env_filter = resolve_env_filter(default_level);
        match LogSink::from_env() {
            LogSink::Disabled => {}
            LogSink::Stderr => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
            LogSink::JsonFile { dir, file_name } => {
                let _ = std::fs::create_dir_all(&dir);
                let writer = tracing_appender::rolling::never(&dir, &file_name);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(false)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
        }
    });
}

/// Span every event of one run is recorded under.
pub(crate) fn run_span(run_id: uuid::Uuid, request: &RunRequest) -> tracing::Span {
    tracing::info_span!(
        "analysis_run",
        run_id = %run_id,
        company = %request.company,
        stage = %request.stage
    )
}
