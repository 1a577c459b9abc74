//! `dealscope`: stream diligence runs and browse saved analyses.

mod render;

use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dealscope_client::history::sector_of;
use dealscope_client::model::DEFAULT_STAGE;
use dealscope_client::observability::init_logging;
use dealscope_client::prelude::*;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "dealscope", version, about = "Stream DealScope diligence runs")]
struct Cli {
    /// Server base URL. Overrides DEALSCOPE_BASE_URL.
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Log filter used when DEALSCOPE_LOG_LEVEL and RUST_LOG are unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an analysis and print its progress as it streams.
    Analyze {
        company: String,
        #[arg(long, default_value = DEFAULT_STAGE)]
        stage: String,
        #[arg(long, default_value = "")]
        exit_type: String,
        /// Store the result in the history once the run completes.
        #[arg(long)]
        save: bool,
        /// Print the final snapshot as JSON instead of live progress.
        #[arg(long)]
        json: bool,
    },
    /// Saved analyses.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Show which integrations the server has configured.
    Health,
}

#[derive(Subcommand)]
enum HistoryAction {
    List,
    Show {
        id: i64,
        #[arg(long)]
        json: bool,
    },
    Delete {
        id: i64,
    },
}

/// Loads `.env` next to the crate first, then from the working directory.
fn load_env() {
    let _ = dotenvy::from_path(std::path::Path::new(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/.env"
    )));
    dotenvy::dotenv().ok();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut config = ClientConfig::from_env().context("invalid client configuration")?;
    if let Some(base_url) = cli.base_url {
        config = config.base_url(base_url);
    }

    match cli.command {
        Command::Analyze {
            company,
            stage,
            exit_type,
            save,
            json,
        } => {
            let request = RunRequest::new(company).stage(stage).exit_type(exit_type);
            analyze(config, request, save, json).await
        }
        Command::History { action } => history(config, action).await,
        Command::Health => health(config).await,
    }
}

async fn analyze(
    config: ClientConfig,
    request: RunRequest,
    save: bool,
    json: bool,
) -> anyhow::Result<()> {
    let client = config.http_client()?;
    let source = HttpEventSource::with_client(client.clone(), config.clone());
    let runner = AnalysisRunner::new(Arc::new(source));
    let mut run = runner.submit(request.clone()).await?;

    let abort = run.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(event = "cli.interrupted", domain = "cli");
            abort.abort();
        }
    });

    let mut printer = render::ProgressPrinter::new(PhaseCatalog::default());
    if !json {
        println!("Analyzing {} ({})", request.company.trim(), request.stage);
    }
    while let Some(snapshot) = run.next_update().await {
        if !json {
            printer.print(&snapshot);
        }
    }
    let snapshot = run.finish().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    let Some(result) = completed_result(&snapshot)? else {
        eprintln!(
            "Analysis cancelled after {} phase update(s).",
            snapshot.phases.len()
        );
        return Ok(());
    };
    if !json {
        render::print_result(result);
    }
    if save {
        let saved = HistoryClient::with_client(client, config)
            .save(&request.company, sector_of(result), result)
            .await
            .context("failed to save analysis")?;
        info!(event = "cli.saved", domain = "cli", id = saved.id);
        eprintln!("Saved as #{}", saved.id);
    }
    Ok(())
}

/// Result of a completed run; `None` for a cancelled one, which is not a
/// failure. Every other ending is an error.
fn completed_result(snapshot: &RunSnapshot) -> anyhow::Result<Option<&serde_json::Value>> {
    match snapshot.state {
        RunState::Completed => snapshot
            .result
            .as_ref()
            .map(Some)
            .context("completed run carried no result"),
        RunState::Cancelled => Ok(None),
        RunState::Failed => bail!(
            "analysis failed: {}",
            snapshot.error.as_deref().unwrap_or("unknown error")
        ),
        RunState::Incomplete => bail!("stream ended before the analysis finished"),
        RunState::Idle | RunState::Running => {
            bail!("run ended in unexpected state {:?}", snapshot.state)
        }
    }
}

async fn history(config: ClientConfig, action: HistoryAction) -> anyhow::Result<()> {
    let client = HistoryClient::new(config)?;
    match action {
        HistoryAction::List => {
            let entries = client.list().await?;
            if entries.is_empty() {
                println!("No saved analyses.");
            }
            let now = chrono::Utc::now();
            for entry in entries {
                println!("{}", render::history_line(&entry, now));
            }
        }
        HistoryAction::Show { id, json } => {
            let stored = client.load(id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stored.result)?);
            } else {
                println!("#{} {}", stored.id, stored.company_name);
                render::print_result(&stored.result);
            }
        }
        HistoryAction::Delete { id } => {
            client.delete(id).await?;
            println!("Deleted #{id}");
        }
    }
    Ok(())
}

async fn health(config: ClientConfig) -> anyhow::Result<()> {
    let status = HistoryClient::new(config)?.health().await?;
    println!("status:  {}", status.status);
    println!("openai:  {}", render::yes_no(status.openai_configured));
    println!("tavily:  {}", render::yes_no(status.tavily_configured));
    println!("neo4j:   {}", render::yes_no(status.neo4j_enabled));
    if !status.is_ok() {
        bail!("server reported status {:?}", status.status);
    }
    Ok(())
}
