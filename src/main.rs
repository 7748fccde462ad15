mod cli;
mod config;
mod error;
mod logging;
mod model;
mod normalize;
mod pipeline;
mod providers;
mod reconcile;
mod retrieval;
mod retry;
mod sink;
mod stats;
mod util;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{error, info};

use cli::{Cli, Command};
use config::AppConfig;
use pipeline::{ProjectJob, ReconciliationRequest, RunContext};
use retry::{CancelToken, TokioSleeper};
use sink::JsonReportSink;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = config::load_config(cli.config.as_deref())?;
    let output_dir = cli.output_dir.clone().unwrap_or_else(|| config.output_dir());
    let sink = Arc::new(JsonReportSink::new(&output_dir));

    match cli.command {
        Command::Ado => {
            let jobs = pipeline::ado_jobs(&config)?;
            discover(&config, sink, jobs, "ado").await
        }
        Command::Jira => {
            let jobs = pipeline::jira_jobs(&config)?;
            discover(&config, sink, jobs, "jira").await
        }
        Command::Reconcile {
            jira,
            ado,
            name,
            jira_project,
            ado_project,
        } => {
            let request = ReconciliationRequest {
                name,
                jira_statistics: jira,
                ado_statistics: ado,
                jira_project,
                ado_project,
            };
            let (report, path) = pipeline::run_reconciliation(
                sink.as_ref(),
                &config.label_mapping(),
                &config.run_by(),
                &request,
            )?;
            println!(
                "{} rows, {} matched, {} unmatched, total {} -> {}",
                report.rows.len(),
                report.matched_rows(),
                report.unmatched_rows(),
                report.total.status,
                path.display()
            );
            Ok(())
        }
    }
}

async fn discover(
    config: &AppConfig,
    sink: Arc<JsonReportSink>,
    jobs: Vec<ProjectJob>,
    source: &str,
) -> Result<()> {
    if jobs.is_empty() {
        bail!("No {source} projects configured. Add them to ~/.workrecon/config.toml");
    }

    let ctx = RunContext {
        policy: config.retry_policy(),
        sleeper: Arc::new(TokioSleeper),
        cancel: CancelToken::new(),
        sink,
        malformed: config.malformed_records,
        run_by: config.run_by(),
    };
    let deadline = config
        .run_timeout_secs
        .map(|secs| pipeline::spawn_deadline(ctx.cancel.clone(), Duration::from_secs(secs)));

    let results = pipeline::run_all(&ctx, jobs, config.parallel_projects()).await;
    if let Some(handle) = deadline {
        handle.abort();
    }

    let mut failed = 0;
    for (project, result) in &results {
        match result {
            Ok(summary) => info!(
                project = %summary.project,
                status = ?summary.status,
                total = summary.total_issue_count,
                records = summary.records,
                skipped_units = summary.skipped_units,
                skipped_records = summary.skipped_records,
                "project done"
            ),
            Err(err) => {
                failed += 1;
                error!(project = %project, error = %format!("{err:#}"), "project failed");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} projects failed", results.len());
    }
    Ok(())
}
