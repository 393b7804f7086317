use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use tracing::warn;

mod columns;
mod ingest;
mod lessons;
mod logging;
mod models;
mod normalize;
mod reconcile;
mod report;
mod workbook;

use crate::models::{CompletionSummary, FinalRecord};
use crate::reconcile::Reconciliation;

#[derive(Parser)]
#[command(name = "lms-completion-reconciler")]
#[command(about = "Reconcile LMS exports with the master roster into a completion report", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Inputs {
    /// First LMS export
    #[arg(long, env = "LMS_EXPORT_A")]
    lms_a: PathBuf,
    /// Second LMS export
    #[arg(long, env = "LMS_EXPORT_B")]
    lms_b: PathBuf,
    /// Master roster sheet
    #[arg(long, env = "MASTER_ROSTER")]
    master: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the Excel completion report
    Reconcile {
        #[command(flatten)]
        inputs: Inputs,
        /// Output workbook (defaults to a date-stamped file name)
        #[arg(long, env = "COMPLETION_REPORT_OUT")]
        out: Option<PathBuf>,
        /// Also write a markdown summary
        #[arg(long)]
        summary_md: Option<PathBuf>,
        /// Also write records and summary as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Print completion statistics without writing files
    Summary {
        #[command(flatten)]
        inputs: Inputs,
        /// Groups shown per breakdown
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Serialize)]
struct JsonExport<'a> {
    summary: &'a CompletionSummary,
    records: &'a [FinalRecord],
}

/// Reads all three inputs concurrently; any failure aborts the run.
async fn load(inputs: &Inputs) -> anyhow::Result<Reconciliation> {
    let (lms_a, lms_b, master) = tokio::try_join!(
        ingest::read_input(&inputs.lms_a),
        ingest::read_input(&inputs.lms_b),
        ingest::read_input(&inputs.master),
    )?;

    let outcome = reconcile::reconcile(&lms_a, &lms_b, &master);
    if outcome.lesson_columns.is_empty() {
        warn!("no lesson status columns found; every completion rate is 0");
    }
    if outcome.dropped_without_identity > 0 {
        warn!(
            rows = outcome.dropped_without_identity,
            "skipped LMS rows without an email"
        );
    }
    Ok(outcome)
}

fn default_report_name() -> PathBuf {
    PathBuf::from(format!(
        "LMS_Completion_Report_{}.xlsx",
        Utc::now().date_naive()
    ))
}

fn write_json(
    path: &Path,
    summary: &CompletionSummary,
    records: &[FinalRecord],
) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(&JsonExport { summary, records })?;
    std::fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match cli.command {
        Commands::Reconcile {
            inputs,
            out,
            summary_md,
            json,
        } => {
            let outcome = load(&inputs).await?;
            let today = Utc::now().date_naive();
            let summary = report::aggregate(&outcome.records);
            let groups = report::all_groups(&outcome.records);
            let out = out.unwrap_or_else(default_report_name);

            workbook::save_report(&out, today, &outcome.records, &summary, &groups)?;

            if let Some(path) = summary_md {
                let markdown = report::build_report(today, &summary, &groups, usize::MAX);
                std::fs::write(&path, markdown)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Summary written to {}.", path.display());
            }
            if let Some(path) = json {
                write_json(&path, &summary, &outcome.records)?;
                println!("JSON written to {}.", path.display());
            }

            println!(
                "Report written to {} ({} pharmacists, {} lesson columns, {:.1}% complete).",
                out.display(),
                summary.total,
                outcome.lesson_columns.len(),
                summary.completion_pct * 100.0
            );
        }
        Commands::Summary { inputs, limit } => {
            let outcome = load(&inputs).await?;
            let summary = report::aggregate(&outcome.records);
            let groups = report::all_groups(&outcome.records);

            println!(
                "Read {} LMS rows: {} identities, {} without email, {} suppressed as empty.",
                outcome.lms_rows,
                outcome.identities,
                outcome.dropped_without_identity,
                outcome.suppressed
            );
            if !outcome.lesson_columns.is_empty() {
                let names: Vec<&str> = outcome.lesson_columns.iter().map(String::as_str).collect();
                println!("Lesson columns: {}", names.join(", "));
            }
            println!();
            print!(
                "{}",
                report::build_report(Utc::now().date_naive(), &summary, &groups, limit)
            );
        }
    }

    Ok(())
}
