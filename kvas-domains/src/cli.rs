//! # kvas-domains CLI Interface (Module)
//!
//! Command parsing and orchestration for the `kvas-domains` binary. All list
//! logic (parsing, merging, budget, diff, trend) lives in `kvas-domains-core`;
//! this module wires the YAML config, the HTTP fetcher, the file store and the
//! report renderers together.
//!
//! - Programmatic use and integration tests: call [`run`] with a constructed [`Cli`].
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use kvas_domains_core::fetch::HttpFetcher;
use kvas_domains_core::pipeline::{commit, load_previous, run_with_previous, BuildReport};
use std::path::PathBuf;

use crate::load_config::load_config;
use crate::report::{render_all, ReportContext};
use crate::store::{ArtifactWriter, FileStore};

/// Builds the KVAS domain list from the primary list and extras categories.
#[derive(Parser)]
#[clap(
    name = "kvas-domains",
    version,
    about = "Merge domain lists into a single line-budgeted list for KVAS routers"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch all sources, build the list and write lists, state and reports
    Build {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Build and print the summary without writing anything
        #[clap(long)]
        dry_run: bool,
    },
}

fn summary_line(report: &BuildReport) -> String {
    format!(
        "{} / {} lines ({}%), +{} / -{}, severity {:?}, sha256 {}",
        report.budget.output_lines,
        report.budget.max_lines,
        report.budget.usage_pct,
        report.diff.output.added.len(),
        report.diff.output.removed.len(),
        report.status.severity,
        report.content_hash
    )
}

/// Async CLI entrypoint for integration tests and main().
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Build { config, dry_run } => {
            let config = load_config(config)?;
            tracing::info!(command = "build", dry_run, "Starting build");

            let fetcher =
                HttpFetcher::new(&config.build.fetch).context("Failed to construct HTTP client")?;
            let store = FileStore::new(&config.output.dir);

            let previous = load_previous(&store);
            let report = run_with_previous(&config.build, &fetcher, &previous).await;

            println!("{}", summary_line(&report));
            for warning in &report.status.warnings {
                println!("warning: {warning}");
            }

            if dry_run {
                tracing::info!(command = "build", "Dry run, nothing written");
            } else {
                let writer = ArtifactWriter::new(config.output.clone());
                if !report.status.failed {
                    writer
                        .write_lists(&report)
                        .context("Failed to write domain lists")?;
                }
                commit(&report, &store).context("Failed to store build state")?;
                let ctx = ReportContext {
                    repo: config.output.repo.clone(),
                    output_path: writer.list_path().display().to_string(),
                };
                writer
                    .write_reports(&report, &render_all(&report, &ctx))
                    .context("Failed to write reports")?;
            }

            if report.status.failed {
                tracing::error!(command = "build", "Build failed, previous list kept");
                return Err(anyhow!(
                    "build failed: no domains could be established from any source"
                ));
            }
            tracing::info!(command = "build", build_id = %report.build_id, "Build complete");
            Ok(())
        }
    }
}
