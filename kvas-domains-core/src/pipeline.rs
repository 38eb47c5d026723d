//! High-level pipeline: orchestrates fetch → parse → merge → budget → diff.
//!
//! This module ties every component together for one build run:
//!   - Fetches and parses the primary and all extras sources ([`crate::aggregate`])
//!   - Merges them with first-extras-wins precedence ([`crate::merge`])
//!   - Cuts the result to the line budget ([`crate::budget`])
//!   - Diffs against the previous run and extends the trend ([`crate::diff`], [`crate::trend`])
//!   - Derives build status, severity and warnings
//!
//! # Major Types
//! - [`BuildReport`]: everything a report renderer needs, plus the final list
//! - [`BuildStatus`]: derived health of the run
//!
//! # Error Handling
//! Source and line level problems never abort a run; they surface as
//! [`BuildStatus`] flags and warnings. A run in which no source yields a
//! single domain is reported as failed and is not persisted.
//!
//! # Navigation
//! - Full run with persistence: [`build`], or [`load_previous`],
//!   [`run_with_previous`] and [`commit`] when the caller publishes in between
//! - Run without persistence: [`run_build`]
//! - Pure assembly from fetched sources: [`assemble`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::aggregate::{aggregate, AggregatedSources, SourceHealth, SourceRole, SourceSnapshot};
use crate::budget::{enforce, BudgetStatus, UsageTier, CRITICAL_PCT, WARNING_PCT};
use crate::config::BuildConfig;
use crate::contract::{Fetcher, SnapshotStore, StoreError};
use crate::diff::{BuildDiff, DomainDiff};
use crate::directive::Domain;
use crate::merge::{extras_union, merge};
use crate::state::PreviousBuild;
use crate::trend::{TrendHistory, TrendPoint, TrendSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Ok,
    Warning,
    Error,
}

/// Per-source line of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDiagnostics {
    pub name: String,
    pub url: String,
    pub role: SourceRole,
    pub valid_lines: usize,
    pub valid_domains: usize,
    pub invalid_lines: usize,
    pub skipped_directives: usize,
    /// Novel domains contributed by the merge. Always zero for the primary.
    pub extras_added: usize,
    pub health: SourceHealth,
}

impl SourceDiagnostics {
    fn new(snapshot: &SourceSnapshot, extras_added: usize) -> Self {
        Self {
            name: snapshot.name.clone(),
            url: snapshot.url.clone(),
            role: snapshot.role,
            valid_lines: snapshot.stats.valid_lines,
            valid_domains: snapshot.valid_domains(),
            invalid_lines: snapshot.stats.invalid_lines,
            skipped_directives: snapshot.stats.skipped_directives,
            extras_added,
            health: snapshot.health.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub primary_count: usize,
    pub extras_added_total: usize,
    pub merged_total: usize,
}

/// Derived health of a run. `has_errors` and `critical` are independent and
/// may both be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStatus {
    pub severity: Severity,
    /// At least one source failed to download.
    pub has_errors: bool,
    /// Budget usage reached the critical tier.
    pub critical: bool,
    /// No source produced any domain; the output must not replace the previous one.
    pub failed: bool,
    pub failed_sources: Vec<String>,
    pub empty_sources: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub build_id: Uuid,
    pub build_time_utc: DateTime<Utc>,
    pub sources: Vec<SourceDiagnostics>,
    pub merge: MergeSummary,
    pub budget: BudgetStatus,
    pub final_domains: Vec<Domain>,
    pub primary_domains: Vec<Domain>,
    pub extras_domains: Vec<Domain>,
    /// Sorted union of all extras domains before overlap removal.
    pub extras_union: Vec<Domain>,
    pub diff: BuildDiff,
    pub trend: TrendSummary,
    pub trend_history: TrendHistory,
    pub content_hash: String,
    pub status: BuildStatus,
}

impl BuildReport {
    pub fn primary(&self) -> Option<&SourceDiagnostics> {
        self.sources.iter().find(|s| s.role == SourceRole::Primary)
    }

    pub fn extras(&self) -> impl Iterator<Item = &SourceDiagnostics> {
        self.sources.iter().filter(|s| s.role == SourceRole::Extras)
    }

    /// The final list as written to disk.
    pub fn output_text(&self) -> String {
        render_list(&self.final_domains)
    }

    /// Snapshot the next run diffs against.
    pub fn next_snapshot(&self) -> PreviousBuild {
        PreviousBuild {
            build_time_utc: self.build_time_utc,
            content_hash: self.content_hash.clone(),
            final_domains: self.final_domains.clone(),
            primary_domains: self.primary_domains.clone(),
            extras_domains: self.extras_domains.clone(),
            trend: self.trend_history.iter().cloned().collect(),
        }
    }
}

/// One domain per line, each terminated by `\n`.
pub fn render_list(domains: &[Domain]) -> String {
    let mut out = String::with_capacity(domains.iter().map(|d| d.as_str().len() + 1).sum());
    for d in domains {
        out.push_str(d.as_str());
        out.push('\n');
    }
    out
}

/// Lowercase hex SHA-256 of the rendered list.
pub fn content_hash(domains: &[Domain]) -> String {
    format!("{:x}", Sha256::digest(render_list(domains).as_bytes()))
}

fn collect_warnings(sources: &AggregatedSources, budget: &BudgetStatus) -> Vec<String> {
    let mut warnings = Vec::new();

    let primary = &sources.primary;
    match &primary.health {
        SourceHealth::Failed { reason, .. } => {
            warnings.push(format!("{}: list failed to download ({reason})", primary.name))
        }
        SourceHealth::Empty => {
            warnings.push(format!("{}: list is empty (0 domains)", primary.name))
        }
        SourceHealth::Ok => {}
    }

    if !sources.extras.is_empty() {
        let failed = sources
            .extras
            .iter()
            .filter(|s| s.health.is_failed())
            .count();
        if failed > 0 {
            warnings.push(format!(
                "extras: {failed}/{} categories failed to download",
                sources.extras.len()
            ));
        }
        if sources.extras.iter().all(|s| s.domains.is_empty()) {
            warnings.push("extras: categories are configured but no domains were received".into());
        }
    }

    if budget.truncated() {
        warnings.push(format!(
            "limit: exceeded ({}/{}), {} lines truncated",
            budget.pre_truncation, budget.max_lines, budget.truncated_lines
        ));
    } else if budget.near_limit {
        warnings.push(format!(
            "limit: close to the limit ({}/{})",
            budget.output_lines, budget.max_lines
        ));
    }

    warnings
}

fn derive_status(sources: &AggregatedSources, budget: &BudgetStatus) -> BuildStatus {
    let failed_sources: Vec<String> = sources
        .iter()
        .filter(|s| s.health.is_failed())
        .map(|s| match &s.health {
            SourceHealth::Failed { reason, .. } => format!("{} ({reason})", s.name),
            _ => s.name.clone(),
        })
        .collect();
    let empty_sources: Vec<String> = sources
        .iter()
        .filter(|s| s.health.is_empty())
        .map(|s| s.name.clone())
        .collect();

    let mut warnings = collect_warnings(sources, budget);
    let failed = budget.pre_truncation == 0;
    if failed {
        warnings.push("build: no domains could be established from any source".into());
    }

    let has_errors = !failed_sources.is_empty();
    let critical = budget.tier == UsageTier::Critical;

    let severity = if has_errors || budget.truncated() || budget.usage_pct >= CRITICAL_PCT || failed
    {
        Severity::Error
    } else if !empty_sources.is_empty()
        || !warnings.is_empty()
        || budget.near_limit
        || budget.usage_pct >= WARNING_PCT
    {
        Severity::Warning
    } else {
        Severity::Ok
    };

    BuildStatus {
        severity,
        has_errors,
        critical,
        failed,
        failed_sources,
        empty_sources,
        warnings,
    }
}

/// Builds the report from already fetched sources. Pure and deterministic
/// apart from `build_id` and `now`, which the caller supplies.
pub fn assemble(
    config: &BuildConfig,
    sources: AggregatedSources,
    previous: Option<&PreviousBuild>,
    now: DateTime<Utc>,
    build_id: Uuid,
) -> BuildReport {
    let merged = merge(&sources.primary, &sources.extras);
    let merge_summary = MergeSummary {
        primary_count: merged.primary_count,
        extras_added_total: merged.extras_added_total(),
        merged_total: merged.len(),
    };

    let mut diagnostics = vec![SourceDiagnostics::new(&sources.primary, 0)];
    for (snapshot, contribution) in sources.extras.iter().zip(&merged.contributions) {
        diagnostics.push(SourceDiagnostics::new(snapshot, contribution.extras_added));
    }

    let primary_domains = sources.primary.domains.clone();
    let extras_domains = merged.extras_domains().to_vec();
    let union = extras_union(&sources.extras);

    let (final_domains, budget) = enforce(merged.domains, &config.budget);
    let hash = content_hash(&final_domains);
    let status = derive_status(&sources, &budget);

    let diff = match previous {
        Some(prev) => BuildDiff {
            primary: DomainDiff::between(&prev.primary_domains, &primary_domains),
            extras: DomainDiff::between(&prev.extras_domains, &extras_domains),
            output: DomainDiff::between(&prev.final_domains, &final_domains),
        },
        None => BuildDiff {
            primary: DomainDiff::initial(&primary_domains),
            extras: DomainDiff::initial(&extras_domains),
            output: DomainDiff::initial(&final_domains),
        },
    };

    let mut history = TrendHistory::from_points(
        config.trend.history_limit,
        previous.map(|p| p.trend.clone()).unwrap_or_default(),
    );
    let trend = history.record(
        TrendPoint {
            ts_utc: now,
            total: final_domains.len(),
            severity: Some(status.severity),
        },
        config.trend.window,
    );

    info!(
        %build_id,
        total = final_domains.len(),
        added = diff.output.added.len(),
        removed = diff.output.removed.len(),
        severity = ?status.severity,
        hash = %hash,
        "Assembled build report"
    );

    BuildReport {
        build_id,
        build_time_utc: now,
        sources: diagnostics,
        merge: merge_summary,
        budget,
        final_domains,
        primary_domains,
        extras_domains,
        extras_union: union,
        diff,
        trend,
        trend_history: history,
        content_hash: hash,
        status,
    }
}

/// Fetches every source and assembles the report, without persistence.
pub async fn run_build<F>(
    config: &BuildConfig,
    fetcher: &F,
    previous: Option<&PreviousBuild>,
) -> BuildReport
where
    F: Fetcher + ?Sized,
{
    let build_id = Uuid::new_v4();
    let span = info_span!("build", %build_id);
    async {
        info!("[BUILD] Starting domain list build");
        let sources = aggregate(fetcher, config).await;
        assemble(config, sources, previous, Utc::now(), build_id)
    }
    .instrument(span)
    .await
}

/// The previous snapshot as read from a store, plus the warning to report
/// when it could not be read.
#[derive(Debug, Clone, Default)]
pub struct LoadedPrevious {
    pub snapshot: Option<PreviousBuild>,
    pub warning: Option<String>,
}

/// Reads the previous snapshot. An unreadable snapshot is treated as a first
/// run and carried as a warning.
pub fn load_previous<S>(store: &S) -> LoadedPrevious
where
    S: SnapshotStore + ?Sized,
{
    match store.load_previous() {
        Ok(snapshot) => LoadedPrevious {
            snapshot,
            warning: None,
        },
        Err(e) => {
            warn!(error = %e, "[BUILD] Previous snapshot unreadable, treating as first run");
            LoadedPrevious {
                snapshot: None,
                warning: Some(format!("state: previous snapshot unreadable ({e})")),
            }
        }
    }
}

/// [`run_build`] against a loaded snapshot; a load warning is added to the
/// report and raises severity to at least [`Severity::Warning`].
pub async fn run_with_previous<F>(
    config: &BuildConfig,
    fetcher: &F,
    previous: &LoadedPrevious,
) -> BuildReport
where
    F: Fetcher + ?Sized,
{
    let mut report = run_build(config, fetcher, previous.snapshot.as_ref()).await;
    if let Some(w) = &previous.warning {
        report.status.warnings.push(w.clone());
        report.status.severity = report.status.severity.max(Severity::Warning);
    }
    report
}

/// Stores the report as the next run's snapshot. A failed build is skipped;
/// returns whether anything was stored.
///
/// Callers that publish the list must do so before committing, so the stored
/// snapshot never describes a list that was not written.
pub fn commit<S>(report: &BuildReport, store: &S) -> Result<bool, StoreError>
where
    S: SnapshotStore + ?Sized,
{
    if report.status.failed {
        error!(
            build_id = %report.build_id,
            "[BUILD][ERROR] No domains established; previous snapshot left untouched"
        );
        return Ok(false);
    }
    store.store_current(&report.next_snapshot())?;
    info!(build_id = %report.build_id, "[BUILD] Stored snapshot for next run");
    Ok(true)
}

/// Full run without a publish step: load, build, commit.
///
/// Only a failure to store the new snapshot is returned as an error.
pub async fn build<F, S>(
    config: &BuildConfig,
    fetcher: &F,
    store: &S,
) -> Result<BuildReport, StoreError>
where
    F: Fetcher + ?Sized,
    S: SnapshotStore + ?Sized,
{
    let previous = load_previous(store);
    let report = run_with_previous(config, fetcher, &previous).await;
    commit(&report, store)?;
    Ok(report)
}
