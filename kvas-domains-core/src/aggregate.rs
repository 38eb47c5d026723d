//! Fetch every configured list and turn each into a [`SourceSnapshot`].
//!
//! Fetches run concurrently, each under its own timeout, but results are
//! always returned in configuration order. A failing source never aborts the
//! run: it becomes a snapshot with [`SourceHealth::Failed`] and no domains.

use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{BuildConfig, SourceSpec};
use crate::contract::{FetchError, Fetcher};
use crate::directive::{parse_list, Domain, LineStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRole {
    Primary,
    Extras,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceHealth {
    Ok,
    Empty,
    Failed {
        reason: String,
        http_status: Option<u16>,
    },
}

impl SourceHealth {
    pub fn is_failed(&self) -> bool {
        matches!(self, SourceHealth::Failed { .. })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SourceHealth::Empty)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceHealth::Ok => "OK",
            SourceHealth::Empty => "EMPTY",
            SourceHealth::Failed { .. } => "FAIL",
        }
    }
}

/// One source after fetch and parse. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub name: String,
    pub url: String,
    pub role: SourceRole,
    /// Unique valid domains in first-seen order.
    pub domains: Vec<Domain>,
    pub stats: LineStats,
    pub health: SourceHealth,
}

impl SourceSnapshot {
    /// Builds a snapshot from an already fetched body.
    pub fn from_text(spec: &SourceSpec, role: SourceRole, text: &str) -> Self {
        let parsed = parse_list(text);
        let health = if parsed.domains.is_empty() {
            SourceHealth::Empty
        } else {
            SourceHealth::Ok
        };
        Self {
            name: spec.name.clone(),
            url: spec.url.clone(),
            role,
            domains: parsed.domains,
            stats: parsed.stats,
            health,
        }
    }

    pub fn failed(spec: &SourceSpec, role: SourceRole, err: &FetchError) -> Self {
        Self {
            name: spec.name.clone(),
            url: spec.url.clone(),
            role,
            domains: Vec::new(),
            stats: LineStats::default(),
            health: SourceHealth::Failed {
                reason: err.message.clone(),
                http_status: err.status,
            },
        }
    }

    pub fn valid_domains(&self) -> usize {
        self.domains.len()
    }
}

/// All snapshots of one run, primary first.
#[derive(Debug, Clone)]
pub struct AggregatedSources {
    pub primary: SourceSnapshot,
    pub extras: Vec<SourceSnapshot>,
}

impl AggregatedSources {
    pub fn iter(&self) -> impl Iterator<Item = &SourceSnapshot> {
        std::iter::once(&self.primary).chain(self.extras.iter())
    }
}

async fn fetch_source<F>(
    fetcher: &F,
    spec: &SourceSpec,
    role: SourceRole,
    timeout_secs: u64,
) -> SourceSnapshot
where
    F: Fetcher + ?Sized,
{
    info!(source = %spec.name, url = %spec.url, ?role, "Fetching source list");

    let fetched = match tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        fetcher.fetch(&spec.url),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(FetchError::timeout(timeout_secs)),
    };

    match fetched {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            let snapshot = SourceSnapshot::from_text(spec, role, &text);
            if snapshot.health.is_empty() {
                warn!(
                    source = %spec.name,
                    invalid = snapshot.stats.invalid_lines,
                    skipped = snapshot.stats.skipped_directives,
                    "Source fetched but yielded no valid domains"
                );
            } else {
                info!(
                    source = %spec.name,
                    domains = snapshot.valid_domains(),
                    invalid = snapshot.stats.invalid_lines,
                    skipped = snapshot.stats.skipped_directives,
                    "Parsed source list"
                );
            }
            snapshot
        }
        Err(e) => {
            error!(source = %spec.name, url = %spec.url, error = %e, "Failed to fetch source");
            SourceSnapshot::failed(spec, role, &e)
        }
    }
}

/// Fetches and parses the primary and every extras source.
pub async fn aggregate<F>(fetcher: &F, config: &BuildConfig) -> AggregatedSources
where
    F: Fetcher + ?Sized,
{
    let timeout_secs = config.fetch.timeout_secs;
    let jobs = std::iter::once((&config.primary, SourceRole::Primary))
        .chain(config.extras.iter().map(|s| (s, SourceRole::Extras)))
        .map(|(spec, role)| fetch_source(fetcher, spec, role, timeout_secs));

    // `buffered` keeps configuration order while running up to N at once.
    let mut snapshots: Vec<SourceSnapshot> = stream::iter(jobs)
        .buffered(config.fetch.concurrency.max(1))
        .collect()
        .await;

    let extras = snapshots.split_off(1);
    let primary = snapshots.remove(0);

    info!(
        primary_domains = primary.valid_domains(),
        extras_sources = extras.len(),
        failed = std::iter::once(&primary)
            .chain(&extras)
            .filter(|s| s.health.is_failed())
            .count(),
        "Aggregated all sources"
    );

    AggregatedSources { primary, extras }
}
