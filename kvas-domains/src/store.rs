//! File-backed persistence and build artifacts.
//!
//! [`FileStore`] implements the core [`SnapshotStore`] over two JSON files in
//! the output directory: `state.json` holds the previous lists, `stats.json`
//! holds the trend history. `stats.json` is written first; trend points newer
//! than `state.json` are ignored on load. [`ArtifactWriter`] writes the final list, the
//! extras-only list, rotated history copies and the rendered reports.

use chrono::{DateTime, Utc};
use kvas_domains_core::contract::{SnapshotStore, StoreError};
use kvas_domains_core::directive::Domain;
use kvas_domains_core::pipeline::{render_list, BuildReport};
use kvas_domains_core::state::PreviousBuild;
use kvas_domains_core::trend::TrendPoint;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::load_config::OutputSection;

pub const STATE_FILE: &str = "state.json";
pub const STATS_FILE: &str = "stats.json";
pub const HISTORY_DIR: &str = "history";
pub const REPORT_MD_FILE: &str = "report.md";
pub const REPORT_JSON_FILE: &str = "report.json";
pub const NOTIFY_FILE: &str = "notify.txt";
pub const ALERT_FILE: &str = "alert.txt";

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    build_time_utc: DateTime<Utc>,
    #[serde(default)]
    content_hash: String,
    #[serde(default)]
    final_domains: Vec<Domain>,
    #[serde(default)]
    primary_domains: Vec<Domain>,
    #[serde(default)]
    extras_domains: Vec<Domain>,
}

/// Writes `contents` next to `path` and renames it into place.
fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut json = serde_json::to_vec_pretty(value)?;
    json.push(b'\n');
    Ok(json)
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn load_trend(&self) -> Result<Vec<TrendPoint>, StoreError> {
        let path = self.dir.join(STATS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl SnapshotStore for FileStore {
    fn load_previous(&self) -> Result<Option<PreviousBuild>, StoreError> {
        let path = self.dir.join(STATE_FILE);
        if !path.exists() {
            debug!(path = %path.display(), "No previous state, first run");
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let state: StateFile = serde_json::from_str(&content)?;
        // Points newer than the state belong to a run that never committed.
        let trend: Vec<TrendPoint> = self
            .load_trend()?
            .into_iter()
            .filter(|p| p.ts_utc <= state.build_time_utc)
            .collect();
        info!(
            path = %path.display(),
            previous_total = state.final_domains.len(),
            trend_points = trend.len(),
            "Loaded previous state"
        );
        Ok(Some(PreviousBuild {
            build_time_utc: state.build_time_utc,
            content_hash: state.content_hash,
            final_domains: state.final_domains,
            primary_domains: state.primary_domains,
            extras_domains: state.extras_domains,
            trend,
        }))
    }

    fn store_current(&self, snapshot: &PreviousBuild) -> Result<(), StoreError> {
        let state = StateFile {
            build_time_utc: snapshot.build_time_utc,
            content_hash: snapshot.content_hash.clone(),
            final_domains: snapshot.final_domains.clone(),
            primary_domains: snapshot.primary_domains.clone(),
            extras_domains: snapshot.extras_domains.clone(),
        };
        // state.json is written last and marks the pair as complete.
        write_atomic(&self.dir.join(STATS_FILE), &to_json(&snapshot.trend)?)?;
        write_atomic(&self.dir.join(STATE_FILE), &to_json(&state)?)?;
        info!(dir = %self.dir.display(), "Stored state and stats");
        Ok(())
    }
}

/// Rendered report texts, produced by [`crate::report`].
#[derive(Debug, Clone)]
pub struct RenderedReports {
    pub markdown: String,
    pub notification: String,
    /// Empty when there is nothing to alert about.
    pub alert: String,
}

pub struct ArtifactWriter {
    output: OutputSection,
}

impl ArtifactWriter {
    pub fn new(output: OutputSection) -> Self {
        Self { output }
    }

    pub fn list_path(&self) -> PathBuf {
        self.output.dir.join(&self.output.list_file)
    }

    /// Writes the final list, the extras-only list and a rotated history copy.
    pub fn write_lists(&self, report: &BuildReport) -> io::Result<()> {
        let text = report.output_text();
        write_atomic(&self.list_path(), text.as_bytes())?;
        write_atomic(
            &self.output.dir.join(&self.output.extras_only_file),
            render_list(&report.extras_union).as_bytes(),
        )?;

        let history_dir = self.output.dir.join(HISTORY_DIR);
        let stem = Path::new(&self.output.list_file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("list");
        let stamp = report.build_time_utc.format("%Y%m%d-%H%M%S");
        write_atomic(&history_dir.join(format!("{stem}.{stamp}.lst")), text.as_bytes())?;
        let removed = rotate_history(&history_dir, stem, self.output.history_keep)?;

        info!(
            path = %self.list_path().display(),
            lines = report.final_domains.len(),
            history_removed = removed,
            "Wrote domain lists"
        );
        Ok(())
    }

    /// Writes the Markdown and JSON reports and the notification files.
    /// A stale alert file is removed when there is nothing to alert about.
    pub fn write_reports(&self, report: &BuildReport, rendered: &RenderedReports) -> io::Result<()> {
        let dir = &self.output.dir;
        write_atomic(&dir.join(REPORT_MD_FILE), rendered.markdown.as_bytes())?;
        write_atomic(&dir.join(REPORT_JSON_FILE), &to_json(report).map_err(io::Error::other)?)?;
        write_atomic(&dir.join(NOTIFY_FILE), rendered.notification.as_bytes())?;

        let alert_path = dir.join(ALERT_FILE);
        if rendered.alert.trim().is_empty() {
            if alert_path.exists() {
                fs::remove_file(&alert_path)?;
            }
        } else {
            write_atomic(&alert_path, rendered.alert.as_bytes())?;
        }
        info!(dir = %dir.display(), "Wrote reports");
        Ok(())
    }
}

/// Keeps the newest `keep` history copies of `stem`. Timestamps in the file
/// names sort chronologically. Returns how many files were removed.
pub fn rotate_history(dir: &Path, stem: &str, keep: usize) -> io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let prefix = format!("{stem}.");
    let mut copies: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension().is_some_and(|e| e == "lst")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect();
    copies.sort();

    let excess = copies.len().saturating_sub(keep);
    for old in &copies[..excess] {
        fs::remove_file(old)?;
        debug!(path = %old.display(), "Removed old history copy");
    }
    Ok(excess)
}
