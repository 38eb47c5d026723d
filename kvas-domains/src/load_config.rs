/// `load_config` module: Loads a static YAML config and adapts it into the core [`BuildConfig`].
///
/// This module is the only place where user-supplied YAML is parsed and mapped to
/// strongly-typed internal structs.
///
/// # Responsibilities
/// - Parse the YAML file into intermediate (YAML-side) structs
/// - Resolve extras categories (inline names, explicit `{name, url}` entries and an
///   optional categories file) into an ordered list of [`SourceSpec`]s
/// - Fill the repository label from `GITHUB_REPOSITORY` when the file leaves it unset
/// - Validate the result so a bad budget or duplicate source fails before any fetch
///
/// # Errors
/// All errors use `anyhow::Error` with context and are surfaced at the CLI boundary.
use anyhow::{anyhow, Context, Result};
use kvas_domains_core::config::{BudgetConfig, BuildConfig, FetchConfig, SourceSpec, TrendConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_list_file")]
    pub list_file: String,
    #[serde(default = "default_extras_only_file")]
    pub extras_only_file: String,
    /// Number of timestamped list copies kept under `history/`.
    #[serde(default = "default_history_keep")]
    pub history_keep: usize,
    #[serde(default)]
    pub repo: Option<String>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dist")
}
fn default_list_file() -> String {
    "inside-kvas.lst".to_string()
}
fn default_extras_only_file() -> String {
    "v2fly-only.lst".to_string()
}
fn default_history_keep() -> usize {
    12
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            list_file: default_list_file(),
            extras_only_file: default_extras_only_file(),
            history_keep: default_history_keep(),
            repo: None,
        }
    }
}

/// An extras category: either a bare name resolved against `base_url`, or an
/// explicit source.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CategoryEntry {
    Name(String),
    Source(SourceSpec),
}

#[derive(Debug, Default, Deserialize)]
struct ExtrasSection {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    categories: Vec<CategoryEntry>,
    #[serde(default)]
    categories_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct SourcesSection {
    primary: SourceSpec,
    #[serde(default)]
    extras: ExtrasSection,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    output: OutputSection,
    sources: SourcesSection,
    #[serde(default)]
    budget: BudgetConfig,
    #[serde(default)]
    trend: TrendConfig,
    #[serde(default)]
    fetch: FetchConfig,
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub output: OutputSection,
    pub build: BuildConfig,
}

/// Reads a categories file: one name per line, blanks and `#` comments ignored.
pub fn read_categories_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read categories file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn category_url(base_url: Option<&str>, name: &str) -> Result<String> {
    let base = base_url.ok_or_else(|| {
        anyhow!("extras category '{name}' has no url and sources.extras.base_url is not set")
    })?;
    Ok(format!("{}/{}", base.trim_end_matches('/'), name))
}

fn resolve_extras(section: ExtrasSection, config_dir: &Path) -> Result<Vec<SourceSpec>> {
    let base_url = section.base_url.as_deref();
    let mut extras = Vec::new();

    for entry in section.categories {
        match entry {
            CategoryEntry::Name(name) => {
                let url = category_url(base_url, &name)?;
                extras.push(SourceSpec::new(name, url));
            }
            CategoryEntry::Source(spec) => extras.push(spec),
        }
    }

    if let Some(file) = section.categories_file {
        let path = if file.is_absolute() {
            file
        } else {
            config_dir.join(file)
        };
        for name in read_categories_file(&path)? {
            if extras.iter().any(|s| s.name == name) {
                continue;
            }
            let url = category_url(base_url, &name)?;
            extras.push(SourceSpec::new(name, url));
        }
    }

    Ok(extras)
}

/// Loads the YAML config at `path` and returns a validated CLI config.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let config_dir = path_ref.parent().unwrap_or_else(|| Path::new("."));
    let extras = resolve_extras(raw.sources.extras, config_dir)?;

    let mut output = raw.output;
    if output.repo.is_none() {
        output.repo = std::env::var("GITHUB_REPOSITORY")
            .ok()
            .filter(|r| !r.trim().is_empty());
    }

    let build = BuildConfig {
        primary: raw.sources.primary,
        extras,
        budget: raw.budget,
        trend: raw.trend,
        fetch: raw.fetch,
    };
    build.validate().context("Invalid build configuration")?;
    build.trace_loaded();

    Ok(CliConfig { output, build })
}
