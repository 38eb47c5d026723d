use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// One upstream list: a display name and the URL it is fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub url: String,
}

impl SourceSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    /// Line count at which the build is flagged as close to the limit.
    #[serde(default = "default_near_limit_threshold")]
    pub near_limit_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Number of most recent runs averaged for the rolling trend.
    #[serde(default = "default_trend_window")]
    pub window: usize,
    /// Maximum number of trend points retained across runs.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Everything the pipeline needs for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    pub primary: SourceSpec,
    /// Extras in precedence order: earlier sources claim shared domains.
    #[serde(default)]
    pub extras: Vec<SourceSpec>,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub trend: TrendConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("budget.max_lines must be greater than zero")]
    ZeroBudget,
    #[error("trend.window must be greater than zero")]
    ZeroTrendWindow,
    #[error("trend.history_limit ({limit}) must be at least trend.window ({window})")]
    HistoryShorterThanWindow { limit: usize, window: usize },
    #[error("fetch.concurrency must be greater than zero")]
    ZeroConcurrency,
    #[error("source name '{0}' is used more than once")]
    DuplicateSource(String),
    #[error("source '{0}' has an empty URL")]
    EmptyUrl(String),
}

fn default_max_lines() -> usize {
    3000
}
fn default_near_limit_threshold() -> usize {
    2900
}
fn default_trend_window() -> usize {
    7
}
fn default_history_limit() -> usize {
    400
}
fn default_timeout_secs() -> u64 {
    25
}
fn default_concurrency() -> usize {
    8
}
fn default_user_agent() -> String {
    "kvas-domains-builder/1.0".to_string()
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            near_limit_threshold: default_near_limit_threshold(),
        }
    }
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window: default_trend_window(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            user_agent: default_user_agent(),
        }
    }
}

impl BuildConfig {
    pub fn new(primary: SourceSpec, extras: Vec<SourceSpec>) -> Self {
        Self {
            primary,
            extras,
            budget: BudgetConfig::default(),
            trend: TrendConfig::default(),
            fetch: FetchConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.budget.max_lines == 0 {
            return Err(ConfigError::ZeroBudget);
        }
        if self.trend.window == 0 {
            return Err(ConfigError::ZeroTrendWindow);
        }
        if self.trend.history_limit < self.trend.window {
            return Err(ConfigError::HistoryShorterThanWindow {
                limit: self.trend.history_limit,
                window: self.trend.window,
            });
        }
        if self.fetch.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        let mut names = HashSet::new();
        for source in std::iter::once(&self.primary).chain(&self.extras) {
            if !names.insert(source.name.as_str()) {
                return Err(ConfigError::DuplicateSource(source.name.clone()));
            }
            if source.url.trim().is_empty() {
                return Err(ConfigError::EmptyUrl(source.name.clone()));
            }
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            primary = %self.primary.name,
            extras_count = self.extras.len(),
            max_lines = self.budget.max_lines,
            near_limit_threshold = self.budget.near_limit_threshold,
            "Loaded BuildConfig"
        );
        debug!(?self, "BuildConfig loaded (full debug)");
    }
}
