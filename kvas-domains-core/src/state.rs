use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::directive::Domain;
use crate::trend::TrendPoint;

/// What a run leaves behind for the next one to diff against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousBuild {
    pub build_time_utc: DateTime<Utc>,
    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub final_domains: Vec<Domain>,
    #[serde(default)]
    pub primary_domains: Vec<Domain>,
    /// Domains the merge credited to extras sources.
    #[serde(default)]
    pub extras_domains: Vec<Domain>,
    /// Trend history, oldest first.
    #[serde(default)]
    pub trend: Vec<TrendPoint>,
}
