//! Hard output-size budget.
//!
//! The merged list is cut to `max_lines` by keeping its prefix. Because the
//! merged order is primary first, then extras in configured order, the cut
//! drops later extras before earlier ones and touches the primary only when
//! the primary alone exceeds the budget.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::BudgetConfig;
use crate::directive::Domain;

pub const WARNING_PCT: f64 = 85.0;
pub const CRITICAL_PCT: f64 = 96.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageTier {
    Normal,
    Warning,
    Critical,
}

impl UsageTier {
    pub fn classify(usage_pct: f64) -> Self {
        if usage_pct >= CRITICAL_PCT {
            UsageTier::Critical
        } else if usage_pct >= WARNING_PCT {
            UsageTier::Warning
        } else {
            UsageTier::Normal
        }
    }
}

/// Percentage of `n` over `d`, rounded to one decimal. Zero when `d` is zero.
pub fn usage_pct(n: usize, d: usize) -> f64 {
    if d == 0 {
        return 0.0;
    }
    (n as f64 / d as f64 * 1000.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub max_lines: usize,
    pub near_limit_threshold: usize,
    pub pre_truncation: usize,
    pub output_lines: usize,
    /// Number of merged entries cut off by the budget.
    pub truncated_lines: usize,
    pub usage_pct: f64,
    pub tier: UsageTier,
    pub near_limit: bool,
}

impl BudgetStatus {
    pub fn truncated(&self) -> bool {
        self.truncated_lines > 0
    }

    pub fn reserve(&self) -> i64 {
        self.max_lines as i64 - self.output_lines as i64
    }
}

/// Applies the budget, returning the final list and its status.
pub fn enforce(mut merged: Vec<Domain>, config: &BudgetConfig) -> (Vec<Domain>, BudgetStatus) {
    let pre_truncation = merged.len();
    let truncated_lines = pre_truncation.saturating_sub(config.max_lines);
    merged.truncate(config.max_lines);

    let output_lines = merged.len();
    let pct = usage_pct(output_lines, config.max_lines);
    let status = BudgetStatus {
        max_lines: config.max_lines,
        near_limit_threshold: config.near_limit_threshold,
        pre_truncation,
        output_lines,
        truncated_lines,
        usage_pct: pct,
        tier: UsageTier::classify(pct),
        near_limit: output_lines >= config.near_limit_threshold,
    };

    if status.truncated() {
        warn!(
            pre_truncation,
            max_lines = config.max_lines,
            truncated_lines,
            "Merged list exceeds budget, truncated"
        );
    }
    info!(
        output_lines,
        usage_pct = pct,
        tier = ?status.tier,
        near_limit = status.near_limit,
        "Applied line budget"
    );

    (merged, status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(n: usize) -> Vec<Domain> {
        (0..n)
            .map(|i| Domain::parse(&format!("d{i}.example.com")).unwrap())
            .collect()
    }

    fn budget(max_lines: usize, near_limit_threshold: usize) -> BudgetConfig {
        BudgetConfig {
            max_lines,
            near_limit_threshold,
        }
    }

    #[test]
    fn within_budget_is_unchanged() {
        let merged = domains(10);
        let (out, status) = enforce(merged.clone(), &budget(10, 9));
        assert_eq!(out, merged);
        assert!(!status.truncated());
        assert_eq!(status.usage_pct, 100.0);
        assert_eq!(status.tier, UsageTier::Critical);
    }

    #[test]
    fn over_budget_keeps_prefix() {
        let merged = domains(12);
        let (out, status) = enforce(merged.clone(), &budget(5, 4));
        assert_eq!(out, merged[..5].to_vec());
        assert_eq!(status.pre_truncation, 12);
        assert_eq!(status.truncated_lines, 7);
        assert_eq!(status.reserve(), 0);
    }

    #[test]
    fn tiers_follow_thresholds() {
        assert_eq!(UsageTier::classify(84.9), UsageTier::Normal);
        assert_eq!(UsageTier::classify(85.0), UsageTier::Warning);
        assert_eq!(UsageTier::classify(95.9), UsageTier::Warning);
        assert_eq!(UsageTier::classify(96.0), UsageTier::Critical);
    }

    #[test]
    fn near_limit_is_independent_of_tier() {
        let (_, status) = enforce(domains(50), &budget(100, 40));
        assert_eq!(status.tier, UsageTier::Normal);
        assert!(status.near_limit);

        let (_, status) = enforce(domains(97), &budget(100, 99));
        assert_eq!(status.tier, UsageTier::Critical);
        assert!(!status.near_limit);
    }

    #[test]
    fn usage_pct_rounds_to_one_decimal() {
        assert_eq!(usage_pct(1830, 1850), 98.9);
        assert_eq!(usage_pct(1, 3), 33.3);
        assert_eq!(usage_pct(5, 0), 0.0);
    }
}
