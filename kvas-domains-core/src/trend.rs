//! Bounded history of build sizes and the rolling trend derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One run's total output size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub ts_utc: DateTime<Utc>,
    pub total: usize,
    #[serde(default)]
    pub severity: Option<crate::pipeline::Severity>,
}

/// Capped, oldest-first queue of [`TrendPoint`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendHistory {
    capacity: usize,
    points: VecDeque<TrendPoint>,
}

impl TrendHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            points: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Rebuilds a history from stored points, keeping only the newest
    /// `capacity` of them.
    pub fn from_points(capacity: usize, points: impl IntoIterator<Item = TrendPoint>) -> Self {
        let mut history = Self::new(capacity);
        for p in points {
            history.push(p);
        }
        history
    }

    pub fn push(&mut self, point: TrendPoint) {
        while self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&TrendPoint> {
        self.points.back()
    }

    /// Oldest first; reversible for newest-first walks.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &TrendPoint> + ExactSizeIterator {
        self.points.iter()
    }

    /// Appends `current` and summarises the trend against what was stored.
    pub fn record(&mut self, current: TrendPoint, window: usize) -> TrendSummary {
        let previous_total = self.last().map(|p| p.total);
        let total = current.total;
        self.push(current);
        TrendSummary::compute(self, previous_total, total, window)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    Flat,
}

impl TrendDirection {
    pub fn from_delta(delta: i64) -> Self {
        match delta.cmp(&0) {
            std::cmp::Ordering::Greater => TrendDirection::Rising,
            std::cmp::Ordering::Less => TrendDirection::Falling,
            std::cmp::Ordering::Equal => TrendDirection::Flat,
        }
    }
}

/// Coarse reading of the current total against the rolling average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendAssessment {
    /// At least twice the rolling average.
    Surge,
    Growing,
    Stable,
    Shrinking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub points: usize,
    pub window: usize,
    pub rolling_average: i64,
    /// `current - previous`; zero on the first run.
    pub delta: i64,
    pub deviation: i64,
    pub direction: TrendDirection,
    pub assessment: TrendAssessment,
    pub min_total: usize,
    pub max_total: usize,
    pub growth_since_first: i64,
}

impl TrendSummary {
    fn compute(
        history: &TrendHistory,
        previous_total: Option<usize>,
        current: usize,
        window: usize,
    ) -> Self {
        let window = window.max(1);
        let recent: Vec<usize> = history
            .iter()
            .rev()
            .take(window)
            .map(|p| p.total)
            .collect();
        let rolling_average = if recent.is_empty() {
            current as i64
        } else {
            (recent.iter().sum::<usize>() as f64 / recent.len() as f64).round() as i64
        };

        let current = current as i64;
        let delta = previous_total.map_or(0, |p| current - p as i64);
        let deviation = current - rolling_average;

        let min_total = history.iter().map(|p| p.total).min().unwrap_or(0);
        let max_total = history.iter().map(|p| p.total).max().unwrap_or(0);
        let first = history.iter().next().map_or(current, |p| p.total as i64);

        Self {
            points: history.len(),
            window,
            rolling_average,
            delta,
            deviation,
            direction: TrendDirection::from_delta(delta),
            assessment: assess(current, rolling_average, deviation),
            min_total,
            max_total,
            growth_since_first: current - first,
        }
    }
}

fn assess(current: i64, average: i64, deviation: i64) -> TrendAssessment {
    if average > 0 && current >= average * 2 {
        return TrendAssessment::Surge;
    }
    let tolerance = std::cmp::max(10, (average as f64 * 0.01).round() as i64);
    if deviation.abs() <= tolerance {
        TrendAssessment::Stable
    } else if deviation > 0 {
        TrendAssessment::Growing
    } else {
        TrendAssessment::Shrinking
    }
}
