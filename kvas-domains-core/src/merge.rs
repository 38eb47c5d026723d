//! Cross-source merge: the primary list in full, then each extras list's
//! novel domains in configured order.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::aggregate::{SourceHealth, SourceSnapshot};
use crate::directive::Domain;

/// What one extras source contributed to the merged list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtrasContribution {
    pub name: String,
    pub valid_domains: usize,
    pub extras_added: usize,
    pub health: SourceHealth,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedList {
    pub domains: Vec<Domain>,
    pub primary_count: usize,
    pub contributions: Vec<ExtrasContribution>,
}

impl MergedList {
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// The merged tail: every domain added by some extras source.
    pub fn extras_domains(&self) -> &[Domain] {
        &self.domains[self.primary_count..]
    }

    pub fn extras_added_total(&self) -> usize {
        self.contributions.iter().map(|c| c.extras_added).sum()
    }
}

/// Merges `primary` with `extras`, earlier extras winning shared domains.
///
/// A single running set is checked and updated sequentially, so the first
/// extras source that introduces a domain is the one credited with it.
pub fn merge(primary: &SourceSnapshot, extras: &[SourceSnapshot]) -> MergedList {
    let mut seen: HashSet<&str> = HashSet::with_capacity(primary.domains.len());
    let mut domains: Vec<Domain> = Vec::with_capacity(primary.domains.len());

    for domain in &primary.domains {
        if seen.insert(domain.as_str()) {
            domains.push(domain.clone());
        }
    }
    let primary_count = domains.len();

    let mut contributions = Vec::with_capacity(extras.len());
    for source in extras {
        let before = domains.len();
        for domain in &source.domains {
            if seen.insert(domain.as_str()) {
                domains.push(domain.clone());
            }
        }
        let added = domains.len() - before;
        debug!(
            source = %source.name,
            valid = source.valid_domains(),
            added,
            "Merged extras source"
        );
        contributions.push(ExtrasContribution {
            name: source.name.clone(),
            valid_domains: source.valid_domains(),
            extras_added: added,
            health: source.health.clone(),
        });
    }

    let merged = MergedList {
        domains,
        primary_count,
        contributions,
    };
    info!(
        primary = merged.primary_count,
        extras_added = merged.extras_added_total(),
        total = merged.len(),
        "Merged sources"
    );
    merged
}

/// Sorted union of every valid extras domain, regardless of overlap with the
/// primary. Useful for checking the extras filter on its own.
pub fn extras_union(extras: &[SourceSnapshot]) -> Vec<Domain> {
    let mut all: Vec<Domain> = extras
        .iter()
        .flat_map(|s| s.domains.iter().cloned())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    all.sort();
    all
}
