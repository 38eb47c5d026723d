use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::directive::Domain;

/// Set difference between two runs of the same list, both sides sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainDiff {
    pub added: Vec<Domain>,
    pub removed: Vec<Domain>,
}

impl DomainDiff {
    /// `added = current - previous`, `removed = previous - current`.
    pub fn between(previous: &[Domain], current: &[Domain]) -> Self {
        let prev: HashSet<&Domain> = previous.iter().collect();
        let curr: HashSet<&Domain> = current.iter().collect();

        let mut added: Vec<Domain> = curr.difference(&prev).map(|d| (*d).clone()).collect();
        let mut removed: Vec<Domain> = prev.difference(&curr).map(|d| (*d).clone()).collect();
        added.sort();
        removed.sort();
        Self { added, removed }
    }

    /// First run: everything is new.
    pub fn initial(current: &[Domain]) -> Self {
        Self::between(&[], current)
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Diffs for the three lists the report tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDiff {
    /// Primary source, before merging.
    pub primary: DomainDiff,
    /// Domains credited to extras sources by the merge.
    pub extras: DomainDiff,
    /// Final, budgeted list.
    pub output: DomainDiff,
}

impl BuildDiff {
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.extras.is_empty() && self.output.is_empty()
    }
}
