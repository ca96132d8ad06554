//! Progression state: the only record that survives across pulls.
//!
//! RULE: `unlocked` only grows and `pull_count` only increases,
//! except through an explicit reset.

use crate::{
    catalog::{Catalog, Item},
    types::{ItemId, PullCount},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressionState {
    pub unlocked: BTreeSet<ItemId>,
    pub pull_count: PullCount,
}

impl ProgressionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one pull. Returns the new pull number.
    pub fn record_pull(&mut self) -> PullCount {
        self.pull_count = self.pull_count.saturating_add(1);
        self.pull_count
    }

    pub fn is_unlocked(&self, id: &str) -> bool {
        self.unlocked.contains(id)
    }

    /// Drop identifiers the catalog does not know about.
    /// Persisted data from another build must never break the subset invariant.
    pub fn retain_known(&mut self, catalog: &Catalog) -> usize {
        let before = self.unlocked.len();
        self.unlocked.retain(|id| catalog.contains(id));
        before - self.unlocked.len()
    }

    pub fn summarize(&self, catalog: &Catalog) -> ProgressionSummary {
        let hidden_unlocked = self.is_unlocked(&catalog.hidden().id);
        let unlocked_standard = catalog
            .standard_items()
            .iter()
            .filter(|i| self.is_unlocked(&i.id))
            .count();
        ProgressionSummary {
            pull_count: self.pull_count,
            unlocked_standard,
            standard_total: catalog.standard_count(),
            hidden_unlocked,
        }
    }

    /// Non-hidden items not yet won, in catalog order.
    pub fn locked_standard<'c>(&self, catalog: &'c Catalog) -> Vec<&'c Item> {
        catalog
            .standard_items()
            .into_iter()
            .filter(|i| !self.is_unlocked(&i.id))
            .collect()
    }

    /// Non-hidden items already won, in catalog order.
    pub fn unlocked_standard<'c>(&self, catalog: &'c Catalog) -> Vec<&'c Item> {
        catalog
            .standard_items()
            .into_iter()
            .filter(|i| self.is_unlocked(&i.id))
            .collect()
    }
}

/// Counts derived once per decision so the win logic and the display
/// pool never disagree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressionSummary {
    pub pull_count: PullCount,
    pub unlocked_standard: usize,
    pub standard_total: usize,
    pub hidden_unlocked: bool,
}

impl ProgressionSummary {
    /// Total collected, hidden item included.
    pub fn collected(&self) -> usize {
        self.unlocked_standard + usize::from(self.hidden_unlocked)
    }
}
