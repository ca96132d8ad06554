//! Unlock ledger: folds a winning result into the progression state.

use crate::{outcome::SpinResult, progression::ProgressionState, types::ItemId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitOutcome {
    /// The item credited, if the result was a win.
    pub item_id: Option<ItemId>,
    /// True only the first time an item is credited.
    pub was_new_unlock: bool,
}

/// Credit a winning result. Losing results and repeat wins change nothing.
pub fn commit(progression: &mut ProgressionState, result: &SpinResult) -> CommitOutcome {
    if !result.is_win {
        return CommitOutcome {
            item_id: None,
            was_new_unlock: false,
        };
    }

    let id = result.slots[0].id.clone();
    let was_new_unlock = progression.unlocked.insert(id.clone());
    if was_new_unlock {
        log::info!(
            "unlocked '{id}' ({} collected, pull {})",
            progression.unlocked.len(),
            progression.pull_count
        );
    }
    CommitOutcome {
        item_id: Some(id),
        was_new_unlock,
    }
}
