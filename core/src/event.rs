//! Machine events: everything presentation needs to react to.
//!
//! Variants are appended over time, never removed or reordered.

use crate::{
    outcome::OutcomeKind,
    types::{ItemId, PullCount},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MachineEvent {
    // ── Pull pipeline ──────────────────────────────
    LeverPulled {
        pull: PullCount,
    },
    SpinStarted {
        pull: PullCount,
        kind: OutcomeKind,
        slots: [ItemId; 3],
    },
    MalfunctionTriggered {
        pull: PullCount,
    },
    SpinRevealed {
        pull: PullCount,
        kind: OutcomeKind,
        is_win: bool,
        is_jackpot: bool,
    },
    ReelsSettled {
        slots: [ItemId; 3],
    },

    // ── Progression ────────────────────────────────
    ItemUnlocked {
        pull: PullCount,
        item_id: ItemId,
        collected: usize,
        is_hidden: bool,
    },
    MilestoneReached {
        pull: PullCount,
        message: String,
    },
    GalleryUnlocked {
        feature: GalleryFeature,
        collected: usize,
    },
    ProgressReset {
        previous_pull_count: PullCount,
        previous_collected: usize,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GalleryFeature {
    Album,
    Story,
}

