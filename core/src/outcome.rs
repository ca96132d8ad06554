//! Outcome determination: the result of every pull.
//!
//! DECISION ORDER (each step short-circuits the next):
//!   1. Malfunction        forced non-matching loss, unless special
//!   2. Special pull       three hidden items once both gates open
//!   3. Win probability    table lookup by unlocked non-hidden count
//!   4. Progress block     wins only repeat owned items while the hidden
//!                         item's pull gate is still closed
//!   5. Pity               forced win of a locked item past the guarantee
//!   6. Normal roll        win, near miss or chaos
//!
//! RULES:
//!   - The pull count is incremented before any of this runs.
//!   - Every path yields exactly three assigned slots.
//!   - `is_jackpot` always equals `is_win`.

use crate::{
    catalog::{Catalog, Item},
    config::EngineConfig,
    pool::{draw_widening, restricted_pool},
    progression::{ProgressionState, ProgressionSummary},
    rng::RandomSource,
    types::REEL_COUNT,
};
use serde::{Deserialize, Serialize};

/// How a result came about. Presentation keys sounds and copy off this.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Malfunction,
    HiddenJackpot,
    Win,
    /// Win restricted to an already-owned item by the progress block.
    BlockedWin,
    /// Forced win of a locked item by the pull-count guarantee.
    PityWin,
    NearMiss,
    Chaos,
    /// Synthetic jackpot rebuilt from the gallery. Never counted as a pull.
    Replay,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malfunction => "malfunction",
            Self::HiddenJackpot => "hidden_jackpot",
            Self::Win => "win",
            Self::BlockedWin => "blocked_win",
            Self::PityWin => "pity_win",
            Self::NearMiss => "near_miss",
            Self::Chaos => "chaos",
            Self::Replay => "replay",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpinResult {
    pub slots: [Item; REEL_COUNT],
    pub is_win: bool,
    /// Tracks `is_win`. Kept separate so a tiered payout can be added later.
    pub is_jackpot: bool,
    pub kind: OutcomeKind,
}

impl SpinResult {
    /// Build a result, deriving the win flags from the slots themselves.
    pub fn from_slots(slots: [Item; REEL_COUNT], kind: OutcomeKind) -> Self {
        let is_win = slots.iter().all(|s| s.id == slots[0].id);
        Self {
            slots,
            is_win,
            is_jackpot: is_win,
            kind,
        }
    }

    pub fn jackpot(item: &Item, kind: OutcomeKind) -> Self {
        Self::from_slots([item.clone(), item.clone(), item.clone()], kind)
    }

    pub fn winning_item(&self) -> Option<&Item> {
        self.is_win.then(|| &self.slots[0])
    }

    pub fn slot_ids(&self) -> [&str; REEL_COUNT] {
        [
            self.slots[0].id.as_str(),
            self.slots[1].id.as_str(),
            self.slots[2].id.as_str(),
        ]
    }
}

/// Pre-checks evaluated before `decide`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PullFlags {
    pub special: bool,
    pub failure: bool,
}

/// True once the hidden item is still locked and both its gates are open.
pub fn is_guaranteed_special_pull(summary: &ProgressionSummary, config: &EngineConfig) -> bool {
    !summary.hidden_unlocked
        && summary.pull_count >= config.hidden_threshold_pulls
        && summary.unlocked_standard >= config.hidden_threshold_count
}

/// Roll for a malfunction. Special pulls never malfunction and draw nothing.
pub fn is_failure_pull(special: bool, config: &EngineConfig, rng: &mut dyn RandomSource) -> bool {
    !special && rng.chance(config.malfunction_probability)
}

/// True while the non-hidden set is complete enough for the hidden item
/// but its pull gate is still shut.
pub fn is_progress_blocked(summary: &ProgressionSummary, config: &EngineConfig) -> bool {
    !summary.hidden_unlocked && summary.unlocked_standard >= config.hidden_threshold_count
}

/// Evaluate both pre-checks for the current (already counted) pull.
pub fn pull_flags(
    catalog: &Catalog,
    config: &EngineConfig,
    progression: &ProgressionState,
    rng: &mut dyn RandomSource,
) -> PullFlags {
    let summary = progression.summarize(catalog);
    let special = is_guaranteed_special_pull(&summary, config);
    let failure = is_failure_pull(special, config, rng);
    PullFlags { special, failure }
}

/// Decide one pull.
pub fn decide(
    catalog: &Catalog,
    config: &EngineConfig,
    progression: &ProgressionState,
    flags: PullFlags,
    rng: &mut dyn RandomSource,
) -> SpinResult {
    let summary = progression.summarize(catalog);
    let visual = restricted_pool(catalog, progression);
    let standard = catalog.standard_items();

    // 1. Malfunction
    if flags.failure && !flags.special {
        log::debug!("pull={} malfunction", summary.pull_count);
        return losing_result(catalog, &visual, &standard, LossShape::Scatter, rng);
    }

    // 2. Special
    if flags.special {
        log::debug!("pull={} special pull: hidden jackpot", summary.pull_count);
        return SpinResult::jackpot(catalog.hidden(), OutcomeKind::HiddenJackpot);
    }

    // 3. Win probability
    let win_probability = config.win_probability(summary.unlocked_standard);

    // 4. Progress block
    if is_progress_blocked(&summary, config) {
        let roll = rng.next_f64();
        if roll < win_probability {
            let owned = progression.unlocked_standard(catalog);
            let item = draw_widening(catalog, &[owned.as_slice(), standard.as_slice()], rng);
            log::debug!(
                "pull={} blocked win: {} (p={win_probability:.2})",
                summary.pull_count,
                item.id
            );
            return SpinResult::jackpot(item, OutcomeKind::BlockedWin);
        }
        return roll_loss(catalog, &visual, &standard, roll, win_probability, rng);
    }

    // 5. Pity
    let locked = progression.locked_standard(catalog);
    if summary.pull_count >= config.guaranteed_threshold_pulls && !locked.is_empty() {
        let item = draw_widening(catalog, &[locked.as_slice(), standard.as_slice()], rng);
        log::debug!(
            "pull={} pity win: {} ({} locked)",
            summary.pull_count,
            item.id,
            locked.len()
        );
        return SpinResult::jackpot(item, OutcomeKind::PityWin);
    }

    // 6. Normal roll
    let roll = rng.next_f64();
    if roll < win_probability {
        let item = draw_widening(catalog, &[standard.as_slice()], rng);
        log::debug!(
            "pull={} win: {} (roll={roll:.3} p={win_probability:.2})",
            summary.pull_count,
            item.id
        );
        return SpinResult::jackpot(item, OutcomeKind::Win);
    }
    roll_loss(catalog, &visual, &standard, roll, win_probability, rng)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LossShape {
    /// Two matching, one different.
    NearMiss,
    /// Independent draws.
    Chaos,
    /// Independent draws, reported as a malfunction.
    Scatter,
}

/// Split the mass above `win_probability` evenly between near miss and chaos.
fn roll_loss<'c>(
    catalog: &'c Catalog,
    visual: &[&'c Item],
    standard: &[&'c Item],
    roll: f64,
    win_probability: f64,
    rng: &mut dyn RandomSource,
) -> SpinResult {
    let loss_mass = (1.0 - win_probability).max(f64::EPSILON);
    let position = (roll - win_probability) / loss_mass;
    let shape = if position < 0.5 {
        LossShape::NearMiss
    } else {
        LossShape::Chaos
    };
    losing_result(catalog, visual, standard, shape, rng)
}

fn losing_result<'c>(
    catalog: &'c Catalog,
    visual: &[&'c Item],
    standard: &[&'c Item],
    shape: LossShape,
    rng: &mut dyn RandomSource,
) -> SpinResult {
    let all: Vec<&Item> = catalog.items().iter().collect();

    let (slots, kind) = match shape {
        LossShape::NearMiss => {
            let a = draw_widening(catalog, &[visual, standard], rng);
            let b = draw_other(catalog, a, &[visual, standard, all.as_slice()], rng);
            ([a, a, b], OutcomeKind::NearMiss)
        }
        LossShape::Chaos | LossShape::Scatter => {
            let a = draw_widening(catalog, &[visual, standard], rng);
            let b = draw_widening(catalog, &[visual, standard], rng);
            let mut c = draw_widening(catalog, &[visual, standard], rng);
            if a.id == b.id && b.id == c.id {
                c = draw_other(catalog, a, &[visual, standard, all.as_slice()], rng);
            }
            let kind = if shape == LossShape::Scatter {
                OutcomeKind::Malfunction
            } else {
                OutcomeKind::Chaos
            };
            ([a, b, c], kind)
        }
    };

    SpinResult::from_slots([slots[0].clone(), slots[1].clone(), slots[2].clone()], kind)
}

/// Draw an item different from `avoid`, widening through `pools`.
fn draw_other<'c>(
    catalog: &'c Catalog,
    avoid: &Item,
    pools: &[&[&'c Item]],
    rng: &mut dyn RandomSource,
) -> &'c Item {
    let filtered: Vec<Vec<&'c Item>> = pools
        .iter()
        .map(|pool| pool.iter().copied().filter(|i| i.id != avoid.id).collect())
        .collect();
    let views: Vec<&[&'c Item]> = filtered.iter().map(Vec::as_slice).collect();
    draw_widening(catalog, &views, rng)
}
