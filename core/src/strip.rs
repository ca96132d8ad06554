//! Reel strip generation.
//!
//! A spin strip starts on the item the reel currently shows and lands
//! on the target `LANDING_MARGIN` cells before its end, leaving room
//! for the reel to decelerate past the payline. A settle strip has no
//! target and is played with zero-duration motion (the silent swap).

use crate::{
    catalog::Item,
    config::EngineConfig,
    outcome::SpinResult,
    rng::RandomSource,
    types::{Millis, REEL_COUNT},
};
use serde::{Deserialize, Serialize};

pub const LANDING_MARGIN: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "motion", rename_all = "snake_case")]
pub enum Motion {
    Animated { duration_ms: Millis },
    /// Reposition without visible movement.
    Silent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReelStrip {
    pub cells: Vec<Item>,
    pub landing_index: Option<usize>,
    pub motion: Motion,
}

impl ReelStrip {
    /// The cell left on the payline once the motion completes.
    pub fn resting_item(&self) -> Option<&Item> {
        let idx = self.landing_index.unwrap_or(0);
        self.cells.get(idx)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Build a strip with the standard landing margin.
pub fn build_strip(
    previous: Option<&Item>,
    target: Option<&Item>,
    length: usize,
    pool: &[&Item],
    rng: &mut dyn RandomSource,
) -> Vec<Item> {
    build_strip_with_margin(previous, target, length, LANDING_MARGIN, pool, rng)
}

/// Fill `length` cells from `pool`, then pin cell 0 to `previous` and
/// cell `length - margin` to `target`.
pub fn build_strip_with_margin(
    previous: Option<&Item>,
    target: Option<&Item>,
    length: usize,
    margin: usize,
    pool: &[&Item],
    rng: &mut dyn RandomSource,
) -> Vec<Item> {
    let fallback: Vec<&Item> = target.into_iter().chain(previous).collect();
    let pool = if pool.is_empty() {
        log::warn!("strip pool empty, filling from pinned cells");
        fallback.as_slice()
    } else {
        pool
    };
    if pool.is_empty() || length == 0 {
        return Vec::new();
    }

    let mut strip: Vec<Item> = (0..length)
        .map(|_| pool[rng.pick_index(pool.len())].clone())
        .collect();

    if let Some(prev) = previous {
        strip[0] = prev.clone();
    }
    if let Some(target) = target {
        strip[landing_index(length, margin)] = target.clone();
    }
    strip
}

/// Where the target lands. Short strips land on their last cell.
pub fn landing_index(length: usize, margin: usize) -> usize {
    length.saturating_sub(margin.max(1)).min(length.saturating_sub(1))
}

/// Three animated strips, one per reel, landing on the result's slots.
pub fn spin_strips(
    visible: &[Item; REEL_COUNT],
    result: &SpinResult,
    config: &EngineConfig,
    pool: &[&Item],
    rng: &mut dyn RandomSource,
) -> [ReelStrip; REEL_COUNT] {
    std::array::from_fn(|reel| {
        let length = config.spin_strip_lengths[reel];
        let cells = build_strip_with_margin(
            Some(&visible[reel]),
            Some(&result.slots[reel]),
            length,
            config.landing_margin,
            pool,
            rng,
        );
        ReelStrip {
            cells,
            landing_index: Some(landing_index(length, config.landing_margin)),
            motion: Motion::Animated {
                duration_ms: config.timings.spin_ms,
            },
        }
    })
}

/// Silent-swap strips parking each reel on `landed`.
pub fn settle_strips(
    landed: &[Item; REEL_COUNT],
    config: &EngineConfig,
    pool: &[&Item],
    rng: &mut dyn RandomSource,
) -> [ReelStrip; REEL_COUNT] {
    std::array::from_fn(|reel| ReelStrip {
        cells: build_strip_with_margin(
            Some(&landed[reel]),
            None,
            config.settle_strip_lengths[reel],
            config.landing_margin,
            pool,
            rng,
        ),
        landing_index: None,
        motion: Motion::Silent,
    })
}

/// Strips shown before the first pull of a session.
pub fn idle_strips(
    config: &EngineConfig,
    pool: &[&Item],
    rng: &mut dyn RandomSource,
) -> [ReelStrip; REEL_COUNT] {
    std::array::from_fn(|reel| ReelStrip {
        cells: build_strip_with_margin(
            None,
            None,
            config.settle_strip_lengths[reel],
            config.landing_margin,
            pool,
            rng,
        ),
        landing_index: None,
        motion: Motion::Silent,
    })
}
