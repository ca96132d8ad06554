//! Visual pool restriction.
//!
//! Before the hidden item is captured, every reel a player sees draws
//! only from items they already own. Once it is captured the full
//! non-hidden set comes back for good.

use crate::{
    catalog::{Catalog, Item},
    progression::ProgressionState,
    rng::RandomSource,
};

/// Items allowed to appear on the reels for the current state.
/// Never empty for a valid catalog.
pub fn restricted_pool<'c>(catalog: &'c Catalog, progression: &ProgressionState) -> Vec<&'c Item> {
    let standard = catalog.standard_items();
    let hidden_unlocked = progression.is_unlocked(&catalog.hidden().id);

    if hidden_unlocked || progression.unlocked.is_empty() {
        return standard;
    }

    let narrowed: Vec<&Item> = catalog
        .items()
        .iter()
        .filter(|i| progression.is_unlocked(&i.id))
        .collect();

    if narrowed.is_empty() {
        log::debug!("restricted pool empty after narrowing, using full non-hidden pool");
        standard
    } else {
        narrowed
    }
}

/// Pick uniformly from the first non-empty pool in `pools`, ending with
/// the full catalog. Never leaves a slot unassigned.
pub fn draw_widening<'c>(
    catalog: &'c Catalog,
    pools: &[&[&'c Item]],
    rng: &mut dyn RandomSource,
) -> &'c Item {
    for pool in pools {
        if !pool.is_empty() {
            return pool[rng.pick_index(pool.len())];
        }
    }
    let standard = catalog.standard_items();
    if !standard.is_empty() {
        return standard[rng.pick_index(standard.len())];
    }
    let all = catalog.items();
    &all[rng.pick_index(all.len())]
}
