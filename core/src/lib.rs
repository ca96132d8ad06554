//! Progression and outcome engine for a three-reel collectible slot machine.
//!
//! Leaves first: `catalog` and `config` are static data, `progression`
//! is the only state that survives a pull, `pool`, `outcome`, `strip`
//! and `ledger` are the per-pull logic, and `machine` drives them
//! through the lever, spin and reveal stages.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod flavor;
pub mod ledger;
pub mod machine;
pub mod outcome;
pub mod pool;
pub mod progression;
pub mod rng;
pub mod store;
pub mod strip;
pub mod types;
