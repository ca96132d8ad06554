//! Shared primitive types used across the engine.

/// A stable, unique catalog identifier ("sheep", "moon", ...).
pub type ItemId = String;

/// Number of lever pulls made in a session. One pull = one Spin Result.
pub type PullCount = u64;

/// Stage durations and elapsed time are tracked in whole milliseconds.
pub type Millis = u64;

/// Number of reels on the machine.
pub const REEL_COUNT: usize = 3;
