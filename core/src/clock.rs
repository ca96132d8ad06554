//! Stage clock: owns elapsed time and the current stage deadline.

use crate::types::Millis;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageClock {
    pub now_ms:   Millis,
    pub deadline: Option<Millis>,
}

impl StageClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward.
    pub fn tick(&mut self, delta_ms: Millis) {
        self.now_ms = self.now_ms.saturating_add(delta_ms);
    }

    /// Start a stage of `duration_ms` from now.
    pub fn arm(&mut self, duration_ms: Millis) {
        self.deadline = Some(self.now_ms.saturating_add(duration_ms));
    }

    /// Start the next stage where the previous one ended, so time that
    /// overshot a deadline carries into the following stage.
    pub fn chain(&mut self, duration_ms: Millis) {
        let base = self.deadline.unwrap_or(self.now_ms);
        self.deadline = Some(base.saturating_add(duration_ms));
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_due(&self) -> bool {
        self.deadline.is_some_and(|d| self.now_ms >= d)
    }

    /// Time left in the current stage, if one is armed.
    pub fn remaining(&self) -> Option<Millis> {
        self.deadline.map(|d| d.saturating_sub(self.now_ms))
    }
}
