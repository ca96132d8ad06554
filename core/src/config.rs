//! Engine tuning. Every threshold and probability the outcome engine
//! consults lives here so alternate tunings can be tested side by side.

use crate::{
    error::{LullabyError, LullabyResult},
    types::{Millis, PullCount, REEL_COUNT},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-step win chance indexed by how many non-hidden items are already
/// unlocked. Intentionally non-monotonic: harder mid-game, easier at the tail.
pub const WIN_PROBABILITIES: [f64; 25] = [
    0.40, 0.40, 0.35, 0.25, 0.15, // 1-5
    0.30, 0.25, 0.25, 0.20, 0.15, // 6-10
    0.30, 0.15, 0.25, 0.10, 0.15, // 11-15
    0.40, 0.20, 0.10, 0.25, 0.40, // 16-20
    0.10, 0.15, 0.40, 0.15, 0.35, // 21-25
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Chance that a non-special pull turns into a staged malfunction.
    pub malfunction_probability: f64,
    /// Minimum pull count before the hidden item can be drawn.
    pub hidden_threshold_pulls: PullCount,
    /// Minimum unlocked non-hidden count before the hidden item can be drawn.
    pub hidden_threshold_count: usize,
    /// Pull count at which every remaining non-hidden item is forced out.
    pub guaranteed_threshold_pulls: PullCount,
    pub probability_table: Vec<f64>,
    pub probability_after_all_unlocked: f64,
    /// Distance of the landing cell from the end of a spin strip.
    pub landing_margin: usize,
    pub spin_strip_lengths: [usize; REEL_COUNT],
    pub settle_strip_lengths: [usize; REEL_COUNT],
    pub timings: StageTimings,
    pub milestones: BTreeMap<PullCount, String>,
    pub gallery: GalleryThresholds,
    pub retry_prompts: Vec<String>,
    pub lose_messages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StageTimings {
    /// Lever travel before the reels start.
    pub lever_ms: Millis,
    /// Reel animation window.
    pub spin_ms: Millis,
    /// Shake after a malfunction before the reels are swapped silently.
    pub malfunction_ms: Millis,
}

impl Default for StageTimings {
    fn default() -> Self {
        Self {
            lever_ms: 400,
            spin_ms: 4500,
            malfunction_ms: 500,
        }
    }
}

/// Collection sizes that open extra gallery content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GalleryThresholds {
    pub album: usize,
    pub story: usize,
}

impl Default for GalleryThresholds {
    fn default() -> Self {
        Self { album: 12, story: 20 }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let milestones = [
            (50, "How is it going? Having fun yet?"),
            (100, "How many secret buttons have you unlocked so far?"),
            (150, "Still no hidden item? A few more pulls and you will see."),
            (200, "Two hundred pulls. Persistence mode engaged."),
            (250, "Don't stop now, the next one might be the hidden one."),
            (300, "Three hundred pulls! Keep going and there will be a hint."),
            (350, "Trust me, fifty more and I will tell you."),
            (400, "Honestly, the hidden item is less than fifty pulls away."),
            (450, "Almost there. The full collection is within reach."),
            (500, "Five hundred pulls? Fine, the express lane is open."),
            (550, "Everything is collected. There are no more surprises after this."),
            (600, "Incredible stamina. There is nothing left to design, go to sleep!"),
        ]
        .into_iter()
        .map(|(n, msg)| (n, msg.to_string()))
        .collect();

        Self {
            malfunction_probability: 0.05,
            hidden_threshold_pulls: 420,
            hidden_threshold_count: 23,
            guaranteed_threshold_pulls: 500,
            probability_table: WIN_PROBABILITIES.to_vec(),
            probability_after_all_unlocked: 0.9,
            landing_margin: 5,
            spin_strip_lengths: [30, 60, 80],
            settle_strip_lengths: [40, 45, 50],
            timings: StageTimings::default(),
            milestones,
            gallery: GalleryThresholds::default(),
            retry_prompts: vec![
                "One more pull, then bed".into(),
                "Sleep can wait, spin again".into(),
                "Really the very last one".into(),
                "Just one more and I'm out".into(),
                "Cannot sleep, must pull".into(),
                "Forget sleep, once more".into(),
            ],
            lose_messages: vec![
                "Try again? Or just close your eyes, that works too.".into(),
            ],
        }
    }
}

impl EngineConfig {
    /// Load overrides from a JSON file. Missing fields keep their defaults.
    pub fn load(path: &str) -> LullabyResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LullabyResult<()> {
        let invalid = |reason: String| Err(LullabyError::InvalidConfig { reason });

        let probabilities = self
            .probability_table
            .iter()
            .chain([&self.malfunction_probability, &self.probability_after_all_unlocked]);
        for p in probabilities {
            if !(0.0..=1.0).contains(p) {
                return invalid(format!("probability {p} outside [0, 1]"));
            }
        }
        if self.probability_table.is_empty() {
            return invalid("probability table is empty".into());
        }

        let shortest = self
            .spin_strip_lengths
            .iter()
            .chain(self.settle_strip_lengths.iter())
            .min()
            .copied()
            .unwrap_or(0);
        if self.landing_margin == 0 || self.landing_margin >= shortest {
            return invalid(format!(
                "landing margin {} must be in 1..{shortest}",
                self.landing_margin
            ));
        }
        Ok(())
    }

    /// Win chance for the next pull given the unlocked non-hidden count.
    pub fn win_probability(&self, unlocked_standard: usize) -> f64 {
        self.probability_table
            .get(unlocked_standard)
            .copied()
            .unwrap_or(self.probability_after_all_unlocked)
    }

    pub fn milestone_message(&self, pull_count: PullCount) -> Option<&str> {
        self.milestones.get(&pull_count).map(String::as_str)
    }
}
