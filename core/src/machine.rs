//! The slot machine session: owns progression and drives each pull
//! through its timed stages.
//!
//! STAGES:
//!   Idle ──pull_lever──▶ LeverPulled ──lever_ms──▶ Spinning
//!   Spinning ──spin_ms / complete_spin──▶ Revealed        (normal result)
//!   Spinning ──spin_ms / complete_spin──▶ Settling        (malfunction)
//!   Settling ──malfunction_ms──▶ Idle                     (silent swap)
//!   Revealed ──dismiss──▶ Idle                            (silent swap)
//!
//! RULES:
//!   - A pull is rejected while LeverPulled, Spinning or Settling.
//!   - A started pull always runs to completion; there is no abort.
//!   - Progress is saved after every change. Save failures are logged.
//!   - Reset is only reachable through `reset(true)`.

use crate::{
    catalog::{Catalog, Item},
    clock::StageClock,
    config::EngineConfig,
    error::{LullabyError, LullabyResult},
    event::{GalleryFeature, MachineEvent},
    flavor::{FlavorChannel, WhisperTicket},
    ledger::{self, CommitOutcome},
    outcome::{decide, pull_flags, OutcomeKind, PullFlags, SpinResult},
    pool::restricted_pool,
    progression::ProgressionState,
    rng::{RandomSource, RngBank, RngStream},
    store::{ProgressStore, PullLogEntry, SqliteProgressStore},
    strip::{idle_strips, settle_strips, spin_strips, ReelStrip},
    types::{ItemId, Millis, PullCount, REEL_COUNT},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MachinePhase {
    Idle,
    LeverPulled,
    Spinning,
    Settling,
    Revealed,
}

impl MachinePhase {
    /// True while a pull owns the machine.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::LeverPulled | Self::Spinning | Self::Settling)
    }
}

/// The pull currently moving through the stages.
#[derive(Debug, Clone)]
struct ActivePull {
    pull: PullCount,
    flags: PullFlags,
    result: Option<SpinResult>,
}

/// What presentation shows once the reels stop on a normal result.
#[derive(Debug, Clone, Serialize)]
pub struct Reveal {
    pub pull: PullCount,
    pub result: SpinResult,
    pub commit: CommitOutcome,
    pub message: String,
    pub retry_prompt: String,
}

/// Outcome of `run_pull`.
#[derive(Debug, Clone, Serialize)]
pub struct PullReport {
    pub pull: PullCount,
    pub result: SpinResult,
    pub commit: Option<CommitOutcome>,
    pub events: Vec<MachineEvent>,
}

impl PullReport {
    pub fn was_new_unlock(&self) -> bool {
        self.commit.as_ref().is_some_and(|c| c.was_new_unlock)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MachineSnapshot {
    pub session_id: String,
    pub phase: MachinePhase,
    pub pull_count: PullCount,
    pub collected: usize,
    pub collectable: usize,
    pub unlocked: Vec<ItemId>,
    pub visible: [ItemId; REEL_COUNT],
    pub hidden_unlocked: bool,
    pub album_unlocked: bool,
    pub story_unlocked: bool,
    pub stage_remaining_ms: Option<Millis>,
}

pub struct SlotMachine {
    session_id: String,
    catalog: Catalog,
    config: EngineConfig,
    progression: ProgressionState,
    phase: MachinePhase,
    clock: StageClock,
    outcome_rng: Box<dyn RandomSource>,
    strip_rng: Box<dyn RandomSource>,
    presentation_rng: Box<dyn RandomSource>,
    store: Box<dyn ProgressStore>,
    flavor: Option<FlavorChannel>,
    visible: [Item; REEL_COUNT],
    strips: [ReelStrip; REEL_COUNT],
    active: Option<ActivePull>,
    last_result: Option<SpinResult>,
    last_commit: Option<CommitOutcome>,
    reveal: Option<Reveal>,
    whisper: Option<WhisperTicket>,
}

impl SlotMachine {
    /// Start a session: load saved progress and park the reels.
    pub fn new(
        session_id: String,
        seed: u64,
        catalog: Catalog,
        config: EngineConfig,
        store: Box<dyn ProgressStore>,
    ) -> LullabyResult<Self> {
        config.validate()?;

        let mut progression = store.load();
        let dropped = progression.retain_known(&catalog);
        if dropped > 0 {
            log::warn!("ignored {dropped} saved item ids missing from the catalog");
        }

        let bank = RngBank::new(seed);
        let mut strip_rng = bank.for_stream(RngStream::Strip);
        let strips = {
            let pool = restricted_pool(&catalog, &progression);
            idle_strips(&config, &pool, &mut strip_rng)
        };
        let visible = resting_items(&strips, &catalog);

        log::info!(
            "session {session_id}: {} pulls, {} of {} collected",
            progression.pull_count,
            progression.unlocked.len(),
            catalog.len()
        );

        Ok(Self {
            session_id,
            catalog,
            config,
            progression,
            phase: MachinePhase::Idle,
            clock: StageClock::new(),
            outcome_rng: Box::new(bank.for_stream(RngStream::Outcome)),
            strip_rng: Box::new(strip_rng),
            presentation_rng: Box::new(bank.for_stream(RngStream::Presentation)),
            store,
            flavor: None,
            visible,
            strips,
            active: None,
            last_result: None,
            last_commit: None,
            reveal: None,
            whisper: None,
        })
    }

    /// Default catalog and tuning over a fresh in-memory store.
    pub fn build_test(session_id: String, seed: u64) -> LullabyResult<Self> {
        let store = SqliteProgressStore::open_migrated(":memory:")?;
        Self::new(
            session_id,
            seed,
            Catalog::standard(),
            EngineConfig::default(),
            Box::new(store),
        )
    }

    /// Replace the outcome and strip sources (scripted tests, replays).
    pub fn with_random(
        mut self,
        outcome: Box<dyn RandomSource>,
        strip: Box<dyn RandomSource>,
    ) -> Self {
        self.outcome_rng = outcome;
        self.strip_rng = strip;
        self
    }

    pub fn with_flavor(mut self, flavor: FlavorChannel) -> Self {
        self.flavor = Some(flavor);
        self
    }

    // ── Accessors ──────────────────────────────────────────────

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> MachinePhase {
        self.phase
    }

    pub fn is_spinning(&self) -> bool {
        self.phase.is_running()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn progression(&self) -> &ProgressionState {
        &self.progression
    }

    pub fn visible(&self) -> &[Item; REEL_COUNT] {
        &self.visible
    }

    pub fn strips(&self) -> &[ReelStrip; REEL_COUNT] {
        &self.strips
    }

    pub fn last_result(&self) -> Option<&SpinResult> {
        self.last_result.as_ref()
    }

    pub fn reveal(&self) -> Option<&Reveal> {
        self.reveal.as_ref()
    }

    pub fn gallery_unlocked(&self, feature: GalleryFeature) -> bool {
        let collected = self.progression.summarize(&self.catalog).collected();
        collected >= gallery_threshold(&self.config, feature)
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        let summary = self.progression.summarize(&self.catalog);
        MachineSnapshot {
            session_id: self.session_id.clone(),
            phase: self.phase,
            pull_count: self.progression.pull_count,
            collected: summary.collected(),
            collectable: self.catalog.len(),
            unlocked: self.progression.unlocked.iter().cloned().collect(),
            visible: slot_ids(&self.visible),
            hidden_unlocked: summary.hidden_unlocked,
            album_unlocked: self.gallery_unlocked(GalleryFeature::Album),
            story_unlocked: self.gallery_unlocked(GalleryFeature::Story),
            stage_remaining_ms: self.clock.remaining(),
        }
    }

    // ── Pull pipeline ──────────────────────────────────────────

    /// Pull the lever. Counts the pull, saves it and arms the lever stage.
    /// Pulling from Revealed dismisses the previous result first.
    pub fn pull_lever(&mut self) -> LullabyResult<Vec<MachineEvent>> {
        if self.phase.is_running() {
            log::debug!("pull rejected: machine is {:?}", self.phase);
            return Err(LullabyError::SpinInProgress);
        }

        let mut events = Vec::new();
        if self.phase == MachinePhase::Revealed {
            self.silent_swap(&mut events);
        }

        let pull = self.progression.record_pull();
        self.persist();

        let flags = pull_flags(
            &self.catalog,
            &self.config,
            &self.progression,
            self.outcome_rng.as_mut(),
        );
        log::debug!(
            "pull={pull} lever: special={} failure={}",
            flags.special,
            flags.failure
        );

        self.active = Some(ActivePull {
            pull,
            flags,
            result: None,
        });
        self.reveal = None;
        self.whisper = None;
        self.phase = MachinePhase::LeverPulled;
        self.clock.arm(self.config.timings.lever_ms);

        events.push(MachineEvent::LeverPulled { pull });
        if let Some(message) = self.config.milestone_message(pull) {
            log::info!("pull={pull} milestone: {message}");
            events.push(MachineEvent::MilestoneReached {
                pull,
                message: message.to_string(),
            });
        }
        Ok(events)
    }

    /// Move time forward and run every stage whose deadline has passed.
    pub fn advance(&mut self, delta_ms: Millis) -> Vec<MachineEvent> {
        let mut events = Vec::new();
        self.clock.tick(delta_ms);
        while self.clock.is_due() {
            match self.phase {
                MachinePhase::LeverPulled => self.start_spin(&mut events),
                MachinePhase::Spinning => self.finish_spin(&mut events),
                MachinePhase::Settling => self.silent_swap(&mut events),
                MachinePhase::Idle | MachinePhase::Revealed => self.clock.disarm(),
            }
        }
        events
    }

    /// Presentation reports the reel animation finished ahead of the timer.
    pub fn complete_spin(&mut self) -> LullabyResult<Vec<MachineEvent>> {
        if self.phase != MachinePhase::Spinning {
            return Err(LullabyError::InvalidPhase {
                operation: "complete_spin",
                phase: self.phase,
            });
        }
        let mut events = Vec::new();
        // End the spin stage now so a following stage starts from here.
        self.clock.arm(0);
        self.finish_spin(&mut events);
        Ok(events)
    }

    /// Close the reveal and park the reels on the landed items.
    pub fn dismiss(&mut self) -> LullabyResult<Vec<MachineEvent>> {
        if self.phase != MachinePhase::Revealed {
            return Err(LullabyError::InvalidPhase {
                operation: "dismiss",
                phase: self.phase,
            });
        }
        let mut events = Vec::new();
        self.silent_swap(&mut events);
        Ok(events)
    }

    /// Drive one pull through every stage and dismiss its reveal.
    pub fn run_pull(&mut self) -> LullabyResult<PullReport> {
        let mut events = self.pull_lever()?;
        let pull = self.progression.pull_count;
        self.last_commit = None;

        let timings = &self.config.timings;
        let total = timings.lever_ms + timings.spin_ms + timings.malfunction_ms;
        events.extend(self.advance(total));

        let result = self
            .last_result
            .clone()
            .ok_or_else(|| anyhow::anyhow!("pull {pull} produced no result"))?;
        let commit = self.last_commit.clone();
        if self.phase == MachinePhase::Revealed {
            events.extend(self.dismiss()?);
        }

        Ok(PullReport {
            pull,
            result,
            commit,
            events,
        })
    }

    // ── Gallery and flavor ─────────────────────────────────────

    /// Rebuild a jackpot for an owned item. No pull is counted.
    pub fn replay(&mut self, item_id: &str) -> LullabyResult<SpinResult> {
        if self.phase.is_running() {
            return Err(LullabyError::SpinInProgress);
        }
        let item = self
            .catalog
            .get(item_id)
            .ok_or_else(|| LullabyError::UnknownItem { id: item_id.into() })?;
        if !self.progression.is_unlocked(item_id) {
            return Err(LullabyError::ItemLocked { id: item_id.into() });
        }
        if let Some(flavor) = &self.flavor {
            self.whisper = Some(flavor.request(&item.label));
        }
        Ok(SpinResult::jackpot(item, OutcomeKind::Replay))
    }

    /// The flavor line for the latest win or replay, once it has arrived.
    pub fn poll_whisper(&mut self) -> Option<String> {
        self.whisper
            .as_mut()
            .and_then(|t| t.poll().map(str::to_string))
    }

    pub fn take_whisper(&mut self) -> Option<WhisperTicket> {
        self.whisper.take()
    }

    // ── Reset ──────────────────────────────────────────────────

    /// Wipe progress and saved storage. Requires explicit confirmation.
    pub fn reset(&mut self, confirmed: bool) -> LullabyResult<Vec<MachineEvent>> {
        if !confirmed {
            return Err(LullabyError::ResetNotConfirmed);
        }
        if self.phase.is_running() {
            return Err(LullabyError::SpinInProgress);
        }

        let mut events = Vec::new();
        if self.phase == MachinePhase::Revealed {
            self.silent_swap(&mut events);
        }

        let previous_pull_count = self.progression.pull_count;
        let previous_collected = self.progression.unlocked.len();
        self.progression = ProgressionState::new();
        if let Err(e) = self.store.clear() {
            log::warn!("clearing saved progress failed: {e}");
        }
        self.last_result = None;
        self.last_commit = None;
        self.reveal = None;
        self.whisper = None;

        log::info!(
            "session {}: progress reset ({previous_pull_count} pulls, {previous_collected} items)",
            self.session_id
        );
        events.push(MachineEvent::ProgressReset {
            previous_pull_count,
            previous_collected,
        });
        Ok(events)
    }

    // ── Stages ─────────────────────────────────────────────────

    fn start_spin(&mut self, events: &mut Vec<MachineEvent>) {
        let Some(active) = self.active.as_mut() else {
            self.clock.disarm();
            self.phase = MachinePhase::Idle;
            return;
        };

        let result = decide(
            &self.catalog,
            &self.config,
            &self.progression,
            active.flags,
            self.outcome_rng.as_mut(),
        );
        let pool = restricted_pool(&self.catalog, &self.progression);
        self.strips = spin_strips(
            &self.visible,
            &result,
            &self.config,
            &pool,
            self.strip_rng.as_mut(),
        );

        events.push(MachineEvent::SpinStarted {
            pull: active.pull,
            kind: result.kind,
            slots: slot_ids(&result.slots),
        });
        active.result = Some(result);
        self.phase = MachinePhase::Spinning;
        self.clock.chain(self.config.timings.spin_ms);
    }

    fn finish_spin(&mut self, events: &mut Vec<MachineEvent>) {
        let Some(ActivePull {
            pull,
            result: Some(result),
            ..
        }) = self.active.take()
        else {
            self.clock.disarm();
            self.phase = MachinePhase::Idle;
            return;
        };

        self.visible = result.slots.clone();
        self.last_result = Some(result.clone());

        if result.kind == OutcomeKind::Malfunction {
            log::info!("pull={pull} malfunction");
            self.log_pull(pull, &result, false);
            events.push(MachineEvent::MalfunctionTriggered { pull });
            self.phase = MachinePhase::Settling;
            self.clock.chain(self.config.timings.malfunction_ms);
            return;
        }

        let collected_before = self.progression.summarize(&self.catalog).collected();
        let commit = ledger::commit(&mut self.progression, &result);
        if result.is_win {
            self.persist();
        }
        self.log_pull(pull, &result, commit.was_new_unlock);

        events.push(MachineEvent::SpinRevealed {
            pull,
            kind: result.kind,
            is_win: result.is_win,
            is_jackpot: result.is_jackpot,
        });

        if commit.was_new_unlock {
            let collected = self.progression.summarize(&self.catalog).collected();
            let item = &result.slots[0];
            events.push(MachineEvent::ItemUnlocked {
                pull,
                item_id: item.id.clone(),
                collected,
                is_hidden: item.is_hidden,
            });
            for feature in [GalleryFeature::Album, GalleryFeature::Story] {
                let threshold = gallery_threshold(&self.config, feature);
                if collected_before < threshold && collected >= threshold {
                    log::info!("gallery {feature:?} unlocked at {collected} items");
                    events.push(MachineEvent::GalleryUnlocked { feature, collected });
                }
            }
        }

        let message = match result.winning_item() {
            Some(item) => item.message.clone(),
            None => pick(self.presentation_rng.as_mut(), &self.config.lose_messages),
        };
        let retry_prompt = pick(self.presentation_rng.as_mut(), &self.config.retry_prompts);

        if let (Some(item), Some(flavor)) = (result.winning_item(), &self.flavor) {
            self.whisper = Some(flavor.request(&item.label));
        }

        self.last_commit = Some(commit.clone());
        self.reveal = Some(Reveal {
            pull,
            result,
            commit,
            message,
            retry_prompt,
        });
        self.phase = MachinePhase::Revealed;
        self.clock.disarm();
    }

    /// Park every reel on what it currently shows, with no visible motion.
    fn silent_swap(&mut self, events: &mut Vec<MachineEvent>) {
        let pool = restricted_pool(&self.catalog, &self.progression);
        self.strips = settle_strips(&self.visible, &self.config, &pool, self.strip_rng.as_mut());
        events.push(MachineEvent::ReelsSettled {
            slots: slot_ids(&self.visible),
        });
        self.phase = MachinePhase::Idle;
        self.clock.disarm();
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.progression) {
            log::warn!("saving progress failed: {e}");
        }
    }

    fn log_pull(&self, pull: PullCount, result: &SpinResult, new_unlock: bool) {
        let entry = PullLogEntry {
            id: None,
            session_id: self.session_id.clone(),
            pull,
            kind: result.kind.as_str().to_string(),
            slots: slot_ids(&result.slots),
            is_win: result.is_win,
            new_unlock,
        };
        if let Err(e) = self.store.record_pull(&entry) {
            log::warn!("recording pull {pull} failed: {e}");
        }
    }
}

fn gallery_threshold(config: &EngineConfig, feature: GalleryFeature) -> usize {
    match feature {
        GalleryFeature::Album => config.gallery.album,
        GalleryFeature::Story => config.gallery.story,
    }
}

fn slot_ids(items: &[Item; REEL_COUNT]) -> [ItemId; REEL_COUNT] {
    std::array::from_fn(|i| items[i].id.clone())
}

fn resting_items(strips: &[ReelStrip; REEL_COUNT], catalog: &Catalog) -> [Item; REEL_COUNT] {
    let fallback = catalog
        .standard_items()
        .first()
        .copied()
        .unwrap_or_else(|| catalog.hidden());
    std::array::from_fn(|i| strips[i].resting_item().unwrap_or(fallback).clone())
}

fn pick(rng: &mut dyn RandomSource, lines: &[String]) -> String {
    if lines.is_empty() {
        return String::new();
    }
    lines[rng.pick_index(lines.len())].clone()
}
