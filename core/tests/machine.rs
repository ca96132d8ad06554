//! Slot machine session tests.
//!
//! Tests cover: the re-entry guard, stage timing, malfunction flow,
//! persistence, reset confirmation, replay, milestones, gallery gates,
//! hidden capture, flavor text, and corrupt storage recovery.

use lullaby_core::{
    catalog::Catalog,
    config::EngineConfig,
    error::{LullabyError, LullabyResult},
    event::{GalleryFeature, MachineEvent},
    flavor::{CannedWhispers, FlavorChannel, FlavorSource, FALLBACK_WHISPER},
    machine::{MachinePhase, SlotMachine},
    outcome::OutcomeKind,
    progression::ProgressionState,
    rng::ScriptedRandom,
    store::{
        ProgressStore, PullLogEntry, SqliteProgressStore, KEY_PULL_COUNT, KEY_UNLOCKED_ITEMS,
    },
};
use std::sync::Arc;

fn shared_uri(name: &str) -> String {
    format!("file:{name}?mode=memory&cache=shared")
}

/// Open a shared in-memory store, seed it with `state`, and start a
/// session on a second connection. The returned store keeps the
/// database alive and lets the test inspect what the machine saved.
fn session_over(name: &str, state: &ProgressionState) -> (SqliteProgressStore, SlotMachine) {
    let uri = shared_uri(name);
    let keeper = SqliteProgressStore::open_migrated(&uri).expect("open keeper");
    keeper.save(state).expect("seed state");
    let store = SqliteProgressStore::open_migrated(&uri).expect("open session store");
    let machine = SlotMachine::new(
        name.to_string(),
        42,
        Catalog::standard(),
        EngineConfig::default(),
        Box::new(store),
    )
    .expect("session");
    (keeper, machine)
}

fn state_with(n: usize, pulls: u64) -> ProgressionState {
    let catalog = Catalog::standard();
    let mut state = ProgressionState::new();
    for item in catalog.standard_items().into_iter().take(n) {
        state.unlocked.insert(item.id.clone());
    }
    state.pull_count = pulls;
    state
}

/// Pin the outcome draws; strips fill from the middle of the pool.
fn scripted(machine: SlotMachine, draws: Vec<f64>, fallback: f64) -> SlotMachine {
    machine.with_random(
        Box::new(ScriptedRandom::new(draws).with_fallback(fallback)),
        Box::new(ScriptedRandom::new([]).with_fallback(0.5)),
    )
}

fn test_machine(seed: u64) -> SlotMachine {
    let _ = env_logger::builder().is_test(true).try_init();
    SlotMachine::build_test(format!("test-{seed}"), seed).expect("build_test")
}

#[test]
fn pull_is_rejected_while_running() {
    // 0.5 no malfunction, 0.9 chaos loss.
    let mut m = scripted(test_machine(1), vec![0.5, 0.9], 0.2);

    m.pull_lever().expect("first pull");
    assert_eq!(m.phase(), MachinePhase::LeverPulled);
    assert!(matches!(m.pull_lever(), Err(LullabyError::SpinInProgress)));

    m.advance(400);
    assert_eq!(m.phase(), MachinePhase::Spinning);
    assert!(matches!(m.pull_lever(), Err(LullabyError::SpinInProgress)));
    assert_eq!(m.progression().pull_count, 1, "rejected pulls are not counted");

    m.advance(4_500);
    assert_eq!(m.phase(), MachinePhase::Revealed);

    let events = m.pull_lever().expect("pull from revealed");
    assert!(matches!(events.first(), Some(MachineEvent::ReelsSettled { .. })));
    assert_eq!(m.progression().pull_count, 2);
}

#[test]
fn stages_follow_their_timings() {
    let mut m = scripted(test_machine(2), vec![0.5, 0.9], 0.2);
    m.pull_lever().expect("pull");

    assert!(m.advance(399).is_empty());
    assert_eq!(m.phase(), MachinePhase::LeverPulled);

    let events = m.advance(1);
    assert!(matches!(events.as_slice(), [MachineEvent::SpinStarted { pull: 1, .. }]));
    assert_eq!(m.phase(), MachinePhase::Spinning);
    assert_eq!(m.snapshot().stage_remaining_ms, Some(4_500));

    m.advance(4_499);
    assert_eq!(m.phase(), MachinePhase::Spinning);
    let events = m.advance(1);
    assert!(events.iter().any(|e| matches!(e, MachineEvent::SpinRevealed { is_win: false, .. })));
    assert_eq!(m.phase(), MachinePhase::Revealed);
}

#[test]
fn one_large_tick_runs_every_due_stage() {
    let mut m = scripted(test_machine(3), vec![0.5, 0.9], 0.2);
    m.pull_lever().expect("pull");
    let events = m.advance(10_000);
    assert!(events.iter().any(|e| matches!(e, MachineEvent::SpinStarted { .. })));
    assert!(events.iter().any(|e| matches!(e, MachineEvent::SpinRevealed { .. })));
    assert_eq!(m.phase(), MachinePhase::Revealed);
}

#[test]
fn spin_strips_land_on_the_result() {
    let mut m = scripted(test_machine(4), vec![0.5, 0.9], 0.2);
    m.pull_lever().expect("pull");
    let before: Vec<String> = m.visible().iter().map(|i| i.id.clone()).collect();
    m.advance(400);

    let reveal_slots = m.strips().clone();
    m.advance(4_500);
    let result = m.last_result().expect("result").clone();
    for reel in 0..3 {
        assert_eq!(reveal_slots[reel].cells[0].id, before[reel], "strip starts on shown item");
        assert_eq!(
            reveal_slots[reel].resting_item().map(|i| i.id.clone()),
            Some(result.slots[reel].id.clone())
        );
        assert_eq!(m.visible()[reel].id, result.slots[reel].id);
    }
}

#[test]
fn scripted_win_reveals_and_unlocks() {
    let catalog = Catalog::standard();
    // 0.5 no malfunction, 0.3 < 0.40 wins, 0.0 picks the first item.
    let mut m = scripted(test_machine(5), vec![0.5, 0.3, 0.0], 0.99);

    m.pull_lever().expect("pull");
    let events = m.advance(4_900);
    assert!(events.contains(&MachineEvent::ItemUnlocked {
        pull: 1,
        item_id: "sheep".into(),
        collected: 1,
        is_hidden: false,
    }));

    let reveal = m.reveal().expect("reveal");
    assert!(reveal.result.is_win && reveal.result.is_jackpot);
    assert_eq!(reveal.result.kind, OutcomeKind::Win);
    assert!(reveal.commit.was_new_unlock);
    assert_eq!(reveal.message, catalog.get("sheep").expect("sheep").message);
    assert!(m.config().retry_prompts.contains(&reveal.retry_prompt));

    let events = m.dismiss().expect("dismiss");
    assert!(matches!(events.as_slice(), [MachineEvent::ReelsSettled { .. }]));
    assert_eq!(m.phase(), MachinePhase::Idle);
    assert!(m.visible().iter().all(|i| i.id == "sheep"));
    assert!(m.strips().iter().all(|s| s.cells[0].id == "sheep"));

    let snap = m.snapshot();
    assert_eq!(snap.collected, 1);
    assert_eq!(snap.collectable, 26);
    assert_eq!(snap.unlocked, vec!["sheep".to_string()]);
}

#[test]
fn losses_after_first_unlock_stay_non_matching() {
    let mut m = scripted(test_machine(6), vec![0.5, 0.3, 0.0], 0.99);
    m.run_pull().expect("winning pull");

    // Only sheep is owned; the loss must still break the triple.
    let report = m.run_pull().expect("losing pull");
    assert!(!report.result.is_win, "{:?}", report.result);
    assert_eq!(report.result.kind, OutcomeKind::Chaos);
    assert!(!report.was_new_unlock());
}

#[test]
fn malfunction_settles_silently_without_reveal() {
    let mut m = scripted(test_machine(7), vec![0.01], 0.3);
    m.pull_lever().expect("pull");

    let events = m.advance(400);
    assert!(matches!(
        events.as_slice(),
        [MachineEvent::SpinStarted { kind: OutcomeKind::Malfunction, .. }]
    ));

    let events = m.advance(4_500);
    assert_eq!(events, vec![MachineEvent::MalfunctionTriggered { pull: 1 }]);
    assert_eq!(m.phase(), MachinePhase::Settling);
    assert!(m.reveal().is_none());
    assert!(matches!(m.pull_lever(), Err(LullabyError::SpinInProgress)));

    let events = m.advance(500);
    assert!(matches!(events.as_slice(), [MachineEvent::ReelsSettled { .. }]));
    assert_eq!(m.phase(), MachinePhase::Idle);
    assert_eq!(m.progression().pull_count, 1);
    assert!(m.progression().unlocked.is_empty());
    assert!(!m.last_result().expect("result").is_win);
}

#[test]
fn complete_spin_ends_the_spin_early() {
    let mut m = scripted(test_machine(8), vec![0.5, 0.9], 0.2);
    assert!(matches!(
        m.complete_spin(),
        Err(LullabyError::InvalidPhase { operation: "complete_spin", .. })
    ));

    m.pull_lever().expect("pull");
    m.advance(400);
    let events = m.complete_spin().expect("complete");
    assert!(events.iter().any(|e| matches!(e, MachineEvent::SpinRevealed { .. })));
    assert_eq!(m.phase(), MachinePhase::Revealed);

    m.dismiss().expect("dismiss");
    assert!(matches!(
        m.dismiss(),
        Err(LullabyError::InvalidPhase { operation: "dismiss", phase: MachinePhase::Idle })
    ));
}

#[test]
fn every_pull_counts_exactly_once() {
    let mut m = test_machine(9);
    let mut previous = m.progression().unlocked.clone();
    for expected in 1..=150 {
        let report = m.run_pull().expect("pull");
        assert_eq!(report.pull, expected);
        assert_eq!(m.progression().pull_count, expected);
        assert_eq!(m.phase(), MachinePhase::Idle);
        assert!(previous.is_subset(&m.progression().unlocked), "unlocks never shrink");
        previous = m.progression().unlocked.clone();
    }
}

#[test]
fn pull_count_is_saved_before_the_spin_resolves() {
    let (keeper, mut m) = session_over("machine_saved_early", &ProgressionState::new());
    m.pull_lever().expect("pull");
    assert_eq!(keeper.load().pull_count, 1);
    assert_eq!(m.phase(), MachinePhase::LeverPulled);
}

#[test]
fn progress_survives_a_new_session() {
    let (keeper, m) = session_over("machine_resume", &state_with(0, 0));
    let mut m = scripted(m, vec![0.5, 0.3, 0.0], 0.99);
    m.run_pull().expect("win");
    m.run_pull().expect("loss");
    drop(m);

    let store = keeper.reopen().expect("reopen");
    let resumed = SlotMachine::new(
        "machine_resume".into(),
        7,
        Catalog::standard(),
        EngineConfig::default(),
        Box::new(store),
    )
    .expect("resume");
    assert_eq!(resumed.progression().pull_count, 2);
    assert!(resumed.progression().is_unlocked("sheep"));
    assert_eq!(resumed.phase(), MachinePhase::Idle);
}

#[test]
fn reset_requires_confirmation() {
    let (keeper, m) = session_over("machine_reset", &state_with(5, 80));
    let mut m = scripted(m, vec![0.5, 0.9], 0.2);

    assert!(matches!(m.reset(false), Err(LullabyError::ResetNotConfirmed)));
    assert_eq!(m.progression().pull_count, 80, "unconfirmed reset changes nothing");

    m.pull_lever().expect("pull");
    assert!(matches!(m.reset(true), Err(LullabyError::SpinInProgress)));
    m.advance(4_900);

    let events = m.reset(true).expect("reset");
    assert!(events.contains(&MachineEvent::ProgressReset {
        previous_pull_count: 81,
        previous_collected: 5,
    }));
    assert_eq!(m.phase(), MachinePhase::Idle);
    assert_eq!(m.progression(), &ProgressionState::new());
    assert!(m.reveal().is_none());
    assert_eq!(keeper.load(), ProgressionState::new());
}

#[test]
fn replay_needs_an_owned_item() {
    let (_keeper, mut m) = session_over("machine_replay", &state_with(3, 12));

    assert!(matches!(m.replay("dragon"), Err(LullabyError::UnknownItem { .. })));
    assert!(matches!(m.replay("unicorn"), Err(LullabyError::ItemLocked { .. })));

    let result = m.replay("moon").expect("replay");
    assert_eq!(result.kind, OutcomeKind::Replay);
    assert!(result.is_win && result.is_jackpot);
    assert!(result.slots.iter().all(|s| s.id == "moon"));
    assert_eq!(m.progression().pull_count, 12, "replay is not a pull");

    m.pull_lever().expect("pull");
    assert!(matches!(m.replay("moon"), Err(LullabyError::SpinInProgress)));
}

#[test]
fn milestone_fires_on_its_pull() {
    let (_keeper, mut m) = session_over("machine_milestone", &state_with(2, 49));
    let events = m.pull_lever().expect("pull 50");
    let expected = m.config().milestone_message(50).expect("milestone 50").to_string();
    assert!(events.contains(&MachineEvent::MilestoneReached {
        pull: 50,
        message: expected,
    }));

    m.advance(10_000);
    let events = m.pull_lever().expect("pull 51");
    assert!(!events.iter().any(|e| matches!(e, MachineEvent::MilestoneReached { .. })));
}

#[test]
fn twelfth_item_opens_the_album() {
    let (_keeper, m) = session_over("machine_album", &state_with(11, 20));
    // 0.0 < 0.15 wins; 0.99 picks the last non-hidden item.
    let mut m = scripted(m, vec![0.5, 0.0, 0.99], 0.5);
    assert!(!m.gallery_unlocked(GalleryFeature::Album));

    let report = m.run_pull().expect("pull");
    assert_eq!(report.result.slots[0].id, "balloon");
    assert!(report.events.contains(&MachineEvent::GalleryUnlocked {
        feature: GalleryFeature::Album,
        collected: 12,
    }));

    let snap = m.snapshot();
    assert!(snap.album_unlocked);
    assert!(!snap.story_unlocked);
}

#[test]
fn hidden_item_arrives_on_pull_420() {
    let (keeper, m) = session_over("machine_hidden", &state_with(23, 419));
    let mut m = scripted(m, vec![], 0.5);

    let report = m.run_pull().expect("pull 420");
    assert_eq!(report.result.kind, OutcomeKind::HiddenJackpot);
    assert!(report.events.contains(&MachineEvent::ItemUnlocked {
        pull: 420,
        item_id: "unicorn".into(),
        collected: 24,
        is_hidden: true,
    }));
    assert!(m.snapshot().hidden_unlocked);
    assert!(keeper.load().is_unlocked("unicorn"));
}

#[test]
fn hidden_item_waits_for_pull_420() {
    let (_keeper, m) = session_over("machine_hidden_early", &state_with(23, 400));
    let mut m = scripted(m, vec![], 0.5);
    for _ in 0..19 {
        let report = m.run_pull().expect("pull");
        assert_ne!(report.result.kind, OutcomeKind::HiddenJackpot);
        assert!(!report.result.slots.iter().any(|s| s.is_hidden));
    }
    assert_eq!(m.progression().pull_count, 419);
    assert!(!m.snapshot().hidden_unlocked);
}

#[test]
fn blocked_sessions_only_repeat_owned_items() {
    let (_keeper, mut m) = session_over("machine_blocked", &state_with(23, 100));
    for _ in 0..250 {
        m.run_pull().expect("pull");
    }
    assert_eq!(m.progression().unlocked.len(), 23, "no new items before pull 420");
}

#[test]
fn long_session_collects_everything() {
    let mut m = test_machine(10);
    for _ in 0..700 {
        m.run_pull().expect("pull");
    }
    let snap = m.snapshot();
    assert_eq!(snap.collected, 26);
    assert!(snap.hidden_unlocked && snap.album_unlocked && snap.story_unlocked);
}

#[test]
fn wins_request_flavor_text() {
    let mut m = scripted(test_machine(11), vec![0.5, 0.3, 0.0], 0.99)
        .with_flavor(FlavorChannel::new(Arc::new(CannedWhispers::default())));
    m.run_pull().expect("win");
    let line = m.take_whisper().expect("ticket").wait();
    assert!(line.contains("Counting Sheep"), "got: {line}");

    m.run_pull().expect("loss");
    assert!(m.take_whisper().is_none(), "losses ask for nothing");
}

struct BrokenSource;

impl FlavorSource for BrokenSource {
    fn whisper(&self, _label: &str) -> anyhow::Result<Option<String>> {
        anyhow::bail!("source offline")
    }
}

#[test]
fn failing_flavor_source_falls_back() {
    let (_keeper, m) = session_over("machine_flavor_fail", &state_with(4, 9));
    let mut m = m.with_flavor(FlavorChannel::new(Arc::new(BrokenSource)));
    m.replay("milk").expect("replay");
    assert_eq!(m.take_whisper().expect("ticket").wait(), FALLBACK_WHISPER);
}

#[test]
fn corrupt_storage_starts_empty() {
    let uri = shared_uri("machine_corrupt");
    let keeper = SqliteProgressStore::open_migrated(&uri).expect("keeper");
    keeper.put_value(KEY_UNLOCKED_ITEMS, "{not json").expect("put");
    keeper.put_value(KEY_PULL_COUNT, "lots").expect("put");

    let m = SlotMachine::new(
        "corrupt".into(),
        1,
        Catalog::standard(),
        EngineConfig::default(),
        Box::new(SqliteProgressStore::open_migrated(&uri).expect("store")),
    )
    .expect("session starts anyway");
    assert_eq!(m.progression(), &ProgressionState::new());
    assert_eq!(keeper.get_value(KEY_UNLOCKED_ITEMS).expect("get"), None, "bad payload discarded");
}

#[test]
fn unknown_saved_ids_are_dropped() {
    let mut state = state_with(2, 5);
    state.unlocked.insert("retired-item".into());
    let (_keeper, m) = session_over("machine_unknown_ids", &state);
    assert_eq!(m.progression().unlocked.len(), 2);
    assert!(!m.progression().is_unlocked("retired-item"));
}

/// A store whose every write fails.
struct ReadOnlyDisk;

impl ProgressStore for ReadOnlyDisk {
    fn load(&self) -> ProgressionState {
        ProgressionState::new()
    }

    fn save(&self, _state: &ProgressionState) -> LullabyResult<()> {
        Err(anyhow::anyhow!("disk is read-only").into())
    }

    fn clear(&self) -> LullabyResult<()> {
        Err(anyhow::anyhow!("disk is read-only").into())
    }

    fn record_pull(&self, _entry: &PullLogEntry) -> LullabyResult<()> {
        Err(anyhow::anyhow!("disk is read-only").into())
    }
}

#[test]
fn failed_writes_never_stop_the_session() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut m = SlotMachine::new(
        "read-only".into(),
        10,
        Catalog::standard(),
        EngineConfig::default(),
        Box::new(ReadOnlyDisk),
    )
    .expect("session starts without a writable store");

    for expected in 1..=700 {
        let report = m.run_pull().expect("pull survives a failed save");
        assert_eq!(report.pull, expected);
    }
    let snap = m.snapshot();
    assert_eq!(snap.pull_count, 700);
    assert_eq!(snap.collected, 26, "unlocks still land in memory");

    let events = m.reset(true).expect("reset survives a failed clear");
    assert!(events.contains(&MachineEvent::ProgressReset {
        previous_pull_count: 700,
        previous_collected: 26,
    }));
    assert_eq!(m.progression(), &ProgressionState::new());

    let report = m.run_pull().expect("pull after reset");
    assert_eq!(report.pull, 1);
}

#[test]
fn invalid_config_is_rejected() {
    let config = EngineConfig {
        landing_margin: 0,
        ..EngineConfig::default()
    };
    let result = SlotMachine::new(
        "bad".into(),
        1,
        Catalog::standard(),
        config,
        Box::new(SqliteProgressStore::open_migrated(":memory:").expect("store")),
    );
    assert!(matches!(result, Err(LullabyError::InvalidConfig { .. })));
}
