//! lullaby-runner: headless driver for a slot machine session.
//!
//! Usage:
//!   lullaby-runner --seed 12345 --pulls 600 --db progress.db
//!   lullaby-runner --db progress.db --reset
//!   lullaby-runner --seed 12345 --ipc-mode

use anyhow::Result;
use lullaby_core::{
    catalog::Catalog,
    config::EngineConfig,
    event::MachineEvent,
    flavor::{CannedWhispers, FlavorChannel},
    machine::{MachineSnapshot, SlotMachine},
    outcome::OutcomeKind,
    store::SqliteProgressStore,
};
use std::collections::BTreeMap;
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// One JSON line on stdin. `pull` runs whole pulls, reveal included, so
/// there is no separate dismiss command.
#[derive(Debug, PartialEq, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    Pull {
        #[serde(default = "one")]
        count: u64,
    },
    Replay {
        item_id: String,
    },
    Reset {
        #[serde(default)]
        confirm: bool,
    },
    Quit,
}

fn one() -> u64 {
    1
}

#[derive(serde::Serialize)]
struct IpcReply<'a> {
    state: MachineSnapshot,
    events: &'a [MachineEvent],
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let pulls = parse_arg(&args, "--pulls", 100u64);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let reset = args.iter().any(|a| a == "--reset");
    let db = str_arg(&args, "--db").unwrap_or(":memory:");

    let config = match str_arg(&args, "--config") {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let catalog = match str_arg(&args, "--catalog") {
        Some(path) => Catalog::load(path)?,
        None => Catalog::standard(),
    };

    if !ipc_mode {
        println!("Lullaby Slots runner");
        println!("  seed:   {seed}");
        println!("  pulls:  {pulls}");
        println!("  db:     {db}");
        println!();
    }

    let store = SqliteProgressStore::open_migrated(db)?;
    let session_id = format!("session-{seed}-{}", unix_seconds());
    let mut machine = SlotMachine::new(session_id, seed, catalog, config, Box::new(store))?
        .with_flavor(FlavorChannel::new(Arc::new(CannedWhispers::default())));

    if reset {
        machine.reset(true)?;
        println!("Progress cleared.");
        return Ok(());
    }

    if ipc_mode {
        run_ipc_loop(&mut machine)?;
    } else {
        run_batch(&mut machine, pulls)?;
    }
    Ok(())
}

fn run_batch(machine: &mut SlotMachine, pulls: u64) -> Result<()> {
    let mut kinds: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut first_unlocks: Vec<(u64, String)> = Vec::new();

    for _ in 0..pulls {
        let report = machine.run_pull()?;
        *kinds.entry(report.result.kind.as_str()).or_default() += 1;
        for event in &report.events {
            match event {
                MachineEvent::ItemUnlocked { pull, item_id, .. } => {
                    first_unlocks.push((*pull, item_id.clone()));
                }
                MachineEvent::MilestoneReached { pull, message } => {
                    println!("  [pull {pull}] {message}");
                }
                MachineEvent::GalleryUnlocked { feature, collected } => {
                    println!("  gallery {feature:?} opened at {collected} items");
                }
                _ => {}
            }
        }
        if report.result.kind == OutcomeKind::HiddenJackpot {
            println!("  hidden item captured on pull {}", report.pull);
        }
    }

    print_summary(machine, &kinds, &first_unlocks);
    Ok(())
}

fn run_ipc_loop(machine: &mut SlotMachine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        let outcome = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::GetState => Ok(Vec::new()),
            IpcCommand::Pull { count } => (0..count).try_fold(Vec::new(), |mut acc, _| {
                machine.run_pull().map(|report| {
                    acc.extend(report.events);
                    acc
                })
            }),
            IpcCommand::Replay { item_id } => machine.replay(&item_id).map(|_| Vec::new()),
            IpcCommand::Reset { confirm } => machine.reset(confirm),
        };

        match outcome {
            Ok(events) => {
                let reply = IpcReply {
                    state: machine.snapshot(),
                    events: &events,
                };
                writeln!(stdout, "{}", serde_json::to_string(&reply)?)?;
            }
            Err(e) => {
                log::warn!("command failed: {e}");
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
            }
        }
        stdout.flush()?;
    }
    Ok(())
}

fn print_summary(
    machine: &SlotMachine,
    kinds: &BTreeMap<&'static str, u64>,
    first_unlocks: &[(u64, String)],
) {
    let snapshot = machine.snapshot();

    println!();
    println!("=== SESSION SUMMARY ===");
    println!("  session:    {}", snapshot.session_id);
    println!("  pulls:      {}", snapshot.pull_count);
    println!("  collected:  {} / {}", snapshot.collected, snapshot.collectable);
    println!("  hidden:     {}", if snapshot.hidden_unlocked { "captured" } else { "locked" });
    println!("  album:      {}", if snapshot.album_unlocked { "open" } else { "locked" });
    println!("  story:      {}", if snapshot.story_unlocked { "open" } else { "locked" });

    println!();
    println!("=== OUTCOMES ===");
    for (kind, count) in kinds {
        println!("  {kind:<15} {count}");
    }

    if !first_unlocks.is_empty() {
        println!();
        println!("=== UNLOCKS ===");
        for (pull, item_id) in first_unlocks {
            println!("  pull {pull:>4}  {item_id}");
        }
    }
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn unix_seconds() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
