//! KLAXON - Cross-session alert notification coordinator
//!
//! Runs a scripted multi-session simulation against the in-memory shared
//! store: N sessions elect one active poller, mirror its state, and print
//! every repaint of their notification panels.
//!
//! ## Usage
//!
//! ```bash
//! # Run the built-in scenario
//! klaxon
//!
//! # Run a scenario file
//! klaxon scenarios/basic.yaml
//!
//! # With verbose logging
//! klaxon -v
//!
//! # Show version
//! klaxon --version
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tracing::info;

use klaxon_alarm::RecordingPlayer;
use klaxon_center::{NotificationCenter, PollEnvelope, RenderSink, ScriptedPollClient};
use klaxon_core::{Notification, RawNotification, UserSettings, init_logging};
use klaxon_session::{MemoryStore, SessionHandle, SessionRegistry, SharedStore, StoreTopic};

/// KLAXON notification coordinator simulator
///
/// Spawns simulated sessions over one shared store and drives them through
/// a scripted timeline of focus, close, and crash events.
#[derive(Parser, Debug)]
#[command(name = "klaxon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario file (YAML); the built-in scenario runs if omitted
    scenario: Option<PathBuf>,

    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.klaxon/logs/)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

/// A scripted simulation: session count, canned poll replies, and a
/// timeline of lifecycle events.
#[derive(Debug, Deserialize)]
struct Scenario {
    /// Number of sessions to spawn
    #[serde(default = "default_sessions")]
    sessions: usize,

    /// Settings every poll reply carries
    #[serde(default)]
    settings: UserSettings,

    /// Poll replies, consumed in order by whichever session is active;
    /// the last one repeats
    #[serde(default)]
    polls: Vec<ScenarioPoll>,

    /// Lifecycle events, ordered by `at_ms`
    #[serde(default)]
    timeline: Vec<ScenarioStep>,

    /// Total simulation length
    #[serde(default = "default_duration")]
    duration_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ScenarioPoll {
    #[serde(default)]
    notifications: Vec<RawNotification>,
}

#[derive(Debug, Deserialize)]
struct ScenarioStep {
    at_ms: u64,
    #[serde(flatten)]
    action: ScenarioAction,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ScenarioAction {
    /// Give focus to a session (by spawn index)
    Focus { session: usize },
    /// Close a session cleanly (runs its handoff/teardown path)
    Close { session: usize },
    /// Kill a session without the close path
    Crash { session: usize },
}

fn default_sessions() -> usize {
    2
}

fn default_duration() -> u64 {
    3000
}

impl Scenario {
    fn load(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("parsing scenario {}", path.display()))
    }

    /// Two sessions, one alert that later resolves, an election reshuffle.
    fn builtin() -> Self {
        serde_yaml::from_str(
            r#"
sessions: 2
settings:
  msg_timeout: 4
polls:
  - notifications:
      - {eventid: "1001", severity: 4, title: "disk space low"}
  - notifications:
      - {eventid: "1001", severity: -1, title: "disk space low"}
timeline:
  - {at_ms: 500, action: focus, session: 0}
  - {at_ms: 2000, action: close, session: 1}
duration_ms: 4000
"#,
        )
        .expect("built-in scenario parses")
    }
}

/// Prints each repaint of one session's panel as a single line.
struct LineSink {
    uid: String,
}

impl RenderSink for LineSink {
    fn render(&mut self, notifications: &[Notification]) {
        let rendered: Vec<String> = notifications
            .iter()
            .map(|n| {
                let snooze = if n.snoozed { "~" } else { "" };
                format!("{}{}({})", snooze, n.id, n.severity)
            })
            .collect();
        println!("[{}] panel: [{}]", self.uid, rendered.join(", "));
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match init_logging(cli.log_dir.clone(), cli.verbose > 0) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::from(1);
        }
    };

    let scenario = match &cli.scenario {
        Some(path) => match Scenario::load(path) {
            Ok(scenario) => scenario,
            Err(e) => {
                eprintln!("Error: {e:#}");
                return ExitCode::from(1);
            }
        },
        None => Scenario::builtin(),
    };

    info!(sessions = scenario.sessions, "starting simulation");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run_simulation(scenario)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run_simulation(scenario: Scenario) -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let registry = SessionRegistry::new();

    // One scripted server shared by every session; whichever is active
    // consumes the reply queue
    let client = Arc::new(ScriptedPollClient::new());
    for poll in &scenario.polls {
        client.push_envelope(PollEnvelope {
            settings: scenario.settings.clone(),
            notifications: poll.notifications.clone(),
            server_time: None,
        });
    }

    let mut uids = Vec::new();
    let mut tasks = Vec::new();
    for _ in 0..scenario.sessions {
        let (handle, session_rx) = registry.register();
        let uid = handle.uid().to_string();
        let sync_rx = store.subscribe(&uid);
        let center = NotificationCenter::new(
            store.clone(),
            Arc::new(handle),
            client.clone(),
            Box::new(RecordingPlayer::new()),
            Box::new(LineSink { uid: uid.clone() }),
        );
        println!("[{uid}] session opened");
        tasks.push(tokio::spawn(center.run(sync_rx, session_rx)));
        uids.push(uid);
    }

    let mut timeline = scenario.timeline;
    timeline.sort_by_key(|step| step.at_ms);

    let start = tokio::time::Instant::now();
    for step in timeline {
        tokio::time::sleep_until(start + Duration::from_millis(step.at_ms)).await;
        match step.action {
            ScenarioAction::Focus { session } => {
                if let Some(uid) = uids.get(session) {
                    println!("[{uid}] focus");
                    registry.focus(uid);
                }
            }
            ScenarioAction::Close { session } => {
                if let Some(uid) = uids.get(session) {
                    println!("[{uid}] close");
                    registry.close(uid);
                }
            }
            ScenarioAction::Crash { session } => {
                if let Some(uid) = uids.get(session) {
                    println!("[{uid}] crash");
                    registry.crash(uid);
                }
            }
        }
    }

    tokio::time::sleep_until(start + Duration::from_millis(scenario.duration_ms)).await;

    let active = store
        .read_key(StoreTopic::ActiveSession)
        .and_then(|v| v.as_str().map(String::from));
    println!(
        "simulation over; active session: {}",
        active.as_deref().unwrap_or("none")
    );
    println!("server polls served: {}", client.poll_count());

    for task in tasks {
        task.abort();
    }
    Ok(())
}
