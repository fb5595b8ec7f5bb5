//! warden-agent: per-unit control loop for a ZooKeeper ensemble.
//!
//! Loads settings (defaults → TOML file → CLI/env overrides), wires a
//! shell-driven workload to the shared state store, and runs a
//! single-threaded event loop that re-evaluates the ensemble on a timer.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tracing::info;

use warden_agent::events::{Event, EventQueue};
use warden_agent::handlers::{PlatformFacts, UnitAgent};
use warden_agent::settings::Settings;
use warden_agent::workload::ShellWorkload;
use warden_cluster::RestartLock;
use warden_core::{MemoryStore, UnitId};

#[derive(Parser)]
#[command(name = "warden-agent", about = "ZooKeeper ensemble unit agent")]
struct Args {
    /// path to TOML configuration file
    #[arg(short = 'c', long, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// print default configuration as TOML and exit
    #[arg(long)]
    config_template: bool,

    /// this unit's myid
    #[arg(short, long, env = "WARDEN_UNIT_ID")]
    unit_id: Option<u32>,

    /// address published to the rest of the ensemble
    #[arg(long, env = "WARDEN_HOST")]
    host: Option<String>,

    /// directory the rendered server config is written to
    #[arg(long, env = "WARDEN_CONF_DIR")]
    conf_dir: Option<PathBuf>,

    /// workload data directory
    #[arg(long, env = "WARDEN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// act as the coordinator unit
    #[arg(long, env = "WARDEN_COORDINATOR")]
    coordinator: bool,

    /// a certificate relationship is present; drives the ssl transition
    #[arg(long, env = "WARDEN_CERTIFICATE_PRESENT")]
    certificate_present: bool,

    /// seconds to wait after a restart for quorum rejoin
    #[arg(long, env = "WARDEN_SETTLE_SECS")]
    settle_secs: Option<u64>,

    /// seconds between timer ticks
    #[arg(long, env = "WARDEN_TICK_SECS")]
    tick_secs: Option<u64>,
}

/// Applies CLI overrides to `Settings`. Only `Some` values take effect,
/// preserving the resolution order: defaults → TOML file → env/CLI flags.
fn apply_args(settings: &mut Settings, args: &Args) {
    if let Some(id) = args.unit_id {
        settings.unit_id = id;
    }
    if let Some(ref host) = args.host {
        settings.host = host.clone();
    }
    if let Some(ref dir) = args.conf_dir {
        settings.conf_dir = dir.to_string_lossy().into_owned();
    }
    if let Some(ref dir) = args.data_dir {
        settings.data_dir = dir.to_string_lossy().into_owned();
    }
    if args.coordinator {
        settings.coordinator = true;
    }
    if args.certificate_present {
        settings.certificate_present = true;
    }
    if let Some(v) = args.settle_secs {
        settings.settle_secs = v;
    }
    if let Some(v) = args.tick_secs {
        settings.tick_secs = v;
    }
}

/// Prints `msg` to stderr and exits with code 1.
fn exit_err(msg: impl std::fmt::Display) -> ! {
    eprintln!("{msg}");
    std::process::exit(1);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warden=info".into()),
        )
        .init();

    let args = Args::parse();

    // --config-template: dump defaults and exit
    if args.config_template {
        match Settings::default().to_toml() {
            Ok(toml) => {
                println!("{toml}");
                std::process::exit(0);
            }
            Err(e) => exit_err(format!("failed to generate config template: {e}")),
        }
    }

    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path).unwrap_or_else(|e| exit_err(e)),
        None => Settings::default(),
    };
    apply_args(&mut settings, &args);

    let mut topology = settings.topology().unwrap_or_else(|e| exit_err(e));
    // the local unit always plans itself
    topology
        .entry(settings.unit_id)
        .or_insert_with(|| settings.host.clone());

    let workload = ShellWorkload {
        start_cmd: settings.workload.start.clone(),
        restart_cmd: settings.workload.restart.clone(),
        alive_cmd: settings.workload.alive.clone(),
        health_cmd: settings.workload.health.clone(),
    };

    let store = MemoryStore::new();
    let lock = Arc::new(Mutex::new(RestartLock::new()));

    let mut agent = UnitAgent::new(
        UnitId(settings.unit_id),
        settings.host.clone(),
        store,
        workload,
        lock,
        settings.conf_dir.clone(),
        settings.data_dir.clone(),
        Duration::from_secs(settings.settle_secs),
    );

    let facts = PlatformFacts {
        is_coordinator: settings.coordinator,
        certificate_present: settings.certificate_present,
        topology: topology.keys().map(|&id| UnitId(id)).collect::<BTreeSet<_>>(),
    };

    info!(
        unit = settings.unit_id,
        coordinator = settings.coordinator,
        peers = facts.topology.len(),
        "warden agent starting"
    );

    let mut queue = EventQueue::default();
    queue.push(Event::NodeJoined(UnitId(settings.unit_id)));
    queue.push(Event::WorkloadReady);

    let tick = Duration::from_secs(settings.tick_secs.max(1));
    loop {
        queue.drain(|event| agent.handle(event, &facts));
        std::thread::sleep(tick);
        queue.push(Event::Tick);
    }
}
