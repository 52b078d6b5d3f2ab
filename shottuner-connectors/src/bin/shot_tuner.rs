//! ShotTuner runner
//!
//! Loads configuration, connects the wire client, and drives one tuning
//! session to completion. Ctrl-C triggers the graceful-shutdown path: the
//! in-flight coefficient is resolved before the process exits.

use std::env;
use std::fs;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info};

use shottuner_connectors::{NtClient, NtConfig};
use shottuner_core::{Orchestrator, Phase, TunerConfig};

const USAGE: &str = "\
shot-tuner - firing-solution coefficient tuner

USAGE:
    shot-tuner [OPTIONS]

OPTIONS:
    --config <path>    JSON configuration overrides
    --team <number>    Team number (overrides the config file)
    --server <addr>    Server address (overrides team-number derivation)
    -h, --help         Print this help
    -V, --version      Print version
";

#[derive(Default)]
struct Args {
    config_path: Option<String>,
    team: Option<u32>,
    server: Option<String>,
    help: bool,
    version: bool,
}

fn parse_args<I: Iterator<Item = String>>(mut argv: I) -> Result<Args, String> {
    let mut args = Args::default();

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--config" => {
                args.config_path = Some(argv.next().ok_or("--config requires a path")?);
            }
            "--team" => {
                let raw = argv.next().ok_or("--team requires a number")?;
                args.team = Some(
                    raw.parse()
                        .map_err(|_| format!("invalid team number '{raw}'"))?,
                );
            }
            "--server" => {
                args.server = Some(argv.next().ok_or("--server requires an address")?);
            }
            "-h" | "--help" => args.help = true,
            "-V" | "--version" => args.version = true,
            other => return Err(format!("unknown argument '{other}'")),
        }
    }

    Ok(args)
}

fn load_config(args: &Args) -> Result<TunerConfig, String> {
    let mut config = match &args.config_path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("cannot read config {path}: {e}"))?;
            serde_json::from_str(&text).map_err(|e| format!("malformed config {path}: {e}"))?
        }
        None => TunerConfig::default(),
    };

    if let Some(team) = args.team {
        config.team_number = team;
    }
    if let Some(server) = &args.server {
        config.server_address = Some(server.clone());
    }

    Ok(config)
}

fn run() -> i32 {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}\n\n{USAGE}");
            return 2;
        }
    };

    if args.help {
        print!("{USAGE}");
        return 0;
    }
    if args.version {
        println!("shot-tuner {}", env!("CARGO_PKG_VERSION"));
        return 0;
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return 2;
        }
    };

    if !config.enabled {
        info!("tuner disabled in configuration, nothing to do");
        return 0;
    }

    let mut orchestrator = match Orchestrator::new(config.clone()) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("invalid configuration: {e}");
            return 2;
        }
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
        error!("cannot install signal handler: {e}");
        return 1;
    }

    let mut client = NtClient::new(
        NtConfig::new().connect_timeout_ms(config.connect_timeout_ms),
    );

    info!(
        "shot-tuner {} targeting {}",
        env!("CARGO_PKG_VERSION"),
        config.resolve_address()
    );

    match orchestrator.run(&mut client, &cancel) {
        Phase::Completed => {
            info!(
                "session complete: {} coefficients committed",
                orchestrator.session().accepted_values().len()
            );
            0
        }
        Phase::Aborted if cancel.load(Ordering::Relaxed) => {
            info!("session cancelled by operator");
            0
        }
        phase => {
            error!("session ended unexpectedly in {phase:?}");
            1
        }
    }
}

fn main() {
    process::exit(run());
}
