// CLI entry point for the Waypoint dedicated server.
//
// Loads an optional JSON lifecycle config, applies command-line overrides,
// and runs the server until the process is killed. Logging goes through
// `tracing`; set `RUST_LOG` to change the filter (default `info`).
//
// Usage:
//   waypoint [OPTIONS]
//     --port <PORT>            Listen port (default: 28000)
//     --missions <DIR>         Mission directory (default: missions)
//     --mission <PATH>         Initial mission, relative to the directory
//     --config <FILE>          Lifecycle config JSON
//     --single-player          Never pause between load stages
//     --max-clients <N>        Connection limit (default: 16)

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use waypoint_mission::{LifecycleConfig, MissionStore, ServerType};
use waypoint_server::{ServerConfig, start_server};

#[derive(Debug, Parser)]
#[command(name = "waypoint", about = "Waypoint dedicated mission server")]
struct Args {
    /// Listen port on 127.0.0.1 (0 picks a free port).
    #[arg(long, default_value_t = 28000)]
    port: u16,

    /// Directory holding mission files.
    #[arg(long, default_value = "missions")]
    missions: PathBuf,

    /// Mission loaded at startup, overriding the config file.
    #[arg(long)]
    mission: Option<String>,

    /// Lifecycle config (JSON). Missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run as a single-player server.
    #[arg(long)]
    single_player: bool,

    #[arg(long, default_value_t = 16)]
    max_clients: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut lifecycle = match &args.config {
        Some(path) => match LifecycleConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                error!("{err}");
                return ExitCode::FAILURE;
            }
        },
        None => LifecycleConfig::default(),
    };
    if args.mission.is_some() {
        lifecycle.initial_mission = args.mission;
    }
    if args.single_player {
        lifecycle.server_type = ServerType::SinglePlayer;
    }

    let config = ServerConfig {
        port: args.port,
        max_clients: args.max_clients,
        lifecycle,
        missions: MissionStore::directory(args.missions),
    };

    let (_handle, addr) = match start_server(config) {
        Ok(result) => result,
        Err(err) => {
            error!("failed to start server: {err}");
            return ExitCode::FAILURE;
        }
    };
    info!("serving missions on {addr}; Ctrl+C to stop");

    // The server runs on its own threads; SIGINT/SIGTERM end the process.
    loop {
        std::thread::park();
    }
}
