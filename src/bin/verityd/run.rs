// Copyright 2024 the verity developers.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implements the `run` command (i.e., running the server).

use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use verity::io::UdpIoProvider;
use verity::server::Server;
use verity::store::{file, RecordStore};

use crate::args::RunArgs;
use crate::config;

/// Runs the server.
pub fn run(args: RunArgs) {
    env_logger::init_from_env(Env::new().default_filter_or("warn"));

    if let Err(e) = try_running(args) {
        let mut message = String::from("Failed to run:");
        for (i, cause) in e.chain().enumerate() {
            write!(message, "\n[{}] {}", i + 1, cause).unwrap();
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
    info!("Exiting with success.");
}

fn try_running(run_args: RunArgs) -> Result<()> {
    info!(
        "Verity daemon v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );

    // Get the configuration, either from the file system or from the
    // command line arguments, as appropriate.
    let (config, reload_source) = if let Some(ref config_path) = run_args.config {
        info!("Loading the configuration from {}.", config_path.display());
        let config =
            config::load_from_path(config_path).context("failed to load the configuration")?;
        let reload_source = ReloadSource::Config(config_path.clone());
        (config, reload_source)
    } else {
        info!("Loading the configuration from the command line.");
        let config =
            config::load_from_args(run_args).context("failed to load the configuration")?;
        let reload_source = ReloadSource::Records(config.records.clone());
        (config, reload_source)
    };

    // Bind the socket before loading records, so that an unusable bind
    // address fails fast.
    let io_provider = UdpIoProvider::bind(config.bind).context("failed to bind the socket")?;

    // Load the records.
    info!("Loading records from {}.", config.records.display());
    let store = load_store(&config.records)?;
    let server = Arc::new(Server::new(Arc::new(store)));

    // Set up signal handling.
    let mut signals = set_up_signal_handling().context("failed to set up signal handling")?;

    // Start the UDP worker.
    info!("Set-up is complete; starting the server.");
    let shutdown = Arc::new(AtomicBool::new(false));
    let worker = {
        let server = server.clone();
        let shutdown = shutdown.clone();
        thread::Builder::new()
            .name("udp worker".into())
            .spawn(move || {
                if let Err(e) = io_provider.run(&server, &shutdown) {
                    error!("The UDP worker failed: {}", e);
                }
            })
            .context("failed to start the UDP worker")?
    };

    // Process incoming signals.
    for signal in signals.forever() {
        match signal {
            s @ (SIGINT | SIGTERM) => {
                let name = match s {
                    SIGINT => "SIGINT",
                    SIGTERM => "SIGTERM",
                    _ => unreachable!(),
                };
                info!("Received {}; shutting down.", name);
                break;
            }
            SIGHUP => {
                info!("Received SIGHUP; reloading records.");
                if let Err(e) = reload_records(&reload_source, &server) {
                    let mut message = String::from("Failed to reload records:");
                    for (i, cause) in e.chain().enumerate() {
                        write!(message, "\n[{}] {}", i + 1, cause).unwrap();
                    }
                    error!("{}", message);
                }
            }
            _ => unreachable!(),
        }
    }

    // Shut down the server.
    shutdown.store(true, Ordering::SeqCst);
    if worker.join().is_err() {
        error!("The UDP worker panicked.");
    }
    info!("Shutdown complete.");
    Ok(())
}

/// Loads the record store from `path`, with logging and context.
fn load_store(path: &Path) -> Result<RecordStore> {
    let store = file::load(path).context("failed to load the record file")?;
    if store.len() == 1 {
        info!("Loaded 1 record.");
    } else {
        info!("Loaded {} records.", store.len());
    }
    Ok(store)
}

fn set_up_signal_handling() -> Result<Signals> {
    let all_signals = &[SIGHUP, SIGINT, SIGTERM];
    let term_signals = &[SIGINT, SIGTERM];
    let already_terminating = Arc::new(AtomicBool::new(false));

    // This sets up signal handlers to exit immediately if a second
    // termination signal arrives before the process finishes shutting
    // down gracefully.
    for sig in term_signals {
        signal_hook::flag::register_conditional_shutdown(*sig, 1, already_terminating.clone())?;
        signal_hook::flag::register(*sig, already_terminating.clone())?;
    }

    Signals::new(all_signals).map_err(Into::into)
}

/// Where to find the record file when reloading. Reloading by
/// configuration file re-reads the configuration, so that a changed
/// record path takes effect; the bind address cannot change without a
/// restart.
enum ReloadSource {
    Records(PathBuf),
    Config(PathBuf),
}

fn reload_records(reload_source: &ReloadSource, server: &Server) -> Result<()> {
    let records_path = match reload_source {
        ReloadSource::Records(path) => path.clone(),
        ReloadSource::Config(path) => {
            let config =
                config::load_from_path(path).context("failed to reload the configuration")?;
            config.records
        }
    };
    let new_store = load_store(&records_path)?;
    server.set_store(Arc::new(new_store));
    Ok(())
}
