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

//! Implements the server configuration file.

use std::fs;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::Deserialize;

use crate::args::RunArgs;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the server configuration from the file given by `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let dir = match path.as_ref().parent() {
        Some(p) => p,
        None => return Err(anyhow!("the configuration file path has no parent")),
    };
    let raw_config =
        fs::read_to_string(path.as_ref()).context("failed to read the configuration file")?;
    let mut config: Config =
        toml::from_str(&raw_config).context("failed to parse the configuration file")?;

    // When loading the configuration from a path, the record file path
    // is interpreted relative to the configuration file's directory.
    if config.records.is_relative() {
        config.records = dir.join(&config.records);
    }

    log_config_summary(&config);
    Ok(config)
}

/// Loads the server configuration from the parsed command line
/// arguments given by `args`. The caller (through clap's argument
/// groups) ensures that `args.records` is present when `args.config` is
/// not.
pub fn load_from_args(args: RunArgs) -> Result<Config> {
    let bind = args.bind.unwrap_or_else(|| {
        let ip = args.ip.unwrap_or(DEFAULT_BIND_IP);
        let port = args.port.unwrap_or(DEFAULT_BIND_PORT);
        SocketAddr::new(ip, port)
    });
    let records = args
        .records
        .ok_or_else(|| anyhow!("no record file provided"))?;

    let config = Config { bind, records };
    log_config_summary(&config);
    Ok(config)
}

/// Summarizes the configuration in the log.
fn log_config_summary(config: &Config) {
    debug!(
        "Configuration loaded:\n\
         Bind address: {}\n\
         Record file:  {}",
        config.bind,
        config.records.display(),
    );
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    pub records: PathBuf,
}

const DEFAULT_BIND_IP: IpAddr = IpAddr::V6(Ipv6Addr::UNSPECIFIED);
const DEFAULT_BIND_PORT: u16 = 5354;

fn default_bind() -> SocketAddr {
    SocketAddr::new(DEFAULT_BIND_IP, DEFAULT_BIND_PORT)
}
