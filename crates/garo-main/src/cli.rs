// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "garo-bridge")]
#[command(about = "Poll Garo charging stations from the Garo cloud API", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "garo.toml", global = true)]
    pub config: PathBuf,

    /// Enable debug logging for the bridge
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Refresh on the configured interval until interrupted (default)
    Run,

    /// Run a single refresh cycle and print the snapshot as JSON
    Once,

    /// Check that the configured credentials can sign in and list stations
    Validate,

    /// Write one configuration variable on a charging station
    SetConfig {
        /// Charging station id
        #[arg(long)]
        station: String,

        /// Configuration key, e.g. GaroOwnerMaxCurrent
        #[arg(long)]
        key: String,

        /// New value
        #[arg(long)]
        value: String,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}
