// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Command line arguments

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// strata - module bundler runtime
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Read configuration from this file instead of the default locations
    #[arg(short, long, global = true, env = "STRATA_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a built-in bundle through the runtime
    Demo {
        /// Which bundle to run
        #[arg(value_enum)]
        bundle: Demo,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Demo {
    /// Two modules requiring each other
    Circular,
    /// A module loaded from a lazily fetched chunk
    Chunks,
    /// Replacing a stateful module in place
    Hot,
    /// Lifecycle hooks and aliased requests
    Plugins,
}
