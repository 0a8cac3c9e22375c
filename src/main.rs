// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! strata - command line front end for the bundler runtime
//!
//! ## Commands
//!
//! - `strata demo <circular|chunks|hot|plugins>` runs a built-in bundle
//! - `strata config` prints the effective configuration

mod cli;
mod demos;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use owo_colors::OwoColorize;
use std::process::ExitCode;
use strata_runtime::RuntimeConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("strata=debug,strata_runtime=debug")
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter("strata=warn").init();
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => RuntimeConfig::load().context("failed to load configuration")?,
    };
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Demo { bundle } => demos::run(bundle, config).await,
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
