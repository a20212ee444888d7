// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! terrapin - compiler and bytecode runner for the terrapin scripting language
//!
//! This is the main entry point for the terrapin CLI.
//!
//! ## Commands
//!
//! - `check` - resolve and type-check an AST document
//! - `compile` - write a binary module
//! - `disasm` - print a module in readable form
//! - `run` - execute a module with the turtle host

use clap::Parser;
use owo_colors::OwoColorize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod config;
mod error;
mod turtle;

use cli::{Cli, Commands};
use commands::CommandContext;
use error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if cli.verbose {
        print_banner();
    }

    match execute(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {:#}", "Error".red().bold(), err);
            let code = err
                .downcast_ref::<CliError>()
                .map_or(2, CliError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn execute(cli: &Cli) -> anyhow::Result<()> {
    let mut ctx = CommandContext::new(cli)?;
    match &cli.command {
        Commands::Check(args) => commands::check::run(args, &ctx).await?,
        Commands::Compile(args) => commands::compile::run(args, &mut ctx).await?,
        Commands::Disasm(args) => commands::disasm::run(args, &ctx).await?,
        Commands::Run(args) => commands::run::run(args, &mut ctx).await?,
    }
    Ok(())
}

fn print_banner() {
    eprintln!(
        "{} {}",
        "terrapin".bright_cyan().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
