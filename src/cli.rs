// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! CLI argument parsing for terrapin.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use terrapin_compiler::Addressing;

/// terrapin - compiler and bytecode runner for the terrapin scripting language
#[derive(Parser, Debug)]
#[command(name = "terrapin")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use this configuration file instead of searching for terrapin.toml
    #[arg(long, global = true, env = "TERRAPIN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Type-check a program without writing anything
    Check(CheckArgs),

    /// Compile a program to a binary module
    #[command(alias = "c")]
    Compile(CompileArgs),

    /// Print a binary module in readable form
    #[command(alias = "dis")]
    Disasm(DisasmArgs),

    /// Run a program or a binary module with the turtle host
    Run(RunArgs),
}

/// Jump encoding, as a command line value.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressingArg {
    Fixed,
    Relative,
}

impl From<AddressingArg> for Addressing {
    fn from(arg: AddressingArg) -> Self {
        match arg {
            AddressingArg::Fixed => Addressing::Fixed,
            AddressingArg::Relative => Addressing::Relative,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Program as an AST JSON document
    pub input: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct CompileArgs {
    /// Program as an AST JSON document
    pub input: PathBuf,

    /// Output path (defaults to the input with a .tbc extension)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Jump encoding in the written module
    #[arg(long, value_enum)]
    pub addressing: Option<AddressingArg>,

    /// Module name written into the header
    #[arg(long)]
    pub module_name: Option<String>,

    /// Also print the disassembly
    #[arg(long)]
    pub disasm: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DisasmArgs {
    /// Binary module, or an AST JSON document to compile first
    pub input: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Binary module, or an AST JSON document to compile first
    pub input: PathBuf,

    /// Abort after this many instructions
    #[arg(long)]
    pub max_steps: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_compile_flags() {
        let cli = Cli::parse_from([
            "terrapin",
            "--quiet",
            "compile",
            "spiral.json",
            "-o",
            "out.tbc",
            "--addressing",
            "relative",
        ]);
        assert!(cli.quiet);
        let Commands::Compile(args) = cli.command else {
            panic!("expected compile");
        };
        assert_eq!(args.output, Some(PathBuf::from("out.tbc")));
        assert_eq!(args.addressing, Some(AddressingArg::Relative));
        assert_eq!(Addressing::from(AddressingArg::Relative), Addressing::Relative);
    }
}
