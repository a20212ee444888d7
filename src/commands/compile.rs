// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Compile command implementation.

use owo_colors::OwoColorize;
use terrapin_compiler::{HostEnvironment, assembly};
use tracing::info;

use super::{CommandContext, default_output};
use crate::cli::CompileArgs;
use crate::error::{CliError, Result};

/// Run the compile command.
pub async fn run(args: &CompileArgs, ctx: &mut CommandContext) -> Result<()> {
    if let Some(name) = &args.module_name {
        ctx.config.compiler.module_name = name.clone();
    }
    if let Some(addressing) = args.addressing {
        ctx.config.compiler.addressing = addressing.into();
    }

    let compiled = ctx.compile_file(&args.input, HostEnvironment::turtle()).await?;
    let bytes = compiled
        .to_bytes()
        .map_err(|diagnostic| CliError::Diagnostic {
            path: args.input.clone(),
            diagnostic,
        })?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.input));
    std::fs::write(&output, &bytes).map_err(|e| CliError::io(&output, e))?;
    info!(output = %output.display(), bytes = bytes.len(), "module written");

    if args.disasm {
        print!("{}", assembly::disassemble(&compiled.module));
    }
    if !ctx.quiet {
        println!(
            "{} {} {}",
            "Compiled".green().bold(),
            output.display().cyan(),
            format!(
                "({} bytes, {} functions)",
                bytes.len(),
                compiled.module.functions.len()
            )
            .dimmed()
        );
    }
    Ok(())
}
