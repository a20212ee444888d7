// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Check command implementation.

use owo_colors::OwoColorize;
use terrapin_compiler::HostEnvironment;

use super::CommandContext;
use crate::cli::CheckArgs;
use crate::error::Result;

/// Run the check command.
pub async fn run(args: &CheckArgs, ctx: &CommandContext) -> Result<()> {
    let compiled = ctx.compile_file(&args.input, HostEnvironment::turtle()).await?;

    if !ctx.quiet {
        println!(
            "{} {} {}",
            "ok".green().bold(),
            args.input.display(),
            format!("({})", compiled.program_type).dimmed()
        );
    }
    Ok(())
}
