// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Disasm command implementation.

use terrapin_compiler::{HostEnvironment, assembly};

use super::CommandContext;
use crate::cli::DisasmArgs;
use crate::error::Result;

/// Run the disasm command.
pub async fn run(args: &DisasmArgs, ctx: &CommandContext) -> Result<()> {
    let module = ctx.module_from(&args.input, HostEnvironment::turtle()).await?;
    print!("{}", assembly::disassemble(&module));
    Ok(())
}
