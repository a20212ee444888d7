// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Run command implementation.

use owo_colors::OwoColorize;
use terrapin_compiler::HostEnvironment;
use terrapin_compiler::vm::Machine;

use super::CommandContext;
use crate::cli::RunArgs;
use crate::error::Result;
use crate::turtle::{self, SharedTurtle};

/// What a finished run left behind.
#[derive(Debug)]
struct Report {
    steps: u64,
    value: Option<String>,
    segments: usize,
    distance: f64,
    position: (f64, f64),
}

/// Run the run command.
pub async fn run(args: &RunArgs, ctx: &mut CommandContext) -> Result<()> {
    if let Some(max_steps) = args.max_steps {
        ctx.config.vm.max_steps = max_steps;
    }
    let host = HostEnvironment::turtle();
    let module = ctx.module_from(&args.input, host.clone()).await?;
    let options = ctx.config.vm.clone();
    let echo = !ctx.quiet;

    // machine values are not Send
    let report = tokio::task::spawn_blocking(move || {
        let state = SharedTurtle::default();
        let outcome = Machine::new(&module, &options)
            .with_natives(turtle::natives(&state, echo))
            .with_globals(turtle::globals(&host))
            .run()?;
        let state = state.borrow();
        let report = Report {
            steps: outcome.steps,
            value: outcome.value.map(|v| v.to_string()),
            segments: state.segments.len(),
            distance: state
                .segments
                .iter()
                .map(|s| (s.to.0 - s.from.0).hypot(s.to.1 - s.from.1))
                .sum(),
            position: (state.x, state.y),
        };
        Ok::<_, terrapin_compiler::vm::VmError>(report)
    })
    .await??;

    if let Some(value) = &report.value {
        println!("{}", value);
    }
    if !ctx.quiet {
        eprintln!(
            "{} {} segments, length {:.2}, turtle at ({:.2}, {:.2}) {}",
            "Done".green().bold(),
            report.segments,
            report.distance,
            report.position.0,
            report.position.1,
            format!("[{} steps]", report.steps).dimmed()
        );
    }
    Ok(())
}
