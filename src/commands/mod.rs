// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Command implementations for terrapin.

pub mod check;
pub mod compile;
pub mod disasm;
pub mod run;

use std::path::{Path, PathBuf};
use terrapin_compiler::assembly::{self, MAGIC, Module};
use terrapin_compiler::ast::Program;
use terrapin_compiler::{CancellationToken, Compiled, Compiler, HostEnvironment};
use tracing::{debug, warn};

use crate::cli::Cli;
use crate::config::Config;
use crate::error::{CliError, Result};

/// Common context for command execution.
pub struct CommandContext {
    pub config: Config,
    pub quiet: bool,
}

impl CommandContext {
    /// Loads the configuration for the current directory.
    pub fn new(cli: &Cli) -> Result<Self> {
        let project_dir = std::env::current_dir().map_err(|e| CliError::io(".", e))?;
        let config = Config::load(&project_dir, cli.config.as_deref())?;
        Ok(Self {
            config,
            quiet: cli.quiet,
        })
    }

    /// Compiles the AST document at `path` against `host`.
    ///
    /// Runs on a blocking task; Ctrl-C cancels the type resolver.
    pub async fn compile_file(&self, path: &Path, host: HostEnvironment) -> Result<Compiled> {
        let program = read_program(path)?;
        let token = CancellationToken::new();
        let compiler = Compiler::new(self.config.compiler.clone())
            .with_host(host)
            .with_cancellation(token.clone());

        let interrupt = tokio::spawn({
            let token = token.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling compilation");
                    token.cancel();
                }
            }
        });
        let result = tokio::task::spawn_blocking(move || compiler.compile(&program)).await;
        interrupt.abort();

        match result? {
            Ok(compiled) => Ok(compiled),
            Err(_) if token.is_cancelled() => Err(CliError::Cancelled),
            Err(diagnostic) => Err(CliError::Diagnostic {
                path: path.to_path_buf(),
                diagnostic,
            }),
        }
    }

    /// Loads a binary module, or compiles an AST document into one.
    pub async fn module_from(&self, path: &Path, host: HostEnvironment) -> Result<Module> {
        let bytes = std::fs::read(path).map_err(|e| CliError::io(path, e))?;
        if bytes.starts_with(MAGIC) {
            debug!(path = %path.display(), "loading binary module");
            assembly::load(&bytes).map_err(|diagnostic| CliError::Diagnostic {
                path: path.to_path_buf(),
                diagnostic,
            })
        } else {
            Ok(self.compile_file(path, host).await?.module)
        }
    }
}

/// Parses an AST JSON document.
pub fn read_program(path: &Path) -> Result<Program> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    serde_json::from_str(&text).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// `input` with its extension replaced by `.tbc`.
pub fn default_output(input: &Path) -> PathBuf {
    input.with_extension("tbc")
}
