// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the terrapin CLI.

use std::path::PathBuf;
use terrapin_compiler::Diagnostic;
use terrapin_compiler::vm::VmError;
use thiserror::Error;

/// Result type for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// Main error type for the CLI.
#[derive(Error, Debug)]
pub enum CliError {
    /// Reading or writing a file failed
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input is not a valid AST document
    #[error("{}: invalid program: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// terrapin.toml could not be parsed
    #[error("{}: invalid configuration: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A configuration value is out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// The compiler or the loader rejected the input
    #[error("{}: {diagnostic}", path.display())]
    Diagnostic { path: PathBuf, diagnostic: Diagnostic },

    /// The program failed at runtime
    #[error("Runtime error: {0}")]
    Runtime(#[from] VmError),

    /// Compilation was interrupted
    #[error("Interrupted")]
    Cancelled,

    /// A background task died
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CliError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CliError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Diagnostic { .. } => 1,
            CliError::Runtime(_) => 3,
            CliError::Cancelled => 130,
            _ => 2,
        }
    }
}
