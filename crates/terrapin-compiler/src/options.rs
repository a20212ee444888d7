// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Compiler and VM settings.

use crate::assembly::Addressing;
use serde::{Deserialize, Serialize};

/// Settings for a compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Name written into the module header
    pub module_name: String,
    /// Producer string written into the module header
    pub vendor: String,
    /// Four-part module version
    pub version: [u16; 4],
    /// Jump encoding used by [`Compiled::to_bytes`](crate::Compiled::to_bytes)
    pub addressing: Addressing,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            module_name: "main".to_string(),
            vendor: concat!("terrapin ", env!("CARGO_PKG_VERSION")).to_string(),
            version: [1, 0, 0, 0],
            addressing: Addressing::Fixed,
        }
    }
}

/// Settings for the bytecode VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmOptions {
    /// Instructions executed before a run is aborted
    pub max_steps: u64,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            max_steps: 10_000_000,
        }
    }
}
