// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The three compiler passes and the bytecode they produce.
//!
//! # Module Structure
//!
//! - `scope`: scope tree, variable slots and function overloads
//! - `resolve`: bottom-up type resolution
//! - `codegen`: lowering to instructions, with the marker/backpatch protocol
//! - `bytecode`: opcodes, instructions and the constant pool

pub mod bytecode;
pub mod codegen;
pub mod resolve;
pub mod scope;

pub use bytecode::{Constant, ConstantPool, Instruction, OpCode};
pub use codegen::{CodeBuilder, Generated, Marker, generate};
pub use resolve::{CancellationToken, Resolution, resolve};
pub use scope::{CompilationContext, FunctionId, ScopeTree, build};
