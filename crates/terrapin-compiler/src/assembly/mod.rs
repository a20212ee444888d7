// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Binary module container.
//!
//! A [`Module`] is the linked output of a compilation: constants, the type
//! catalog and one [`FunctionDef`] per function, with code held in relative
//! form. [`assemble`] writes it to bytes, [`load`] reads it back and
//! [`disassemble`] renders a listing.
//!
//! # Layout
//!
//! All integers are little-endian.
//!
//! ```text
//! magic "TRPN" | format u16 | flags u8 | name | vendor | version 4*u16 | entry u32
//! counts 6*u32    constants, types, type-refs, functions, function-refs, code bytes
//! pointers 6*u32  absolute offset of each section
//! constants       tag u8, then bool u8 / f64 / string
//! types           id u32, name, primitive u8, kind u8, size u32, field count u32, fields
//! type-refs       reserved, always empty
//! functions       id u32, name, return type u32, code offset u32, params u32,
//!                 variable count u32, (type id u32, name) per slot
//! function-refs   reserved, always empty
//! code            trampoline, then every body in function id order
//! ```
//!
//! Strings are a u32 byte length followed by UTF-8. An instruction is its
//! opcode byte followed by four bytes per operand.

mod disasm;
mod loader;
mod writer;

#[cfg(test)]
mod tests;

pub use disasm::disassemble;
pub use loader::load;
pub use writer::assemble;

use crate::compiler::bytecode::{Constant, Instruction, OpCode};
use crate::types::TypeDef;
use serde::{Deserialize, Serialize};

/// File signature.
pub const MAGIC: &[u8; 4] = b"TRPN";

/// Layout revision written after the magic.
pub const FORMAT_VERSION: u16 = 1;

/// Flag bit set when jump operands are absolute byte offsets.
pub const FLAG_FIXED: u8 = 0b0000_0001;

/// Encoding of jump operands in the code section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Addressing {
    /// Target index minus the jump's own index
    Relative,
    /// Absolute byte offset into the code section
    #[default]
    Fixed,
}

/// The code every module starts with: reserve the exit slot, call the entry
/// function, stop.
pub fn trampoline(entry_point: u32) -> [Instruction; 3] {
    [
        Instruction::with_operand(OpCode::PushInt, 0),
        Instruction::with_operands(OpCode::Call, entry_point as i32, 0),
        Instruction::simple(OpCode::Halt),
    ]
}

/// Byte length of an instruction sequence.
pub fn encoded_len(code: &[Instruction]) -> usize {
    code.iter().map(Instruction::encoded_len).sum()
}

/// A variable slot of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDef {
    /// Catalog id of the slot type
    pub type_id: u32,
    /// Source name (hidden loop slots start with `$`)
    pub name: String,
}

/// A function as stored in a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    /// Function id; `main` is 0
    pub id: u32,
    /// Source name
    pub name: String,
    /// Catalog id of the return type
    pub return_type: u32,
    /// Parameters occupy the first `param_count` slots
    pub param_count: u32,
    /// Parameter and local slots
    pub variables: Vec<VariableDef>,
    /// Body with relative jump operands
    pub code: Vec<Instruction>,
}

/// A linked program.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Producer string
    pub vendor: String,
    /// Four-part version
    pub version: [u16; 4],
    /// Id of the function the trampoline calls
    pub entry_point: u32,
    /// Constant pool in id order
    pub constants: Vec<Constant>,
    /// Type catalog
    pub types: Vec<TypeDef>,
    /// Functions in id order
    pub functions: Vec<FunctionDef>,
}

impl Module {
    /// Looks up a function by id.
    pub fn function(&self, id: u32) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.id == id)
    }

    /// Looks up a type descriptor by id.
    pub fn type_def(&self, id: u32) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.id == id)
    }

    /// Total number of instructions across all functions.
    pub fn instruction_count(&self) -> usize {
        self.functions.iter().map(|f| f.code.len()).sum()
    }
}
