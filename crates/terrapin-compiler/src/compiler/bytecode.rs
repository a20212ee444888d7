// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode definitions.

use crate::types::PrimitiveKind;
use rustc_hash::FxHashMap;
use std::fmt;
use terrapin_macros::opcodes;

opcodes! {
    /// Bytecode operation codes.
    ///
    /// The number after `=>` is the fixed operand count; every operand is a
    /// signed 32-bit integer.
    pub enum OpCode: u8 {
        /// No operation
        Nop = 0x00 => 0,
        /// Push constant pool entry `a`
        LoadConst = 0x01 => 1,
        /// Push local slot `a`
        LoadLocal = 0x02 => 1,
        /// Store top of stack into local slot `a` (pops)
        StoreLocal = 0x03 => 1,
        /// Push host global `a`
        LoadGlobal = 0x04 => 1,
        /// Store top of stack into host global `a` (pops)
        StoreGlobal = 0x05 => 1,
        /// Push the integer `a`
        PushInt = 0x06 => 1,
        /// Push the default value of type id `a`
        PushDefault = 0x07 => 1,
        /// Discard top of stack
        Pop = 0x08 => 0,
        /// Duplicate top of stack
        Dup = 0x09 => 0,

        /// Double addition
        Add = 0x10 => 0,
        /// Double subtraction
        Sub = 0x11 => 0,
        /// Double multiplication
        Mul = 0x12 => 0,
        /// Double division
        Div = 0x13 => 0,
        /// Double remainder
        Mod = 0x14 => 0,

        /// Less than
        Lt = 0x18 => 0,
        /// Greater than
        Gt = 0x19 => 0,
        /// Less than or equal
        Le = 0x1A => 0,
        /// Greater than or equal
        Ge = 0x1B => 0,
        /// Equality of two scalars
        Eq = 0x1C => 0,

        /// Boolean and
        And = 0x20 => 0,
        /// Boolean or
        Or = 0x21 => 0,

        /// Truncate a double to an integer
        ToInt = 0x28 => 0,
        /// Integer multiplication
        IMul = 0x29 => 0,
        /// Integer addition; array + integer yields an element address
        IAdd = 0x2A => 0,

        /// Pop `a` values into a new array of type id `b` elements
        NewArray = 0x30 => 2,
        /// Replace an array with its length as a double
        Length = 0x31 => 0,
        /// Load field `a` at an address with stride `b`
        GetField = 0x32 => 2,
        /// Store a value into field `a` at an address with stride `b`; the
        /// value stays on the stack
        SetField = 0x33 => 2,

        /// Jump by `a` instructions
        Jump = 0x40 => 1,
        /// Pop a boolean, jump by `a` if false
        JumpIfFalse = 0x41 => 1,
        /// Pop a boolean, jump by `a` if true
        JumpIfTrue = 0x42 => 1,

        /// Call script function `a` with `b` arguments
        Call = 0x48 => 2,
        /// Call host native `a` with `b` arguments
        CallNative = 0x49 => 2,
        /// Return from the current function with `a` (0 or 1) values
        Ret = 0x4A => 1,
        /// Stop the machine
        Halt = 0x4F => 0,
    }
}

impl OpCode {
    /// Whether the first operand is a jump target.
    pub fn is_jump(&self) -> bool {
        matches!(self, OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfTrue)
    }
}

/// A single bytecode instruction.
///
/// Jump operands are relative: the target index minus the jump's own index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    /// The operation code
    pub opcode: OpCode,
    operands: [i32; 2],
}

impl Instruction {
    /// Creates an instruction with no operand.
    pub fn simple(opcode: OpCode) -> Self {
        debug_assert_eq!(opcode.operand_count(), 0, "{}", opcode.name());
        Self {
            opcode,
            operands: [0; 2],
        }
    }

    /// Creates an instruction with one operand.
    pub fn with_operand(opcode: OpCode, a: i32) -> Self {
        debug_assert_eq!(opcode.operand_count(), 1, "{}", opcode.name());
        Self {
            opcode,
            operands: [a, 0],
        }
    }

    /// Creates an instruction with two operands.
    pub fn with_operands(opcode: OpCode, a: i32, b: i32) -> Self {
        debug_assert_eq!(opcode.operand_count(), 2, "{}", opcode.name());
        Self {
            opcode,
            operands: [a, b],
        }
    }

    /// Builds an instruction from decoded parts; `None` on an arity mismatch.
    pub fn from_parts(opcode: OpCode, operands: &[i32]) -> Option<Self> {
        if operands.len() != opcode.operand_count() {
            return None;
        }
        let mut all = [0; 2];
        all[..operands.len()].copy_from_slice(operands);
        Some(Self {
            opcode,
            operands: all,
        })
    }

    /// The operands actually present.
    pub fn operands(&self) -> &[i32] {
        &self.operands[..self.opcode.operand_count()]
    }

    /// First operand (0 when absent).
    pub fn a(&self) -> i32 {
        self.operands[0]
    }

    /// Second operand (0 when absent).
    pub fn b(&self) -> i32 {
        self.operands[1]
    }

    /// Replaces the first operand.
    pub fn set_a(&mut self, value: i32) {
        self.operands[0] = value;
    }

    /// Size in the binary encoding: opcode byte plus four bytes per operand.
    pub fn encoded_len(&self) -> usize {
        1 + 4 * self.opcode.operand_count()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode.name())?;
        for operand in self.operands() {
            write!(f, " {}", operand)?;
        }
        Ok(())
    }
}

/// A constant pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Boolean
    Boolean(bool),
    /// Double
    Double(f64),
    /// String
    String(String),
}

impl Constant {
    /// Type tag written before the value in the binary form.
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Constant::Boolean(_) => PrimitiveKind::Boolean,
            Constant::Double(_) => PrimitiveKind::Double,
            Constant::String(_) => PrimitiveKind::String,
        }
    }

    fn key(&self) -> ConstantKey {
        match self {
            Constant::Boolean(b) => ConstantKey::Boolean(*b),
            Constant::Double(d) => ConstantKey::Double(d.to_bits()),
            Constant::String(s) => ConstantKey::String(s.clone()),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Boolean(b) => write!(f, "{}", b),
            Constant::Double(d) => write!(f, "{}", d),
            Constant::String(s) => write!(f, "{:?}", s),
        }
    }
}

// doubles are keyed by bit pattern so the pool can hash them
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    Boolean(bool),
    Double(u64),
    String(String),
}

/// Program-wide table of literal values, deduplicated, ids in first-insertion
/// order.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    values: Vec<Constant>,
    index: FxHashMap<ConstantKey, u32>,
}

impl ConstantPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `value`, adding it on first sight.
    pub fn intern(&mut self, value: Constant) -> u32 {
        let key = value.key();
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = self.values.len() as u32;
        self.values.push(value);
        self.index.insert(key, id);
        id
    }

    /// Looks up an entry.
    pub fn get(&self, id: u32) -> Option<&Constant> {
        self.values.get(id as usize)
    }

    /// Number of distinct constants.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing was interned.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in id order.
    pub fn into_vec(self) -> Vec<Constant> {
        self.values
    }
}
