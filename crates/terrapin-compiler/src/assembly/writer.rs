// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module to bytes.

use super::{Addressing, FLAG_FIXED, FORMAT_VERSION, FunctionDef, MAGIC, Module, trampoline};
use crate::ast::Span;
use crate::compiler::bytecode::{Constant, Instruction};
use crate::diagnostic::{Diagnostic, Result};
use crate::types::TypeDef;
use tracing::{debug, instrument};

/// Serializes `module` with jump operands in the requested form.
#[instrument(skip_all, fields(module = %module.name, ?addressing))]
pub fn assemble(module: &Module, addressing: Addressing) -> Result<Vec<u8>> {
    let mut functions: Vec<&FunctionDef> = module.functions.iter().collect();
    functions.sort_by_key(|f| f.id);
    if !functions.iter().any(|f| f.id == module.entry_point) {
        return Err(fail(format!(
            "entry point #{} has no function",
            module.entry_point
        )));
    }

    let mut code = Encoder::new();
    for instruction in trampoline(module.entry_point) {
        code.write_instruction(&instruction);
    }
    let mut offsets = Vec::with_capacity(functions.len());
    for function in &functions {
        let base = code.len();
        offsets.push(to_u32(base)?);
        code.write_body(function, base, addressing)?;
    }

    let mut constants = Encoder::new();
    for constant in &module.constants {
        constants.write_constant(constant)?;
    }
    let mut types = Encoder::new();
    for def in &module.types {
        types.write_type(def)?;
    }
    let mut defs = Encoder::new();
    for (function, offset) in functions.iter().zip(&offsets) {
        defs.write_function(function, *offset)?;
    }

    let mut out = Encoder::new();
    out.write_bytes(MAGIC);
    out.write_u16(FORMAT_VERSION);
    out.write_u8(match addressing {
        Addressing::Fixed => FLAG_FIXED,
        Addressing::Relative => 0,
    });
    out.write_string(&module.name)?;
    out.write_string(&module.vendor)?;
    for part in module.version {
        out.write_u16(part);
    }
    out.write_u32(module.entry_point);

    let sections = [constants.buf, types.buf, Vec::new(), defs.buf, Vec::new(), code.buf];
    let counts = [
        module.constants.len(),
        module.types.len(),
        0,
        functions.len(),
        0,
        sections[5].len(),
    ];
    for count in counts {
        out.write_u32(to_u32(count)?);
    }
    // pointers are absolute, so the first section starts right after them
    let mut pointer = out.len() + 4 * sections.len();
    for section in &sections {
        out.write_u32(to_u32(pointer)?);
        pointer += section.len();
    }
    for section in &sections {
        out.write_bytes(section);
    }

    debug!(bytes = out.len(), functions = functions.len(), "module assembled");
    Ok(out.buf)
}

fn fail(message: impl Into<String>) -> Diagnostic {
    Diagnostic::format(message, Span::default())
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| fail(format!("{} does not fit in 32 bits", value)))
}

struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn len(&self) -> usize {
        self.buf.len()
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_bits().to_le_bytes());
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_u32(to_u32(s.len())?);
        self.write_bytes(s.as_bytes());
        Ok(())
    }

    fn write_instruction(&mut self, instruction: &Instruction) {
        self.write_u8(instruction.opcode as u8);
        for operand in instruction.operands() {
            self.write_i32(*operand);
        }
    }

    fn write_constant(&mut self, constant: &Constant) -> Result<()> {
        self.write_u8(constant.kind() as u8);
        match constant {
            Constant::Boolean(b) => self.write_bool(*b),
            Constant::Double(d) => self.write_f64(*d),
            Constant::String(s) => self.write_string(s)?,
        }
        Ok(())
    }

    fn write_type(&mut self, def: &TypeDef) -> Result<()> {
        self.write_u32(def.id);
        self.write_string(&def.name)?;
        self.write_bool(def.is_primitive);
        self.write_u8(def.kind as u8);
        self.write_u32(def.size);
        self.write_u32(to_u32(def.fields.len())?);
        for field in &def.fields {
            self.write_u32(field.type_id);
            self.write_string(&field.name)?;
        }
        Ok(())
    }

    fn write_function(&mut self, function: &FunctionDef, offset: u32) -> Result<()> {
        self.write_u32(function.id);
        self.write_string(&function.name)?;
        self.write_u32(function.return_type);
        self.write_u32(offset);
        self.write_u32(function.param_count);
        self.write_u32(to_u32(function.variables.len())?);
        for variable in &function.variables {
            self.write_u32(variable.type_id);
            self.write_string(&variable.name)?;
        }
        Ok(())
    }

    /// Writes a body starting at code offset `base`.
    fn write_body(&mut self, function: &FunctionDef, base: usize, addressing: Addressing) -> Result<()> {
        // byte position of every instruction index, plus one past the end
        let mut starts = Vec::with_capacity(function.code.len() + 1);
        let mut at = 0;
        for instruction in &function.code {
            starts.push(at);
            at += instruction.encoded_len();
        }
        starts.push(at);

        for (index, instruction) in function.code.iter().enumerate() {
            if !instruction.opcode.is_jump() || addressing == Addressing::Relative {
                self.write_instruction(instruction);
                continue;
            }
            let target = index as i64 + i64::from(instruction.a());
            let target = usize::try_from(target)
                .ok()
                .filter(|&t| t <= function.code.len())
                .ok_or_else(|| {
                    fail(format!(
                        "jump at {}:{} leaves the function (delta {})",
                        function.name,
                        index,
                        instruction.a()
                    ))
                })?;
            let absolute = i32::try_from(base + starts[target])
                .map_err(|_| fail("code section exceeds the jump operand range"))?;
            let mut fixed = *instruction;
            fixed.set_a(absolute);
            self.write_instruction(&fixed);
        }
        Ok(())
    }
}
