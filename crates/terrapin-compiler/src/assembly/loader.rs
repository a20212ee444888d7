// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytes to module.
//!
//! Loading builds a fresh [`Module`]; nothing is returned unless the whole
//! input checks out. Diagnostics carry the byte offset where decoding stopped
//! as their span.

use super::{FLAG_FIXED, FORMAT_VERSION, FunctionDef, MAGIC, Module, VariableDef, trampoline};
use crate::ast::Span;
use crate::compiler::bytecode::{Constant, Instruction, OpCode};
use crate::diagnostic::{Diagnostic, Result};
use crate::types::{FieldDef, PrimitiveKind, TypeDef};
use tracing::{debug, instrument};

const SECTIONS: [&str; 6] = [
    "constants",
    "types",
    "type-refs",
    "functions",
    "function-refs",
    "code",
];

/// Reads a module written by [`assemble`](super::assemble) in either
/// addressing form. Jump operands come back relative.
#[instrument(skip_all, fields(bytes = bytes.len()))]
pub fn load(bytes: &[u8]) -> Result<Module> {
    let mut dec = Decoder::new(bytes);
    dec.expect_magic()?;
    let format = dec.read_u16()?;
    if format != FORMAT_VERSION {
        return Err(dec.err(format!(
            "unsupported format version {} (expected {})",
            format, FORMAT_VERSION
        )));
    }
    let flags = dec.read_u8()?;
    if flags & !FLAG_FIXED != 0 {
        return Err(dec.err(format!("unknown flags {:#04x}", flags)));
    }
    let fixed = flags & FLAG_FIXED != 0;

    let name = dec.read_string()?;
    let vendor = dec.read_string()?;
    let mut version = [0u16; 4];
    for part in &mut version {
        *part = dec.read_u16()?;
    }
    let entry_point = dec.read_u32()?;

    let mut counts = [0usize; 6];
    for count in &mut counts {
        *count = dec.read_len()?;
    }
    let mut pointers = [0usize; 6];
    for pointer in &mut pointers {
        *pointer = dec.read_len()?;
    }
    for reserved in [2, 4] {
        if counts[reserved] != 0 {
            return Err(dec.err(format!(
                "reserved {} section is not empty",
                SECTIONS[reserved]
            )));
        }
    }

    dec.enter_section(0, &pointers)?;
    let constants = (0..counts[0])
        .map(|_| dec.read_constant())
        .collect::<Result<Vec<_>>>()?;
    dec.enter_section(1, &pointers)?;
    let types = (0..counts[1])
        .map(|_| dec.read_type())
        .collect::<Result<Vec<_>>>()?;
    dec.enter_section(2, &pointers)?;
    dec.enter_section(3, &pointers)?;
    let mut functions = (0..counts[3])
        .map(|_| dec.read_function())
        .collect::<Result<Vec<_>>>()?;
    dec.enter_section(4, &pointers)?;
    dec.enter_section(5, &pointers)?;

    functions.sort_by_key(|(f, _)| f.id);
    if !functions.iter().any(|(f, _)| f.id == entry_point) {
        return Err(dec.err(format!("entry point #{} has no function", entry_point)));
    }

    let code_start = dec.pos;
    let code_len = counts[5];
    for expected in trampoline(entry_point) {
        let found = dec.read_instruction()?;
        if found != expected {
            return Err(dec.err(format!(
                "trampoline mismatch: expected '{}', found '{}'",
                expected, found
            )));
        }
    }

    let ends: Vec<usize> = functions
        .iter()
        .skip(1)
        .map(|(_, offset)| *offset)
        .chain(std::iter::once(code_len))
        .collect();
    for ((function, offset), end) in functions.iter_mut().zip(ends) {
        if dec.pos - code_start != *offset || end < *offset {
            return Err(dec.err(format!(
                "code of function #{} is not where its definition says ({})",
                function.id, offset
            )));
        }
        let mut starts = Vec::new();
        while dec.pos - code_start < end {
            starts.push(dec.pos - code_start - *offset);
            function.code.push(dec.read_instruction()?);
        }
        if dec.pos - code_start != end {
            return Err(dec.err(format!(
                "last instruction of function #{} runs past its body",
                function.id
            )));
        }
        starts.push(end - *offset);
        relocate(function, *offset, &starts, fixed)
            .map_err(|message| dec.err(message))?;
    }

    if dec.remaining() != 0 {
        return Err(dec.err(format!("{} trailing bytes", dec.remaining())));
    }

    let module = Module {
        name,
        vendor,
        version,
        entry_point,
        constants,
        types,
        functions: functions.into_iter().map(|(f, _)| f).collect(),
    };
    debug!(
        functions = module.functions.len(),
        constants = module.constants.len(),
        fixed,
        "module loaded"
    );
    Ok(module)
}

/// Turns every jump operand of `function` back into a relative delta.
///
/// `starts` holds the byte position of each instruction within the body,
/// plus the body length.
fn relocate(
    function: &mut FunctionDef,
    base: usize,
    starts: &[usize],
    fixed: bool,
) -> std::result::Result<(), String> {
    let len = function.code.len();
    for index in 0..len {
        let instruction = &mut function.code[index];
        if !instruction.opcode.is_jump() {
            continue;
        }
        let target = if fixed {
            let absolute = instruction.a();
            usize::try_from(absolute)
                .ok()
                .and_then(|a| a.checked_sub(base))
                .and_then(|at| starts.binary_search(&at).ok())
                .ok_or_else(|| {
                    format!(
                        "jump at {}:{} targets byte {}, which is not an instruction of the function",
                        function.name, index, absolute
                    )
                })?
        } else {
            let target = index as i64 + i64::from(instruction.a());
            usize::try_from(target)
                .ok()
                .filter(|&t| t <= len)
                .ok_or_else(|| {
                    format!(
                        "jump at {}:{} leaves the function (delta {})",
                        function.name,
                        index,
                        instruction.a()
                    )
                })?
        };
        instruction.set_a(target as i32 - index as i32);
    }
    Ok(())
}

struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn err(&self, message: impl Into<String>) -> Diagnostic {
        Diagnostic::format(message, Span::new(self.pos, self.pos))
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    fn read_exact(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| self.err("unexpected end of input"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn expect_magic(&mut self) -> Result<()> {
        if self.read_exact(MAGIC.len())? != MAGIC {
            return Err(Diagnostic::format("bad magic", Span::new(0, MAGIC.len())));
        }
        Ok(())
    }

    fn enter_section(&self, section: usize, pointers: &[usize; 6]) -> Result<()> {
        if self.pos != pointers[section] {
            return Err(self.err(format!(
                "{} section pointer is {}, but the section starts at {}",
                SECTIONS[section], pointers[section], self.pos
            )));
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_exact(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_exact(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_exact(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i32(&mut self) -> Result<i32> {
        let b = self.read_exact(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_f64(&mut self) -> Result<f64> {
        let b = self.read_exact(8)?;
        Ok(f64::from_bits(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ])))
    }

    fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.err(format!("invalid boolean {}", other))),
        }
    }

    fn read_len(&mut self) -> Result<usize> {
        let n = self.read_u32()?;
        usize::try_from(n).map_err(|_| self.err("length overflow"))
    }

    fn read_string(&mut self) -> Result<String> {
        let n = self.read_len()?;
        let b = self.read_exact(n)?;
        std::str::from_utf8(b)
            .map(str::to_string)
            .map_err(|e| self.err(format!("invalid utf-8: {}", e)))
    }

    fn read_kind(&mut self, what: &str) -> Result<PrimitiveKind> {
        let tag = self.read_u8()?;
        PrimitiveKind::try_from(tag).map_err(|tag| self.err(format!("unknown {} tag {}", what, tag)))
    }

    fn read_constant(&mut self) -> Result<Constant> {
        match self.read_kind("constant")? {
            PrimitiveKind::Boolean => Ok(Constant::Boolean(self.read_bool()?)),
            PrimitiveKind::Double => Ok(Constant::Double(self.read_f64()?)),
            PrimitiveKind::String => Ok(Constant::String(self.read_string()?)),
            other => Err(self.err(format!("unknown constant tag {}", other as u8))),
        }
    }

    fn read_type(&mut self) -> Result<TypeDef> {
        let id = self.read_u32()?;
        let name = self.read_string()?;
        let is_primitive = self.read_bool()?;
        let kind = self.read_kind("type kind")?;
        let size = self.read_u32()?;
        let field_count = self.read_len()?;
        let fields = (0..field_count)
            .map(|_| -> Result<FieldDef> {
                Ok(FieldDef {
                    type_id: self.read_u32()?,
                    name: self.read_string()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TypeDef {
            id,
            name,
            is_primitive,
            kind,
            size,
            fields,
        })
    }

    /// A function definition and its code offset; the code is filled later.
    fn read_function(&mut self) -> Result<(FunctionDef, usize)> {
        let id = self.read_u32()?;
        let name = self.read_string()?;
        let return_type = self.read_u32()?;
        let offset = self.read_len()?;
        let param_count = self.read_u32()?;
        let variable_count = self.read_len()?;
        let variables = (0..variable_count)
            .map(|_| -> Result<VariableDef> {
                Ok(VariableDef {
                    type_id: self.read_u32()?,
                    name: self.read_string()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if param_count as usize > variables.len() {
            return Err(self.err(format!(
                "function #{} declares {} parameters but only {} slots",
                id,
                param_count,
                variables.len()
            )));
        }
        Ok((
            FunctionDef {
                id,
                name,
                return_type,
                param_count,
                variables,
                code: Vec::new(),
            },
            offset,
        ))
    }

    fn read_instruction(&mut self) -> Result<Instruction> {
        let byte = self.read_u8()?;
        let opcode =
            OpCode::try_from(byte).map_err(|byte| self.err(format!("unknown opcode {:#04x}", byte)))?;
        let mut operands = [0i32; 2];
        for operand in operands.iter_mut().take(opcode.operand_count()) {
            *operand = self.read_i32()?;
        }
        Instruction::from_parts(opcode, &operands[..opcode.operand_count()])
            .ok_or_else(|| self.err(format!("bad operand count for {}", opcode.name())))
    }
}
