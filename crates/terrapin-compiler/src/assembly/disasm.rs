// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Plain-text listing of a module. Debug output only; never parsed back.

use super::Module;
use crate::compiler::bytecode::OpCode;
use std::fmt::Write;

/// Renders `module` as a human-readable listing.
pub fn disassemble(module: &Module) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    let _ = render(module, &mut out);
    out
}

fn type_name(module: &Module, id: u32) -> String {
    module
        .type_def(id)
        .map(|def| def.name.clone())
        .unwrap_or_else(|| format!("type#{}", id))
}

fn render(module: &Module, out: &mut String) -> std::fmt::Result {
    let [major, minor, build, revision] = module.version;
    writeln!(
        out,
        "module {} ({} {}.{}.{}.{}), entry #{}",
        module.name, module.vendor, major, minor, build, revision, module.entry_point
    )?;

    writeln!(out, "\nconstants:")?;
    for (id, constant) in module.constants.iter().enumerate() {
        writeln!(out, "  #{:<4} {:<8} {}", id, constant.kind().name(), constant)?;
    }

    for function in &module.functions {
        let params: Vec<String> = function
            .variables
            .iter()
            .take(function.param_count as usize)
            .map(|v| format!("{} {}", type_name(module, v.type_id), v.name))
            .collect();
        writeln!(
            out,
            "\nfunction #{} {}({}) -> {}",
            function.id,
            function.name,
            params.join(", "),
            type_name(module, function.return_type)
        )?;
        for (slot, variable) in function
            .variables
            .iter()
            .enumerate()
            .skip(function.param_count as usize)
        {
            writeln!(
                out,
                "  local {} {} {}",
                slot,
                type_name(module, variable.type_id),
                variable.name
            )?;
        }
        for (index, instruction) in function.code.iter().enumerate() {
            let text = instruction.to_string();
            if instruction.opcode.is_jump() {
                let target = index as i64 + i64::from(instruction.a());
                writeln!(out, "  {:04}  {:<24} ; -> {:04}", index, text, target)?;
            } else if instruction.opcode == OpCode::LoadConst {
                match module.constants.get(instruction.a() as usize) {
                    Some(constant) => writeln!(out, "  {:04}  {:<24} ; {}", index, text, constant)?,
                    None => writeln!(out, "  {:04}  {}", index, text)?,
                }
            } else {
                writeln!(out, "  {:04}  {}", index, text)?;
            }
        }
    }
    Ok(())
}
