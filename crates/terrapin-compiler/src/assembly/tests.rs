// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Tests for the module writer, loader and listing.

use super::*;
use crate::diagnostic::DiagnosticKind;
use crate::types::{Type, TypeCatalog};
use terrapin_macros::assert_err_contains;

// header offsets for a module named "demo" by "test"
const ENTRY_AT: usize = 31;
const COUNTS_AT: usize = 35;
const POINTERS_AT: usize = 59;

fn op(opcode: OpCode) -> Instruction {
    Instruction::simple(opcode)
}

fn op1(opcode: OpCode, a: i32) -> Instruction {
    Instruction::with_operand(opcode, a)
}

fn sample() -> Module {
    Module {
        name: "demo".to_string(),
        vendor: "test".to_string(),
        version: [1, 2, 0, 7],
        entry_point: 0,
        constants: vec![
            Constant::Boolean(true),
            Constant::Double(1.0),
            Constant::String("a".to_string()),
        ],
        types: TypeCatalog::standard(),
        functions: vec![
            FunctionDef {
                id: 0,
                name: "main".to_string(),
                return_type: Type::Empty.id(),
                param_count: 0,
                variables: vec![VariableDef {
                    type_id: Type::Double.id(),
                    name: "i".to_string(),
                }],
                code: vec![
                    op1(OpCode::LoadConst, 0),
                    op1(OpCode::JumpIfFalse, 3),
                    op1(OpCode::LoadConst, 1),
                    op1(OpCode::Jump, 2),
                    op1(OpCode::LoadConst, 1),
                    Instruction::with_operands(OpCode::Call, 1, 1),
                    op(OpCode::Pop),
                    op1(OpCode::Ret, 0),
                ],
            },
            FunctionDef {
                id: 1,
                name: "f".to_string(),
                return_type: Type::Double.id(),
                param_count: 1,
                variables: vec![VariableDef {
                    type_id: Type::Double.id(),
                    name: "x".to_string(),
                }],
                code: vec![
                    op1(OpCode::LoadLocal, 0),
                    op1(OpCode::JumpIfTrue, -1),
                    op1(OpCode::Ret, 1),
                ],
            },
        ],
    }
}

fn read_u32(bytes: &[u8], at: usize) -> usize {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize
}

fn write_u32(bytes: &mut [u8], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn section(bytes: &[u8], index: usize) -> usize {
    read_u32(bytes, POINTERS_AT + 4 * index)
}

#[test]
fn test_round_trip_fixed() {
    let module = sample();
    let bytes = assemble(&module, Addressing::Fixed).unwrap();
    assert_eq!(load(&bytes).unwrap(), module);
}

#[test]
fn test_round_trip_relative() {
    let module = sample();
    let bytes = assemble(&module, Addressing::Relative).unwrap();
    assert_eq!(load(&bytes).unwrap(), module);
}

#[test]
fn test_header_fields() {
    let bytes = assemble(&sample(), Addressing::Fixed).unwrap();
    assert_eq!(&bytes[..4], MAGIC);
    assert_eq!(bytes[6], FLAG_FIXED);
    assert_eq!(read_u32(&bytes, COUNTS_AT), 3);
    assert_eq!(read_u32(&bytes, COUNTS_AT + 4), 11);
    assert_eq!(read_u32(&bytes, COUNTS_AT + 12), 2);
    // the code section runs to the end of the file
    let code = section(&bytes, 5);
    assert_eq!(code + read_u32(&bytes, COUNTS_AT + 20), bytes.len());
}

#[test]
fn test_fixed_jumps_are_absolute_byte_offsets() {
    let bytes = assemble(&sample(), Addressing::Fixed).unwrap();
    let code = section(&bytes, 5);
    // trampoline is 15 bytes; main's JumpIfFalse sits at byte 5 of its body
    // and targets instruction 4, at byte 20
    assert_eq!(bytes[code + 20], OpCode::JumpIfFalse as u8);
    assert_eq!(read_u32(&bytes, code + 21), 35);

    let relative = assemble(&sample(), Addressing::Relative).unwrap();
    assert_eq!(read_u32(&relative, code + 21), 3);
}

#[test]
fn test_trampoline_calls_entry() {
    let bytes = assemble(&sample(), Addressing::Relative).unwrap();
    let code = section(&bytes, 5);
    assert_eq!(bytes[code], OpCode::PushInt as u8);
    assert_eq!(bytes[code + 5], OpCode::Call as u8);
    assert_eq!(read_u32(&bytes, code + 6), 0);
    assert_eq!(bytes[code + 14], OpCode::Halt as u8);
    assert_eq!(encoded_len(&trampoline(0)), 15);
}

#[test]
fn test_bad_magic() {
    let mut bytes = assemble(&sample(), Addressing::Fixed).unwrap();
    bytes[0] = b'X';
    let err = load(&bytes).unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Format);
    assert!(err.message.contains("bad magic"));
}

#[test]
fn test_truncated_input() {
    let bytes = assemble(&sample(), Addressing::Fixed).unwrap();
    assert_err_contains!(load(&bytes[..bytes.len() - 1]), "unexpected end of input");
    assert_err_contains!(load(&bytes[..10]), "unexpected end of input");
}

#[test]
fn test_trailing_bytes() {
    let mut bytes = assemble(&sample(), Addressing::Fixed).unwrap();
    bytes.push(0);
    assert_err_contains!(load(&bytes), "trailing bytes");
}

#[test]
fn test_unknown_opcode() {
    let mut bytes = assemble(&sample(), Addressing::Fixed).unwrap();
    let code = section(&bytes, 5);
    bytes[code + 15] = 0xEE;
    assert_err_contains!(load(&bytes), "unknown opcode 0xee");
}

#[test]
fn test_unknown_constant_tag() {
    let mut bytes = assemble(&sample(), Addressing::Fixed).unwrap();
    let constants = section(&bytes, 0);
    bytes[constants] = 0xEE;
    assert_err_contains!(load(&bytes), "unknown constant tag");

    bytes[constants] = Type::Array(Box::new(Type::Double)).kind() as u8;
    assert_err_contains!(load(&bytes), "unknown constant tag");
}

#[test]
fn test_entry_point_must_exist() {
    let mut module = sample();
    module.entry_point = 9;
    assert_err_contains!(assemble(&module, Addressing::Fixed), "entry point #9");

    let mut bytes = assemble(&sample(), Addressing::Fixed).unwrap();
    write_u32(&mut bytes, ENTRY_AT, 7);
    assert_err_contains!(load(&bytes), "entry point #7 has no function");
}

#[test]
fn test_trampoline_mismatch() {
    let mut bytes = assemble(&sample(), Addressing::Fixed).unwrap();
    let code = section(&bytes, 5);
    write_u32(&mut bytes, code + 6, 1);
    assert_err_contains!(load(&bytes), "trampoline mismatch");
}

#[test]
fn test_jump_into_middle_of_instruction() {
    let mut bytes = assemble(&sample(), Addressing::Fixed).unwrap();
    let code = section(&bytes, 5);
    write_u32(&mut bytes, code + 21, 36);
    assert_err_contains!(load(&bytes), "not an instruction of the function");
}

#[test]
fn test_relative_jump_outside_function() {
    let mut module = sample();
    module.functions[1].code[1] = op1(OpCode::JumpIfTrue, -5);
    assert_err_contains!(assemble(&module, Addressing::Fixed), "leaves the function");

    let bytes = assemble(&module, Addressing::Relative).unwrap();
    assert_err_contains!(load(&bytes), "leaves the function");
}

#[test]
fn test_reserved_sections_must_be_empty() {
    let mut bytes = assemble(&sample(), Addressing::Fixed).unwrap();
    write_u32(&mut bytes, COUNTS_AT + 8, 1);
    assert_err_contains!(load(&bytes), "reserved type-refs section is not empty");
}

#[test]
fn test_disassembly_listing() {
    let listing = disassemble(&sample());
    assert!(listing.starts_with("module demo (test 1.2.0.7), entry #0"));
    assert!(listing.contains("function #1 f(Double x) -> Double"));
    assert!(listing.contains("local 0 Double i"));
    assert!(listing.contains("JumpIfFalse 3"));
    assert!(listing.contains("; -> 0004"));
    assert!(listing.contains("; \"a\"") || listing.contains("; 1"));
}
