// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! End-to-end tests: AST in, bytes out, and back through the VM.

use terrapin_compiler::assembly::{self, Module};
use terrapin_compiler::ast::{BinaryOp, Direction, Expr, Program};
use terrapin_compiler::compiler::{CodeBuilder, Constant, FunctionId, Instruction, OpCode};
use terrapin_compiler::vm::{Machine, Value, default_globals, standard_natives};
use terrapin_compiler::{
    Addressing, Compiler, CompilerOptions, DiagnosticKind, HostEnvironment, Type, VmOptions,
};

fn host() -> HostEnvironment {
    HostEnvironment::standard()
        .variable("out", Type::Double)
        .variable("text", Type::String)
}

fn compile(body: Vec<Expr>) -> Module {
    Compiler::new(CompilerOptions::default())
        .with_host(host())
        .compile(&Program::new(Expr::block(body)))
        .expect("compilation should succeed")
        .module
}

/// Runs `module` and returns the `out` and `text` globals.
fn run(module: &Module) -> (Value, Value) {
    let host = host();
    let mut machine = Machine::new(module, &VmOptions::default())
        .with_natives(standard_natives())
        .with_globals(default_globals(&host));
    machine.run().expect("run should succeed");
    (machine.globals()[0].clone(), machine.globals()[1].clone())
}

fn num(value: f64) -> Expr {
    Expr::number(value)
}

fn add(left: Expr, right: Expr) -> Expr {
    Expr::binary(BinaryOp::Add, left, right)
}

fn set(name: &str, value: Expr) -> Expr {
    Expr::assign(Expr::ident(name), value)
}

#[test]
fn test_json_program_round_trips_through_bytes() {
    let json = r#"{
        "body": {
            "kind": "Scope",
            "body": [
                {
                    "kind": "Binary",
                    "op": "Assign",
                    "left": { "kind": "Variable", "name": "out" },
                    "right": {
                        "kind": "Binary",
                        "op": "Mul",
                        "left": { "kind": "Constant", "value": 6 },
                        "right": { "kind": "Constant", "value": 7 }
                    }
                }
            ]
        }
    }"#;
    let program: Program = serde_json::from_str(json).unwrap();
    let compiled = Compiler::new(CompilerOptions::default())
        .with_host(host())
        .compile(&program)
        .unwrap();
    assert_eq!(compiled.program_type, Type::Double);

    for addressing in [Addressing::Fixed, Addressing::Relative] {
        let bytes = compiled.to_bytes_with(addressing).unwrap();
        assert_eq!(&bytes[..4], b"TRPN");
        let loaded = assembly::load(&bytes).unwrap();
        assert_eq!(loaded, compiled.module);
        assert_eq!(run(&loaded).0, Value::Double(42.0));
    }
}

#[test]
fn test_constants_are_shared_across_functions() {
    let module = compile(vec![
        Expr::function(
            "greet",
            vec![],
            Expr::block(vec![set("text", Expr::string("hi"))]),
        ),
        set("text", Expr::string("hi")),
        set("out", add(num(1.0), num(1.0))),
        Expr::call("greet", vec![]),
    ]);
    assert_eq!(
        module.constants,
        vec![Constant::String("hi".to_string()), Constant::Double(1.0)]
    );
}

#[test]
fn test_shadowing_uses_distinct_slots() {
    let module = compile(vec![
        Expr::assign(Expr::declare("number", "x"), num(1.0)),
        Expr::block(vec![
            Expr::assign(Expr::declare("number", "x"), num(2.0)),
            set("out", add(Expr::ident("out"), Expr::ident("x"))),
        ]),
        set("out", add(Expr::ident("out"), Expr::ident("x"))),
    ]);
    let main = module.function(0).unwrap();
    assert_eq!(main.variables.len(), 2);
    assert_eq!(run(&module).0, Value::Double(3.0));
}

#[test]
fn test_overloads_dispatch_on_argument_types() {
    let module = compile(vec![
        Expr::function(
            "describe",
            vec![Expr::declare("number", "n")],
            Expr::block(vec![Expr::binary(BinaryOp::Mul, Expr::ident("n"), num(2.0))]),
        ),
        Expr::function(
            "describe",
            vec![Expr::declare("string", "s")],
            Expr::block(vec![add(Expr::ident("s"), Expr::string("!"))]),
        ),
        set("out", Expr::call("describe", vec![num(21.0)])),
        set("text", Expr::call("describe", vec![Expr::string("hey")])),
    ]);
    assert_eq!(module.functions.len(), 3);
    let (out, text) = run(&module);
    assert_eq!(out, Value::Double(42.0));
    assert_eq!(text, Value::string("hey!"));
}

#[test]
fn test_if_else_branches_must_agree() {
    let err = Compiler::new(CompilerOptions::default())
        .compile(&Program::new(Expr::block(vec![Expr::if_else(
            Expr::boolean(true),
            Expr::block(vec![num(1.0)]),
            Some(Expr::block(vec![Expr::string("one")])),
        )])))
        .unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::Type);
}

#[test]
fn test_marker_insertion_keeps_targets() {
    let mut code = CodeBuilder::new(FunctionId::MAIN);
    let skip = code.acquire();
    code.emit(Instruction::with_operand(OpCode::PushInt, 1));
    let middle = code.acquire();
    code.emit(Instruction::simple(OpCode::Pop));
    let end = code.acquire();

    code.patch_jump(&skip, OpCode::Jump, &end).unwrap();
    assert_eq!(code.index_of(&middle).unwrap(), 2);
    code.set_operation(&middle, Instruction::simple(OpCode::Nop))
        .unwrap();
    // the first jump still lands one past the Pop
    assert_eq!(code.code()[0].a(), 4);
    for marker in [skip, middle, end] {
        code.release(marker).unwrap();
    }
    let listing: Vec<String> = code
        .finish()
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(listing, ["Jump 4", "PushInt 1", "Nop", "Pop"]);
}

/// Wraps `body` in `depth` alternating loops.
fn nested_loops(depth: usize, body: Expr) -> Expr {
    (0..depth).fold(body, |inner, level| {
        let counter = format!("i{}", level);
        match level % 4 {
            0 => Expr::for_to(
                Expr::ident(&counter),
                num(1.0),
                num(2.0),
                Direction::Up,
                Expr::block(vec![inner]),
            ),
            1 => Expr::block(vec![
                Expr::assign(Expr::declare("number", &counter), num(0.0)),
                Expr::while_loop(
                    Expr::binary(BinaryOp::Less, Expr::ident(&counter), num(2.0)),
                    Expr::block(vec![
                        inner,
                        set(&counter, add(Expr::ident(&counter), num(1.0))),
                    ]),
                ),
            ]),
            2 => Expr::for_in(
                Expr::ident(&counter),
                Expr::array(vec![num(1.0), num(2.0)]),
                Expr::block(vec![inner]),
            ),
            _ => Expr::if_else(
                Expr::binary(BinaryOp::Greater, Expr::ident("out"), num(-1.0)),
                Expr::block(vec![inner]),
                Some(Expr::block(vec![])),
            ),
        }
    })
}

#[test]
fn test_nested_loops_lower_to_valid_jumps() {
    for depth in 1..=8 {
        let module = compile(vec![nested_loops(
            depth,
            set("out", add(Expr::ident("out"), num(1.0))),
        )]);
        let code = &module.function(0).unwrap().code;
        for (at, instruction) in code.iter().enumerate() {
            if instruction.opcode.is_jump() {
                let target = at as i64 + i64::from(instruction.a());
                assert!(
                    (0..=code.len() as i64).contains(&target),
                    "depth {}: jump at {} lands at {}",
                    depth,
                    at,
                    target
                );
            }
        }
        // every loop level runs its body twice, the if once
        let loops = (0..depth).filter(|level| level % 4 != 3).count();
        let expected = f64::from(1u32 << loops);
        assert_eq!(run(&module).0, Value::Double(expected), "depth {}", depth);
    }
}
