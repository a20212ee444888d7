// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Tests for the virtual machine, driven through the full compiler.

use super::*;
use crate::assembly::{self, Addressing, FunctionDef};
use crate::ast::{BinaryOp, Direction, Expr, Program};
use crate::compiler::bytecode::{Instruction, OpCode};
use crate::options::VmOptions;
use crate::types::{Type, TypeCatalog};
use crate::{Compiler, CompilerOptions};
use std::cell::RefCell;
use std::rc::Rc;
use terrapin_macros::assert_matches;

fn host() -> HostEnvironment {
    HostEnvironment::standard().variable("out", Type::Double)
}

fn compile(host: &HostEnvironment, body: Vec<Expr>) -> crate::assembly::Module {
    Compiler::new(CompilerOptions::default())
        .with_host(host.clone())
        .compile(&Program::new(Expr::block(body)))
        .expect("compilation should succeed")
        .module
}

/// Compiles `body`, runs it and returns the final value of `out`.
fn run_out(body: Vec<Expr>) -> Value {
    let host = host();
    let module = compile(&host, body);
    let mut machine = Machine::new(&module, &VmOptions::default())
        .with_natives(standard_natives())
        .with_globals(default_globals(&host));
    machine.run().expect("run should succeed");
    machine.globals()[0].clone()
}

fn num(value: f64) -> Expr {
    Expr::number(value)
}

fn set_out(value: Expr) -> Expr {
    Expr::assign(Expr::ident("out"), value)
}

fn add(left: Expr, right: Expr) -> Expr {
    Expr::binary(BinaryOp::Add, left, right)
}

#[test]
fn test_empty_program_halts() {
    let module = compile(&host(), vec![]);
    let outcome = Machine::new(&module, &VmOptions::default()).run().unwrap();
    // PushInt, Call, Ret 0, Halt
    assert_eq!(outcome.steps, 4);
    assert_eq!(outcome.value, None);
}

#[test]
fn test_counting_for_loop() {
    let host = host()
        .variable("sum", Type::Double)
        .variable("last", Type::Double);
    let i = || Expr::ident("i");
    let module = compile(
        &host,
        vec![
            Expr::declare("number", "i"),
            Expr::for_loop(
                Some(Expr::assign(i(), num(0.0))),
                Some(Expr::binary(BinaryOp::Less, i(), num(3.0))),
                Some(Expr::assign(i(), add(i(), num(1.0)))),
                Expr::block(vec![
                    set_out(add(Expr::ident("out"), num(1.0))),
                    Expr::assign(Expr::ident("sum"), add(Expr::ident("sum"), i())),
                ]),
            ),
            Expr::assign(Expr::ident("last"), i()),
        ],
    );
    let mut machine = Machine::new(&module, &VmOptions::default())
        .with_natives(standard_natives())
        .with_globals(default_globals(&host));
    machine.run().unwrap();

    let global = |name: &str| machine.globals()[host.variable_index(name).unwrap()].clone();
    // three iterations with i = 0, 1, 2, leaving i at 3
    assert_eq!(global("out"), Value::Double(3.0));
    assert_eq!(global("sum"), Value::Double(0.0 + 1.0 + 2.0));
    assert_eq!(global("last"), Value::Double(3.0));
}

#[test]
fn test_while_and_repeat() {
    let out = run_out(vec![
        Expr::assign(Expr::declare("number", "n"), num(0.0)),
        Expr::while_loop(
            Expr::binary(BinaryOp::Less, Expr::ident("n"), num(5.0)),
            Expr::block(vec![Expr::assign(
                Expr::ident("n"),
                add(Expr::ident("n"), num(1.0)),
            )]),
        ),
        Expr::repeat_until(
            Expr::block(vec![Expr::assign(
                Expr::ident("n"),
                add(Expr::ident("n"), num(10.0)),
            )]),
            Expr::binary(BinaryOp::Greater, Expr::ident("n"), num(0.0)),
        ),
        set_out(Expr::ident("n")),
    ]);
    // the repeat body runs once even though the condition already holds
    assert_eq!(out, Value::Double(15.0));
}

#[test]
fn test_for_to_both_directions() {
    let up = run_out(vec![Expr::for_to(
        Expr::ident("i"),
        num(1.0),
        num(4.0),
        Direction::Up,
        Expr::block(vec![set_out(add(Expr::ident("out"), Expr::ident("i")))]),
    )]);
    assert_eq!(up, Value::Double(10.0));

    let down = run_out(vec![Expr::for_to(
        Expr::ident("i"),
        num(3.0),
        num(1.0),
        Direction::Down,
        Expr::block(vec![set_out(Expr::binary(
            BinaryOp::Mul,
            add(Expr::ident("out"), num(1.0)),
            Expr::ident("i"),
        ))]),
    )]);
    // (((0 + 1) * 3 + 1) * 2 + 1) * 1
    assert_eq!(down, Value::Double(9.0));
}

#[test]
fn test_if_else_value() {
    let pick = |flag: bool| {
        run_out(vec![set_out(Expr::if_else(
            Expr::boolean(flag),
            Expr::block(vec![num(1.0)]),
            Some(Expr::block(vec![num(2.0)])),
        ))])
    };
    assert_eq!(pick(true), Value::Double(1.0));
    assert_eq!(pick(false), Value::Double(2.0));
}

#[test]
fn test_function_calls_and_returns() {
    let out = run_out(vec![
        Expr::function(
            "sum",
            vec![Expr::declare("number", "a"), Expr::declare("number", "b")],
            Expr::block(vec![add(Expr::ident("a"), Expr::ident("b"))]),
        ),
        Expr::function(
            "clamp",
            vec![Expr::declare("number", "x")],
            Expr::block(vec![
                Expr::if_else(
                    Expr::binary(BinaryOp::Greater, Expr::ident("x"), num(10.0)),
                    Expr::block(vec![Expr::ret(Some(num(10.0)))]),
                    None,
                ),
                Expr::ret(Some(Expr::ident("x"))),
            ]),
        ),
        set_out(add(
            Expr::call("sum", vec![num(2.0), num(3.0)]),
            Expr::call("clamp", vec![num(40.0)]),
        )),
    ]);
    assert_eq!(out, Value::Double(15.0));
}

#[test]
fn test_recursion() {
    // fib(n) = n < 2 ? n : fib(n - 1) + fib(n - 2)
    let out = run_out(vec![
        Expr::function(
            "fib",
            vec![Expr::declare("number", "n")],
            Expr::block(vec![
                Expr::if_else(
                    Expr::binary(BinaryOp::Less, Expr::ident("n"), num(2.0)),
                    Expr::block(vec![Expr::ret(Some(Expr::ident("n")))]),
                    None,
                ),
                Expr::ret(Some(add(
                    Expr::call(
                        "fib",
                        vec![Expr::binary(BinaryOp::Sub, Expr::ident("n"), num(1.0))],
                    ),
                    Expr::call(
                        "fib",
                        vec![Expr::binary(BinaryOp::Sub, Expr::ident("n"), num(2.0))],
                    ),
                ))),
            ]),
        ),
        set_out(Expr::call("fib", vec![num(10.0)])),
    ]);
    assert_eq!(out, Value::Double(55.0));
}

#[test]
fn test_arrays_and_for_in() {
    let out = run_out(vec![
        Expr::assign(
            Expr::declare_array("number", "xs"),
            Expr::array(vec![num(1.0), num(2.0), num(3.0)]),
        ),
        Expr::assign(Expr::index(Expr::ident("xs"), num(1.0)), num(20.0)),
        Expr::for_in(
            Expr::ident("x"),
            Expr::ident("xs"),
            Expr::block(vec![set_out(add(Expr::ident("out"), Expr::ident("x")))]),
        ),
    ]);
    assert_eq!(out, Value::Double(24.0));
}

#[test]
fn test_index_out_of_bounds() {
    let host = host();
    let module = compile(
        &host,
        vec![
            Expr::assign(
                Expr::declare_array("number", "xs"),
                Expr::array(vec![num(1.0)]),
            ),
            set_out(Expr::index(Expr::ident("xs"), num(4.0))),
        ],
    );
    let err = Machine::new(&module, &VmOptions::default())
        .with_globals(default_globals(&host))
        .run()
        .unwrap_err();
    assert_matches!(err, VmError::IndexOutOfBounds { index: 4, len: 1 });
}

#[test]
fn test_string_concatenation_through_natives() {
    let host = HostEnvironment::standard().variable("text", Type::String);
    let module = compile(
        &host,
        vec![Expr::assign(
            Expr::ident("text"),
            add(add(Expr::string("n = "), num(2.0)), Expr::string("!")),
        )],
    );
    let mut machine = Machine::new(&module, &VmOptions::default())
        .with_natives(standard_natives())
        .with_globals(default_globals(&host));
    machine.run().unwrap();
    assert_eq!(machine.globals()[0], Value::string("n = 2!"));
}

#[test]
fn test_host_natives_receive_arguments() {
    let host = HostEnvironment::standard().native("emit", vec![Type::Double], Type::Empty);
    let module = compile(&host, vec![Expr::call("emit", vec![num(7.0)])]);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    Machine::new(&module, &VmOptions::default())
        .with_natives(standard_natives())
        .with_native(move |args| {
            sink.borrow_mut().extend(args.iter().cloned());
            Ok(None)
        })
        .run()
        .unwrap();
    assert_eq!(*seen.borrow(), vec![Value::Double(7.0)]);
}

#[test]
fn test_native_failure_propagates() {
    let host = HostEnvironment::standard().native("fail", vec![], Type::Empty);
    let module = compile(&host, vec![Expr::call("fail", vec![])]);
    let err = Machine::new(&module, &VmOptions::default())
        .with_natives(standard_natives())
        .with_native(|_| {
            Err(VmError::Native {
                name: "fail".to_string(),
                message: "refused".to_string(),
            })
        })
        .run()
        .unwrap_err();
    assert_matches!(err, VmError::Native { ref name, .. } if name == "fail");
    assert_eq!(err.to_string(), "native 'fail' failed: refused");
}

#[test]
fn test_step_limit() {
    let module = compile(
        &host(),
        vec![Expr::while_loop(Expr::boolean(true), Expr::block(vec![]))],
    );
    let err = Machine::new(&module, &VmOptions { max_steps: 100 })
        .run()
        .unwrap_err();
    assert_eq!(err, VmError::StepLimit(100));
}

#[test]
fn test_assembled_module_runs_the_same() {
    let host = host();
    let module = compile(
        &host,
        vec![Expr::for_to(
            Expr::ident("i"),
            num(1.0),
            num(3.0),
            Direction::Up,
            Expr::block(vec![set_out(add(Expr::ident("out"), Expr::ident("i")))]),
        )],
    );
    for addressing in [Addressing::Fixed, Addressing::Relative] {
        let bytes = assembly::assemble(&module, addressing).unwrap();
        let loaded = assembly::load(&bytes).unwrap();
        let mut machine = Machine::new(&loaded, &VmOptions::default())
            .with_globals(default_globals(&host));
        machine.run().unwrap();
        assert_eq!(machine.globals()[0], Value::Double(6.0));
    }
}

/// A hand-built module whose only function claims a number result.
fn valued_module(code: Vec<Instruction>) -> crate::assembly::Module {
    crate::assembly::Module {
        name: "valued".to_string(),
        vendor: "test".to_string(),
        version: [0; 4],
        entry_point: 0,
        constants: Vec::new(),
        types: TypeCatalog::standard(),
        functions: vec![FunctionDef {
            id: 0,
            name: "main".to_string(),
            return_type: Type::Double.id(),
            param_count: 0,
            variables: Vec::new(),
            code,
        }],
    }
}

#[test]
fn test_missing_return_value() {
    let module = valued_module(vec![Instruction::with_operand(OpCode::Ret, 0)]);
    let err = Machine::new(&module, &VmOptions::default()).run().unwrap_err();
    assert_eq!(err, VmError::MissingReturnValue("main".to_string()));
}

#[test]
fn test_entry_value_is_reported() {
    let module = valued_module(vec![
        Instruction::with_operand(OpCode::PushDefault, Type::Double.id() as i32),
        Instruction::with_operand(OpCode::Ret, 1),
    ]);
    let outcome = Machine::new(&module, &VmOptions::default()).run().unwrap();
    assert_eq!(outcome.value, Some(Value::Double(0.0)));
}

#[test]
fn test_type_mismatch_is_reported() {
    let module = valued_module(vec![
        Instruction::with_operand(OpCode::PushInt, 1),
        Instruction::simple(OpCode::Length),
    ]);
    let err = Machine::new(&module, &VmOptions::default()).run().unwrap_err();
    assert_eq!(
        err,
        VmError::TypeMismatch {
            op: "Length",
            expected: "array",
            found: "integer",
        }
    );
}

#[test]
fn test_running_off_the_end() {
    let module = valued_module(vec![Instruction::simple(OpCode::Nop)]);
    let err = Machine::new(&module, &VmOptions::default()).run().unwrap_err();
    assert_eq!(err, VmError::FellOffEnd("main".to_string()));
}
