// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use terrapin_compiler::ast::{BinaryOp, Direction, Expr, Program};
use terrapin_compiler::vm::{Machine, default_globals, standard_natives};
use terrapin_compiler::{Addressing, Compiler, CompilerOptions, HostEnvironment, Type, VmOptions};

/// `functions` small functions, each with a loop, called from main.
fn workload(functions: usize) -> Program {
    let mut body = Vec::new();
    for i in 0..functions {
        let name = format!("f{}", i);
        body.push(Expr::function(
            &name,
            vec![Expr::declare("number", "n")],
            Expr::block(vec![
                Expr::assign(Expr::declare("number", "acc"), Expr::number(0.0)),
                Expr::for_to(
                    Expr::ident("k"),
                    Expr::number(1.0),
                    Expr::ident("n"),
                    Direction::Up,
                    Expr::block(vec![Expr::assign(
                        Expr::ident("acc"),
                        Expr::binary(BinaryOp::Add, Expr::ident("acc"), Expr::ident("k")),
                    )]),
                ),
                Expr::ident("acc"),
            ]),
        ));
        body.push(Expr::assign(
            Expr::ident("out"),
            Expr::binary(
                BinaryOp::Add,
                Expr::ident("out"),
                Expr::call(&name, vec![Expr::number(50.0)]),
            ),
        ));
    }
    Program::new(Expr::block(body))
}

fn host() -> HostEnvironment {
    HostEnvironment::standard().variable("out", Type::Double)
}

fn bench_compile(c: &mut Criterion) {
    let program = workload(200);
    let compiler = Compiler::new(CompilerOptions::default()).with_host(host());
    c.bench_function("compile_200_functions", |b| {
        b.iter(|| compiler.compile(black_box(&program)))
    });
}

fn bench_assembly(c: &mut Criterion) {
    let compiler = Compiler::new(CompilerOptions::default()).with_host(host());
    let Ok(compiled) = compiler.compile(&workload(200)) else {
        return;
    };
    let Ok(bytes) = compiled.to_bytes_with(Addressing::Fixed) else {
        return;
    };
    c.bench_function("assemble_fixed", |b| {
        b.iter(|| terrapin_compiler::assembly::assemble(black_box(&compiled.module), Addressing::Fixed))
    });
    c.bench_function("load_fixed", |b| {
        b.iter(|| terrapin_compiler::assembly::load(black_box(&bytes)))
    });
}

fn bench_run(c: &mut Criterion) {
    let host = host();
    let compiler = Compiler::new(CompilerOptions::default()).with_host(host.clone());
    let Ok(compiled) = compiler.compile(&workload(20)) else {
        return;
    };
    let options = VmOptions::default();
    c.bench_function("run_20_loops", |b| {
        b.iter(|| {
            Machine::new(&compiled.module, &options)
                .with_natives(standard_natives())
                .with_globals(default_globals(&host))
                .run()
        })
    });
}

criterion_group!(benches, bench_compile, bench_assembly, bench_run);
criterion_main!(benches);
