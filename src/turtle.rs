// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Turtle graphics natives for `terrapin run`.
//!
//! Implements the natives of [`HostEnvironment::turtle`] against an
//! in-memory turtle that records the segments it draws.

use std::cell::RefCell;
use std::f64::consts::PI;
use std::rc::Rc;
use terrapin_compiler::HostEnvironment;
use terrapin_compiler::vm::{NativeFn, Value, VmError, default_globals, standard_natives};

/// A drawn line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: (f64, f64),
    pub to: (f64, f64),
}

/// Pen position, heading in degrees and what has been drawn so far.
#[derive(Debug, Clone, PartialEq)]
pub struct Turtle {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub pen_down: bool,
    pub segments: Vec<Segment>,
    pub printed: Vec<String>,
}

impl Default for Turtle {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            heading: 0.0,
            pen_down: true,
            segments: Vec::new(),
            printed: Vec::new(),
        }
    }
}

impl Turtle {
    fn forward(&mut self, distance: f64) {
        let radians = self.heading.to_radians();
        let from = (self.x, self.y);
        self.x += distance * radians.cos();
        self.y += distance * radians.sin();
        if self.pen_down {
            self.segments.push(Segment {
                from,
                to: (self.x, self.y),
            });
        }
    }

    fn turn(&mut self, degrees: f64) {
        self.heading = (self.heading + degrees).rem_euclid(360.0);
    }
}

/// Shared turtle state handed to the natives.
pub type SharedTurtle = Rc<RefCell<Turtle>>;

/// The standard natives followed by the turtle natives, in
/// [`HostEnvironment::turtle`] order.
pub fn natives(turtle: &SharedTurtle, echo: bool) -> Vec<NativeFn> {
    let mut natives = standard_natives();

    let t = Rc::clone(turtle);
    natives.push(Box::new(move |args: &[Value]| {
        t.borrow_mut().forward(number("forward", args)?);
        Ok(None)
    }));
    let t = Rc::clone(turtle);
    natives.push(Box::new(move |args: &[Value]| {
        t.borrow_mut().turn(number("turn", args)?);
        Ok(None)
    }));
    let t = Rc::clone(turtle);
    natives.push(Box::new(move |_: &[Value]| {
        t.borrow_mut().pen_down = false;
        Ok(None)
    }));
    let t = Rc::clone(turtle);
    natives.push(Box::new(move |_: &[Value]| {
        t.borrow_mut().pen_down = true;
        Ok(None)
    }));
    // print(string) and print(number) share one body
    for _ in 0..2 {
        let t = Rc::clone(turtle);
        natives.push(Box::new(move |args: &[Value]| {
            let line = args.first().map(ToString::to_string).unwrap_or_default();
            if echo {
                println!("{}", line);
            }
            t.borrow_mut().printed.push(line);
            Ok(None)
        }));
    }
    natives
}

/// Globals for [`HostEnvironment::turtle`] with `pi` filled in.
pub fn globals(host: &HostEnvironment) -> Vec<Value> {
    let mut globals = default_globals(host);
    if let Some(index) = host.variable_index("pi") {
        globals[index] = Value::Double(PI);
    }
    globals
}

fn number(name: &str, args: &[Value]) -> Result<f64, VmError> {
    args.first()
        .and_then(Value::as_double)
        .ok_or_else(|| VmError::Native {
            name: name.to_string(),
            message: "expects one number".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrapin_compiler::ast::{Expr, Program};
    use terrapin_compiler::vm::Machine;
    use terrapin_compiler::{Compiler, CompilerOptions, VmOptions};

    #[test]
    fn test_native_table_matches_host() {
        let turtle = SharedTurtle::default();
        assert_eq!(
            natives(&turtle, false).len(),
            HostEnvironment::turtle().natives.len()
        );
    }

    #[test]
    fn test_square() {
        let host = HostEnvironment::turtle();
        let program = Program::new(Expr::block(vec![
            Expr::call("print", vec![Expr::string("square")]),
            Expr::for_to(
                Expr::ident("side"),
                Expr::number(1.0),
                Expr::number(4.0),
                terrapin_compiler::ast::Direction::Up,
                Expr::block(vec![
                    Expr::call("forward", vec![Expr::number(10.0)]),
                    Expr::call("turn", vec![Expr::number(90.0)]),
                ]),
            ),
            Expr::call("pen_up", vec![]),
            Expr::call("forward", vec![Expr::ident("pi")]),
        ]));
        let compiled = Compiler::new(CompilerOptions::default())
            .with_host(host.clone())
            .compile(&program)
            .unwrap();

        let turtle = SharedTurtle::default();
        Machine::new(&compiled.module, &VmOptions::default())
            .with_natives(natives(&turtle, false))
            .with_globals(globals(&host))
            .run()
            .unwrap();

        let turtle = turtle.borrow();
        assert_eq!(turtle.printed, ["square"]);
        assert_eq!(turtle.segments.len(), 4);
        assert!(!turtle.pen_down);
        assert_eq!(turtle.heading, 0.0);
        // back at the start, then a pen-up step of pi along the x axis
        assert!((turtle.x - PI).abs() < 1e-9);
        assert!(turtle.y.abs() < 1e-9);
    }

    #[test]
    fn test_forward_rejects_non_numbers() {
        let turtle = SharedTurtle::default();
        let mut natives = natives(&turtle, false);
        let forward = &mut natives[3];
        let err = forward(&[Value::string("far")]).unwrap_err();
        assert!(err.to_string().contains("forward"));
    }
}
