// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Control flow lowering.
//!
//! Loops are laid out bottom-tested: an entry jump skips to the condition,
//! which jumps back to the body while it holds.
//!
//! ```text
//!         Jump cond          <- entry marker
//! body:   ...body...
//!         ...step...
//! cond:   ...condition...
//!         JumpIfTrue body
//! ```

use super::Generator;
use crate::ast::{Direction, Expr, ExprKind};
use crate::compiler::bytecode::{Constant, Instruction, OpCode};
use crate::diagnostic::{Diagnostic, Result};
use crate::types::ARRAY_PAYLOAD_FIELD;

impl Generator<'_> {
    pub(super) fn if_expr(
        &mut self,
        expr: &Expr,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: Option<&Expr>,
    ) -> Result<()> {
        let ty = self.ty(expr)?;
        self.expr(condition)?;
        let branch = self.acquire()?;
        self.expr(then_branch)?;

        // without an else, a valued `if` still needs a value on the false path
        if else_branch.is_none() && ty.is_empty() {
            let end = self.acquire()?;
            self.code()?.patch_jump(&branch, OpCode::JumpIfFalse, &end)?;
            return self.release([branch, end]);
        }

        let skip = self.acquire()?;
        let else_start = self.acquire()?;
        match else_branch {
            Some(else_branch) => self.expr(else_branch)?,
            None => {
                self.emit(Instruction::with_operand(OpCode::PushDefault, ty.id() as i32))?;
            }
        }
        let end = self.acquire()?;

        let code = self.code()?;
        code.patch_jump(&branch, OpCode::JumpIfFalse, &else_start)?;
        code.patch_jump(&skip, OpCode::Jump, &end)?;
        self.release([branch, skip, else_start, end])
    }

    pub(super) fn while_loop(&mut self, condition: &Expr, body: &Expr) -> Result<()> {
        let entry = self.acquire()?;
        let body_start = self.acquire()?;
        self.statement(body)?;
        let cond = self.acquire()?;
        self.code()?.patch_jump(&entry, OpCode::Jump, &cond)?;
        self.expr(condition)?;
        self.code()?.emit_jump_to(OpCode::JumpIfTrue, &body_start)?;
        self.release([entry, body_start, cond])
    }

    pub(super) fn for_loop(
        &mut self,
        init: Option<&Expr>,
        condition: Option<&Expr>,
        step: Option<&Expr>,
        body: &Expr,
    ) -> Result<()> {
        if let Some(init) = init {
            self.statement(init)?;
        }
        let entry = self.acquire()?;
        let body_start = self.acquire()?;
        self.statement(body)?;
        if let Some(step) = step {
            self.statement(step)?;
        }
        let cond = self.acquire()?;
        self.code()?.patch_jump(&entry, OpCode::Jump, &cond)?;
        match condition {
            Some(condition) => {
                self.expr(condition)?;
                self.code()?.emit_jump_to(OpCode::JumpIfTrue, &body_start)?;
            }
            None => {
                self.code()?.emit_jump_to(OpCode::Jump, &body_start)?;
            }
        }
        self.release([entry, body_start, cond])
    }

    pub(super) fn for_to(
        &mut self,
        variable: &Expr,
        from: &Expr,
        to: &Expr,
        direction: Direction,
        body: &Expr,
    ) -> Result<()> {
        let counter = self.loop_variable(variable)?;
        self.expr(from)?;
        self.store(counter)?;

        let entry = self.acquire()?;
        let body_start = self.acquire()?;
        self.statement(body)?;
        self.load(counter)?;
        self.constant(Constant::Double(1.0))?;
        self.emit_op(match direction {
            Direction::Up => OpCode::Add,
            Direction::Down => OpCode::Sub,
        })?;
        self.store(counter)?;

        let cond = self.acquire()?;
        self.code()?.patch_jump(&entry, OpCode::Jump, &cond)?;
        // the bound is inclusive: keep going until the counter passes it
        self.load(counter)?;
        self.expr(to)?;
        self.emit_op(match direction {
            Direction::Up => OpCode::Gt,
            Direction::Down => OpCode::Lt,
        })?;
        self.code()?.emit_jump_to(OpCode::JumpIfFalse, &body_start)?;
        self.release([entry, body_start, cond])
    }

    pub(super) fn for_in(
        &mut self,
        node: &Expr,
        variable: &Expr,
        iterable: &Expr,
        body: &Expr,
    ) -> Result<()> {
        let slots = self.tree.for_in_slots(node.id).ok_or_else(|| {
            Diagnostic::generator("for-in loop has no hidden slots", node.span)
        })?;
        let item = self.loop_variable(variable)?;
        let stride = self.ty(variable)?.size() as i32;

        self.expr(iterable)?;
        self.store(slots.array)?;
        self.constant(Constant::Double(0.0))?;
        self.store(slots.index)?;

        let entry = self.acquire()?;
        let body_start = self.acquire()?;
        self.load(slots.array)?;
        self.load(slots.index)?;
        self.emit_op(OpCode::ToInt)?;
        self.emit(Instruction::with_operand(OpCode::PushInt, stride))?;
        self.emit_op(OpCode::IMul)?;
        self.emit_op(OpCode::IAdd)?;
        self.emit(Instruction::with_operands(
            OpCode::GetField,
            ARRAY_PAYLOAD_FIELD as i32,
            stride,
        ))?;
        self.store(item)?;
        self.statement(body)?;
        self.load(slots.index)?;
        self.constant(Constant::Double(1.0))?;
        self.emit_op(OpCode::Add)?;
        self.store(slots.index)?;

        let cond = self.acquire()?;
        self.code()?.patch_jump(&entry, OpCode::Jump, &cond)?;
        self.load(slots.index)?;
        self.load(slots.array)?;
        self.emit_op(OpCode::Length)?;
        self.emit_op(OpCode::Lt)?;
        self.code()?.emit_jump_to(OpCode::JumpIfTrue, &body_start)?;
        self.release([entry, body_start, cond])
    }

    pub(super) fn repeat(&mut self, body: &Expr, condition: &Expr) -> Result<()> {
        let body_start = self.acquire()?;
        self.statement(body)?;
        self.expr(condition)?;
        self.code()?.emit_jump_to(OpCode::JumpIfFalse, &body_start)?;
        self.release([body_start])
    }

    fn loop_variable(&self, variable: &Expr) -> Result<crate::compiler::scope::VariableId> {
        match &variable.kind {
            ExprKind::Variable { name, .. } => self.variable(name, variable.span),
            other => Err(Diagnostic::generator(
                format!("loop variable must be a variable, found {}", other.name()),
                variable.span,
            )),
        }
    }
}
