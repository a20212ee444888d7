// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Third pass: lower the typed tree to one instruction list per function.
//!
//! The generator runs a stack machine model: an expression leaves exactly
//! one value on the stack unless its type is `Empty`, in which case it
//! leaves nothing. Blocks drop every value except the last one.
//!
//! Type checking is assumed to have succeeded; anything that would have been
//! a type error here is reported as a generator error.

mod control;
mod marker;


pub use marker::{CodeBuilder, Marker};

use crate::ast::{BinaryOp, Expr, ExprKind, Literal, Program, Span};
use crate::compiler::bytecode::{Constant, ConstantPool, Instruction, OpCode};
use crate::compiler::resolve::Resolution;
use crate::compiler::scope::{Callee, FunctionId, ScopeId, ScopeTree, Storage, VariableId};
use crate::diagnostic::{Diagnostic, Result};
use crate::host::CONCAT;
use crate::types::{ARRAY_PAYLOAD_FIELD, Type};
use tracing::{debug, instrument};

/// Output of code generation.
#[derive(Debug, Clone)]
pub struct Generated {
    /// Instruction lists indexed by function id
    pub functions: Vec<Vec<Instruction>>,
    /// The shared constant pool
    pub constants: ConstantPool,
}

/// Generates code for every function of `program`.
#[instrument(skip_all)]
pub fn generate(program: &Program, tree: &ScopeTree, resolution: &Resolution) -> Result<Generated> {
    let mut generator = Generator::new(tree, resolution);
    generator.program(program)?;
    let functions = generator
        .finished
        .into_iter()
        .enumerate()
        .map(|(id, code)| {
            code.ok_or_else(|| {
                Diagnostic::generator(
                    format!("no code was generated for function #{}", id),
                    program.body.span,
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;
    debug!(
        functions = functions.len(),
        instructions = functions.iter().map(Vec::len).sum::<usize>(),
        constants = generator.constants.len(),
        "code generated"
    );
    Ok(Generated {
        functions,
        constants: generator.constants,
    })
}

/// Lowers a resolved program.
pub struct Generator<'a> {
    tree: &'a ScopeTree,
    resolution: &'a Resolution,
    constants: ConstantPool,
    /// Function contexts; the innermost one receives emitted code
    contexts: Vec<CodeBuilder>,
    finished: Vec<Option<Vec<Instruction>>>,
    scope: ScopeId,
}

impl<'a> Generator<'a> {
    /// Creates a generator over a built and resolved tree.
    pub fn new(tree: &'a ScopeTree, resolution: &'a Resolution) -> Self {
        Self {
            tree,
            resolution,
            constants: ConstantPool::new(),
            contexts: Vec::new(),
            finished: vec![None; tree.functions().len()],
            scope: tree.program_scope(),
        }
    }

    fn program(&mut self, program: &Program) -> Result<()> {
        self.enter_function(FunctionId::MAIN);
        self.scope = self.tree.program_scope();
        self.expr(&program.body)?;
        self.epilogue(&program.body, &Type::Empty)?;
        self.exit_function()
    }

    // ========================================================================
    // Function contexts
    // ========================================================================

    fn enter_function(&mut self, id: FunctionId) {
        self.contexts.push(CodeBuilder::new(id));
    }

    fn exit_function(&mut self) -> Result<()> {
        let builder = self
            .contexts
            .pop()
            .ok_or_else(|| Diagnostic::generator("no function context to exit", Span::default()))?;
        let id = builder.function();
        let code = builder.finish()?;
        self.finished[id.0 as usize] = Some(code);
        Ok(())
    }

    /// The innermost function context.
    fn code(&mut self) -> Result<&mut CodeBuilder> {
        self.contexts
            .last_mut()
            .ok_or_else(|| Diagnostic::generator("no active function context", Span::default()))
    }

    fn emit(&mut self, instruction: Instruction) -> Result<usize> {
        Ok(self.code()?.emit(instruction))
    }

    fn emit_op(&mut self, opcode: OpCode) -> Result<usize> {
        self.emit(Instruction::simple(opcode))
    }

    fn acquire(&mut self) -> Result<Marker> {
        Ok(self.code()?.acquire())
    }

    fn release(&mut self, markers: impl IntoIterator<Item = Marker>) -> Result<()> {
        let code = self.code()?;
        for marker in markers {
            code.release(marker)?;
        }
        Ok(())
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    fn ty(&self, expr: &Expr) -> Result<&'a Type> {
        self.resolution.type_of(expr.id).ok_or_else(|| {
            Diagnostic::generator(
                format!("{} node was never typed", expr.kind.name()),
                expr.span,
            )
        })
    }

    fn with_scope<T>(&mut self, node: &Expr, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let scope = self.tree.scope_of(node.id).ok_or_else(|| {
            Diagnostic::generator(format!("{} has no scope", node.kind.name()), node.span)
        })?;
        let saved = std::mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = saved;
        result
    }

    fn variable(&self, name: &str, span: Span) -> Result<VariableId> {
        self.tree
            .lookup_variable(self.scope, name)
            .ok_or_else(|| Diagnostic::generator(format!("unknown variable '{}'", name), span))
    }

    fn load(&mut self, variable: VariableId) -> Result<()> {
        let instruction = match self.tree.variable(variable).storage {
            Storage::Local { slot, .. } => Instruction::with_operand(OpCode::LoadLocal, slot as i32),
            Storage::Global(index) => Instruction::with_operand(OpCode::LoadGlobal, index as i32),
        };
        self.emit(instruction).map(drop)
    }

    fn store(&mut self, variable: VariableId) -> Result<()> {
        let instruction = match self.tree.variable(variable).storage {
            Storage::Local { slot, .. } => Instruction::with_operand(OpCode::StoreLocal, slot as i32),
            Storage::Global(index) => Instruction::with_operand(OpCode::StoreGlobal, index as i32),
        };
        self.emit(instruction).map(drop)
    }

    fn constant(&mut self, value: Constant) -> Result<()> {
        let id = self.constants.intern(value);
        self.emit(Instruction::with_operand(OpCode::LoadConst, id as i32))
            .map(drop)
    }

    fn call(&mut self, callee: Callee, argc: usize) -> Result<()> {
        let instruction = match callee {
            Callee::Script(id) => Instruction::with_operands(OpCode::Call, id.0 as i32, argc as i32),
            Callee::Native(index) => {
                Instruction::with_operands(OpCode::CallNative, index as i32, argc as i32)
            }
        };
        self.emit(instruction).map(drop)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Emits `expr`, then drops its value if it has one.
    fn statement(&mut self, expr: &Expr) -> Result<()> {
        self.expr(expr)?;
        if !self.ty(expr)?.is_empty() {
            self.emit_op(OpCode::Pop)?;
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Constant { value } => self.constant(match value {
                Literal::Boolean(b) => Constant::Boolean(*b),
                Literal::Number(n) => Constant::Double(*n),
                Literal::String(s) => Constant::String(s.clone()),
            }),
            ExprKind::Variable { name, .. } => {
                let variable = self.variable(name, expr.span)?;
                self.load(variable)
            }
            ExprKind::Binary { op, left, right } => self.binary(*op, left, right, expr.span),
            ExprKind::FunctionDeclaration { body, .. } => self.function_declaration(expr, body),
            ExprKind::Scope { body } => self.with_scope(expr, |this| {
                for (position, item) in body.iter().enumerate() {
                    if position + 1 == body.len() {
                        this.expr(item)?;
                    } else {
                        this.statement(item)?;
                    }
                }
                Ok(())
            }),
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.if_expr(expr, condition, then_branch, else_branch.as_deref()),
            ExprKind::For {
                init,
                condition,
                step,
                body,
            } => self.with_scope(expr, |this| {
                this.for_loop(init.as_deref(), condition.as_deref(), step.as_deref(), body)
            }),
            ExprKind::ForTo {
                variable,
                from,
                to,
                direction,
                body,
            } => self.with_scope(expr, |this| this.for_to(variable, from, to, *direction, body)),
            ExprKind::ForIn {
                variable,
                iterable,
                body,
            } => self.with_scope(expr, |this| this.for_in(expr, variable, iterable, body)),
            ExprKind::While { condition, body } => self.while_loop(condition, body),
            ExprKind::Repeat { body, condition } => self.repeat(body, condition),
            ExprKind::Invocation { name, args } => {
                let mut arg_types = Vec::with_capacity(args.len());
                for arg in args {
                    self.expr(arg)?;
                    arg_types.push(self.ty(arg)?.clone());
                }
                let entry = self
                    .tree
                    .resolve_call(self.scope, name, &arg_types)
                    .ok_or_else(|| {
                        Diagnostic::generator(format!("unresolved call to '{}'", name), expr.span)
                    })?;
                self.call(entry.callee, args.len())
            }
            ExprKind::Return { value } => {
                let count = match value {
                    Some(value) => {
                        self.expr(value)?;
                        if self.ty(value)?.is_empty() { 0 } else { 1 }
                    }
                    None => 0,
                };
                self.emit(Instruction::with_operand(OpCode::Ret, count))
                    .map(drop)
            }
            ExprKind::Parenthesized { inner } => self.expr(inner),
            ExprKind::ElementAccess { target, index } => {
                let Some(index) = index else {
                    return Err(Diagnostic::generator(
                        "array type syntax used as a value",
                        expr.span,
                    ));
                };
                let stride = self.ty(expr)?.size() as i32;
                self.element_address(target, index, stride)?;
                self.emit(Instruction::with_operands(
                    OpCode::GetField,
                    ARRAY_PAYLOAD_FIELD as i32,
                    stride,
                ))
                .map(drop)
            }
            ExprKind::ArrayInitialization { elements } => {
                for element in elements {
                    self.expr(element)?;
                }
                let element_id = match self.ty(expr)? {
                    Type::Array(element) => element.id(),
                    other => {
                        return Err(Diagnostic::generator(
                            format!("array literal typed as {}", other),
                            expr.span,
                        ));
                    }
                };
                self.emit(Instruction::with_operands(
                    OpCode::NewArray,
                    elements.len() as i32,
                    element_id as i32,
                ))
                .map(drop)
            }
        }
    }

    /// Pushes the address of `target[index]`: base, index, to-int, times
    /// stride, plus base.
    fn element_address(&mut self, target: &Expr, index: &Expr, stride: i32) -> Result<()> {
        self.expr(target)?;
        self.expr(index)?;
        self.emit_op(OpCode::ToInt)?;
        self.emit(Instruction::with_operand(OpCode::PushInt, stride))?;
        self.emit_op(OpCode::IMul)?;
        self.emit_op(OpCode::IAdd)?;
        Ok(())
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, span: Span) -> Result<()> {
        if op == BinaryOp::Assign {
            return self.assignment(left, right, span);
        }
        self.expr(left)?;
        self.expr(right)?;
        let lhs = self.ty(left)?;
        let rhs = self.ty(right)?;

        let opcode = match op {
            BinaryOp::Add if *lhs == Type::String || *rhs == Type::String => {
                let entry = self
                    .tree
                    .resolve_call(self.scope, CONCAT, &[lhs.clone(), rhs.clone()])
                    .ok_or_else(|| {
                        Diagnostic::generator(
                            format!("no concatenation for {} + {}", lhs, rhs),
                            span,
                        )
                    })?;
                return self.call(entry.callee, 2);
            }
            BinaryOp::Equal if matches!(lhs, Type::Array(_)) || matches!(rhs, Type::Array(_)) => {
                return Err(Diagnostic::generator(
                    format!("'==' is not supported between {} and {}", lhs, rhs),
                    span,
                ));
            }
            BinaryOp::Add => OpCode::Add,
            BinaryOp::Sub => OpCode::Sub,
            BinaryOp::Mul => OpCode::Mul,
            BinaryOp::Div => OpCode::Div,
            BinaryOp::Mod => OpCode::Mod,
            BinaryOp::Less => OpCode::Lt,
            BinaryOp::Greater => OpCode::Gt,
            BinaryOp::LessEqual => OpCode::Le,
            BinaryOp::GreaterEqual => OpCode::Ge,
            BinaryOp::Equal => OpCode::Eq,
            BinaryOp::And => OpCode::And,
            BinaryOp::Or => OpCode::Or,
            BinaryOp::Assign => unreachable!("handled above"),
        };
        self.emit_op(opcode).map(drop)
    }

    fn assignment(&mut self, target: &Expr, value: &Expr, span: Span) -> Result<()> {
        match &target.kind {
            ExprKind::Variable { name, .. } => {
                let variable = self.variable(name, target.span)?;
                self.expr(value)?;
                self.emit_op(OpCode::Dup)?;
                self.store(variable)
            }
            ExprKind::ElementAccess {
                target: array,
                index: Some(index),
            } => {
                let stride = self.ty(target)?.size() as i32;
                self.element_address(array, index, stride)?;
                self.expr(value)?;
                self.emit(Instruction::with_operands(
                    OpCode::SetField,
                    ARRAY_PAYLOAD_FIELD as i32,
                    stride,
                ))
                .map(drop)
            }
            other => Err(Diagnostic::generator(
                format!("cannot assign to {}", other.name()),
                span,
            )),
        }
    }

    // ========================================================================
    // Functions
    // ========================================================================

    fn function_declaration(&mut self, expr: &Expr, body: &Expr) -> Result<()> {
        let id = self.tree.function_of(expr.id).ok_or_else(|| {
            Diagnostic::generator("function declaration has no function record", expr.span)
        })?;
        let return_type = self.tree.function(id).return_type.clone().ok_or_else(|| {
            Diagnostic::generator(
                format!("function '{}' has no return type", self.tree.function(id).name),
                expr.span,
            )
        })?;
        self.with_scope(expr, |this| {
            this.enter_function(id);
            this.expr(body)?;
            this.epilogue(body, &return_type)?;
            this.exit_function()
        })
    }

    /// Returns the body's value when it is the function's result, otherwise
    /// drops it and returns nothing.
    fn epilogue(&mut self, body: &Expr, return_type: &Type) -> Result<()> {
        let body_type = self.ty(body)?;
        if !return_type.is_empty() && body_type == return_type {
            self.emit(Instruction::with_operand(OpCode::Ret, 1))?;
        } else {
            if !body_type.is_empty() {
                self.emit_op(OpCode::Pop)?;
            }
            self.emit(Instruction::with_operand(OpCode::Ret, 0))?;
        }
        Ok(())
    }
}
