// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Second pass: infer and check a type for every expression.
//!
//! The resolver walks the same tree the scope builder saw, entering the
//! scopes it created. It only writes to the scope tree to bind a lazily
//! typed variable or to fix a function's return type; everything else it
//! learns goes into [`Resolution::types`], keyed by node id.
//!
//! The walk stops at the first problem.


use crate::ast::{BinaryOp, Expr, ExprKind, Literal, NodeId, Program, Span};
use crate::compiler::scope::{Callee, FunctionId, ScopeId, ScopeTree, Storage, signature};
use crate::diagnostic::{Diagnostic, Result};
use crate::host::{CONCAT, HostEnvironment};
use crate::types::Type;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, instrument};

/// Cooperative cancellation flag, checked before every node visit.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Visible to every clone.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What the resolver learned.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Type of the whole program
    pub program_type: Type,
    /// Type of every visited node
    pub types: FxHashMap<NodeId, Type>,
}

impl Resolution {
    /// Type recorded for a node.
    pub fn type_of(&self, node: NodeId) -> Option<&Type> {
        self.types.get(&node)
    }
}

/// Types `program` against `tree`.
#[instrument(skip_all)]
pub fn resolve(
    program: &Program,
    tree: &mut ScopeTree,
    host: &HostEnvironment,
    cancel: &CancellationToken,
) -> Result<Resolution> {
    let scope = tree.program_scope();
    let mut resolver = Resolver {
        tree,
        host,
        cancel,
        types: FxHashMap::default(),
        scope,
        function: FunctionId::MAIN,
    };
    let program_type = resolver.visit(&program.body)?;
    debug!(nodes = resolver.types.len(), %program_type, "program resolved");
    Ok(Resolution {
        program_type,
        types: resolver.types,
    })
}

struct Resolver<'a> {
    tree: &'a mut ScopeTree,
    host: &'a HostEnvironment,
    cancel: &'a CancellationToken,
    types: FxHashMap<NodeId, Type>,
    scope: ScopeId,
    function: FunctionId,
}

impl Resolver<'_> {
    fn visit(&mut self, expr: &Expr) -> Result<Type> {
        if self.cancel.is_cancelled() {
            return Err(Diagnostic::structural("compilation cancelled", expr.span));
        }
        let ty = self.type_of(expr)?;
        self.types.insert(expr.id, ty.clone());
        Ok(ty)
    }

    fn type_of(&mut self, expr: &Expr) -> Result<Type> {
        match &expr.kind {
            ExprKind::Constant { value } => Ok(match value {
                Literal::Boolean(_) => Type::Boolean,
                Literal::Number(_) => Type::Double,
                Literal::String(_) => Type::String,
            }),
            ExprKind::Variable { name, .. } => self.variable(name, expr.span),
            ExprKind::Binary { op, left, right } => self.binary(*op, left, right, expr.span),
            ExprKind::FunctionDeclaration { name, params, body } => {
                self.function_declaration(expr, name, params, body)
            }
            ExprKind::Scope { body } => self.in_scope(expr, |this| this.block(body)),
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.condition(condition)?;
                let then_ty = self.visit(then_branch)?;
                if let Some(else_branch) = else_branch {
                    let else_ty = self.visit(else_branch)?;
                    if then_ty != else_ty {
                        return Err(Diagnostic::type_error(
                            format!(
                                "if branches have different types: {} and {}",
                                then_ty, else_ty
                            ),
                            expr.span,
                        ));
                    }
                }
                Ok(then_ty)
            }
            ExprKind::For {
                init,
                condition,
                step,
                body,
            } => self.in_scope(expr, |this| {
                if let Some(init) = init {
                    this.visit(init)?;
                }
                if let Some(condition) = condition {
                    this.condition(condition)?;
                }
                if let Some(step) = step {
                    this.visit(step)?;
                }
                this.visit(body)?;
                Ok(Type::Empty)
            }),
            ExprKind::ForTo {
                variable,
                from,
                to,
                body,
                ..
            } => self.in_scope(expr, |this| {
                this.loop_variable(variable, &Type::Double)?;
                for bound in [from, to] {
                    let ty = this.visit(bound)?;
                    if ty != Type::Double {
                        return Err(Diagnostic::type_error(
                            format!("for-to bounds must be numbers, found {}", ty),
                            bound.span,
                        ));
                    }
                }
                this.visit(body)?;
                Ok(Type::Empty)
            }),
            ExprKind::ForIn {
                variable,
                iterable,
                body,
            } => self.in_scope(expr, |this| {
                let iterable_ty = this.visit(iterable)?;
                let Type::Array(element) = &iterable_ty else {
                    return Err(Diagnostic::type_error(
                        format!("for-in expects an array, found {}", iterable_ty),
                        iterable.span,
                    ));
                };
                if element.is_empty() {
                    return Err(Diagnostic::type_error(
                        "cannot iterate over an empty array literal",
                        iterable.span,
                    ));
                }
                this.loop_variable(variable, element)?;
                let slots = this.tree.for_in_slots(expr.id).ok_or_else(|| {
                    Diagnostic::structural("for-in loop has no hidden slots", expr.span)
                })?;
                this.tree.variable_mut(slots.array).ty = Some(iterable_ty.clone());
                this.visit(body)?;
                Ok(Type::Empty)
            }),
            ExprKind::While { condition, body } => {
                self.condition(condition)?;
                self.visit(body)?;
                Ok(Type::Empty)
            }
            ExprKind::Repeat { body, condition } => {
                self.visit(body)?;
                self.condition(condition)?;
                Ok(Type::Empty)
            }
            ExprKind::Invocation { name, args } => self.invocation(name, args, expr.span),
            ExprKind::Return { value } => self.return_value(value.as_deref(), expr.span),
            ExprKind::Parenthesized { inner } => self.visit(inner),
            ExprKind::ElementAccess { target, index } => {
                let Some(index) = index else {
                    return Err(Diagnostic::structural(
                        "array type syntax used as a value",
                        expr.span,
                    ));
                };
                self.element_access(target, index)
            }
            ExprKind::ArrayInitialization { elements } => self.array_literal(elements),
        }
    }

    // ========================================================================
    // Scopes and blocks
    // ========================================================================

    fn in_scope(
        &mut self,
        node: &Expr,
        f: impl FnOnce(&mut Self) -> Result<Type>,
    ) -> Result<Type> {
        let scope = self.tree.scope_of(node.id).ok_or_else(|| {
            Diagnostic::structural(
                format!("{} has no scope; was the tree built?", node.kind.name()),
                node.span,
            )
        })?;
        let saved = std::mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = saved;
        result
    }

    /// Function declarations first, then everything else in order.
    /// The block's type is its last member's.
    fn block(&mut self, body: &[Expr]) -> Result<Type> {
        for item in body.iter().filter(|e| e.is_function_declaration()) {
            self.visit(item)?;
        }
        for item in body.iter().filter(|e| !e.is_function_declaration()) {
            self.visit(item)?;
        }
        Ok(body
            .last()
            .and_then(|last| self.types.get(&last.id).cloned())
            .unwrap_or(Type::Empty))
    }

    fn condition(&mut self, condition: &Expr) -> Result<()> {
        let ty = self.visit(condition)?;
        if ty != Type::Boolean {
            return Err(Diagnostic::type_error(
                format!("condition must be Boolean, found {}", ty),
                condition.span,
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Variables
    // ========================================================================

    fn variable(&mut self, name: &str, span: Span) -> Result<Type> {
        let id = self
            .tree
            .lookup_variable(self.scope, name)
            .ok_or_else(|| Diagnostic::resolution(format!("undeclared variable '{}'", name), span))?;
        let variable = self.tree.variable(id);
        if let Storage::Local { function, .. } = variable.storage {
            if function != self.function {
                return Err(Diagnostic::resolution(
                    format!(
                        "variable '{}' belongs to function '{}' and is not visible here",
                        name,
                        self.tree.function(function).name
                    ),
                    span,
                ));
            }
        }
        variable.ty.clone().ok_or_else(|| {
            Diagnostic::type_error(format!("type of variable '{}' is not known here", name), span)
        })
    }

    /// Binds or checks the type of a `for-to`/`for-in` loop variable.
    fn loop_variable(&mut self, variable: &Expr, expected: &Type) -> Result<()> {
        let ExprKind::Variable { name, .. } = &variable.kind else {
            return Err(Diagnostic::structural(
                "loop variable must be a variable",
                variable.span,
            ));
        };
        let id = self.tree.lookup_variable(self.scope, name).ok_or_else(|| {
            Diagnostic::resolution(format!("undeclared variable '{}'", name), variable.span)
        })?;
        let slot = self.tree.variable_mut(id);
        match slot.ty.clone() {
            None => slot.ty = Some(expected.clone()),
            Some(actual) if actual != *expected => {
                return Err(Diagnostic::type_error(
                    format!(
                        "loop variable '{}' has type {} but the loop produces {}",
                        name, actual, expected
                    ),
                    variable.span,
                ));
            }
            Some(_) => {}
        }
        // also rejects captured locals
        let ty = self.visit(variable)?;
        debug_assert_eq!(&ty, expected);
        Ok(())
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, span: Span) -> Result<Type> {
        if op == BinaryOp::Assign {
            return self.assignment(left, right, span);
        }
        let lhs = self.visit(left)?;
        let rhs = self.visit(right)?;
        let mismatch = |expected: &str| {
            Diagnostic::type_error(
                format!(
                    "operator '{}' expects {} operands, found {} and {}",
                    op.symbol(),
                    expected,
                    lhs,
                    rhs
                ),
                span,
            )
        };

        match op {
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                if lhs == Type::Double && rhs == Type::Double {
                    Ok(Type::Double)
                } else {
                    Err(mismatch("number"))
                }
            }
            BinaryOp::Add => {
                if lhs == Type::Boolean || rhs == Type::Boolean {
                    return Err(mismatch("number or string"));
                }
                if lhs == Type::String || rhs == Type::String {
                    if !matches!(lhs, Type::String | Type::Double)
                        || !matches!(rhs, Type::String | Type::Double)
                    {
                        return Err(mismatch("number or string"));
                    }
                    let operands = [lhs.clone(), rhs.clone()];
                    if self.tree.resolve_call(self.scope, CONCAT, &operands).is_none() {
                        return Err(Diagnostic::resolution(
                            format!(
                                "no string concatenation available for {}",
                                signature(CONCAT, &operands)
                            ),
                            span,
                        ));
                    }
                    return Ok(Type::String);
                }
                if lhs == Type::Double && rhs == Type::Double {
                    Ok(Type::Double)
                } else {
                    Err(mismatch("number or string"))
                }
            }
            BinaryOp::Less | BinaryOp::Greater | BinaryOp::LessEqual | BinaryOp::GreaterEqual => {
                if lhs == Type::Double && rhs == Type::Double {
                    Ok(Type::Boolean)
                } else {
                    Err(mismatch("number"))
                }
            }
            BinaryOp::And | BinaryOp::Or => {
                if lhs == Type::Boolean && rhs == Type::Boolean {
                    Ok(Type::Boolean)
                } else {
                    Err(mismatch("Boolean"))
                }
            }
            BinaryOp::Equal => Ok(Type::Boolean),
            BinaryOp::Assign => unreachable!("handled above"),
        }
    }

    fn assignment(&mut self, target: &Expr, value: &Expr, span: Span) -> Result<Type> {
        let (dest, what) = match &target.kind {
            ExprKind::Variable { name, .. } => (self.visit(target)?, format!("variable '{}'", name)),
            ExprKind::ElementAccess { index: Some(_), .. } => {
                (self.visit(target)?, "array element".to_string())
            }
            other => {
                return Err(Diagnostic::structural(
                    format!("cannot assign to {}", other.name()),
                    target.span,
                ));
            }
        };
        let source = self.visit(value)?;
        if !dest.accepts(&source) {
            return Err(Diagnostic::type_error(
                format!("cannot assign {} to {} of type {}", source, what, dest),
                span,
            ));
        }
        Ok(dest)
    }

    // ========================================================================
    // Arrays
    // ========================================================================

    fn element_access(&mut self, target: &Expr, index: &Expr) -> Result<Type> {
        let target_ty = self.visit(target)?;
        let Type::Array(element) = &target_ty else {
            return Err(Diagnostic::type_error(
                format!("cannot index a value of type {}", target_ty),
                target.span,
            ));
        };
        let index_ty = self.visit(index)?;
        if index_ty != Type::Double {
            return Err(Diagnostic::type_error(
                format!("array index must be a number, found {}", index_ty),
                index.span,
            ));
        }
        if element.is_empty() {
            return Err(Diagnostic::type_error(
                "cannot index an empty array literal",
                target.span,
            ));
        }
        Ok((**element).clone())
    }

    fn array_literal(&mut self, elements: &[Expr]) -> Result<Type> {
        let mut element_ty: Option<Type> = None;
        for element in elements {
            let ty = self.visit(element)?;
            match &element_ty {
                None if ty.is_empty() => {
                    return Err(Diagnostic::type_error(
                        "array elements must have a value",
                        element.span,
                    ));
                }
                None => element_ty = Some(ty),
                Some(expected) if *expected != ty => {
                    return Err(Diagnostic::type_error(
                        format!(
                            "array elements must share one type, found {} and {}",
                            expected, ty
                        ),
                        element.span,
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(Type::array_of(element_ty.unwrap_or(Type::Empty)))
    }

    // ========================================================================
    // Functions
    // ========================================================================

    fn invocation(&mut self, name: &str, args: &[Expr], span: Span) -> Result<Type> {
        let mut arg_types = Vec::with_capacity(args.len());
        for arg in args {
            arg_types.push(self.visit(arg)?);
        }
        let entry = self
            .tree
            .resolve_call(self.scope, name, &arg_types)
            .ok_or_else(|| {
                Diagnostic::resolution(
                    format!("undeclared function '{}'", signature(name, &arg_types)),
                    span,
                )
            })?;
        match entry.callee {
            Callee::Native(index) => self
                .host
                .natives
                .get(index as usize)
                .map(|native| native.return_type.clone())
                .ok_or_else(|| {
                    Diagnostic::resolution(format!("native #{} is not provided", index), span)
                }),
            Callee::Script(id) => self.tree.function(id).return_type.clone().ok_or_else(|| {
                Diagnostic::type_error(
                    format!(
                        "return type of '{}' is not known yet",
                        signature(name, &arg_types)
                    ),
                    span,
                )
            }),
        }
    }

    fn return_value(&mut self, value: Option<&Expr>, span: Span) -> Result<Type> {
        if self.function == FunctionId::MAIN {
            return Err(Diagnostic::structural(
                "'return' used outside of a function body",
                span,
            ));
        }
        let ty = match value {
            Some(value) => self.visit(value)?,
            None => Type::Empty,
        };
        let function = self.tree.function_mut(self.function);
        match function.return_type.clone() {
            None => function.return_type = Some(ty),
            Some(existing) if existing != ty => {
                return Err(Diagnostic::type_error(
                    format!(
                        "conflicting return types in function '{}': {} and {}",
                        function.name, existing, ty
                    ),
                    span,
                ));
            }
            Some(_) => {}
        }
        Ok(Type::Empty)
    }

    fn function_declaration(
        &mut self,
        expr: &Expr,
        name: &str,
        params: &[Expr],
        body: &Expr,
    ) -> Result<Type> {
        let declared_in = self.scope;
        let id = self.tree.function_of(expr.id).ok_or_else(|| {
            Diagnostic::structural(
                format!("function '{}' has no function record; was the tree built?", name),
                expr.span,
            )
        })?;
        self.in_scope(expr, |this| {
            // parameters are locals of the declared function
            let saved = std::mem::replace(&mut this.function, id);
            let result = this.function_body(expr, id, declared_in, name, params, body);
            this.function = saved;
            result
        })
    }

    fn function_body(
        &mut self,
        expr: &Expr,
        id: FunctionId,
        declared_in: ScopeId,
        name: &str,
        params: &[Expr],
        body: &Expr,
    ) -> Result<Type> {
        let mut param_types = Vec::with_capacity(params.len());
        for param in params {
            param_types.push(self.visit(param)?);
        }
        match self.tree.resolve_call(declared_in, name, &param_types).map(|entry| entry.callee) {
            Some(Callee::Script(found)) if found == id => {}
            _ => {
                return Err(Diagnostic::resolution(
                    format!(
                        "declaration of '{}' does not match its function record",
                        signature(name, &param_types)
                    ),
                    expr.span,
                ));
            }
        }

        let body_ty = self.visit(body)?;
        let function = self.tree.function_mut(id);
        match function.return_type.clone() {
            None => function.return_type = Some(body_ty),
            Some(existing) if !existing.is_empty() && !body_ty.is_empty() && existing != body_ty => {
                return Err(Diagnostic::type_error(
                    format!(
                        "conflicting return types in function '{}': {} and {}",
                        function.name, existing, body_ty
                    ),
                    body.span,
                ));
            }
            Some(_) => {}
        }
        Ok(Type::Empty)
    }
}
