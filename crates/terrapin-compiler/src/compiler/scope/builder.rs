// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! First pass: build the scope tree and register every declaration.

use super::{
    Callee, ForInSlots, FunctionBuilder, FunctionEntry, FunctionId, ScopeId, ScopeTree, Storage,
};
use crate::ast::{Expr, ExprKind, Program, Span};
use crate::diagnostic::Diagnostic;
use crate::host::HostEnvironment;
use crate::types::Type;
use tracing::{debug, instrument};
use unicode_xid::UnicodeXID;

/// State shared by every pass of one compilation.
///
/// Function ids come from here rather than from global state, so two
/// compilations never influence each other.
#[derive(Debug, Default)]
pub struct CompilationContext {
    next_function: u32,
}

impl CompilationContext {
    /// A fresh context; the first id handed out is `main`'s.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next function id.
    pub fn next_function_id(&mut self) -> FunctionId {
        let id = FunctionId(self.next_function);
        self.next_function += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn functions_issued(&self) -> u32 {
        self.next_function
    }
}

/// Builds the scope tree for `program` with `host` merged into the root.
///
/// Every declaration problem found is reported, not just the first.
#[instrument(skip_all)]
pub fn build(
    program: &Program,
    host: &HostEnvironment,
    ctx: &mut CompilationContext,
) -> Result<ScopeTree, Vec<Diagnostic>> {
    let mut builder = Builder {
        tree: ScopeTree::new(),
        ctx,
        scope: ScopeId(0),
        function: FunctionId::MAIN,
        errors: Vec::new(),
    };
    builder.declare_host(host);
    builder.program(program);

    let Builder { tree, errors, .. } = builder;
    debug!(
        scopes = tree.scope_count(),
        functions = tree.functions().len(),
        errors = errors.len(),
        "scope tree built"
    );
    if errors.is_empty() {
        Ok(tree)
    } else {
        Err(errors)
    }
}

/// Whether `name` is a valid identifier.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_xid_start() => chars.all(|c| c.is_xid_continue()),
        _ => false,
    }
}

/// The type named by declaration syntax, if the syntax is well formed.
fn declared_type(syntax: &Expr) -> Option<Type> {
    match &syntax.kind {
        ExprKind::Variable {
            name,
            declaration: None,
        } => Type::from_keyword(name),
        ExprKind::ElementAccess {
            target,
            index: None,
        } => match &target.kind {
            ExprKind::Variable {
                name,
                declaration: None,
            } => Type::from_keyword(name).map(Type::array_of),
            _ => None,
        },
        _ => None,
    }
}

struct Builder<'a> {
    tree: ScopeTree,
    ctx: &'a mut CompilationContext,
    scope: ScopeId,
    function: FunctionId,
    errors: Vec<Diagnostic>,
}

impl Builder<'_> {
    fn report(&mut self, result: crate::diagnostic::Result<impl Sized>) {
        if let Err(diag) = result {
            self.errors.push(diag);
        }
    }

    fn declare_host(&mut self, host: &HostEnvironment) {
        let root = self.tree.root();
        for (index, variable) in host.variables.iter().enumerate() {
            let result = self.tree.declare_variable(
                root,
                &variable.name,
                Some(variable.ty.clone()),
                Storage::Global(index as u32),
                Span::default(),
            );
            self.report(result);
        }
        for (index, native) in host.natives.iter().enumerate() {
            let entry = FunctionEntry {
                name: native.name.clone(),
                params: native.params.clone(),
                callee: Callee::Native(index as u32),
            };
            let result = self.tree.declare_function(root, entry, Span::default());
            self.report(result);
        }
    }

    fn program(&mut self, program: &Program) {
        let main = self.ctx.next_function_id();
        debug_assert_eq!(main, FunctionId::MAIN);
        self.tree
            .push_function(FunctionBuilder::new(main, "main", program.body.span));
        self.tree.functions[0].return_type = Some(Type::Empty);

        let scope = self.tree.push_scope(self.tree.root(), main);
        self.tree.program = scope;
        self.scope = scope;
        self.function = main;

        // A top-level block is the program scope itself, not a child of it.
        match &program.body.kind {
            ExprKind::Scope { body } => {
                self.tree.bind_node(program.body.id, scope);
                for item in body {
                    self.visit(item);
                }
            }
            _ => self.visit(&program.body),
        }
    }

    fn visit(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Variable {
                name,
                declaration: Some(syntax),
            } => self.declare(name, syntax, expr.span),
            ExprKind::Variable { .. } | ExprKind::Constant { .. } => {}
            ExprKind::FunctionDeclaration { name, params, body } => {
                self.function_declaration(expr, name, params, body)
            }
            ExprKind::Scope { body } => {
                let saved = self.enter(expr);
                for item in body {
                    self.visit(item);
                }
                self.scope = saved;
            }
            ExprKind::For { .. } => {
                let saved = self.enter(expr);
                expr.for_each_child(&mut |child| self.visit(child));
                self.scope = saved;
            }
            ExprKind::ForTo {
                variable,
                from,
                to,
                body,
                ..
            } => {
                let saved = self.enter(expr);
                self.loop_variable(variable);
                self.visit(from);
                self.visit(to);
                self.visit(body);
                self.scope = saved;
            }
            ExprKind::ForIn {
                variable,
                iterable,
                body,
            } => {
                let saved = self.enter(expr);
                self.loop_variable(variable);
                self.for_in_slots(expr);
                self.visit(iterable);
                self.visit(body);
                self.scope = saved;
            }
            _ => expr.for_each_child(&mut |child| self.visit(child)),
        }
    }

    /// Opens a scope bound to `node`; returns the scope to restore.
    fn enter(&mut self, node: &Expr) -> ScopeId {
        let scope = self.tree.push_scope(self.scope, self.function);
        self.tree.bind_node(node.id, scope);
        std::mem::replace(&mut self.scope, scope)
    }

    fn declare(&mut self, name: &str, syntax: &Expr, span: Span) {
        if !is_identifier(name) {
            self.errors.push(Diagnostic::structural(
                format!("'{}' is not a valid variable name", name),
                span,
            ));
            return;
        }
        let Some(ty) = declared_type(syntax) else {
            self.errors.push(Diagnostic::structural(
                format!("malformed declaration of '{}'", name),
                syntax.span,
            ));
            return;
        };
        let result = self
            .tree
            .declare_local(self.scope, self.function, name, Some(ty), span);
        self.report(result);
    }

    /// A `for-to`/`for-in` variable: a declaration, an existing variable, or
    /// an implicit local whose type the resolver fills in.
    fn loop_variable(&mut self, variable: &Expr) {
        match &variable.kind {
            ExprKind::Variable {
                name,
                declaration: Some(syntax),
            } => self.declare(name, syntax, variable.span),
            ExprKind::Variable {
                name,
                declaration: None,
            } => {
                if self.tree.lookup_variable(self.scope, name).is_some() {
                    return;
                }
                if !is_identifier(name) {
                    self.errors.push(Diagnostic::structural(
                        format!("'{}' is not a valid variable name", name),
                        variable.span,
                    ));
                    return;
                }
                let result =
                    self.tree
                        .declare_local(self.scope, self.function, name, None, variable.span);
                self.report(result);
            }
            other => self.errors.push(Diagnostic::structural(
                format!("loop variable must be a variable, found {}", other.name()),
                variable.span,
            )),
        }
    }

    fn for_in_slots(&mut self, node: &Expr) {
        let array = self.tree.declare_local(
            self.scope,
            self.function,
            &format!("$array{}", node.id.0),
            None,
            node.span,
        );
        let index = self.tree.declare_local(
            self.scope,
            self.function,
            &format!("$index{}", node.id.0),
            Some(Type::Double),
            node.span,
        );
        match (array, index) {
            (Ok(array), Ok(index)) => {
                self.tree
                    .for_in_slots
                    .insert(node.id, ForInSlots { array, index });
            }
            (array, index) => {
                self.report(array);
                self.report(index);
            }
        }
    }

    fn function_declaration(&mut self, expr: &Expr, name: &str, params: &[Expr], body: &Expr) {
        if !is_identifier(name) {
            self.errors.push(Diagnostic::structural(
                format!("'{}' is not a valid function name", name),
                expr.span,
            ));
            return;
        }

        let mut param_types = Vec::with_capacity(params.len());
        for (position, param) in params.iter().enumerate() {
            match &param.kind {
                ExprKind::Variable {
                    name: param_name,
                    declaration: Some(syntax),
                } => match declared_type(syntax) {
                    Some(_) if !is_identifier(param_name) => {
                        self.errors.push(Diagnostic::structural(
                            format!("'{}' is not a valid parameter name", param_name),
                            param.span,
                        ))
                    }
                    Some(ty) => param_types.push((param_name.as_str(), ty, param.span)),
                    None => self.errors.push(Diagnostic::structural(
                        format!("malformed declaration of parameter '{}'", param_name),
                        syntax.span,
                    )),
                },
                _ => self.errors.push(Diagnostic::structural(
                    format!("parameter {} of '{}' must declare a type", position, name),
                    param.span,
                )),
            }
        }
        if param_types.len() != params.len() {
            return;
        }

        let id = self.ctx.next_function_id();
        self.tree
            .push_function(FunctionBuilder::new(id, name, expr.span));
        self.tree.node_functions.insert(expr.id, id);
        let entry = FunctionEntry {
            name: name.to_string(),
            params: param_types.iter().map(|(_, ty, _)| ty.clone()).collect(),
            callee: Callee::Script(id),
        };
        let result = self.tree.declare_function(self.scope, entry, expr.span);
        self.report(result);

        let scope = self.tree.push_scope(self.scope, id);
        self.tree.bind_node(expr.id, scope);
        let saved_scope = std::mem::replace(&mut self.scope, scope);
        let saved_function = std::mem::replace(&mut self.function, id);

        for (param_name, ty, span) in param_types {
            let result = self.tree.declare_local(scope, id, param_name, Some(ty), span);
            self.report(result);
        }
        self.tree.function_mut(id).param_count = params.len() as u32;
        self.visit(body);

        self.scope = saved_scope;
        self.function = saved_function;
    }
}
