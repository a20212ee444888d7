// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The scope tree.
//!
//! Lexical scopes and functions are two separate arenas joined by a back
//! reference: every [`ScopeNode`] names the function that owns its locals,
//! while [`FunctionBuilder`] holds that function's slot table. Blocks inside
//! `if`/`while` bodies therefore get a scope without a function record.
//!
//! The root scope is the host scope. The program body is its only child and
//! belongs to function 0 (`main`).

mod builder;


pub use builder::{CompilationContext, build};

use crate::ast::{NodeId, Span};
use crate::diagnostic::{Diagnostic, Result};
use crate::types::Type;
use rustc_hash::FxHashMap;
use std::fmt;

/// Index of a scope in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

/// Function id. `main` is 0; ids grow in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

impl FunctionId {
    /// The synthetic top-level function.
    pub const MAIN: FunctionId = FunctionId(0);
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of a variable in the tree's variable arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableId(pub u32);

/// Where a variable lives at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storage {
    /// A slot in a function's frame
    Local {
        /// Owning function
        function: FunctionId,
        /// Slot index
        slot: u32,
    },
    /// A host global
    Global(u32),
}

/// A declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Name as declared
    pub name: String,
    /// Bound type; `None` until the resolver first observes it
    pub ty: Option<Type>,
    /// Run-time location
    pub storage: Storage,
    /// Declaration site
    pub span: Span,
}

/// Who implements a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callee {
    /// Compiled script function
    Script(FunctionId),
    /// Host native, by index
    Native(u32),
}

/// One overload in a scope's function table.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionEntry {
    /// Name as declared
    pub name: String,
    /// Parameter types
    pub params: Vec<Type>,
    /// Implementation
    pub callee: Callee,
}

/// A lexical scope.
#[derive(Debug, Clone, Default)]
pub struct ScopeNode {
    /// Enclosing scope; `None` only for the host scope
    pub parent: Option<ScopeId>,
    /// Nested scopes, in source order
    pub children: Vec<ScopeId>,
    /// Function owning locals declared here
    pub function: Option<FunctionId>,
    variables: FxHashMap<String, VariableId>,
    functions: FxHashMap<String, Vec<FunctionEntry>>,
}

impl ScopeNode {
    /// Variables declared directly in this scope.
    pub fn variables(&self) -> impl Iterator<Item = VariableId> + '_ {
        self.variables.values().copied()
    }

    /// Overload sets declared directly in this scope.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionEntry> {
        self.functions.values().flatten()
    }
}

/// A slot in a function's variable table.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    /// Slot name (hidden temporaries start with `$`)
    pub name: String,
    /// The variable stored here
    pub variable: VariableId,
}

/// A function under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBuilder {
    /// Function id
    pub id: FunctionId,
    /// Name as declared
    pub name: String,
    /// Number of leading slots that are parameters
    pub param_count: u32,
    /// Parameters first, then locals
    pub slots: Vec<Slot>,
    /// Set at most once, by the first `return` or after the body is typed
    pub return_type: Option<Type>,
    /// Declaration site
    pub span: Span,
}

impl FunctionBuilder {
    fn new(id: FunctionId, name: &str, span: Span) -> Self {
        Self {
            id,
            name: name.to_string(),
            param_count: 0,
            slots: Vec::new(),
            return_type: None,
            span,
        }
    }
}

/// Hidden locals backing a `for-in` loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForInSlots {
    /// The iterated array
    pub array: VariableId,
    /// Current index (Double)
    pub index: VariableId,
}

/// Folds a name for case-insensitive lookup.
pub fn fold(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Every scope, variable and function of one compilation.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Vec<ScopeNode>,
    variables: Vec<Variable>,
    functions: Vec<FunctionBuilder>,
    node_scopes: FxHashMap<NodeId, ScopeId>,
    node_functions: FxHashMap<NodeId, FunctionId>,
    for_in_slots: FxHashMap<NodeId, ForInSlots>,
    program: ScopeId,
}

impl ScopeTree {
    fn new() -> Self {
        Self {
            scopes: vec![ScopeNode::default()],
            variables: Vec::new(),
            functions: Vec::new(),
            node_scopes: FxHashMap::default(),
            node_functions: FxHashMap::default(),
            for_in_slots: FxHashMap::default(),
            program: ScopeId(0),
        }
    }

    /// The host scope.
    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// The scope of the program body.
    pub fn program_scope(&self) -> ScopeId {
        self.program
    }

    /// Looks up a scope.
    pub fn scope(&self, id: ScopeId) -> &ScopeNode {
        &self.scopes[id.0 as usize]
    }

    /// Number of scopes, host scope included.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// The scope introduced by a block, function, or loop node.
    pub fn scope_of(&self, node: NodeId) -> Option<ScopeId> {
        self.node_scopes.get(&node).copied()
    }

    /// The function declared by a function declaration node.
    pub fn function_of(&self, node: NodeId) -> Option<FunctionId> {
        self.node_functions.get(&node).copied()
    }

    /// The hidden slots of a `for-in` node.
    pub fn for_in_slots(&self, node: NodeId) -> Option<ForInSlots> {
        self.for_in_slots.get(&node).copied()
    }

    /// Looks up a variable.
    pub fn variable(&self, id: VariableId) -> &Variable {
        &self.variables[id.0 as usize]
    }

    /// Mutable access, used by the resolver to bind lazy types.
    pub fn variable_mut(&mut self, id: VariableId) -> &mut Variable {
        &mut self.variables[id.0 as usize]
    }

    /// Looks up a function.
    pub fn function(&self, id: FunctionId) -> &FunctionBuilder {
        &self.functions[id.0 as usize]
    }

    /// Mutable access, used by the resolver to fix return types.
    pub fn function_mut(&mut self, id: FunctionId) -> &mut FunctionBuilder {
        &mut self.functions[id.0 as usize]
    }

    /// All functions in id order.
    pub fn functions(&self) -> &[FunctionBuilder] {
        &self.functions
    }

    /// Finds a variable, innermost scope first.
    pub fn lookup_variable(&self, from: ScopeId, name: &str) -> Option<VariableId> {
        let key = fold(name);
        self.ancestors(from)
            .find_map(|scope| self.scope(scope).variables.get(&key).copied())
    }

    /// The overload set of the first scope, walking outward, that declares
    /// `name` at all.
    ///
    /// The walk stops there even if no overload in that set fits the call.
    pub fn lookup_overloads(&self, from: ScopeId, name: &str) -> Option<&[FunctionEntry]> {
        let key = fold(name);
        self.ancestors(from)
            .find_map(|scope| self.scope(scope).functions.get(&key))
            .map(Vec::as_slice)
    }

    /// Resolves a call by exact parameter-type match.
    pub fn resolve_call(&self, from: ScopeId, name: &str, args: &[Type]) -> Option<&FunctionEntry> {
        self.lookup_overloads(from, name)?
            .iter()
            .find(|entry| entry.params == args)
    }

    /// `from` and every enclosing scope, innermost first.
    pub fn ancestors(&self, from: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(from), move |&id| self.scope(id).parent)
    }

    // ========================================================================
    // Construction
    // ========================================================================

    fn push_scope(&mut self, parent: ScopeId, function: FunctionId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(ScopeNode {
            parent: Some(parent),
            function: Some(function),
            ..ScopeNode::default()
        });
        self.scopes[parent.0 as usize].children.push(id);
        id
    }

    fn bind_node(&mut self, node: NodeId, scope: ScopeId) {
        self.node_scopes.insert(node, scope);
    }

    fn push_function(&mut self, function: FunctionBuilder) {
        debug_assert_eq!(function.id.0 as usize, self.functions.len());
        self.functions.push(function);
    }

    fn declare_variable(
        &mut self,
        scope: ScopeId,
        name: &str,
        ty: Option<Type>,
        storage: Storage,
        span: Span,
    ) -> Result<VariableId> {
        let key = fold(name);
        if self.scope(scope).variables.contains_key(&key) {
            return Err(Diagnostic::declaration(
                format!("variable '{}' is already declared in this scope", name),
                span,
            ));
        }
        let id = VariableId(self.variables.len() as u32);
        self.variables.push(Variable {
            name: name.to_string(),
            ty,
            storage,
            span,
        });
        self.scopes[scope.0 as usize].variables.insert(key, id);
        Ok(id)
    }

    /// Declares a local in `scope` and gives it the next slot of `function`.
    fn declare_local(
        &mut self,
        scope: ScopeId,
        function: FunctionId,
        name: &str,
        ty: Option<Type>,
        span: Span,
    ) -> Result<VariableId> {
        let slot = self.function(function).slots.len() as u32;
        let id = self.declare_variable(scope, name, ty, Storage::Local { function, slot }, span)?;
        self.function_mut(function).slots.push(Slot {
            name: name.to_string(),
            variable: id,
        });
        Ok(id)
    }

    fn declare_function(&mut self, scope: ScopeId, entry: FunctionEntry, span: Span) -> Result<()> {
        let overloads = self.scopes[scope.0 as usize]
            .functions
            .entry(fold(&entry.name))
            .or_default();
        if overloads.iter().any(|existing| existing.params == entry.params) {
            return Err(Diagnostic::declaration(
                format!(
                    "function '{}' is already declared in this scope",
                    signature(&entry.name, &entry.params)
                ),
                span,
            ));
        }
        overloads.push(entry);
        Ok(())
    }
}

/// Renders `name(T1, T2)` for messages.
pub fn signature(name: &str, params: &[Type]) -> String {
    let params: Vec<String> = params.iter().map(Type::to_string).collect();
    format!("{}({})", name, params.join(", "))
}
