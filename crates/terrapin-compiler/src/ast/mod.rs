// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Abstract Syntax Tree (AST) definitions for terrapin programs.
//!
//! The parser lives outside this crate; it hands over a tree of [`Expr`]
//! nodes built from a fixed set of sixteen node kinds. Everything is an
//! expression, statements included, so a block simply evaluates to its last
//! member.
//!
//! Trees can be built in code with the constructor helpers on [`Expr`] or
//! deserialized from JSON (every node is tagged by a `kind` field).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A byte range in the original source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// Inclusive start offset
    pub start: usize,
    /// Exclusive end offset
    pub end: usize,
}

impl Span {
    /// Creates a span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span covers nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Pre-order index of a node inside its [`Program`].
///
/// Later passes key their per-node facts by this id instead of writing into
/// the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub u32);

/// A complete program: the top-level expression plus node numbering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    /// The top-level expression, normally a [`ExprKind::Scope`] block
    pub body: Expr,
    #[serde(skip)]
    node_count: u32,
}

impl Program {
    /// Wraps `body` and assigns every node its [`NodeId`].
    pub fn new(mut body: Expr) -> Self {
        let mut next = 0;
        number_nodes(&mut body, &mut next);
        Self {
            body,
            node_count: next,
        }
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> u32 {
        self.node_count
    }
}

impl<'de> Deserialize<'de> for Program {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            body: Expr,
        }

        let raw = Raw::deserialize(deserializer)?;
        Ok(Program::new(raw.body))
    }
}

fn number_nodes(expr: &mut Expr, next: &mut u32) {
    expr.id = NodeId(*next);
    *next += 1;
    expr.for_each_child_mut(&mut |child| number_nodes(child, next));
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    /// Pre-order id, assigned by [`Program::new`]
    #[serde(skip)]
    pub id: NodeId,
    /// Source range
    #[serde(default)]
    pub span: Span,
    /// What kind of node this is
    #[serde(flatten)]
    pub kind: ExprKind,
}

/// A literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    /// `true` / `false`
    Boolean(bool),
    /// Every number is a double
    Number(f64),
    /// A string literal
    String(String),
}

/// Binary operators. Assignment is one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `<=`
    LessEqual,
    /// `>=`
    GreaterEqual,
    /// `==`
    Equal,
    /// `and`
    And,
    /// `or`
    Or,
    /// `=`
    Assign,
}

impl BinaryOp {
    /// The operator as written in source.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Less => "<",
            BinaryOp::Greater => ">",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Equal => "==",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Assign => "=",
        }
    }
}

/// Direction of a counted `for v = a to|down to b` loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// `to`
    Up,
    /// `down to`
    Down,
}

/// The sixteen node kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ExprKind {
    /// A literal
    Constant {
        /// The value
        value: Literal,
    },
    /// A binary operation, including assignment
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// A variable reference, or a declaration when `declaration` is present
    Variable {
        /// Name as written
        name: String,
        /// Type syntax of a declaration (`number x`, `string[] xs`)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        declaration: Option<Box<Expr>>,
    },
    /// `function name(params) body`
    FunctionDeclaration {
        /// Function name
        name: String,
        /// Parameters, each a declaring [`ExprKind::Variable`]
        params: Vec<Expr>,
        /// Function body
        body: Box<Expr>,
    },
    /// A block `{ ... }`
    Scope {
        /// Members, evaluated in order
        body: Vec<Expr>,
    },
    /// `if (c) a [else b]`
    If {
        /// Condition
        condition: Box<Expr>,
        /// Taken when the condition holds
        then_branch: Box<Expr>,
        /// Taken otherwise
        #[serde(default, skip_serializing_if = "Option::is_none")]
        else_branch: Option<Box<Expr>>,
    },
    /// `for (init; condition; step) body`
    For {
        /// Runs once before the loop
        #[serde(default, skip_serializing_if = "Option::is_none")]
        init: Option<Box<Expr>>,
        /// Loop condition; absent means forever
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<Box<Expr>>,
        /// Runs after each iteration
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<Box<Expr>>,
        /// Loop body
        body: Box<Expr>,
    },
    /// `for v = from to|down to to body`
    ForTo {
        /// Loop variable
        variable: Box<Expr>,
        /// Start value
        from: Box<Expr>,
        /// Inclusive bound
        to: Box<Expr>,
        /// Counting direction
        direction: Direction,
        /// Loop body
        body: Box<Expr>,
    },
    /// `for v in iterable body`
    ForIn {
        /// Loop variable
        variable: Box<Expr>,
        /// The array iterated over
        iterable: Box<Expr>,
        /// Loop body
        body: Box<Expr>,
    },
    /// `while (c) body`
    While {
        /// Condition
        condition: Box<Expr>,
        /// Loop body
        body: Box<Expr>,
    },
    /// `repeat body until (c)`
    Repeat {
        /// Loop body
        body: Box<Expr>,
        /// Exit condition
        condition: Box<Expr>,
    },
    /// `name(args)`
    Invocation {
        /// Callee name
        name: String,
        /// Arguments
        args: Vec<Expr>,
    },
    /// `return [value]`
    Return {
        /// Returned value
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Box<Expr>>,
    },
    /// `( inner )`
    Parenthesized {
        /// Wrapped expression
        inner: Box<Expr>,
    },
    /// `target[index]`, or `keyword[]` inside type syntax
    ElementAccess {
        /// The indexed expression
        target: Box<Expr>,
        /// Index; absent only in array type syntax
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<Box<Expr>>,
    },
    /// `[a, b, c]`
    ArrayInitialization {
        /// Elements
        elements: Vec<Expr>,
    },
}

impl ExprKind {
    /// Name of the node kind.
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Constant { .. } => "Constant",
            ExprKind::Binary { .. } => "Binary",
            ExprKind::Variable { .. } => "Variable",
            ExprKind::FunctionDeclaration { .. } => "FunctionDeclaration",
            ExprKind::Scope { .. } => "Scope",
            ExprKind::If { .. } => "If",
            ExprKind::For { .. } => "For",
            ExprKind::ForTo { .. } => "ForTo",
            ExprKind::ForIn { .. } => "ForIn",
            ExprKind::While { .. } => "While",
            ExprKind::Repeat { .. } => "Repeat",
            ExprKind::Invocation { .. } => "Invocation",
            ExprKind::Return { .. } => "Return",
            ExprKind::Parenthesized { .. } => "Parenthesized",
            ExprKind::ElementAccess { .. } => "ElementAccess",
            ExprKind::ArrayInitialization { .. } => "ArrayInitialization",
        }
    }
}

impl Expr {
    /// Creates a node with an unassigned id.
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            id: NodeId::default(),
            span,
            kind,
        }
    }

    /// Replaces the span.
    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Whether this node is a function declaration.
    pub fn is_function_declaration(&self) -> bool {
        matches!(self.kind, ExprKind::FunctionDeclaration { .. })
    }

    /// Visits the direct children in evaluation order.
    pub fn for_each_child(&self, f: &mut impl FnMut(&Expr)) {
        match &self.kind {
            ExprKind::Constant { .. } => {}
            ExprKind::Binary { left, right, .. } => {
                f(left);
                f(right);
            }
            ExprKind::Variable { declaration, .. } => {
                if let Some(decl) = declaration {
                    f(decl);
                }
            }
            ExprKind::FunctionDeclaration { params, body, .. } => {
                params.iter().for_each(&mut *f);
                f(body);
            }
            ExprKind::Scope { body } => body.iter().for_each(f),
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                f(condition);
                f(then_branch);
                if let Some(e) = else_branch {
                    f(e);
                }
            }
            ExprKind::For {
                init,
                condition,
                step,
                body,
            } => {
                for part in [init, condition, step].into_iter().flatten() {
                    f(part);
                }
                f(body);
            }
            ExprKind::ForTo {
                variable,
                from,
                to,
                body,
                ..
            } => {
                f(variable);
                f(from);
                f(to);
                f(body);
            }
            ExprKind::ForIn {
                variable,
                iterable,
                body,
            } => {
                f(variable);
                f(iterable);
                f(body);
            }
            ExprKind::While { condition, body } => {
                f(condition);
                f(body);
            }
            ExprKind::Repeat { body, condition } => {
                f(body);
                f(condition);
            }
            ExprKind::Invocation { args, .. } => args.iter().for_each(f),
            ExprKind::Return { value } => {
                if let Some(v) = value {
                    f(v);
                }
            }
            ExprKind::Parenthesized { inner } => f(inner),
            ExprKind::ElementAccess { target, index } => {
                f(target);
                if let Some(i) = index {
                    f(i);
                }
            }
            ExprKind::ArrayInitialization { elements } => elements.iter().for_each(f),
        }
    }

    /// Mutable counterpart of [`Expr::for_each_child`], same order.
    pub fn for_each_child_mut(&mut self, f: &mut impl FnMut(&mut Expr)) {
        match &mut self.kind {
            ExprKind::Constant { .. } => {}
            ExprKind::Binary { left, right, .. } => {
                f(left);
                f(right);
            }
            ExprKind::Variable { declaration, .. } => {
                if let Some(decl) = declaration {
                    f(decl);
                }
            }
            ExprKind::FunctionDeclaration { params, body, .. } => {
                params.iter_mut().for_each(&mut *f);
                f(body);
            }
            ExprKind::Scope { body } => body.iter_mut().for_each(f),
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                f(condition);
                f(then_branch);
                if let Some(e) = else_branch {
                    f(e);
                }
            }
            ExprKind::For {
                init,
                condition,
                step,
                body,
            } => {
                for part in [init, condition, step].into_iter().flatten() {
                    f(part);
                }
                f(body);
            }
            ExprKind::ForTo {
                variable,
                from,
                to,
                body,
                ..
            } => {
                f(variable);
                f(from);
                f(to);
                f(body);
            }
            ExprKind::ForIn {
                variable,
                iterable,
                body,
            } => {
                f(variable);
                f(iterable);
                f(body);
            }
            ExprKind::While { condition, body } => {
                f(condition);
                f(body);
            }
            ExprKind::Repeat { body, condition } => {
                f(body);
                f(condition);
            }
            ExprKind::Invocation { args, .. } => args.iter_mut().for_each(f),
            ExprKind::Return { value } => {
                if let Some(v) = value {
                    f(v);
                }
            }
            ExprKind::Parenthesized { inner } => f(inner),
            ExprKind::ElementAccess { target, index } => {
                f(target);
                if let Some(i) = index {
                    f(i);
                }
            }
            ExprKind::ArrayInitialization { elements } => elements.iter_mut().for_each(f),
        }
    }
}

// ============================================================================
// Construction helpers
// ============================================================================

impl Expr {
    fn bare(kind: ExprKind) -> Self {
        Expr::new(kind, Span::default())
    }

    /// A number literal.
    pub fn number(value: f64) -> Self {
        Self::bare(ExprKind::Constant {
            value: Literal::Number(value),
        })
    }

    /// A string literal.
    pub fn string(value: &str) -> Self {
        Self::bare(ExprKind::Constant {
            value: Literal::String(value.to_string()),
        })
    }

    /// A boolean literal.
    pub fn boolean(value: bool) -> Self {
        Self::bare(ExprKind::Constant {
            value: Literal::Boolean(value),
        })
    }

    /// A variable reference.
    pub fn ident(name: &str) -> Self {
        Self::bare(ExprKind::Variable {
            name: name.to_string(),
            declaration: None,
        })
    }

    /// A scalar declaration such as `number x`.
    pub fn declare(keyword: &str, name: &str) -> Self {
        Self::declare_with(Self::ident(keyword), name)
    }

    /// An array declaration such as `number[] xs`.
    pub fn declare_array(keyword: &str, name: &str) -> Self {
        let syntax = Self::bare(ExprKind::ElementAccess {
            target: Box::new(Self::ident(keyword)),
            index: None,
        });
        Self::declare_with(syntax, name)
    }

    /// A declaration with arbitrary type syntax.
    pub fn declare_with(syntax: Expr, name: &str) -> Self {
        Self::bare(ExprKind::Variable {
            name: name.to_string(),
            declaration: Some(Box::new(syntax)),
        })
    }

    /// `left op right`
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::bare(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// `target = value`
    pub fn assign(target: Expr, value: Expr) -> Self {
        Self::binary(BinaryOp::Assign, target, value)
    }

    /// `{ body }`
    pub fn block(body: Vec<Expr>) -> Self {
        Self::bare(ExprKind::Scope { body })
    }

    /// `if (condition) then_branch [else else_branch]`
    pub fn if_else(condition: Expr, then_branch: Expr, else_branch: Option<Expr>) -> Self {
        Self::bare(ExprKind::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        })
    }

    /// `while (condition) body`
    pub fn while_loop(condition: Expr, body: Expr) -> Self {
        Self::bare(ExprKind::While {
            condition: Box::new(condition),
            body: Box::new(body),
        })
    }

    /// `repeat body until (condition)`
    pub fn repeat_until(body: Expr, condition: Expr) -> Self {
        Self::bare(ExprKind::Repeat {
            body: Box::new(body),
            condition: Box::new(condition),
        })
    }

    /// `for (init; condition; step) body`
    pub fn for_loop(
        init: Option<Expr>,
        condition: Option<Expr>,
        step: Option<Expr>,
        body: Expr,
    ) -> Self {
        Self::bare(ExprKind::For {
            init: init.map(Box::new),
            condition: condition.map(Box::new),
            step: step.map(Box::new),
            body: Box::new(body),
        })
    }

    /// `for variable = from to|down to to body`
    pub fn for_to(variable: Expr, from: Expr, to: Expr, direction: Direction, body: Expr) -> Self {
        Self::bare(ExprKind::ForTo {
            variable: Box::new(variable),
            from: Box::new(from),
            to: Box::new(to),
            direction,
            body: Box::new(body),
        })
    }

    /// `for variable in iterable body`
    pub fn for_in(variable: Expr, iterable: Expr, body: Expr) -> Self {
        Self::bare(ExprKind::ForIn {
            variable: Box::new(variable),
            iterable: Box::new(iterable),
            body: Box::new(body),
        })
    }

    /// `name(args)`
    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Self::bare(ExprKind::Invocation {
            name: name.to_string(),
            args,
        })
    }

    /// `return [value]`
    pub fn ret(value: Option<Expr>) -> Self {
        Self::bare(ExprKind::Return {
            value: value.map(Box::new),
        })
    }

    /// `( inner )`
    pub fn paren(inner: Expr) -> Self {
        Self::bare(ExprKind::Parenthesized {
            inner: Box::new(inner),
        })
    }

    /// `target[index]`
    pub fn index(target: Expr, index: Expr) -> Self {
        Self::bare(ExprKind::ElementAccess {
            target: Box::new(target),
            index: Some(Box::new(index)),
        })
    }

    /// `[elements]`
    pub fn array(elements: Vec<Expr>) -> Self {
        Self::bare(ExprKind::ArrayInitialization { elements })
    }

    /// `function name(params) body`
    pub fn function(name: &str, params: Vec<Expr>, body: Expr) -> Self {
        Self::bare(ExprKind::FunctionDeclaration {
            name: name.to_string(),
            params,
            body: Box::new(body),
        })
    }
}
