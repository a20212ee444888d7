// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # terrapin-compiler
//!
//! Compiler core for the terrapin scripting language.
//!
//! ## Overview
//!
//! A parsed [`Program`] goes through three passes and a link step:
//! - scope building: one lexical scope per block, variable slots, overloads
//! - type resolution: a type for every node and every function
//! - code generation: one instruction list per function, jumps backpatched
//!   through markers
//! - linking into a [`Module`], which [`assembly`] writes to and reads from
//!   the binary container
//!
//! A small stack [`vm`] executes linked modules.
//!
//! ## Quick Start
//!
//! ```rust
//! use terrapin_compiler::ast::{BinaryOp, Expr, Program};
//! use terrapin_compiler::{Compiler, CompilerOptions, Type};
//!
//! let program = Program::new(Expr::block(vec![Expr::binary(
//!     BinaryOp::Add,
//!     Expr::string("n = "),
//!     Expr::number(1.0),
//! )]));
//! let compiled = Compiler::new(CompilerOptions::default()).compile(&program)?;
//! assert_eq!(compiled.program_type, Type::String);
//! let bytes = compiled.to_bytes()?;
//! assert_eq!(terrapin_compiler::assembly::load(&bytes)?, compiled.module);
//! # Ok::<(), terrapin_compiler::Diagnostic>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assembly;
pub mod ast;
pub mod compiler;
pub mod diagnostic;
pub mod host;
pub mod options;
pub mod types;
pub mod vm;

pub use assembly::{Addressing, Module};
pub use ast::{Program, Span};
pub use compiler::CancellationToken;
pub use diagnostic::{Diagnostic, DiagnosticKind, Result};
pub use host::HostEnvironment;
pub use options::{CompilerOptions, VmOptions};
pub use types::Type;

use assembly::{FunctionDef, VariableDef};
use compiler::codegen::Generated;
use compiler::scope::ScopeTree;
use compiler::{CompilationContext, build, generate, resolve};
use tracing::{debug, instrument};
use types::TypeCatalog;

/// The compilation pipeline.
///
/// Holds the options, the host environment merged into the root scope and
/// the cancellation token the type resolver polls.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompilerOptions,
    host: HostEnvironment,
    cancel: CancellationToken,
}

impl Compiler {
    /// Creates a compiler with the standard prelude as host environment.
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            host: HostEnvironment::standard(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the host environment.
    pub fn with_host(mut self, host: HostEnvironment) -> Self {
        self.host = host;
        self
    }

    /// Uses `token` to cancel type resolution from elsewhere.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The host environment.
    pub fn host(&self) -> &HostEnvironment {
        &self.host
    }

    /// The options.
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Runs every pass over `program` and links the result.
    ///
    /// Each pass stops at its first error; that diagnostic is returned and
    /// later passes do not run.
    #[instrument(skip_all, fields(module = %self.options.module_name))]
    pub fn compile(&self, program: &Program) -> Result<Compiled> {
        let mut context = CompilationContext::new();
        let mut tree = build(program, &self.host, &mut context).map_err(|errors| {
            errors.into_iter().next().unwrap_or_else(|| {
                Diagnostic::structural("scope building failed", program.body.span)
            })
        })?;
        let resolution = resolve(program, &mut tree, &self.host, &self.cancel)?;
        let generated = generate(program, &tree, &resolution)?;
        let module = self.link(&tree, generated);
        debug!(
            functions = module.functions.len(),
            instructions = module.instruction_count(),
            program_type = %resolution.program_type,
            "compiled"
        );
        Ok(Compiled {
            module,
            program_type: resolution.program_type,
            addressing: self.options.addressing,
        })
    }

    fn link(&self, tree: &ScopeTree, generated: Generated) -> Module {
        let functions = tree
            .functions()
            .iter()
            .zip(generated.functions)
            .map(|(function, code)| FunctionDef {
                id: function.id.0,
                name: function.name.clone(),
                return_type: function.return_type.as_ref().unwrap_or(&Type::Empty).id(),
                param_count: function.param_count,
                variables: function
                    .slots
                    .iter()
                    .map(|slot| VariableDef {
                        type_id: tree
                            .variable(slot.variable)
                            .ty
                            .as_ref()
                            .unwrap_or(&Type::Empty)
                            .id(),
                        name: slot.name.clone(),
                    })
                    .collect(),
                code,
            })
            .collect();
        Module {
            name: self.options.module_name.clone(),
            vendor: self.options.vendor.clone(),
            version: self.options.version,
            entry_point: compiler::FunctionId::MAIN.0,
            constants: generated.constants.into_vec(),
            types: TypeCatalog::standard(),
            functions,
        }
    }
}

/// A successful compilation.
#[derive(Debug, Clone)]
pub struct Compiled {
    /// The linked module
    pub module: Module,
    /// Type of the program's top-level block
    pub program_type: Type,
    addressing: Addressing,
}

impl Compiled {
    /// Assembles the module with the configured addressing.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        assembly::assemble(&self.module, self.addressing)
    }

    /// Assembles the module with explicit addressing.
    pub fn to_bytes_with(&self, addressing: Addressing) -> Result<Vec<u8>> {
        assembly::assemble(&self.module, addressing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    #[test]
    fn test_link_records_slot_types() {
        let program = Program::new(Expr::block(vec![
            Expr::function(
                "twice",
                vec![Expr::declare("number", "x")],
                Expr::block(vec![Expr::binary(
                    ast::BinaryOp::Mul,
                    Expr::ident("x"),
                    Expr::number(2.0),
                )]),
            ),
            Expr::assign(Expr::declare("string", "s"), Expr::string("hi")),
        ]));
        let compiled = Compiler::default().compile(&program).unwrap();
        let module = &compiled.module;
        assert_eq!(module.entry_point, 0);
        assert_eq!(module.types.len(), 11);

        let main = module.function(0).unwrap();
        assert_eq!(main.return_type, Type::Empty.id());
        assert_eq!(main.variables[0].name, "s");
        assert_eq!(main.variables[0].type_id, Type::String.id());

        let twice = module.function(1).unwrap();
        assert_eq!(twice.name, "twice");
        assert_eq!(twice.param_count, 1);
        assert_eq!(twice.return_type, Type::Double.id());
        assert_eq!(twice.variables[0].type_id, Type::Double.id());
    }

    #[test]
    fn test_overloads_compile_to_distinct_functions() {
        let program = Program::new(Expr::block(vec![
            Expr::function(
                "f",
                vec![Expr::declare("number", "x")],
                Expr::block(vec![Expr::ident("x")]),
            ),
            Expr::function(
                "f",
                vec![Expr::declare("string", "s")],
                Expr::block(vec![Expr::ident("s")]),
            ),
            Expr::call("f", vec![Expr::number(1.0)]),
            Expr::call("f", vec![Expr::string("one")]),
        ]));
        let compiled = Compiler::default().compile(&program).unwrap();
        assert_eq!(compiled.program_type, Type::String);

        let module = &compiled.module;
        let by_number = module.function(1).unwrap();
        let by_string = module.function(2).unwrap();
        assert_eq!(by_number.return_type, Type::Double.id());
        assert_eq!(by_string.return_type, Type::String.id());
        assert_eq!(by_string.variables[0].type_id, Type::String.id());
    }

    #[test]
    fn test_first_scope_error_is_reported() {
        let program = Program::new(Expr::block(vec![
            Expr::declare("number", "a"),
            Expr::declare("number", "a"),
        ]));
        let err = Compiler::default().compile(&program).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::Declaration);
    }

    #[test]
    fn test_cancelled_compilation() {
        let token = CancellationToken::new();
        token.cancel();
        let err = Compiler::default()
            .with_cancellation(token)
            .compile(&Program::new(Expr::block(vec![Expr::number(1.0)])))
            .unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::Structural);
        assert!(err.message.contains("cancelled"));
    }
}
