// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Diagnostics reported by the compilation pipeline and the module loader.
//!
//! Every externally visible failure is a message paired with a source range.
//! Passes stop at the first problem they hit, so callers only ever see one
//! diagnostic per failed stage (the scope builder is the exception: it
//! collects every declaration error it finds before giving up).

use crate::ast::Span;
use std::fmt;
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Diagnostic>;

/// Broad classification of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Duplicate variable or function in one scope
    Declaration,
    /// Undeclared variable or function, missing overload
    Resolution,
    /// Operand, branch, assignment or return type mismatch
    Type,
    /// Malformed declaration, misplaced `return`, cancellation
    Structural,
    /// Bad binary module on load
    Format,
    /// The code generator hit a construct it cannot lower
    Generator,
}

impl DiagnosticKind {
    /// Human readable label used as the message prefix.
    pub fn label(&self) -> &'static str {
        match self {
            DiagnosticKind::Declaration => "DeclarationError",
            DiagnosticKind::Resolution => "ResolutionError",
            DiagnosticKind::Type => "TypeError",
            DiagnosticKind::Structural => "StructuralError",
            DiagnosticKind::Format => "FormatError",
            DiagnosticKind::Generator => "GeneratorError",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single `(message, source-range)` failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message} at {span}")]
pub struct Diagnostic {
    /// What went wrong, broadly
    pub kind: DiagnosticKind,
    /// Human readable description
    pub message: String,
    /// Source range (byte offsets into the blob for format errors)
    pub span: Span,
}

impl Diagnostic {
    /// Creates a diagnostic.
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
        }
    }

    /// A duplicate declaration.
    pub fn declaration(message: impl Into<String>, span: Span) -> Self {
        Self::new(DiagnosticKind::Declaration, message, span)
    }

    /// A name that could not be resolved.
    pub fn resolution(message: impl Into<String>, span: Span) -> Self {
        Self::new(DiagnosticKind::Resolution, message, span)
    }

    /// A type mismatch.
    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        Self::new(DiagnosticKind::Type, message, span)
    }

    /// A structurally invalid program.
    pub fn structural(message: impl Into<String>, span: Span) -> Self {
        Self::new(DiagnosticKind::Structural, message, span)
    }

    /// A malformed binary module.
    pub fn format(message: impl Into<String>, span: Span) -> Self {
        Self::new(DiagnosticKind::Format, message, span)
    }

    /// A construct the generator refuses to lower.
    pub fn generator(message: impl Into<String>, span: Span) -> Self {
        Self::new(DiagnosticKind::Generator, message, span)
    }
}
