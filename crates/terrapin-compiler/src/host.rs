// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Predefined variables and native functions supplied by the host.
//!
//! Everything here is merged into the root scope before a program is
//! compiled. Host variables live in global slots (index = position in
//! [`HostEnvironment::variables`]) and natives are called by position in
//! [`HostEnvironment::natives`], so the runtime side must register its
//! implementations in the same order.

use crate::types::Type;

/// Name of the runtime string concatenation natives.
pub const CONCAT: &str = "$concat";

/// A predefined global variable.
#[derive(Debug, Clone, PartialEq)]
pub struct HostVariable {
    /// Name as seen by scripts
    pub name: String,
    /// Fixed type
    pub ty: Type,
}

/// The signature of a host-implemented function.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeSignature {
    /// Name as seen by scripts
    pub name: String,
    /// Parameter types, in order
    pub params: Vec<Type>,
    /// Return type, `Empty` for none
    pub return_type: Type,
}

/// Host globals and natives.
#[derive(Debug, Clone, PartialEq)]
pub struct HostEnvironment {
    /// Global variables
    pub variables: Vec<HostVariable>,
    /// Native functions
    pub natives: Vec<NativeSignature>,
}

impl Default for HostEnvironment {
    fn default() -> Self {
        Self::standard()
    }
}

impl HostEnvironment {
    /// A host with nothing in it, not even string concatenation.
    pub fn empty() -> Self {
        Self {
            variables: Vec::new(),
            natives: Vec::new(),
        }
    }

    /// The standard prelude: string concatenation for every mix of string
    /// and number operands.
    pub fn standard() -> Self {
        Self::empty()
            .native(CONCAT, vec![Type::String, Type::String], Type::String)
            .native(CONCAT, vec![Type::String, Type::Double], Type::String)
            .native(CONCAT, vec![Type::Double, Type::String], Type::String)
    }

    /// The standard prelude plus turtle graphics.
    pub fn turtle() -> Self {
        Self::standard()
            .variable("pi", Type::Double)
            .native("forward", vec![Type::Double], Type::Empty)
            .native("turn", vec![Type::Double], Type::Empty)
            .native("pen_up", vec![], Type::Empty)
            .native("pen_down", vec![], Type::Empty)
            .native("print", vec![Type::String], Type::Empty)
            .native("print", vec![Type::Double], Type::Empty)
    }

    /// Adds a global variable.
    pub fn variable(mut self, name: &str, ty: Type) -> Self {
        self.variables.push(HostVariable {
            name: name.to_string(),
            ty,
        });
        self
    }

    /// Adds a native function.
    pub fn native(mut self, name: &str, params: Vec<Type>, return_type: Type) -> Self {
        self.natives.push(NativeSignature {
            name: name.to_string(),
            params,
            return_type,
        });
        self
    }

    /// Index of the native with this exact signature.
    pub fn native_index(&self, name: &str, params: &[Type]) -> Option<usize> {
        self.natives
            .iter()
            .position(|n| n.name.eq_ignore_ascii_case(name) && n.params == params)
    }

    /// Index of the global with this name.
    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables
            .iter()
            .position(|v| v.name.eq_ignore_ascii_case(name))
    }
}
