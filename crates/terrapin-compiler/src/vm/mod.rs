// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The bytecode virtual machine.
//!
//! Executes a linked [`Module`](crate::assembly::Module) on a stack
//! machine. Host variables live in a global table and host natives are
//! closures indexed the same way as the host environment declared them.
//!
//! ## Structure
//!
//! - `interpreter` - the [`Machine`] and its fetch/execute loop
//! - `value` - runtime values and array storage

mod interpreter;
mod value;

#[cfg(test)]
mod tests;

pub use interpreter::{Machine, Outcome};
pub use value::{ArrayRef, ArrayValue, Value};

use crate::host::HostEnvironment;
use thiserror::Error;

/// A host function callable through `CallNative`.
pub type NativeFn = Box<dyn FnMut(&[Value]) -> Result<Option<Value>>>;

/// Runtime failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// Popped from an empty operand stack
    #[error("stack underflow in {0}")]
    StackUnderflow(String),

    /// An operand had the wrong runtime type
    #[error("{op} expects {expected}, found {found}")]
    TypeMismatch {
        /// Opcode name
        op: &'static str,
        /// Expected operand kind
        expected: &'static str,
        /// Actual operand kind
        found: &'static str,
    },

    /// Operand referenced a missing table entry
    #[error("unknown {what} #{index}")]
    UnknownEntry {
        /// Table name
        what: &'static str,
        /// Index used
        index: i64,
    },

    /// Call with the wrong number of arguments
    #[error("function '{function}' takes {expected} argument(s), got {found}")]
    ArityMismatch {
        /// Callee name
        function: String,
        /// Declared parameter count
        expected: usize,
        /// Arguments passed
        found: usize,
    },

    /// Array access past either end
    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds {
        /// Element index
        index: i64,
        /// Array length
        len: usize,
    },

    /// Address that is not a whole number of elements in
    #[error("misaligned access: offset {offset} with stride {stride}")]
    Misaligned {
        /// Byte offset
        offset: i64,
        /// Stride operand
        stride: i32,
    },

    /// A valued function returned without a value
    #[error("function '{0}' returned without a value")]
    MissingReturnValue(String),

    /// Execution ran past the last instruction
    #[error("execution ran off the end of function '{0}'")]
    FellOffEnd(String),

    /// The step budget was used up
    #[error("step limit of {0} exceeded")]
    StepLimit(u64),

    /// A native reported a failure
    #[error("native '{name}' failed: {message}")]
    Native {
        /// Native name
        name: String,
        /// Failure text
        message: String,
    },
}

/// Result type for VM operations.
pub type Result<T> = std::result::Result<T, VmError>;

/// Implementations of the standard prelude natives, in the order
/// [`HostEnvironment::standard`] declares them.
pub fn standard_natives() -> Vec<NativeFn> {
    fn concat() -> NativeFn {
        Box::new(|args: &[Value]| {
            let joined: String = args.iter().map(ToString::to_string).collect();
            Ok(Some(Value::string(&joined)))
        })
    }
    vec![concat(), concat(), concat()]
}

/// Default global values for the variables of `host`.
pub fn default_globals(host: &HostEnvironment) -> Vec<Value> {
    host.variables
        .iter()
        .map(|variable| interpreter::default_for_type(&variable.ty))
        .collect()
}
