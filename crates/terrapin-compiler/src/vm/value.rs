// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Runtime values.

use crate::compiler::bytecode::Constant;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared, mutable array storage.
pub type ArrayRef = Rc<RefCell<ArrayValue>>;

/// Array contents plus the layout the code addresses them with.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    /// Catalog id of the element type
    pub element_type: u32,
    /// Element size in bytes; addresses are multiples of it
    pub stride: u32,
    /// The elements
    pub elements: Vec<Value>,
}

/// A value on the machine stack, in a slot or in a global.
#[derive(Debug, Clone)]
pub enum Value {
    /// Placeholder of a slot whose type carries no value
    Empty,
    /// Boolean
    Boolean(bool),
    /// Double (`number`)
    Double(f64),
    /// Integer produced by address arithmetic
    Int(i64),
    /// Immutable string
    String(Rc<str>),
    /// Array reference
    Array(ArrayRef),
    /// An array plus a byte offset into its payload
    Address {
        /// The array being addressed
        array: ArrayRef,
        /// Byte offset from the first element
        offset: i64,
    },
}

impl Value {
    /// Wraps a string.
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    /// Creates an array value.
    pub fn array(element_type: u32, stride: u32, elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(ArrayValue {
            element_type,
            stride,
            elements,
        })))
    }

    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Boolean(_) => "boolean",
            Value::Double(_) => "number",
            Value::Int(_) => "integer",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Address { .. } => "address",
        }
    }

    /// The number, if this is one.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&Constant> for Value {
    fn from(constant: &Constant) -> Self {
        match constant {
            Constant::Boolean(b) => Value::Boolean(*b),
            Constant::Double(d) => Value::Double(*d),
            Constant::String(s) => Value::string(s),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (
                Value::Address { array: a, offset: x },
                Value::Address { array: b, offset: y },
            ) => Rc::ptr_eq(a, b) && x == y,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Double(d) => write!(f, "{}", d),
            Value::Int(i) => write!(f, "{}", i),
            Value::String(s) => f.write_str(s),
            Value::Array(array) => {
                f.write_str("[")?;
                for (i, element) in array.borrow().elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                f.write_str("]")
            }
            Value::Address { offset, .. } => write!(f, "<address +{}>", offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Value::Double(3.0).to_string(), "3");
        assert_eq!(Value::Double(0.5).to_string(), "0.5");
        assert_eq!(Value::string("hi").to_string(), "hi");
        let array = Value::array(6, 8, vec![Value::Double(1.0), Value::Double(2.0)]);
        assert_eq!(array.to_string(), "[1, 2]");
    }

    #[test]
    fn test_arrays_compare_by_contents() {
        let a = Value::array(6, 8, vec![Value::Double(1.0)]);
        let b = Value::array(6, 8, vec![Value::Double(1.0)]);
        assert_eq!(a, b);
        assert_ne!(a, Value::array(6, 8, vec![]));
    }
}
