// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Declarative macros for the terrapin toolchain.
//!
//! # Macros Overview
//!
//! ## Encoding
//! - [`opcodes!`] - Define a byte-coded instruction set with fixed operand counts
//! - [`int_enum!`] - Create enums convertible to/from integers, with names
//!
//! ## Testing
//! - [`assert_matches!`] - Assert that a value matches a pattern
//! - [`assert_err_contains!`] - Assert that a `Result` failed with a given message
//!
//! # Examples
//!
//! ```
//! use terrapin_macros::*;
//!
//! opcodes! {
//!     pub enum Op: u8 {
//!         Nop = 0x00 => 0,
//!         Push = 0x01 => 1,
//!     }
//! }
//!
//! assert_eq!(Op::Push.operand_count(), 1);
//! assert_eq!(Op::try_from(0x00u8), Ok(Op::Nop));
//! ```

#![warn(missing_docs)]

mod encoding;
mod testing;
