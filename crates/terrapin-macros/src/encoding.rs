// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Encoding macros.
//!
//! Byte-tagged enums that have to survive a trip through a binary file.

/// Define an opcode enum with a byte encoding and a fixed operand count.
///
/// Each variant is written `Name = <byte> => <operand count>`. The macro
/// derives the usual traits, a `TryFrom<repr>` that hands back the rejected
/// value, and `name()`, `all()` and `operand_count()` helpers.
///
/// # Example
///
/// ```
/// use terrapin_macros::opcodes;
///
/// opcodes! {
///     pub enum Opcode: u8 {
///         Nop = 0x00 => 0,
///         Push = 0x01 => 1,
///         Jump = 0x10 => 1,
///         Call = 0x11 => 2,
///     }
/// }
///
/// assert_eq!(Opcode::Push as u8, 0x01);
/// assert_eq!(Opcode::try_from(0x11), Ok(Opcode::Call));
/// assert_eq!(Opcode::try_from(0x7f), Err(0x7f));
/// assert_eq!(Opcode::Call.operand_count(), 2);
/// assert_eq!(Opcode::Jump.name(), "Jump");
/// ```
#[macro_export]
macro_rules! opcodes {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $repr:ty {
            $(
                $(#[$vmeta:meta])*
                $opcode:ident = $value:literal => $arity:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr($repr)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $opcode = $value
            ),+
        }

        impl TryFrom<$repr> for $name {
            type Error = $repr;

            fn try_from(value: $repr) -> Result<Self, $repr> {
                match value {
                    $($value => Ok(Self::$opcode),)+
                    other => Err(other),
                }
            }
        }

        impl $name {
            /// The mnemonic of this opcode.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$opcode => stringify!($opcode),)+
                }
            }

            /// Every opcode, in declaration order.
            pub fn all() -> &'static [Self] {
                &[$(Self::$opcode),+]
            }

            /// Number of operands that always follow this opcode.
            pub fn operand_count(&self) -> usize {
                match self {
                    $(Self::$opcode => $arity,)+
                }
            }
        }
    };
}

/// Create an enum that can convert to/from integers.
///
/// # Example
///
/// ```
/// use terrapin_macros::int_enum;
///
/// int_enum! {
///     #[derive(Debug, Clone, Copy, PartialEq)]
///     pub enum Color: u8 {
///         Red = 0,
///         Green = 1,
///         Blue = 2,
///     }
/// }
///
/// assert_eq!(Color::Green as u8, 1);
/// assert_eq!(Color::try_from(2u8).unwrap(), Color::Blue);
/// assert_eq!(Color::Red.name(), "Red");
/// ```
#[macro_export]
macro_rules! int_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $repr:ty {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr($repr)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant = $value
            ),+
        }

        impl TryFrom<$repr> for $name {
            type Error = $repr;

            fn try_from(value: $repr) -> Result<Self, $repr> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    other => Err(other),
                }
            }
        }

        impl $name {
            /// The variant name.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)+
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    opcodes! {
        enum Probe: u8 {
            Halt = 0x00 => 0,
            Load = 0x01 => 1,
            Call = 0x02 => 2,
        }
    }

    int_enum! {
        #[derive(Debug, Clone, Copy, PartialEq)]
        enum Status: u8 {
            Success = 0,
            Failed = 1,
        }
    }

    #[test]
    fn test_opcodes_round_trip_through_byte() {
        for op in Probe::all() {
            assert_eq!(Probe::try_from(*op as u8), Ok(*op));
        }
        assert_eq!(Probe::try_from(9), Err(9));
    }

    #[test]
    fn test_opcode_operand_counts() {
        assert_eq!(Probe::Halt.operand_count(), 0);
        assert_eq!(Probe::Load.operand_count(), 1);
        assert_eq!(Probe::Call.operand_count(), 2);
        assert_eq!(Probe::Call.name(), "Call");
    }

    #[test]
    fn test_int_enum() {
        assert_eq!(Status::Success as u8, 0);
        assert_eq!(Status::try_from(1u8).unwrap(), Status::Failed);
        assert_eq!(Status::try_from(99u8), Err(99));
        assert_eq!(Status::Failed.name(), "Failed");
    }
}
