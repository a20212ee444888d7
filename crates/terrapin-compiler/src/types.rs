// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The type model.
//!
//! [`Type`] is what the resolver reasons about: scalars compare by identity
//! and the array variant also compares its element type. [`TypeDef`] is the
//! flat descriptor stored in a compiled module's type section.

use std::fmt;
use terrapin_macros::int_enum;

int_enum! {
    /// Primitive kind tag. Doubles as the type id in the catalog.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum PrimitiveKind: u8 {
        /// bool
        Boolean = 0,
        /// Unsigned 8-bit integer
        Byte = 1,
        /// 16-bit integer
        Int16 = 2,
        /// 32-bit integer
        Int32 = 3,
        /// 64-bit integer
        Int64 = 4,
        /// 32-bit float
        Single = 5,
        /// 64-bit float (`number`)
        Double = 6,
        /// string
        String = 7,
        /// Array of a single element type
        Array = 8,
        /// User structure (reserved)
        Struct = 9,
        /// No value
        Empty = 10,
    }
}

impl PrimitiveKind {
    /// Every kind in tag order.
    pub const ALL: [PrimitiveKind; 11] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Byte,
        PrimitiveKind::Int16,
        PrimitiveKind::Int32,
        PrimitiveKind::Int64,
        PrimitiveKind::Single,
        PrimitiveKind::Double,
        PrimitiveKind::String,
        PrimitiveKind::Array,
        PrimitiveKind::Struct,
        PrimitiveKind::Empty,
    ];

    /// Storage size in bytes.
    pub fn size(self) -> u32 {
        match self {
            PrimitiveKind::Boolean | PrimitiveKind::Byte => 1,
            PrimitiveKind::Int16 => 2,
            PrimitiveKind::Int32 | PrimitiveKind::Single => 4,
            PrimitiveKind::Int64 | PrimitiveKind::Double | PrimitiveKind::String => 8,
            PrimitiveKind::Array => 16,
            PrimitiveKind::Struct | PrimitiveKind::Empty => 0,
        }
    }
}

/// Index of the payload field in the array descriptor.
pub const ARRAY_PAYLOAD_FIELD: u32 = 2;

/// A resolved type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// No value
    Empty,
    /// bool
    Boolean,
    /// Byte
    Byte,
    /// Int16
    Int16,
    /// Int32
    Int32,
    /// Int64
    Int64,
    /// Single
    Single,
    /// number
    Double,
    /// string
    String,
    /// Array of the boxed element type
    Array(Box<Type>),
}

impl Type {
    /// `Array(element)`
    pub fn array_of(element: Type) -> Type {
        Type::Array(Box::new(element))
    }

    /// Maps a declaration keyword to its scalar type.
    pub fn from_keyword(keyword: &str) -> Option<Type> {
        match keyword {
            "number" => Some(Type::Double),
            "string" => Some(Type::String),
            "bool" => Some(Type::Boolean),
            _ => None,
        }
    }

    /// The primitive kind tag.
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Type::Empty => PrimitiveKind::Empty,
            Type::Boolean => PrimitiveKind::Boolean,
            Type::Byte => PrimitiveKind::Byte,
            Type::Int16 => PrimitiveKind::Int16,
            Type::Int32 => PrimitiveKind::Int32,
            Type::Int64 => PrimitiveKind::Int64,
            Type::Single => PrimitiveKind::Single,
            Type::Double => PrimitiveKind::Double,
            Type::String => PrimitiveKind::String,
            Type::Array(_) => PrimitiveKind::Array,
        }
    }

    /// Catalog id of the descriptor.
    pub fn id(&self) -> u32 {
        self.kind() as u32
    }

    /// Storage size in bytes; the element stride when used inside an array.
    pub fn size(&self) -> u32 {
        self.kind().size()
    }

    /// Whether this is the no-value type.
    pub fn is_empty(&self) -> bool {
        matches!(self, Type::Empty)
    }

    /// Element type of an array.
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Array(element) => Some(&**element),
            _ => None,
        }
    }

    /// Whether a value of type `source` may be stored into `self`.
    ///
    /// Exact match, plus the empty array literal which fits any array.
    pub fn accepts(&self, source: &Type) -> bool {
        self == source
            || matches!((self, source), (Type::Array(_), Type::Array(e)) if e.is_empty())
    }

    /// The scalar type for a catalog tag, if the tag names one.
    pub fn from_kind(kind: PrimitiveKind) -> Option<Type> {
        match kind {
            PrimitiveKind::Boolean => Some(Type::Boolean),
            PrimitiveKind::Byte => Some(Type::Byte),
            PrimitiveKind::Int16 => Some(Type::Int16),
            PrimitiveKind::Int32 => Some(Type::Int32),
            PrimitiveKind::Int64 => Some(Type::Int64),
            PrimitiveKind::Single => Some(Type::Single),
            PrimitiveKind::Double => Some(Type::Double),
            PrimitiveKind::String => Some(Type::String),
            PrimitiveKind::Empty => Some(Type::Empty),
            PrimitiveKind::Array | PrimitiveKind::Struct => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Array(element) => write!(f, "Array<{}>", element),
            other => f.write_str(other.kind().name()),
        }
    }
}

/// A field of a type descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Catalog id of the field type
    pub type_id: u32,
    /// Field name
    pub name: String,
}

/// A type descriptor as stored in a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    /// Catalog id
    pub id: u32,
    /// Name
    pub name: String,
    /// false for composite types (Array, Struct)
    pub is_primitive: bool,
    /// Kind tag
    pub kind: PrimitiveKind,
    /// Size in bytes
    pub size: u32,
    /// Ordered fields
    pub fields: Vec<FieldDef>,
}

/// The fixed catalog every module carries.
pub struct TypeCatalog;

impl TypeCatalog {
    /// Builds the standard descriptors, one per [`PrimitiveKind`], in id order.
    pub fn standard() -> Vec<TypeDef> {
        PrimitiveKind::ALL
            .iter()
            .map(|&kind| TypeDef {
                id: kind as u32,
                name: kind.name().to_string(),
                is_primitive: !matches!(kind, PrimitiveKind::Array | PrimitiveKind::Struct),
                kind,
                size: kind.size(),
                fields: Self::fields_of(kind),
            })
            .collect()
    }

    fn fields_of(kind: PrimitiveKind) -> Vec<FieldDef> {
        if kind != PrimitiveKind::Array {
            return Vec::new();
        }
        let field = |kind: PrimitiveKind, name: &str| FieldDef {
            type_id: kind as u32,
            name: name.to_string(),
        };
        vec![
            field(PrimitiveKind::Int32, "length"),
            field(PrimitiveKind::Int32, "stride"),
            field(PrimitiveKind::Int64, "payload"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_ids_match_tags() {
        let catalog = TypeCatalog::standard();
        assert_eq!(catalog.len(), 11);
        for (index, def) in catalog.iter().enumerate() {
            assert_eq!(def.id as usize, index);
            assert_eq!(def.kind as usize, index);
        }
        assert_eq!(catalog[PrimitiveKind::Double as usize].size, 8);
        assert_eq!(catalog[PrimitiveKind::Empty as usize].name, "Empty");
    }

    #[test]
    fn test_array_descriptor_payload_field() {
        let catalog = TypeCatalog::standard();
        let array = &catalog[PrimitiveKind::Array as usize];
        assert!(!array.is_primitive);
        assert_eq!(array.fields.len(), 3);
        assert_eq!(array.fields[ARRAY_PAYLOAD_FIELD as usize].name, "payload");
        assert_eq!(array.fields[0].type_id, PrimitiveKind::Int32 as u32);
    }

    #[test]
    fn test_array_equality_compares_element() {
        assert_eq!(Type::array_of(Type::Double), Type::array_of(Type::Double));
        assert_ne!(Type::array_of(Type::Double), Type::array_of(Type::String));
        assert_ne!(Type::Double, Type::String);
    }

    #[test]
    fn test_empty_array_literal_fits_any_array() {
        let empty = Type::array_of(Type::Empty);
        assert!(Type::array_of(Type::String).accepts(&empty));
        assert!(!Type::String.accepts(&empty));
        assert!(!Type::array_of(Type::String).accepts(&Type::array_of(Type::Double)));
    }

    #[test]
    fn test_keywords_and_display() {
        assert_eq!(Type::from_keyword("number"), Some(Type::Double));
        assert_eq!(Type::from_keyword("bool"), Some(Type::Boolean));
        assert_eq!(Type::from_keyword("int"), None);
        assert_eq!(Type::array_of(Type::Double).to_string(), "Array<Double>");
    }
}
