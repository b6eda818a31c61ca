//! Type Classification
//!
//! Recognizes the built-in Avro type names and the schema keywords that carry
//! meaning. Shared by the canonical hasher and the dependency walker.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Avro primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
}

impl Primitive {
    pub const ALL: [Primitive; 8] = [
        Primitive::Null,
        Primitive::Boolean,
        Primitive::Int,
        Primitive::Long,
        Primitive::Float,
        Primitive::Double,
        Primitive::Bytes,
        Primitive::String,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Primitive::Null => "null",
            Primitive::Boolean => "boolean",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Bytes => "bytes",
            Primitive::String => "string",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Primitive {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Primitive::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or(())
    }
}

/// Complex (structural) type names
pub const COMPLEX_TYPES: &[&str] = &["record", "enum", "array", "map", "fixed"];

/// Keywords that change what a schema means. Everything else (doc, aliases,
/// custom properties) is ignored for hashing.
pub const SEMANTIC_KEYWORDS: &[&str] = &[
    "name",
    "namespace",
    "fields",
    "type",
    "default",
    "order",
    "symbols",
    "items",
    "size",
    "values",
    "protocol",
    "request",
    "response",
    "errors",
];

/// True for the fixed set of primitive and complex type names
pub fn is_known_type(name: &str) -> bool {
    name.parse::<Primitive>().is_ok() || COMPLEX_TYPES.contains(&name)
}

/// True when `name` is not a built-in type, i.e. it refers to another named schema
pub fn is_custom_type_reference(name: &str) -> bool {
    !is_known_type(name)
}

/// True for semantic keywords and for array indices
pub fn is_semantic_keyword(key: &str) -> bool {
    SEMANTIC_KEYWORDS.contains(&key) || is_array_index(key)
}

fn is_array_index(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}
