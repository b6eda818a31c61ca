//! Canonical content hashing for schema deduplication
//!
//! A schema is reduced to its semantic keywords before hashing, so `doc`,
//! `aliases` and other annotations never produce a new version. Object keys
//! are emitted in sorted order, array order is kept.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::classify::is_semantic_keyword;

/// SHA256 content hash of a canonicalized schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Hash a schema body after stripping non-semantic fields.
    ///
    /// The hashed bytes are the compact JSON text of the [`canonicalize`]d
    /// schema. A `Value` always has string keys, so writing it out through
    /// its `Display` impl is infallible and every body gets its own bytes.
    pub fn of_schema(schema: &Value) -> Self {
        Self::from_bytes(canonicalize(schema).to_string().as_bytes())
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Checksum {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Rebuild `schema` keeping only semantic keywords, with object keys sorted
pub fn canonicalize(schema: &Value) -> Value {
    match schema {
        Value::Object(obj) => {
            let mut keys: Vec<&String> = obj.keys().filter(|k| is_semantic_keyword(k)).collect();
            keys.sort();

            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&obj[key.as_str()]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        leaf => leaf.clone(),
    }
}
