//! Schema definitions and the typed Avro type tree
//!
//! Submitted schemas stay as the JSON the caller handed in (that is what gets
//! stored and snapshotted). For structural work the JSON is lifted into an
//! [`AvroType`] tree so references are found by variant, not by key name.

use serde_json::Value;
use std::collections::BTreeSet;

use crate::classify::{is_custom_type_reference, Primitive};
use crate::error::{RegistryError, Result};

/// Registry key for a schema body: `namespace.name`, or `name` when no
/// namespace is given.
pub fn qualified_name(schema: &Value) -> Result<String> {
    let name = schema
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| RegistryError::InvalidSchema("schema has no `name`".to_string()))?;

    match schema.get("namespace").and_then(Value::as_str) {
        Some(ns) if !ns.is_empty() => Ok(format!("{}.{}", ns, name)),
        _ => Ok(name.to_string()),
    }
}

/// Name of a named type (record, enum, fixed) with its effective namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub name: String,
    pub namespace: Option<String>,
}

impl Name {
    pub fn fullname(&self) -> String {
        match &self.namespace {
            Some(ns) if !self.name.contains('.') => format!("{}.{}", ns, self.name),
            _ => self.name.clone(),
        }
    }
}

/// A by-name reference to another named type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub name: String,
    /// Namespace in scope where the reference appears
    pub namespace: Option<String>,
}

impl TypeRef {
    /// Full names this reference may denote, most specific first
    pub fn candidates(&self) -> Vec<String> {
        match &self.namespace {
            Some(ns) if !self.name.contains('.') => {
                vec![format!("{}.{}", ns, self.name), self.name.clone()]
            }
            _ => vec![self.name.clone()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    pub name: String,
    pub ty: AvroType,
}

/// Closed set of Avro type shapes
#[derive(Debug, Clone, PartialEq)]
pub enum AvroType {
    Primitive(Primitive),
    Reference(TypeRef),
    Record { name: Name, fields: Vec<RecordField> },
    Enum { name: Name, symbols: Vec<String> },
    Array(Box<AvroType>),
    Map(Box<AvroType>),
    Fixed { name: Name, size: u64 },
    Union(Vec<AvroType>),
}

impl AvroType {
    /// Lift a JSON schema body into the typed tree
    pub fn parse(value: &Value) -> Result<Self> {
        Self::parse_in(value, None)
    }

    fn parse_in(value: &Value, namespace: Option<&str>) -> Result<Self> {
        match value {
            Value::String(s) => Self::parse_name(s, namespace),
            Value::Array(branches) => branches
                .iter()
                .map(|b| Self::parse_in(b, namespace))
                .collect::<Result<Vec<_>>>()
                .map(AvroType::Union),
            Value::Object(obj) => match obj.get("type") {
                Some(Value::String(kind)) => Self::parse_complex(kind, value, namespace),
                Some(nested @ (Value::Object(_) | Value::Array(_))) => {
                    Self::parse_in(nested, namespace)
                }
                _ => Err(invalid(value, "missing or non-string `type`")),
            },
            other => Err(invalid(other, "not a schema")),
        }
    }

    fn parse_name(s: &str, namespace: Option<&str>) -> Result<Self> {
        if let Ok(p) = s.parse::<Primitive>() {
            return Ok(AvroType::Primitive(p));
        }
        if !is_custom_type_reference(s) {
            return Err(RegistryError::InvalidSchema(format!(
                "complex type `{}` used without a definition",
                s
            )));
        }
        Ok(AvroType::Reference(TypeRef {
            name: s.to_string(),
            namespace: namespace.map(str::to_string),
        }))
    }

    fn parse_complex(kind: &str, value: &Value, namespace: Option<&str>) -> Result<Self> {
        match kind {
            "record" | "error" => {
                let name = named(value, namespace)?;
                let inner_ns = name.namespace.clone();
                let fields = value
                    .get("fields")
                    .and_then(Value::as_array)
                    .ok_or_else(|| invalid(value, "record without `fields` array"))?
                    .iter()
                    .map(|f| {
                        let field_name = f
                            .get("name")
                            .and_then(Value::as_str)
                            .ok_or_else(|| invalid(f, "field without `name`"))?;
                        let ty = f
                            .get("type")
                            .ok_or_else(|| invalid(f, "field without `type`"))?;
                        Ok(RecordField {
                            name: field_name.to_string(),
                            ty: Self::parse_in(ty, inner_ns.as_deref())?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(AvroType::Record { name, fields })
            }
            "enum" => {
                let name = named(value, namespace)?;
                let symbols = value
                    .get("symbols")
                    .and_then(Value::as_array)
                    .ok_or_else(|| invalid(value, "enum without `symbols` array"))?
                    .iter()
                    .map(|s| {
                        s.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| invalid(s, "enum symbol is not a string"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(AvroType::Enum { name, symbols })
            }
            "array" => {
                let items = value
                    .get("items")
                    .ok_or_else(|| invalid(value, "array without `items`"))?;
                Ok(AvroType::Array(Box::new(Self::parse_in(items, namespace)?)))
            }
            "map" => {
                let values = value
                    .get("values")
                    .ok_or_else(|| invalid(value, "map without `values`"))?;
                Ok(AvroType::Map(Box::new(Self::parse_in(values, namespace)?)))
            }
            "fixed" => {
                let name = named(value, namespace)?;
                let size = value
                    .get("size")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| invalid(value, "fixed without integer `size`"))?;
                Ok(AvroType::Fixed { name, size })
            }
            // {"type": "int", ...} or {"type": "SomeRecord"}
            other => Self::parse_name(other, namespace),
        }
    }

    /// Full name for record, enum and fixed types
    pub fn fullname(&self) -> Option<String> {
        match self {
            AvroType::Record { name, .. }
            | AvroType::Enum { name, .. }
            | AvroType::Fixed { name, .. } => Some(name.fullname()),
            _ => None,
        }
    }

    /// Every named type defined inline in this tree, including the root
    pub fn defined_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.visit(&mut |ty| {
            if let Some(fullname) = ty.fullname() {
                names.insert(fullname);
            }
        });
        names
    }

    /// By-name references in depth-first order
    pub fn references(&self) -> Vec<TypeRef> {
        let mut refs = Vec::new();
        self.visit(&mut |ty| {
            if let AvroType::Reference(r) = ty {
                refs.push(r.clone());
            }
        });
        refs
    }

    fn visit<F: FnMut(&AvroType)>(&self, f: &mut F) {
        f(self);
        match self {
            AvroType::Record { fields, .. } => {
                for field in fields {
                    field.ty.visit(f);
                }
            }
            AvroType::Array(inner) | AvroType::Map(inner) => inner.visit(f),
            AvroType::Union(branches) => {
                for branch in branches {
                    branch.visit(f);
                }
            }
            AvroType::Primitive(_)
            | AvroType::Reference(_)
            | AvroType::Enum { .. }
            | AvroType::Fixed { .. } => {}
        }
    }
}

fn named(value: &Value, enclosing: Option<&str>) -> Result<Name> {
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(value, "named type without `name`"))?;
    let namespace = value
        .get("namespace")
        .and_then(Value::as_str)
        .or(enclosing)
        .filter(|ns| !ns.is_empty())
        .map(str::to_string);
    Ok(Name {
        name: name.to_string(),
        namespace,
    })
}

fn invalid(value: &Value, reason: &str) -> RegistryError {
    RegistryError::InvalidSchema(format!("{}: {}", reason, value))
}
