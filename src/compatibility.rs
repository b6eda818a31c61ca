//! Schema evolution policy
//!
//! Under `strict` every distinct body is its own major version. Under
//! `resolve` a new body continues the current major version when a reader
//! built from it can resolve data written with the current major's body;
//! otherwise it opens a new one. Incompatibility is an outcome here, never an
//! error.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use apache_avro::schema::{EnumSchema, FixedSchema, Name, Schema, UnionSchema};
use apache_avro::schema_compatibility::SchemaCompatibility;

use crate::classify::is_custom_type_reference;
use crate::dependency::Snapshot;
use crate::error::RegistryError;
use crate::schema::{AvroType, TypeRef};
use crate::version::{Epoch, RegistrationEntry};

/// Evolution policy, fixed per registry instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaEvolution {
    #[default]
    Strict,
    Resolve,
}

impl SchemaEvolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaEvolution::Strict => "strict",
            SchemaEvolution::Resolve => "resolve",
        }
    }
}

impl fmt::Display for SchemaEvolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaEvolution {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(SchemaEvolution::Strict),
            "resolve" => Ok(SchemaEvolution::Resolve),
            other => Err(RegistryError::InvalidConfiguration(format!(
                "unsupported schema evolution `{}` (expected `strict` or `resolve`)",
                other
            ))),
        }
    }
}

/// A schema body together with the named types it was registered against
#[derive(Debug, Clone, Copy)]
pub struct ResolverInput<'a> {
    pub schema: &'a Value,
    pub snapshot: &'a Snapshot,
}

impl<'a> From<&'a RegistrationEntry> for ResolverInput<'a> {
    fn from(entry: &'a RegistrationEntry) -> Self {
        Self {
            schema: entry.schema.as_ref(),
            snapshot: &entry.snapshot,
        }
    }
}

/// Builds a reader-over-writer resolver; success proves compatibility
pub trait SchemaResolver: Send + Sync {
    fn create_resolver(&self, reader: ResolverInput<'_>, writer: ResolverInput<'_>) -> anyhow::Result<()>;
}

/// Resolver backed by `apache-avro` schema resolution rules
#[derive(Debug, Clone, Copy, Default)]
pub struct AvroResolver;

impl AvroResolver {
    pub fn new() -> Self {
        Self
    }

    /// Parse a body with its snapshot bodies available as named types.
    ///
    /// The result is a self-contained tree: every named reference is replaced
    /// by the definition it denotes, which is what reader/writer resolution
    /// compares.
    pub fn parse(input: ResolverInput<'_>) -> anyhow::Result<Schema> {
        let mut known: BTreeSet<String> = input.snapshot.keys().cloned().collect();
        known.extend(AvroType::parse(input.schema)?.defined_names());
        for body in input.snapshot.values() {
            known.extend(AvroType::parse(body)?.defined_names());
        }

        let mut inliner = Inliner {
            snapshot: input.snapshot,
            known,
            seen: BTreeSet::new(),
        };
        let standalone = inliner.inline(input.schema, None);
        let parsed = Schema::parse_str(&standalone.to_string())?;

        let mut definitions = HashMap::new();
        collect_definitions(&parsed, &mut definitions);
        expand_refs(&parsed, &definitions)
    }
}

/// Rewrites a body into one standalone schema text.
///
/// The first reference to each snapshot type carries its definition. Every
/// named type is renamed to its escaped full name with no namespace, and every
/// reference to it uses that name, so the parser never resolves a name
/// against an enclosing namespace.
struct Inliner<'a> {
    snapshot: &'a Snapshot,
    /// Full names defined by the body or any snapshot body
    known: BTreeSet<String>,
    /// Full names already defined in the output
    seen: BTreeSet<String>,
}

impl Inliner<'_> {
    fn inline(&mut self, value: &Value, namespace: Option<&str>) -> Value {
        match value {
            Value::String(name) if is_custom_type_reference(name) => {
                let reference = TypeRef {
                    name: name.clone(),
                    namespace: namespace.map(str::to_string),
                };
                let Some(fullname) = reference
                    .candidates()
                    .into_iter()
                    .find(|c| self.known.contains(c))
                else {
                    return value.clone();
                };
                match self.snapshot.get(&fullname) {
                    Some(body) if !self.seen.contains(&fullname) => {
                        let body = Arc::clone(body);
                        self.inline(&body, None)
                    }
                    _ => Value::String(escape_name(&fullname)),
                }
            }
            Value::Array(branches) => {
                Value::Array(branches.iter().map(|b| self.inline(b, namespace)).collect())
            }
            Value::Object(obj) => self.inline_object(obj, namespace),
            other => other.clone(),
        }
    }

    fn inline_object(&mut self, obj: &Map<String, Value>, namespace: Option<&str>) -> Value {
        let mut out = obj.clone();

        match obj.get("type").and_then(Value::as_str) {
            Some("record" | "error" | "enum" | "fixed") => {
                let Some(name) = obj.get("name").and_then(Value::as_str) else {
                    return Value::Object(out);
                };
                let inner_ns = obj
                    .get("namespace")
                    .and_then(Value::as_str)
                    .or(namespace)
                    .filter(|ns| !ns.is_empty())
                    .map(str::to_string);
                let fullname = match &inner_ns {
                    Some(ns) if !name.contains('.') => format!("{}.{}", ns, name),
                    _ => name.to_string(),
                };

                out.insert("name".to_string(), Value::String(escape_name(&fullname)));
                out.remove("namespace");
                out.remove("aliases");
                self.seen.insert(fullname);

                if let Some(Value::Array(fields)) = obj.get("fields") {
                    let fields = fields
                        .iter()
                        .map(|field| {
                            let mut field = field.clone();
                            if let Some(ty) = field.get("type").cloned() {
                                field["type"] = self.inline(&ty, inner_ns.as_deref());
                            }
                            field
                        })
                        .collect();
                    out.insert("fields".to_string(), Value::Array(fields));
                }
            }
            Some("array") => {
                if let Some(items) = obj.get("items") {
                    out.insert("items".to_string(), self.inline(items, namespace));
                }
            }
            Some("map") => {
                if let Some(values) = obj.get("values") {
                    out.insert("values".to_string(), self.inline(values, namespace));
                }
            }
            _ => {
                if let Some(ty) = obj.get("type") {
                    out.insert("type".to_string(), self.inline(ty, namespace));
                }
            }
        }

        Value::Object(out)
    }
}

/// Dot-free, injective spelling of a full name
fn escape_name(fullname: &str) -> String {
    fullname.replace('_', "_u").replace('.', "_d")
}

fn collect_definitions(schema: &Schema, definitions: &mut HashMap<Name, Schema>) {
    match schema {
        Schema::Record(record) => {
            definitions.insert(record.name.clone(), schema.clone());
            for field in &record.fields {
                collect_definitions(&field.schema, definitions);
            }
        }
        Schema::Enum(EnumSchema { name, .. }) | Schema::Fixed(FixedSchema { name, .. }) => {
            definitions.insert(name.clone(), schema.clone());
        }
        Schema::Array(inner) | Schema::Map(inner) => collect_definitions(inner, definitions),
        Schema::Union(union) => {
            for variant in union.variants() {
                collect_definitions(variant, definitions);
            }
        }
        _ => {}
    }
}

/// Replace every `Schema::Ref` with its definition. Reference cycles are
/// rejected at registration, so this terminates.
fn expand_refs(schema: &Schema, definitions: &HashMap<Name, Schema>) -> anyhow::Result<Schema> {
    let expanded = match schema {
        Schema::Ref { name } => {
            let definition = definitions
                .get(name)
                .ok_or_else(|| anyhow!("undefined named type `{}`", name.fullname(None)))?;
            expand_refs(definition, definitions)?
        }
        Schema::Record(record) => {
            let mut record = record.clone();
            for field in &mut record.fields {
                field.schema = expand_refs(&field.schema, definitions)?;
            }
            Schema::Record(record)
        }
        Schema::Array(inner) => Schema::Array(Box::new(expand_refs(inner, definitions)?)),
        Schema::Map(inner) => Schema::Map(Box::new(expand_refs(inner, definitions)?)),
        Schema::Union(union) => {
            let variants = union
                .variants()
                .iter()
                .map(|variant| expand_refs(variant, definitions))
                .collect::<anyhow::Result<Vec<_>>>()?;
            Schema::Union(UnionSchema::new(variants)?)
        }
        other => other.clone(),
    };
    Ok(expanded)
}

impl SchemaResolver for AvroResolver {
    fn create_resolver(&self, reader: ResolverInput<'_>, writer: ResolverInput<'_>) -> anyhow::Result<()> {
        let reader = Self::parse(reader)?;
        let writer = Self::parse(writer)?;

        if SchemaCompatibility::can_read(&writer, &reader) {
            Ok(())
        } else {
            Err(anyhow!("reader schema cannot resolve data written with the writer schema"))
        }
    }
}

/// Decides major version placement for new registrations
#[derive(Clone)]
pub struct EvolutionClassifier {
    policy: SchemaEvolution,
    resolver: Arc<dyn SchemaResolver>,
}

impl EvolutionClassifier {
    pub fn new(policy: SchemaEvolution, resolver: Arc<dyn SchemaResolver>) -> Self {
        Self { policy, resolver }
    }

    pub fn policy(&self) -> SchemaEvolution {
        self.policy
    }

    /// Placement of `candidate` relative to the current major version entry.
    ///
    /// Returns `None` under strict evolution, where no compatibility check
    /// runs and every distinct body opens its own major version.
    pub fn classify(
        &self,
        current_major: Option<&RegistrationEntry>,
        candidate: ResolverInput<'_>,
    ) -> Option<Epoch> {
        if self.policy == SchemaEvolution::Strict {
            return None;
        }

        let Some(current) = current_major else {
            return Some(Epoch::Start);
        };

        match self.resolver.create_resolver(candidate, current.into()) {
            Ok(()) => {
                debug!(name = %current.name, "schema resolves against current major version");
                Some(Epoch::Continue)
            }
            Err(reason) => {
                info!(name = %current.name, %reason, "breaking change, starting new major version");
                Some(Epoch::Start)
            }
        }
    }
}

impl fmt::Debug for EvolutionClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvolutionClassifier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksum;
    use chrono::Utc;
    use serde_json::json;

    fn entry(schema: Value) -> RegistrationEntry {
        RegistrationEntry {
            name: "test".to_string(),
            hash: Checksum::of_schema(&schema),
            version: 0,
            major_version: 0,
            schema: Arc::new(schema),
            snapshot: Snapshot::new(),
            registered_at: Utc::now(),
        }
    }

    fn with_field(field_type: Value) -> Value {
        json!({
            "name": "test",
            "type": "record",
            "fields": [ { "name": "test", "type": field_type } ]
        })
    }

    fn resolve() -> EvolutionClassifier {
        EvolutionClassifier::new(SchemaEvolution::Resolve, Arc::new(AvroResolver::new()))
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("strict".parse::<SchemaEvolution>().unwrap(), SchemaEvolution::Strict);
        assert_eq!("resolve".parse::<SchemaEvolution>().unwrap(), SchemaEvolution::Resolve);
        assert!(matches!(
            "lenient".parse::<SchemaEvolution>(),
            Err(RegistryError::InvalidConfiguration(_))
        ));
        assert_eq!(SchemaEvolution::default(), SchemaEvolution::Strict);
    }

    #[test]
    fn test_strict_skips_compatibility_check() {
        let classifier = EvolutionClassifier::new(SchemaEvolution::Strict, Arc::new(AvroResolver));
        let body = with_field(json!("int"));
        let snapshot = Snapshot::new();
        let input = ResolverInput { schema: &body, snapshot: &snapshot };
        assert_eq!(classifier.classify(None, input), None);
    }

    #[test]
    fn test_first_registration_starts_epoch() {
        let body = with_field(json!("int"));
        let snapshot = Snapshot::new();
        let input = ResolverInput { schema: &body, snapshot: &snapshot };
        assert_eq!(resolve().classify(None, input), Some(Epoch::Start));
    }

    #[test]
    fn test_union_widening_continues_epoch() {
        let current = entry(with_field(json!("int")));
        let body = with_field(json!(["int", "null"]));
        let snapshot = Snapshot::new();
        let input = ResolverInput { schema: &body, snapshot: &snapshot };
        assert_eq!(resolve().classify(Some(&current), input), Some(Epoch::Continue));
    }

    #[test]
    fn test_type_change_starts_epoch() {
        let current = entry(with_field(json!("int")));
        let body = with_field(json!("string"));
        let snapshot = Snapshot::new();
        let input = ResolverInput { schema: &body, snapshot: &snapshot };
        assert_eq!(resolve().classify(Some(&current), input), Some(Epoch::Start));
    }

    #[test]
    fn test_parse_with_snapshot_types() {
        let dep = json!({ "name": "dep", "type": "enum", "symbols": ["A"] });
        let mut snapshot = Snapshot::new();
        snapshot.insert("dep".to_string(), Arc::new(dep));

        let body = with_field(json!("dep"));
        let parsed = AvroResolver::parse(ResolverInput { schema: &body, snapshot: &snapshot });
        assert!(parsed.is_ok());

        let orphan = AvroResolver::parse(ResolverInput { schema: &body, snapshot: &Snapshot::new() });
        assert!(orphan.is_err());
    }

    fn inliner(snapshot: &Snapshot) -> Inliner<'_> {
        Inliner {
            snapshot,
            known: snapshot.keys().cloned().collect(),
            seen: BTreeSet::new(),
        }
    }

    fn contains_ref(schema: &Schema) -> bool {
        match schema {
            Schema::Ref { .. } => true,
            Schema::Record(record) => record.fields.iter().any(|f| contains_ref(&f.schema)),
            Schema::Array(inner) | Schema::Map(inner) => contains_ref(inner),
            Schema::Union(union) => union.variants().iter().any(contains_ref),
            _ => false,
        }
    }

    #[test]
    fn test_escape_name() {
        assert_eq!(escape_name("Tag"), "Tag");
        assert_eq!(escape_name("ns.dep"), "ns_ddep");
        assert_ne!(escape_name("a_b.c"), escape_name("a.b_c"));
    }

    #[test]
    fn test_inline_first_reference_only() {
        let dep = json!({ "name": "dep", "namespace": "ns", "type": "enum", "symbols": ["A"] });
        let mut snapshot = Snapshot::new();
        snapshot.insert("ns.dep".to_string(), Arc::new(dep));

        let body = json!({
            "name": "holder",
            "namespace": "ns",
            "type": "record",
            "fields": [
                { "name": "a", "type": "dep" },
                { "name": "b", "type": { "type": "array", "items": "dep" } },
                { "name": "c", "type": "string", "default": "dep" }
            ]
        });
        let inlined = inliner(&snapshot).inline(&body, None);

        assert_eq!(inlined["name"], json!("ns_dholder"));
        assert!(inlined.get("namespace").is_none());
        assert_eq!(
            inlined["fields"][0]["type"],
            json!({ "name": "ns_ddep", "type": "enum", "symbols": ["A"] })
        );
        assert_eq!(inlined["fields"][1]["type"]["items"], json!("ns_ddep"));
        assert_eq!(inlined["fields"][2]["default"], json!("dep"));
    }

    #[test]
    fn test_parse_expands_repeated_references() {
        let tag = json!({ "name": "Tag", "type": "enum", "symbols": ["A", "B"] });
        let mut snapshot = Snapshot::new();
        snapshot.insert("Tag".to_string(), Arc::new(tag));

        let body = json!({
            "name": "Holder",
            "type": "record",
            "fields": [
                { "name": "tag", "type": "Tag" },
                { "name": "tags", "type": { "type": "array", "items": "Tag" } },
                { "name": "maybe", "type": ["null", "Tag"] }
            ]
        });
        let parsed = AvroResolver::parse(ResolverInput { schema: &body, snapshot: &snapshot }).unwrap();
        assert!(!contains_ref(&parsed));
    }

    #[test]
    fn test_repeated_reference_addition_continues_epoch() {
        let tag = json!({ "name": "Tag", "type": "enum", "symbols": ["A", "B"] });
        let mut snapshot = Snapshot::new();
        snapshot.insert("Tag".to_string(), Arc::new(tag));

        let mut current = entry(json!({
            "name": "Holder",
            "type": "record",
            "fields": [
                { "name": "tag", "type": "Tag" },
                { "name": "tag2", "type": "Tag" }
            ]
        }));
        current.snapshot = snapshot.clone();

        let body = json!({
            "name": "Holder",
            "type": "record",
            "fields": [
                { "name": "tag", "type": "Tag" },
                { "name": "tag2", "type": "Tag" },
                { "name": "x", "type": ["null", "int"], "default": null }
            ]
        });
        let input = ResolverInput { schema: &body, snapshot: &snapshot };
        assert_eq!(resolve().classify(Some(&current), input), Some(Epoch::Continue));
    }

    #[test]
    fn test_local_type_used_twice_continues_epoch() {
        let fields = json!([
            { "name": "fg", "type": { "type": "enum", "name": "Color", "symbols": ["RED"] } },
            { "name": "bg", "type": "Color" }
        ]);
        let current = entry(json!({ "name": "Paint", "type": "record", "fields": fields }));

        let mut widened = fields.as_array().cloned().unwrap_or_default();
        widened.push(json!({ "name": "alpha", "type": "double", "default": 1.0 }));
        let body = json!({ "name": "Paint", "type": "record", "fields": widened });

        let snapshot = Snapshot::new();
        let input = ResolverInput { schema: &body, snapshot: &snapshot };
        assert_eq!(resolve().classify(Some(&current), input), Some(Epoch::Continue));
    }

    #[test]
    fn test_namespaceless_dependency_inside_namespaced_referrer() {
        let tag = json!({ "name": "Tag", "type": "enum", "symbols": ["A"] });
        let thing = json!({
            "name": "Thing", "namespace": "other", "type": "record",
            "fields": [ { "name": "t", "type": "Tag" } ]
        });
        let mut snapshot = Snapshot::new();
        snapshot.insert("Tag".to_string(), Arc::new(tag));
        snapshot.insert("other.Thing".to_string(), Arc::new(thing));

        let fields = json!([
            { "name": "tag", "type": "Tag" },
            { "name": "thing", "type": "other.Thing" }
        ]);
        let mut current = entry(json!({
            "name": "Holder", "namespace": "shop", "type": "record", "fields": fields
        }));
        current.snapshot = snapshot.clone();

        let mut widened = fields.as_array().cloned().unwrap_or_default();
        widened.push(json!({ "name": "note", "type": ["null", "string"], "default": null }));
        let body = json!({
            "name": "Holder", "namespace": "shop", "type": "record", "fields": widened
        });

        let input = ResolverInput { schema: &body, snapshot: &snapshot };
        assert!(AvroResolver::parse(input).is_ok());
        assert_eq!(resolve().classify(Some(&current), input), Some(Epoch::Continue));
    }

    #[test]
    fn test_referenced_record_widening_continues_epoch() {
        let dep = json!({
            "name": "point", "type": "record",
            "fields": [ { "name": "x", "type": "int" } ]
        });
        let mut snapshot = Snapshot::new();
        snapshot.insert("point".to_string(), Arc::new(dep));

        let mut current = entry(with_field(json!("point")));
        current.snapshot = snapshot.clone();

        let body = with_field(json!(["null", "point"]));
        let input = ResolverInput { schema: &body, snapshot: &snapshot };
        assert_eq!(resolve().classify(Some(&current), input), Some(Epoch::Continue));
    }
}
