//! Schema Registry
//!
//! In-memory, content-addressed registry. Each qualified name owns a
//! [`VersionStore`]; registration deduplicates by canonical hash, freezes a
//! snapshot of every dependency, places the entry into a major version
//! according to the evolution policy and notifies subscribers.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::checksum::Checksum;
use crate::compatibility::{
    AvroResolver, EvolutionClassifier, ResolverInput, SchemaEvolution, SchemaResolver,
};
use crate::config::RegistrySettings;
use crate::dependency::build_snapshot;
use crate::error::Result;
use crate::events::{EventDispatcher, SchemaEvent, Subscription, Topic};
use crate::schema::qualified_name;
use crate::version::{Epoch, RegistrationEntry, VersionStore};

/// The schema registry
#[derive(Debug)]
pub struct Registry {
    /// Version stores by qualified name. One lock for the whole map keeps
    /// duplicate-check-then-append atomic.
    stores: RwLock<HashMap<String, VersionStore>>,
    classifier: EvolutionClassifier,
    events: EventDispatcher,
}

impl Registry {
    /// Registry with strict evolution
    pub fn new() -> Self {
        Self::with_evolution(SchemaEvolution::default())
    }

    pub fn with_evolution(policy: SchemaEvolution) -> Self {
        Self::with_resolver(policy, Arc::new(AvroResolver::new()))
    }

    /// Registry with a custom compatibility resolver
    pub fn with_resolver(policy: SchemaEvolution, resolver: Arc<dyn SchemaResolver>) -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            classifier: EvolutionClassifier::new(policy, resolver),
            events: EventDispatcher::new(),
        }
    }

    /// Build from loaded settings. An unsupported evolution value is an
    /// `InvalidConfiguration` error.
    pub fn from_config(settings: &RegistrySettings) -> Result<Self> {
        let policy: SchemaEvolution = settings.registry.schema_evolution.parse()?;
        Ok(Self::with_evolution(policy))
    }

    pub fn policy(&self) -> SchemaEvolution {
        self.classifier.policy()
    }

    /// Canonical content hash of a schema body
    pub fn hash(&self, schema: &Value) -> Checksum {
        Checksum::of_schema(schema)
    }

    /// Register a schema body.
    ///
    /// Returns the new entry, or the existing one when identical content was
    /// registered before. Fails without touching any state when a referenced
    /// type is missing or references loop.
    #[tracing::instrument(skip_all, fields(name = tracing::field::Empty))]
    pub fn register(&self, schema: impl Into<Arc<Value>>) -> Result<Arc<RegistrationEntry>> {
        let schema: Arc<Value> = schema.into();
        let name = qualified_name(&schema)?;
        tracing::Span::current().record("name", name.as_str());

        let hash = Checksum::of_schema(&schema);
        debug!(%hash, "computed schema hash");

        let mut events = Vec::new();
        let entry = {
            let mut stores = self.stores.write();

            let existing = stores
                .get(&name)
                .and_then(|store| store.find(&hash))
                .cloned();

            match existing {
                Some(existing) => {
                    debug!(version = existing.version, "schema already registered");
                    events.push(SchemaEvent {
                        topic: Topic::OldSchema,
                        name: name.clone(),
                        entry: Arc::clone(&existing),
                        previous: None,
                    });
                    existing
                }
                None => {
                    let snapshot = build_snapshot(&schema, &*stores)?;

                    let store = stores.get(&name);
                    let is_new = store.is_none();
                    let previous = store.and_then(VersionStore::latest).cloned();
                    let current_major = store.and_then(VersionStore::latest_major).cloned();

                    let epoch = self.classifier.classify(
                        current_major.as_deref(),
                        ResolverInput {
                            schema: schema.as_ref(),
                            snapshot: &snapshot,
                        },
                    );
                    // strict evolution makes every distinct body its own major version
                    let placement = epoch.unwrap_or(Epoch::Start);
                    let version = store.map_or(0, VersionStore::len);
                    let major_version = store.map_or(0, |s| s.major_index_for(placement));

                    let entry = Arc::new(RegistrationEntry {
                        name: name.clone(),
                        hash,
                        version,
                        major_version,
                        schema,
                        snapshot,
                        registered_at: chrono::Utc::now(),
                    });

                    stores
                        .entry(name.clone())
                        .or_default()
                        .insert(Arc::clone(&entry), placement);

                    info!(
                        version,
                        major_version,
                        dependencies = entry.snapshot.len(),
                        "registered schema"
                    );

                    if is_new {
                        events.push(SchemaEvent {
                            topic: Topic::NewSchema,
                            name: name.clone(),
                            entry: Arc::clone(&entry),
                            previous: None,
                        });
                    }
                    events.push(SchemaEvent {
                        topic: Topic::UpdatedSchema,
                        name: name.clone(),
                        entry: Arc::clone(&entry),
                        previous,
                    });
                    if let Some(epoch) = epoch {
                        let topic = match epoch {
                            Epoch::Start => Topic::NewMajorSchema,
                            Epoch::Continue => Topic::UpdatedMajorSchema,
                        };
                        events.push(SchemaEvent {
                            topic,
                            name: name.clone(),
                            entry: Arc::clone(&entry),
                            previous: current_major,
                        });
                    }

                    entry
                }
            }
        };

        for event in &events {
            self.events.emit(event);
        }

        Ok(entry)
    }

    /// Look up an entry. `version` indexes major versions under `resolve`
    /// and minor versions under `strict`; `None` means latest and negative
    /// values count back from it.
    pub fn get(&self, name: &str, version: Option<i64>) -> Option<Arc<RegistrationEntry>> {
        match self.policy() {
            SchemaEvolution::Resolve => self.get_major(name, version),
            SchemaEvolution::Strict => self.get_minor(name, version),
        }
    }

    pub fn get_minor(&self, name: &str, version: Option<i64>) -> Option<Arc<RegistrationEntry>> {
        self.stores.read().get(name)?.get_minor(version).cloned()
    }

    pub fn get_major(&self, name: &str, version: Option<i64>) -> Option<Arc<RegistrationEntry>> {
        self.stores.read().get(name)?.get_major(version).cloned()
    }

    /// All entries for `name` in registration order
    pub fn versions(&self, name: &str) -> Vec<Arc<RegistrationEntry>> {
        self.stores
            .read()
            .get(name)
            .map(|store| store.entries().cloned().collect())
            .unwrap_or_default()
    }

    /// Registered qualified names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stores.read().contains_key(name)
    }

    /// Subscribe to a registry topic
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&SchemaEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(topic, handler)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use parking_lot::Mutex;
    use serde_json::json;

    fn with_field(name: &str, field_type: Value) -> Arc<Value> {
        Arc::new(json!({
            "name": name,
            "type": "record",
            "fields": [ { "name": "test", "type": field_type } ]
        }))
    }

    #[test]
    fn test_create_registry() {
        let registry = Registry::new();
        assert!(registry.names().is_empty());
        assert_eq!(registry.policy(), SchemaEvolution::Strict);
        assert!(registry.get("test", None).is_none());
    }

    #[test]
    fn test_register_returns_entry() {
        let registry = Registry::new();
        let schema = with_field("test", json!("int"));

        let entry = registry.register(Arc::clone(&schema)).unwrap();
        assert!(Arc::ptr_eq(&entry.schema, &schema));
        assert_eq!(entry.version, 0);
        assert_eq!(entry.major_version, 0);
        assert_eq!(entry.name, "test");
        assert_eq!(entry.hash, registry.hash(&schema));
        assert!(entry.snapshot.is_empty());
    }

    #[test]
    fn test_duplicate_returns_same_entry() {
        let registry = Registry::new();
        let first = registry.register(with_field("test", json!("int"))).unwrap();
        let second = registry.register(with_field("test", json!("int"))).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.versions("test").len(), 1);
        assert!(registry.get("test", Some(1)).is_none());
    }

    #[test]
    fn test_strict_versions_are_majors() {
        let registry = Registry::new();
        registry.register(with_field("test", json!("int"))).unwrap();
        let second = registry.register(with_field("test", json!(["int", "null"]))).unwrap();

        assert_eq!(second.version, 1);
        assert_eq!(second.major_version, 1);
        let major = registry.get_major("test", Some(second.major_version as i64)).unwrap();
        assert!(Arc::ptr_eq(&major, &second));
        assert!(Arc::ptr_eq(&registry.get_major("test", None).unwrap(), &second));
    }

    #[test]
    fn test_resolve_epochs() {
        let registry = Registry::with_evolution(SchemaEvolution::Resolve);
        let a = registry.register(with_field("test", json!("int"))).unwrap();
        let widened = registry.register(with_field("test", json!(["int", "null"]))).unwrap();
        let broken = registry.register(with_field("test", json!("string"))).unwrap();

        assert_eq!(a.major_version, 0);
        assert_eq!(widened.major_version, 0);
        assert_eq!(broken.major_version, 1);

        assert_eq!(registry.versions("test").len(), 3);
        assert!(Arc::ptr_eq(&registry.get("test", Some(0)).unwrap(), &widened));
        assert!(Arc::ptr_eq(&registry.get("test", None).unwrap(), &broken));
        assert!(Arc::ptr_eq(&registry.get("test", Some(-1)).unwrap(), &widened));
        assert!(Arc::ptr_eq(&registry.get_minor("test", Some(0)).unwrap(), &a));
    }

    #[test]
    fn test_failed_registration_leaves_no_trace() {
        let registry = Registry::new();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        registry.subscribe(Topic::NewSchema, move |_| *c.lock() += 1);

        let err = registry.register(with_field("p", json!("missing"))).unwrap_err();
        assert!(matches!(err, RegistryError::UnregisteredDependency { .. }));
        assert!(!registry.contains("p"));
        assert_eq!(*count.lock(), 0);
    }

    #[test]
    fn test_nameless_schema_is_invalid() {
        let registry = Registry::new();
        let err = registry.register(json!({ "type": "int" })).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSchema(_)));
    }

    #[test]
    fn test_handler_can_reenter_registry() {
        let registry = Arc::new(Registry::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&registry);
        let s = Arc::clone(&seen);
        registry.subscribe(Topic::UpdatedSchema, move |event| {
            if let Some(registry) = weak.upgrade() {
                s.lock().push(registry.versions(&event.name).len());
            }
        });

        registry.register(with_field("test", json!("int"))).unwrap();
        registry.register(with_field("test", json!("long"))).unwrap();
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_from_config_rejects_unknown_policy() {
        let mut settings = RegistrySettings::default();
        settings.registry.schema_evolution = "lenient".to_string();
        assert!(matches!(
            Registry::from_config(&settings),
            Err(RegistryError::InvalidConfiguration(_))
        ));

        settings.registry.schema_evolution = "resolve".to_string();
        let registry = Registry::from_config(&settings).unwrap();
        assert_eq!(registry.policy(), SchemaEvolution::Resolve);
    }
}
