//! Dependency discovery and snapshots
//!
//! Walks a schema's type tree, resolves every by-name reference to the latest
//! registered body of that name, and recurses into it. The edges found are
//! loaded into a directed graph; any strongly connected component with more
//! than one member, or a node referencing itself, is a cycle.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::schema::{qualified_name, AvroType, TypeRef};
use crate::version::VersionStore;

/// Dependency bodies frozen at registration time, keyed by qualified name
pub type Snapshot = BTreeMap<String, Arc<Value>>;

/// Every transitive dependency mapped to its own direct dependencies
pub type DependencyMap = BTreeMap<String, BTreeSet<String>>;

/// Read access to the latest registered body for a name
pub trait SchemaLookup {
    fn latest_schema(&self, name: &str) -> Option<Arc<Value>>;
}

impl SchemaLookup for HashMap<String, VersionStore> {
    fn latest_schema(&self, name: &str) -> Option<Arc<Value>> {
        self.get(name)
            .and_then(VersionStore::latest)
            .map(|entry| Arc::clone(&entry.schema))
    }
}

/// Discover all registered types `schema` depends on, directly or transitively
pub fn discover_dependencies<L: SchemaLookup>(schema: &Value, lookup: &L) -> Result<DependencyMap> {
    let root = qualified_name(schema)?;

    let mut walker = Walker {
        lookup,
        root: &root,
        edges: DependencyMap::new(),
    };
    walker.walk(&root, schema)?;

    let mut edges = walker.edges;
    check_cycles(&root, &edges)?;
    edges.remove(&root);
    Ok(edges)
}

/// Freeze the current latest body of every dependency of `schema`
pub fn build_snapshot<L: SchemaLookup>(schema: &Value, lookup: &L) -> Result<Snapshot> {
    let deps = discover_dependencies(schema, lookup)?;

    deps.keys()
        .map(|name| {
            lookup
                .latest_schema(name)
                .map(|body| (name.clone(), body))
                .ok_or_else(|| RegistryError::UnregisteredDependency { name: name.clone() })
        })
        .collect()
}

struct Walker<'a, L> {
    lookup: &'a L,
    /// Name being registered. References to it are edges, never lookups.
    root: &'a str,
    /// Walked names, root included, mapped to their direct references
    edges: DependencyMap,
}

impl<L: SchemaLookup> Walker<'_, L> {
    fn walk(&mut self, name: &str, body: &Value) -> Result<()> {
        let ty = AvroType::parse(body)?;
        let mut local = ty.defined_names();
        local.remove(name);
        self.edges.entry(name.to_string()).or_default();

        for reference in ty.references() {
            let Some(target) = self.resolve(&reference, &local)? else {
                continue;
            };
            debug!(caller = name, dependency = %target, "resolved schema dependency");

            self.edges
                .entry(name.to_string())
                .or_default()
                .insert(target.clone());

            if self.edges.contains_key(&target) {
                continue;
            }
            if let Some(dep) = self.lookup.latest_schema(&target) {
                self.walk(&target, &dep)?;
            }
        }

        Ok(())
    }

    /// Full name a reference denotes, or `None` when it names a type defined
    /// inline in the same body
    fn resolve(&self, reference: &TypeRef, local: &BTreeSet<String>) -> Result<Option<String>> {
        for candidate in reference.candidates() {
            if candidate == self.root {
                return Ok(Some(candidate));
            }
            if local.contains(&candidate) {
                return Ok(None);
            }
            if self.lookup.latest_schema(&candidate).is_some() {
                return Ok(Some(candidate));
            }
        }
        Err(RegistryError::UnregisteredDependency {
            name: reference.name.clone(),
        })
    }
}

/// Fail on the first reference cycle in `edges`.
///
/// The reported `to` is the root when it sits on the cycle, and `from` is the
/// cycle member that references it.
fn check_cycles(root: &str, edges: &DependencyMap) -> Result<()> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let nodes: HashMap<&str, NodeIndex> = edges
        .keys()
        .map(|name| (name.as_str(), graph.add_node(name.as_str())))
        .collect();

    for (from, targets) in edges {
        for to in targets {
            if let (Some(&a), Some(&b)) = (nodes.get(from.as_str()), nodes.get(to.as_str())) {
                graph.add_edge(a, b, ());
            }
        }
    }

    for scc in kosaraju_scc(&graph) {
        let cyclic = match scc.as_slice() {
            [single] => graph.contains_edge(*single, *single),
            _ => true,
        };
        if !cyclic {
            continue;
        }

        let mut members: Vec<&str> = scc.iter().map(|&idx| graph[idx]).collect();
        members.sort_unstable();

        let to = if members.contains(&root) { root } else { members[0] };
        let from = members
            .iter()
            .copied()
            .find(|m| edges.get(*m).map_or(false, |targets| targets.contains(to)))
            .unwrap_or(to);

        return Err(RegistryError::CircularDependency {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    Ok(())
}
