//! Schema file loading
//!
//! Reads `.avsc` files from a directory and registers them. Files are tried in
//! path order; a file whose dependencies are not registered yet is retried
//! after the others until a full pass makes no progress.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::LoaderConfig;
use crate::error::{RegistryError, Result};
use crate::registry::Registry;
use crate::version::RegistrationEntry;

/// A schema file that was registered (or matched an existing entry)
#[derive(Debug, Clone)]
pub struct LoadedSchema {
    pub path: PathBuf,
    pub entry: Arc<RegistrationEntry>,
}

/// Outcome of loading a directory
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<LoadedSchema>,
    pub failed: Vec<(PathBuf, RegistryError)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Schema files under `dir`, sorted by path
pub fn collect_schema_files(dir: &Path, config: &LoaderConfig) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(dir);
    if !config.recursive {
        walker = walker.max_depth(1);
    }

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map_or(false, |ext| ext == config.extension.as_str()))
        .collect();
    files.sort();
    files
}

/// Parse one schema file
pub fn read_schema(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Register every schema file under `dir`
pub fn load_directory(registry: &Registry, dir: &Path, config: &LoaderConfig) -> Result<LoadReport> {
    let mut pending = Vec::new();
    for path in collect_schema_files(dir, config) {
        let schema = Arc::new(read_schema(&path)?);
        pending.push((path, schema));
    }

    let mut report = LoadReport::default();
    loop {
        let mut waiting = Vec::new();
        let mut progressed = false;

        for (path, schema) in pending {
            match registry.register(Arc::clone(&schema)) {
                Ok(entry) => {
                    progressed = true;
                    report.loaded.push(LoadedSchema { path, entry });
                }
                Err(err @ RegistryError::UnregisteredDependency { .. }) => {
                    debug!(path = %path.display(), %err, "deferring schema");
                    waiting.push((path, schema, err));
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "schema rejected");
                    report.failed.push((path, err));
                }
            }
        }

        if waiting.is_empty() {
            break;
        }
        if !progressed {
            for (path, _, err) in waiting {
                warn!(path = %path.display(), %err, "schema rejected");
                report.failed.push((path, err));
            }
            break;
        }
        pending = waiting.into_iter().map(|(path, schema, _)| (path, schema)).collect();
    }

    Ok(report)
}
