//! Avro Registry CLI
//!
//! Loads schema files into an in-memory registry and reports versions,
//! dependency snapshots and evolution decisions.

use std::path::PathBuf;

use anyhow::{bail, Context};
use avro_registry::config::RegistrySettings;
use avro_registry::loader::{load_directory, read_schema};
use avro_registry::{Registry, SchemaEvolution, Topic};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "avro-registry")]
#[command(about = "Register Avro schemas and inspect their versions")]
struct Cli {
    /// Config file (defaults to avro-registry.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the evolution policy ("strict" or "resolve")
    #[arg(short, long)]
    evolution: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register every schema file in a directory
    Register {
        /// Directory containing .avsc files
        dir: PathBuf,
    },

    /// Print the canonical hash of a schema file
    Hash {
        file: PathBuf,
    },

    /// Load a directory and print one entry as JSON
    Show {
        /// Directory containing .avsc files
        dir: PathBuf,
        /// Qualified schema name
        name: String,
        /// Version index (negative counts back from the latest)
        #[arg(short, long, allow_hyphen_values = true)]
        version: Option<i64>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = RegistrySettings::load_from(cli.config.as_deref())
        .context("loading configuration")?;
    if let Some(evolution) = cli.evolution {
        settings.registry.schema_evolution = evolution;
    }

    match cli.command {
        Commands::Hash { file } => {
            let schema = read_schema(&file)?;
            let registry = Registry::from_config(&settings)?;
            println!("{}  {}", registry.hash(&schema), file.display());
            Ok(())
        }

        Commands::Register { dir } => {
            let registry = Registry::from_config(&settings)?;
            println!("📦 Registering schemas from {:?} ({})", dir, registry.policy());
            println!();

            registry.subscribe(Topic::OldSchema, |event| {
                println!("  ♻️  {} unchanged (v{})", event.name, event.entry.version);
            });
            registry.subscribe(Topic::UpdatedSchema, |event| {
                println!(
                    "  ✅ {} v{} ({} dependencies)",
                    event.name,
                    event.entry.version,
                    event.entry.snapshot.len()
                );
            });
            if registry.policy() == SchemaEvolution::Resolve {
                registry.subscribe(Topic::NewMajorSchema, |event| {
                    println!("     └─ major {} started", event.entry.major_version);
                });
                registry.subscribe(Topic::UpdatedMajorSchema, |event| {
                    println!("     └─ compatible with major {}", event.entry.major_version);
                });
            }

            let report = load_directory(&registry, &dir, &settings.loader)?;

            println!();
            println!("📊 Summary:");
            println!("  Schemas: {}", registry.names().len());
            println!("  Files loaded: {}", report.loaded.len());

            if !report.is_clean() {
                println!("  Failed: {}", report.failed.len());
                for (path, err) in &report.failed {
                    println!("  ❌ {:?}: {}", path, err);
                }
                bail!("{} schema file(s) could not be registered", report.failed.len());
            }
            Ok(())
        }

        Commands::Show { dir, name, version } => {
            let registry = Registry::from_config(&settings)?;
            let report = load_directory(&registry, &dir, &settings.loader)?;
            for (path, err) in &report.failed {
                eprintln!("⚠️  {:?}: {}", path, err);
            }

            let entry = registry
                .get(&name, version)
                .with_context(|| format!("no entry for {} at {:?}", name, version))?;
            println!("{}", serde_json::to_string_pretty(&*entry)?);
            Ok(())
        }
    }
}
