//! Schema Sync CLI
//!
//! Publishes local schemas to the registry, dry-runs ordering, and pulls
//! registry dependencies.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use schema_sync::graph::DependencyGraph;
use schema_sync::references::detect_all;
use schema_sync::{
    discover_schemas, order_by_dependencies, pull_dependencies, ApicurioRegistryClient,
    CompatibilityPolicy, DiscoveryConfig, PublishOrchestrator, PublishOutcome, RegistryDependency,
    SchemaDocument, SyncConfig, SyncError,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-sync")]
#[command(about = "Publish schemas to a schema registry and pull registry dependencies")]
struct Cli {
    /// Config file (layered over schema-sync.toml and SCHEMA_SYNC__* variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish every discovered schema in dependency order
    Publish {
        /// Schema directories (defaults to [schemas].dirs)
        #[arg(short, long)]
        dir: Vec<PathBuf>,

        /// Registry group (defaults to [registry].group)
        #[arg(short, long)]
        group: Option<String>,

        /// Compatibility policy (defaults to [registry].compatibility)
        #[arg(long)]
        compatibility: Option<CompatibilityPolicy>,
    },

    /// Detect references and print the publish order without contacting the registry
    Validate {
        #[arg(short, long)]
        dir: Vec<PathBuf>,
    },

    /// Pull configured dependencies and everything they reference
    Pull {
        /// Output directory (defaults to [pull].output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Extra dependency as group/artifact[@version]
        #[arg(long = "dependency", value_parser = parse_dependency)]
        dependencies: Vec<RegistryDependency>,
    },

    /// Inspect or create configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default schema-sync.toml
    Init {
        #[arg(default_value = "schema-sync.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check the effective configuration
    Validate,
}

fn parse_dependency(value: &str) -> Result<RegistryDependency, String> {
    let (coordinates, version) = value.split_once('@').unwrap_or((value, "latest"));
    match coordinates.split_once('/') {
        Some((group, artifact)) if !group.is_empty() && !artifact.is_empty() => {
            Ok(RegistryDependency::new(group, artifact, version))
        }
        _ => Err(format!("expected group/artifact[@version], got '{}'", value)),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns whether every item succeeded
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config_path = cli.config.as_deref().map(|p| p.to_string_lossy().into_owned());
    let config = SyncConfig::load_from(config_path.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Publish {
            dir,
            group,
            compatibility,
        } => {
            let mut config = config;
            if let Some(group) = group {
                config.registry.group = group;
            }
            if let Some(policy) = compatibility {
                config.registry.compatibility = policy;
            }
            let schemas = load_schemas(&config, &dir)?;
            println!("📂 Found {} schemas", schemas.len());

            let client = ApicurioRegistryClient::from_config(&config)?;
            let orchestrator = PublishOrchestrator::new(Arc::new(client));
            let summary = orchestrator
                .publish_batch(schemas, &config.registry.group, config.registry.compatibility)
                .await?;

            for result in &summary.results {
                match &result.outcome {
                    PublishOutcome::Failed(e) => println!("   ❌ {}: {}", result.artifact_id, e),
                    outcome => println!(
                        "   ✅ {} {} (version {})",
                        result.artifact_id,
                        outcome.label(),
                        outcome.version().unwrap_or_default()
                    ),
                }
            }

            let state = &summary.state;
            println!(
                "\n📊 created {}, versioned {}, unchanged {}, failed {} in {}ms",
                state.created,
                state.versioned,
                state.unchanged,
                state.failed,
                summary.duration().num_milliseconds()
            );
            Ok(summary.is_success())
        }

        Commands::Validate { dir } => {
            let schemas = load_schemas(&config, &dir)?;
            let batch = detect_all(schemas);
            let graph = DependencyGraph::build(&batch);

            match order_by_dependencies(batch) {
                Ok(ordered) => {
                    println!("✅ {} schemas, publish order:", ordered.len());
                    for (i, schema) in ordered.iter().enumerate() {
                        let refs: Vec<&str> = schema.referenced_artifacts().collect();
                        if refs.is_empty() {
                            println!("   {:>3}. {}", i + 1, schema.artifact_id);
                        } else {
                            println!("   {:>3}. {} -> {}", i + 1, schema.artifact_id, refs.join(", "));
                        }
                    }
                    Ok(true)
                }
                Err(e @ SyncError::CircularDependency { .. }) => {
                    println!("❌ {}", e);
                    for group in graph.cycle_groups() {
                        println!("   cycle: {}", group.join(" -> "));
                    }
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        }

        Commands::Pull {
            output,
            dependencies,
        } => {
            let output_dir = output.unwrap_or_else(|| config.pull.output_dir.clone());
            let mut all = config.pull.dependencies.clone();
            all.extend(dependencies);
            if all.is_empty() {
                println!("Nothing to pull; add [pull].dependencies or --dependency");
                return Ok(true);
            }

            let client = ApicurioRegistryClient::from_config(&config)?;
            let summary = pull_dependencies(&client, &all, &output_dir).await?;

            for pulled in &summary.pulled {
                println!("   ⬇️  {} -> {}", pulled.dependency, pulled.path.display());
            }
            for (dependency, e) in &summary.failed {
                println!("   ❌ {}: {}", dependency, e);
            }
            for conflict in &summary.conflicts {
                println!("   ⚠️  {} skipped, {} already pulled", conflict.skipped, conflict.kept);
            }
            println!(
                "\n📊 pulled {}, failed {}, conflicts {}",
                summary.pulled.len(),
                summary.failed.len(),
                summary.conflicts.len()
            );
            Ok(summary.is_success())
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let mut shown = config;
                if let Some(auth) = shown.auth.as_mut() {
                    auth.client_secret = "********".to_string();
                }
                print!("{}", toml::to_string_pretty(&shown)?);
                Ok(true)
            }
            ConfigAction::Init { path, force } => {
                if path.exists() && !force {
                    anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
                }
                let mut defaults = SyncConfig::default();
                defaults.registry.url = "http://localhost:8080".to_string();
                defaults.save(&path.to_string_lossy())?;
                println!("✅ Wrote {}", path.display());
                Ok(true)
            }
            ConfigAction::Validate => {
                config.validate()?;
                println!("✅ Configuration is valid");
                Ok(true)
            }
        },
    }
}

fn load_schemas(config: &SyncConfig, dirs: &[PathBuf]) -> anyhow::Result<Vec<SchemaDocument>> {
    let dirs: &[PathBuf] = if dirs.is_empty() { &config.schemas.dirs } else { dirs };
    let discovery = DiscoveryConfig::from(&config.schemas);

    let mut schemas = Vec::new();
    for dir in dirs {
        if !dir.is_dir() {
            eprintln!("   ⚠️  Directory not found: {:?}", dir);
            continue;
        }
        let found = discover_schemas(dir, &discovery)
            .with_context(|| format!("failed to read schemas from {}", dir.display()))?;
        schemas.extend(found);
    }
    Ok(schemas)
}
