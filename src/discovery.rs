//! Schema Discovery
//!
//! Walks a directory and loads every file that looks like a schema document.

use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::SchemasConfig;
use crate::error::Result;
use crate::schema::{SchemaDocument, SchemaFormat};

/// Which files discovery considers
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Skip files whose path relative to the root starts with one of these
    pub skip_prefixes: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            skip_prefixes: vec![
                "target/".to_string(),
                ".git/".to_string(),
                "node_modules/".to_string(),
            ],
        }
    }
}

impl From<&SchemasConfig> for DiscoveryConfig {
    fn from(config: &SchemasConfig) -> Self {
        let mut discovery = Self::default();
        discovery.skip_prefixes.extend(config.skip_prefixes.iter().cloned());
        discovery
    }
}

/// Load every schema document under `schema_dir`, sorted by path
pub fn discover_schemas(schema_dir: &Path, config: &DiscoveryConfig) -> Result<Vec<SchemaDocument>> {
    let mut documents = Vec::new();

    for entry in WalkDir::new(schema_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let relative = path.strip_prefix(schema_dir).unwrap_or(path);
        let relative_str = relative.to_string_lossy().replace('\\', "/");
        if config.skip_prefixes.iter().any(|p| relative_str.starts_with(p)) {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };

        let content = match extension {
            "avsc" | "proto" | "json" | "yaml" | "yml" => fs::read_to_string(path)?,
            _ => continue,
        };

        let Some(format) = detect_format(extension, &content) else {
            debug!(path = %relative_str, "not a schema document, skipping");
            continue;
        };

        debug!(path = %relative_str, format = %format, "discovered schema");
        documents.push(SchemaDocument::from_source(file_name, content, format));
    }

    Ok(documents)
}

/// Format of a file from its extension, peeking at top-level keys for API documents
pub fn detect_format(extension: &str, content: &str) -> Option<SchemaFormat> {
    match extension {
        "avsc" => Some(SchemaFormat::Avro),
        "proto" => Some(SchemaFormat::Protobuf),
        "json" => match serde_json::from_str::<serde_json::Value>(content) {
            Ok(json) => Some(api_format(|key| json.get(key).is_some()).unwrap_or(SchemaFormat::JsonSchema)),
            // still published; the registry decides whether it is valid
            Err(_) => Some(SchemaFormat::JsonSchema),
        },
        "yaml" | "yml" => match serde_yaml::from_str::<serde_yaml::Value>(content) {
            Ok(yaml) => api_format(|key| yaml.get(key).is_some()),
            Err(e) => {
                warn!(error = %e, "could not parse YAML document");
                None
            }
        },
        _ => None,
    }
}

fn api_format(has_key: impl Fn(&str) -> bool) -> Option<SchemaFormat> {
    if has_key("openapi") || has_key("swagger") {
        Some(SchemaFormat::OpenApi)
    } else if has_key("asyncapi") {
        Some(SchemaFormat::AsyncApi)
    } else {
        None
    }
}
