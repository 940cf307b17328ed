//! JSON Schema `$ref` references
//!
//! Only references that point outside the document are considered:
//! HTTP(S) URLs, `apicurio://` coordinates and paths under `/schemas/`.
//! Local fragments such as `#/definitions/Foo` are ignored.

use serde_json::Value;
use url::Url;

use super::dedup_by_display_name;
use crate::schema::SchemaReference;

const REGISTRY_SCHEME: &str = "apicurio://";

/// Detect registry references anywhere in a JSON Schema document
pub fn detect(content: &str) -> serde_json::Result<Vec<SchemaReference>> {
    let root: Value = serde_json::from_str(content)?;
    let mut references = Vec::new();
    collect_refs(&root, &mut references);
    Ok(dedup_by_display_name(references))
}

fn collect_refs(value: &Value, out: &mut Vec<SchemaReference>) {
    match value {
        Value::Object(obj) => {
            for (key, child) in obj {
                if key == "$ref" {
                    if let Some(reference) = child.as_str().and_then(parse_ref) {
                        out.push(reference);
                    }
                } else {
                    collect_refs(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_refs(item, out);
            }
        }
        _ => {}
    }
}

/// Whether a `$ref` value points at another registry artifact
pub fn is_registry_ref(value: &str) -> bool {
    value.starts_with("http://")
        || value.starts_with("https://")
        || value.starts_with(REGISTRY_SCHEME)
        || value.contains("/schemas/")
}

/// Interpret a `$ref` value; `None` for non-registry references
pub fn parse_ref(value: &str) -> Option<SchemaReference> {
    if !is_registry_ref(value) {
        return None;
    }

    if let Some(path) = value.strip_prefix(REGISTRY_SCHEME) {
        return Some(parse_registry_coordinates(value, path));
    }

    if value.starts_with("http://") || value.starts_with("https://") {
        let artifact_id = Url::parse(value).ok().and_then(|url| {
            let segments: Vec<String> = url.path_segments()?.map(str::to_string).collect();
            let pos = segments.iter().position(|s| s == "schemas")?;
            segments
                .get(pos + 1)
                .filter(|s| !s.is_empty())
                .map(|s| strip_schema_extension(s).to_string())
        });
        return Some(match artifact_id {
            Some(id) => SchemaReference::to_artifact(value, id),
            None => SchemaReference::unresolvable(value),
        });
    }

    Some(SchemaReference::unresolvable(value))
}

/// `apicurio://group/artifact` or `apicurio://group/artifact/versions/3`
fn parse_registry_coordinates(display_name: &str, path: &str) -> SchemaReference {
    let path = path.split(['#', '?']).next().unwrap_or(path);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [group, artifact] => SchemaReference {
            display_name: display_name.to_string(),
            group_id: Some(group.to_string()),
            artifact_id: Some(artifact.to_string()),
            version: None,
        },
        [group, artifact, "versions", version] => SchemaReference {
            display_name: display_name.to_string(),
            group_id: Some(group.to_string()),
            artifact_id: Some(artifact.to_string()),
            version: Some(version.to_string()),
        },
        _ => SchemaReference::unresolvable(display_name),
    }
}

fn strip_schema_extension(segment: &str) -> &str {
    segment
        .strip_suffix(".schema.json")
        .or_else(|| segment.strip_suffix(".json"))
        .unwrap_or(segment)
}
