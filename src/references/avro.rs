//! Avro named-type references
//!
//! Only type positions are inspected (`type`, `items`, `values`, `fields`)
//! and only when reached through a record, array or map. Map keys elsewhere in
//! the document that happen to look like type names are never reported.

use serde_json::Value;
use std::collections::HashSet;

use super::dedup_by_display_name;
use crate::schema::SchemaReference;

/// The eight Avro primitive type names
pub const PRIMITIVES: [&str; 8] = [
    "null", "boolean", "int", "long", "float", "double", "bytes", "string",
];

const NAMED_KINDS: [&str; 4] = ["record", "error", "enum", "fixed"];

/// Detect references to named types defined outside this document
pub fn detect(content: &str) -> serde_json::Result<Vec<SchemaReference>> {
    let root: Value = serde_json::from_str(content)?;

    let mut defined = HashSet::new();
    collect_defined_names(&root, None, &mut defined);

    let mut candidates = Vec::new();
    walk_type(&root, &mut candidates);

    let references = candidates
        .into_iter()
        .filter(|name| !defined.contains(name))
        .map(|name| {
            let artifact_id = name.rsplit('.').next().unwrap_or(&name).to_string();
            SchemaReference::to_artifact(name, artifact_id)
        })
        .collect();

    Ok(dedup_by_display_name(references))
}

/// Whether a type name may point at another schema
pub fn is_reference_candidate(name: &str) -> bool {
    if PRIMITIVES.contains(&name) {
        return false;
    }
    name.contains('.') || name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

fn walk_type(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(name) => {
            if is_reference_candidate(name) {
                out.push(name.clone());
            }
        }
        // union
        Value::Array(branches) => {
            for branch in branches {
                walk_type(branch, out);
            }
        }
        Value::Object(obj) => match obj.get("type") {
            Some(Value::String(kind)) => match kind.as_str() {
                "record" | "error" => {
                    if let Some(fields) = obj.get("fields").and_then(Value::as_array) {
                        for field in fields {
                            if let Some(field_type) = field.get("type") {
                                walk_type(field_type, out);
                            }
                        }
                    }
                }
                "array" => {
                    if let Some(items) = obj.get("items") {
                        walk_type(items, out);
                    }
                }
                "map" => {
                    if let Some(values) = obj.get("values") {
                        walk_type(values, out);
                    }
                }
                "enum" | "fixed" => {}
                // {"type": "long", "logicalType": ...} or {"type": "com.acme.Address"}
                other => {
                    if is_reference_candidate(other) {
                        out.push(other.to_string());
                    }
                }
            },
            Some(nested @ (Value::Object(_) | Value::Array(_))) => walk_type(nested, out),
            _ => {}
        },
        _ => {}
    }
}

/// Collect full and simple names of every named type defined in the document
fn collect_defined_names(value: &Value, enclosing_namespace: Option<&str>, out: &mut HashSet<String>) {
    match value {
        Value::Array(branches) => {
            for branch in branches {
                collect_defined_names(branch, enclosing_namespace, out);
            }
        }
        Value::Object(obj) => {
            let kind = obj.get("type");
            let named = kind
                .and_then(Value::as_str)
                .is_some_and(|k| NAMED_KINDS.contains(&k));

            let mut namespace = enclosing_namespace.map(str::to_string);
            if named {
                if let Some(name) = obj.get("name").and_then(Value::as_str) {
                    let full_name = match name.rsplit_once('.') {
                        Some((ns, _)) => {
                            namespace = Some(ns.to_string());
                            name.to_string()
                        }
                        None => {
                            if let Some(ns) = obj.get("namespace").and_then(Value::as_str) {
                                namespace = Some(ns.to_string());
                            }
                            match namespace.as_deref() {
                                Some(ns) if !ns.is_empty() => format!("{}.{}", ns, name),
                                _ => name.to_string(),
                            }
                        }
                    };
                    let simple = full_name.rsplit('.').next().unwrap_or(&full_name).to_string();
                    out.insert(full_name);
                    out.insert(simple);
                }
            }

            if let Some(fields) = obj.get("fields").and_then(Value::as_array) {
                for field in fields {
                    if let Some(field_type) = field.get("type") {
                        collect_defined_names(field_type, namespace.as_deref(), out);
                    }
                }
            }
            for key in ["items", "values"] {
                if let Some(inner) = obj.get(key) {
                    collect_defined_names(inner, namespace.as_deref(), out);
                }
            }
            if let Some(nested @ (Value::Object(_) | Value::Array(_))) = kind {
                collect_defined_names(nested, namespace.as_deref(), out);
            }
        }
        _ => {}
    }
}
