//! Reference Detection
//!
//! Scans a schema document for pointers to other schemas. One detector per
//! format, selected by a single match on [`SchemaFormat`].
//!
//! Detection never fails: a document that cannot be parsed yields no
//! references and a warning, so an unparseable file never blocks a publish.

pub mod avro;
pub mod json_schema;
pub mod protobuf;

use tracing::warn;

use crate::schema::{SchemaDocument, SchemaFormat, SchemaReference, SchemaWithReferences};

/// Detect every reference a schema makes to other schemas
pub fn detect_references(schema: &SchemaDocument) -> Vec<SchemaReference> {
    let detected = match schema.format() {
        SchemaFormat::Avro => avro::detect(schema.content()),
        SchemaFormat::JsonSchema => json_schema::detect(schema.content()),
        SchemaFormat::Protobuf => Ok(protobuf::detect(schema.content())),
        // Embedded schemas in API documents are not decomposed
        SchemaFormat::OpenApi | SchemaFormat::AsyncApi => Ok(Vec::new()),
    };

    match detected {
        Ok(references) => references,
        Err(e) => {
            warn!(
                artifact_id = %schema.artifact_id(),
                format = %schema.format(),
                error = %e,
                "could not parse schema for reference detection; assuming no references"
            );
            Vec::new()
        }
    }
}

/// Pair every schema in a batch with its detected references
pub fn detect_all(schemas: Vec<SchemaDocument>) -> Vec<SchemaWithReferences> {
    schemas
        .into_iter()
        .map(|schema| {
            let references = detect_references(&schema);
            SchemaWithReferences::new(schema, references)
        })
        .collect()
}

/// Keep the first occurrence of each display name
pub(crate) fn dedup_by_display_name(references: Vec<SchemaReference>) -> Vec<SchemaReference> {
    let mut seen = std::collections::HashSet::new();
    references
        .into_iter()
        .filter(|r| seen.insert(r.display_name.clone()))
        .collect()
}
