//! Schema documents, detected references and registry coordinates

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::checksum::Checksum;

/// Version expression resolving to the newest version of an artifact
pub const LATEST: &str = "latest";

/// Group the registry files artifacts under when none is given
pub const DEFAULT_GROUP: &str = "default";

/// Format of a schema document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaFormat {
    /// Apache Avro schemas (.avsc)
    Avro,
    /// JSON Schema documents
    JsonSchema,
    /// Protocol Buffers definitions (.proto)
    Protobuf,
    /// OpenAPI specifications
    OpenApi,
    /// AsyncAPI specifications
    AsyncApi,
}

impl SchemaFormat {
    /// Artifact type string understood by the registry
    pub fn artifact_type(&self) -> &'static str {
        match self {
            SchemaFormat::Avro => "AVRO",
            SchemaFormat::JsonSchema => "JSON",
            SchemaFormat::Protobuf => "PROTOBUF",
            SchemaFormat::OpenApi => "OPENAPI",
            SchemaFormat::AsyncApi => "ASYNCAPI",
        }
    }

    /// Parse a registry artifact type
    pub fn from_artifact_type(artifact_type: &str) -> Option<Self> {
        match artifact_type.to_ascii_uppercase().as_str() {
            "AVRO" => Some(SchemaFormat::Avro),
            "JSON" => Some(SchemaFormat::JsonSchema),
            "PROTOBUF" => Some(SchemaFormat::Protobuf),
            "OPENAPI" => Some(SchemaFormat::OpenApi),
            "ASYNCAPI" => Some(SchemaFormat::AsyncApi),
            _ => None,
        }
    }

    /// Default file extension when writing pulled content
    pub fn extension(&self) -> &'static str {
        match self {
            SchemaFormat::Avro => "avsc",
            SchemaFormat::JsonSchema => "json",
            SchemaFormat::Protobuf => "proto",
            SchemaFormat::OpenApi | SchemaFormat::AsyncApi => "json",
        }
    }
}

impl fmt::Display for SchemaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.artifact_type())
    }
}

/// Derive an artifact id from a schema's file name.
///
/// `Customer.avsc` -> `Customer`, `Address.schema.json` -> `Address`.
pub fn artifact_id_from_file_name(file_name: &str) -> String {
    if let Some(stem) = file_name.strip_suffix(".schema.json") {
        return stem.to_string();
    }
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file_name.to_string(),
    }
}

/// A local schema document loaded for one publish run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDocument {
    artifact_id: String,
    content: String,
    content_hash: Checksum,
    format: SchemaFormat,
    source_extension: String,
}

impl SchemaDocument {
    /// Create a document with an explicit artifact id
    pub fn new(
        artifact_id: impl Into<String>,
        content: impl Into<String>,
        format: SchemaFormat,
        source_extension: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            artifact_id: artifact_id.into(),
            content_hash: Checksum::of_content(&content),
            content,
            format,
            source_extension: source_extension.into(),
        }
    }

    /// Create a document whose artifact id is derived from its file name
    pub fn from_source(file_name: &str, content: impl Into<String>, format: SchemaFormat) -> Self {
        let extension = if file_name.ends_with(".schema.json") {
            "schema.json".to_string()
        } else {
            file_name
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_string())
                .unwrap_or_default()
        };
        Self::new(artifact_id_from_file_name(file_name), content, format, extension)
    }

    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn content_hash(&self) -> &Checksum {
        &self.content_hash
    }

    pub fn format(&self) -> SchemaFormat {
        self.format
    }

    pub fn source_extension(&self) -> &str {
        &self.source_extension
    }

    /// MIME type the content is submitted with
    pub fn content_type(&self) -> &'static str {
        match self.format {
            SchemaFormat::Protobuf => "application/x-protobuf",
            SchemaFormat::OpenApi | SchemaFormat::AsyncApi
                if matches!(self.source_extension.as_str(), "yaml" | "yml") =>
            {
                "application/x-yaml"
            }
            _ => "application/json",
        }
    }
}

/// A pointer from one schema to another, as detected in source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaReference {
    /// The reference as it appeared in the source document
    pub display_name: String,
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
}

impl SchemaReference {
    /// Reference whose only resolvable coordinate is the artifact id
    pub fn to_artifact(display_name: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            group_id: None,
            artifact_id: Some(artifact_id.into()),
            version: None,
        }
    }

    /// Reference kept for reporting only
    pub fn unresolvable(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            group_id: None,
            artifact_id: None,
            version: None,
        }
    }
}

/// A schema paired with the references detected in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaWithReferences {
    pub schema: SchemaDocument,
    pub artifact_id: String,
    pub references: Vec<SchemaReference>,
}

impl SchemaWithReferences {
    pub fn new(schema: SchemaDocument, references: Vec<SchemaReference>) -> Self {
        Self {
            artifact_id: schema.artifact_id().to_string(),
            schema,
            references,
        }
    }

    /// Artifact ids this schema points at (resolvable references only)
    pub fn referenced_artifacts(&self) -> impl Iterator<Item = &str> {
        self.references
            .iter()
            .filter_map(|r| r.artifact_id.as_deref())
    }
}

/// A fully resolved reference as submitted to the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentReference {
    /// Registries omit or null this for the default group
    #[serde(default = "default_group", deserialize_with = "group_or_default")]
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub name: String,
}

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

fn group_or_default<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let group: Option<String> = Option::deserialize(deserializer)?;
    Ok(group.unwrap_or_else(default_group))
}

/// An artifact requested from the registry by coordinates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryDependency {
    #[serde(alias = "groupId")]
    pub group_id: String,
    #[serde(alias = "artifactId")]
    pub artifact_id: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    LATEST.to_string()
}

impl RegistryDependency {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
        }
    }

    pub fn is_latest(&self) -> bool {
        self.version == LATEST
    }
}

impl fmt::Display for RegistryDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.group_id, self.artifact_id, self.version)
    }
}

impl From<ContentReference> for RegistryDependency {
    fn from(reference: ContentReference) -> Self {
        Self::new(reference.group_id, reference.artifact_id, reference.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_id_from_file_name() {
        assert_eq!(artifact_id_from_file_name("Customer.avsc"), "Customer");
        assert_eq!(artifact_id_from_file_name("Address.schema.json"), "Address");
        assert_eq!(artifact_id_from_file_name("order.v1.proto"), "order.v1");
        assert_eq!(artifact_id_from_file_name("README"), "README");
    }

    #[test]
    fn test_from_source_records_extension_and_hash() {
        let doc = SchemaDocument::from_source("Address.schema.json", "{}", SchemaFormat::JsonSchema);
        assert_eq!(doc.artifact_id(), "Address");
        assert_eq!(doc.source_extension(), "schema.json");
        assert!(doc.content_hash().matches("{}"));
    }

    #[test]
    fn test_content_type() {
        let proto = SchemaDocument::from_source("a.proto", "", SchemaFormat::Protobuf);
        assert_eq!(proto.content_type(), "application/x-protobuf");
        let yaml = SchemaDocument::from_source("api.yaml", "openapi: 3.0.0", SchemaFormat::OpenApi);
        assert_eq!(yaml.content_type(), "application/x-yaml");
        let json = SchemaDocument::from_source("api.json", "{}", SchemaFormat::OpenApi);
        assert_eq!(json.content_type(), "application/json");
    }

    #[test]
    fn test_artifact_type_round_trip() {
        for format in [
            SchemaFormat::Avro,
            SchemaFormat::JsonSchema,
            SchemaFormat::Protobuf,
            SchemaFormat::OpenApi,
            SchemaFormat::AsyncApi,
        ] {
            assert_eq!(SchemaFormat::from_artifact_type(format.artifact_type()), Some(format));
        }
        assert_eq!(SchemaFormat::from_artifact_type("GRAPHQL"), None);
    }

    #[test]
    fn test_content_reference_wire_names() {
        let reference = ContentReference {
            group_id: "com.acme".into(),
            artifact_id: "Address".into(),
            version: "1".into(),
            name: "com.acme.Address".into(),
        };
        let json = serde_json::to_value(&reference).unwrap();
        assert_eq!(json["groupId"], "com.acme");
        assert_eq!(json["artifactId"], "Address");
    }

    #[test]
    fn test_content_reference_without_group_is_default_group() {
        let references: Vec<ContentReference> = serde_json::from_str(
            r#"[
                {"groupId": null, "artifactId": "Address", "version": "1", "name": "Address"},
                {"artifactId": "Money", "version": "2", "name": "Money"},
                {"groupId": "com.acme", "artifactId": "Customer", "version": "3", "name": "Customer"}
            ]"#,
        )
        .unwrap();
        let groups: Vec<&str> = references.iter().map(|r| r.group_id.as_str()).collect();
        assert_eq!(groups, vec!["default", "default", "com.acme"]);
    }

    #[test]
    fn test_dependency_version_defaults_to_latest() {
        let dep: RegistryDependency =
            serde_json::from_str(r#"{"groupId": "g", "artifactId": "a"}"#).unwrap();
        assert!(dep.is_latest());
        assert_eq!(dep.to_string(), "g/a@latest");
    }
}
