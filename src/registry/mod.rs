//! Registry Client
//!
//! The operations the publish and pull workflows need from a schema
//! registry. [`http::ApicurioRegistryClient`] talks to an Apicurio v3 REST
//! API; tests substitute mocks or in-memory registries.

pub mod http;

pub use http::ApicurioRegistryClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use crate::config::CompatibilityPolicy;
use crate::error::Result;
use crate::schema::{ContentReference, SchemaDocument, SchemaFormat};

/// Artifact metadata as reported by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    #[serde(default)]
    pub group_id: Option<String>,
    pub artifact_id: String,
    #[serde(default)]
    pub artifact_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub modified_on: Option<String>,
}

impl ArtifactMetadata {
    pub fn format(&self) -> Option<SchemaFormat> {
        self.artifact_type
            .as_deref()
            .and_then(SchemaFormat::from_artifact_type)
    }
}

/// One version of an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetadata {
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub artifact_id: Option<String>,
    pub version: String,
    #[serde(default)]
    pub global_id: Option<i64>,
    #[serde(default)]
    pub content_id: Option<i64>,
    #[serde(default)]
    pub artifact_type: Option<String>,
    #[serde(default)]
    pub created_on: Option<String>,
}

impl VersionMetadata {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            group_id: None,
            artifact_id: None,
            version: version.into(),
            global_id: None,
            content_id: None,
            artifact_type: None,
            created_on: None,
        }
    }
}

/// Response to creating an artifact: the artifact and its first version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedArtifact {
    pub artifact: ArtifactMetadata,
    pub version: VersionMetadata,
}

/// Content submitted for a new artifact, version or dry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionContent {
    pub content: String,
    pub content_type: String,
    #[serde(default)]
    pub references: Vec<ContentReference>,
}

impl VersionContent {
    pub fn new(schema: &SchemaDocument, references: Vec<ContentReference>) -> Self {
        Self {
            content: schema.content().to_string(),
            content_type: schema.content_type().to_string(),
            references,
        }
    }
}

/// Outcome of a compatibility check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompatibilityReport {
    Compatible,
    Incompatible { reason: String },
}

impl CompatibilityReport {
    pub fn is_compatible(&self) -> bool {
        matches!(self, CompatibilityReport::Compatible)
    }
}

/// Operations against a schema registry
///
/// "Not found" comes back as [`SyncError::ArtifactNotFound`] or
/// [`SyncError::VersionNotFound`](crate::error::SyncError::VersionNotFound);
/// callers branch on it rather than treating it as a failure.
///
/// [`SyncError::ArtifactNotFound`]: crate::error::SyncError::ArtifactNotFound
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn get_artifact_metadata(&self, group_id: &str, artifact_id: &str) -> Result<ArtifactMetadata>;

    async fn get_latest_version(&self, group_id: &str, artifact_id: &str) -> Result<VersionMetadata>;

    /// Raw content of a version; `version` may be [`LATEST`](crate::schema::LATEST)
    async fn get_version_content(&self, group_id: &str, artifact_id: &str, version: &str) -> Result<String>;

    /// References stored with a version, or `None` if this registry does not expose them
    async fn get_version_references(
        &self,
        _group_id: &str,
        _artifact_id: &str,
        _version: &str,
    ) -> Result<Option<Vec<ContentReference>>> {
        Ok(None)
    }

    async fn create_artifact(
        &self,
        group_id: &str,
        artifact_id: &str,
        format: SchemaFormat,
        content: &VersionContent,
    ) -> Result<CreatedArtifact>;

    async fn create_version(
        &self,
        group_id: &str,
        artifact_id: &str,
        content: &VersionContent,
    ) -> Result<VersionMetadata>;

    /// Would `content` be accepted as the next version under `policy`?
    async fn check_compatibility(
        &self,
        group_id: &str,
        artifact_id: &str,
        content: &VersionContent,
        policy: CompatibilityPolicy,
    ) -> Result<CompatibilityReport>;

    /// Configure the artifact's COMPATIBILITY rule
    async fn set_compatibility_rule(
        &self,
        group_id: &str,
        artifact_id: &str,
        policy: CompatibilityPolicy,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_decodes_registry_json() {
        let meta: ArtifactMetadata = serde_json::from_str(
            r#"{"groupId": "com.acme", "artifactId": "Order", "artifactType": "AVRO", "owner": "ci"}"#,
        )
        .unwrap();
        assert_eq!(meta.format(), Some(SchemaFormat::Avro));
        assert_eq!(meta.group_id.as_deref(), Some("com.acme"));
    }

    #[test]
    fn test_version_content_wire_shape() {
        let doc = SchemaDocument::new("Order", "syntax = \"proto3\";", SchemaFormat::Protobuf, "proto");
        let body = serde_json::to_value(VersionContent::new(&doc, Vec::new())).unwrap();
        assert_eq!(body["contentType"], "application/x-protobuf");
        assert_eq!(body["references"], serde_json::json!([]));
    }
}
