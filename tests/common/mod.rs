//! In-memory registry for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use schema_sync::registry::{
    ArtifactMetadata, CompatibilityPolicy, CompatibilityReport, CreatedArtifact, RegistryClient,
    VersionContent, VersionMetadata,
};
use schema_sync::schema::{ContentReference, SchemaDocument, SchemaFormat, LATEST};
use schema_sync::{Result, SyncError};

#[derive(Debug, Clone)]
pub struct StoredVersion {
    pub version: String,
    pub content: String,
    pub references: Vec<ContentReference>,
}

#[derive(Debug, Clone)]
struct Artifact {
    artifact_type: String,
    versions: Vec<StoredVersion>,
}

/// Registry held in memory; versions are numbered "1", "2", ...
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    artifacts: Mutex<HashMap<(String, String), Artifact>>,
    incompatible: Mutex<HashSet<String>>,
    expose_references: bool,
    pub create_artifact_calls: AtomicUsize,
    pub create_version_calls: AtomicUsize,
    pub compatibility_checks: AtomicUsize,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that reports stored references through `get_version_references`
    pub fn exposing_references() -> Self {
        Self {
            expose_references: true,
            ..Self::default()
        }
    }

    /// Reject every new version of `artifact_id` as incompatible
    pub fn reject_changes_to(&self, artifact_id: &str) {
        self.incompatible.lock().unwrap().insert(artifact_id.to_string());
    }

    /// Seed an artifact directly
    pub fn insert(&self, group: &str, artifact_id: &str, format: SchemaFormat, versions: Vec<StoredVersion>) {
        self.artifacts.lock().unwrap().insert(
            (group.to_string(), artifact_id.to_string()),
            Artifact {
                artifact_type: format.artifact_type().to_string(),
                versions,
            },
        );
    }

    pub fn versions(&self, group: &str, artifact_id: &str) -> Vec<StoredVersion> {
        self.artifacts
            .lock()
            .unwrap()
            .get(&(group.to_string(), artifact_id.to_string()))
            .map(|a| a.versions.clone())
            .unwrap_or_default()
    }

    pub fn write_calls(&self) -> usize {
        self.create_artifact_calls.load(Ordering::SeqCst) + self.create_version_calls.load(Ordering::SeqCst)
    }

    fn not_found(group: &str, artifact_id: &str) -> SyncError {
        SyncError::ArtifactNotFound {
            group_id: group.to_string(),
            artifact_id: artifact_id.to_string(),
        }
    }

    fn find_version(&self, group: &str, artifact_id: &str, version: &str) -> Result<StoredVersion> {
        let artifacts = self.artifacts.lock().unwrap();
        let artifact = artifacts
            .get(&(group.to_string(), artifact_id.to_string()))
            .ok_or_else(|| Self::not_found(group, artifact_id))?;
        let found = if version == LATEST {
            artifact.versions.last()
        } else {
            artifact.versions.iter().find(|v| v.version == version)
        };
        found.cloned().ok_or_else(|| SyncError::VersionNotFound {
            group_id: group.to_string(),
            artifact_id: artifact_id.to_string(),
            version: version.to_string(),
        })
    }
}

#[async_trait]
impl RegistryClient for InMemoryRegistry {
    async fn get_artifact_metadata(&self, group_id: &str, artifact_id: &str) -> Result<ArtifactMetadata> {
        let artifacts = self.artifacts.lock().unwrap();
        let artifact = artifacts
            .get(&(group_id.to_string(), artifact_id.to_string()))
            .ok_or_else(|| Self::not_found(group_id, artifact_id))?;
        Ok(ArtifactMetadata {
            group_id: Some(group_id.to_string()),
            artifact_id: artifact_id.to_string(),
            artifact_type: Some(artifact.artifact_type.clone()),
            name: None,
            description: None,
            created_on: None,
            modified_on: None,
        })
    }

    async fn get_latest_version(&self, group_id: &str, artifact_id: &str) -> Result<VersionMetadata> {
        let latest = self.find_version(group_id, artifact_id, LATEST)?;
        Ok(VersionMetadata::new(latest.version))
    }

    async fn get_version_content(&self, group_id: &str, artifact_id: &str, version: &str) -> Result<String> {
        Ok(self.find_version(group_id, artifact_id, version)?.content)
    }

    async fn get_version_references(
        &self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
    ) -> Result<Option<Vec<ContentReference>>> {
        if !self.expose_references {
            return Ok(None);
        }
        Ok(Some(self.find_version(group_id, artifact_id, version)?.references))
    }

    async fn create_artifact(
        &self,
        group_id: &str,
        artifact_id: &str,
        format: SchemaFormat,
        content: &VersionContent,
    ) -> Result<CreatedArtifact> {
        self.create_artifact_calls.fetch_add(1, Ordering::SeqCst);
        let mut artifacts = self.artifacts.lock().unwrap();
        let key = (group_id.to_string(), artifact_id.to_string());
        if artifacts.contains_key(&key) {
            return Err(SyncError::Http {
                status: 409,
                body: format!("artifact {} already exists", artifact_id),
            });
        }
        artifacts.insert(
            key,
            Artifact {
                artifact_type: format.artifact_type().to_string(),
                versions: vec![StoredVersion {
                    version: "1".to_string(),
                    content: content.content.clone(),
                    references: content.references.clone(),
                }],
            },
        );
        Ok(CreatedArtifact {
            artifact: ArtifactMetadata {
                group_id: Some(group_id.to_string()),
                artifact_id: artifact_id.to_string(),
                artifact_type: Some(format.artifact_type().to_string()),
                name: None,
                description: None,
                created_on: None,
                modified_on: None,
            },
            version: VersionMetadata::new("1"),
        })
    }

    async fn create_version(
        &self,
        group_id: &str,
        artifact_id: &str,
        content: &VersionContent,
    ) -> Result<VersionMetadata> {
        self.create_version_calls.fetch_add(1, Ordering::SeqCst);
        let mut artifacts = self.artifacts.lock().unwrap();
        let artifact = artifacts
            .get_mut(&(group_id.to_string(), artifact_id.to_string()))
            .ok_or_else(|| Self::not_found(group_id, artifact_id))?;
        let version = (artifact.versions.len() + 1).to_string();
        artifact.versions.push(StoredVersion {
            version: version.clone(),
            content: content.content.clone(),
            references: content.references.clone(),
        });
        Ok(VersionMetadata::new(version))
    }

    async fn check_compatibility(
        &self,
        _group_id: &str,
        artifact_id: &str,
        _content: &VersionContent,
        policy: CompatibilityPolicy,
    ) -> Result<CompatibilityReport> {
        self.compatibility_checks.fetch_add(1, Ordering::SeqCst);
        if policy.is_enforced() && self.incompatible.lock().unwrap().contains(artifact_id) {
            return Ok(CompatibilityReport::Incompatible {
                reason: format!("{} violates {}", artifact_id, policy),
            });
        }
        Ok(CompatibilityReport::Compatible)
    }

    async fn set_compatibility_rule(
        &self,
        _group_id: &str,
        _artifact_id: &str,
        _policy: CompatibilityPolicy,
    ) -> Result<()> {
        Ok(())
    }
}

/// A JSON Schema document as discovery would load it from `<artifact_id>.schema.json`
pub fn json_schema(artifact_id: &str, content: &str) -> SchemaDocument {
    SchemaDocument::from_source(&format!("{}.schema.json", artifact_id), content, SchemaFormat::JsonSchema)
}

pub const ADDRESS: &str = r#"{
  "$id": "https://schemas.acme.dev/schemas/Address.schema.json",
  "type": "object",
  "properties": {
    "street": { "type": "string" },
    "city": { "type": "string" }
  }
}"#;

pub const CUSTOMER: &str = r#"{
  "$id": "https://schemas.acme.dev/schemas/Customer.schema.json",
  "type": "object",
  "properties": {
    "name": { "type": "string" },
    "address": { "$ref": "https://schemas.acme.dev/schemas/Address.schema.json" }
  }
}"#;
