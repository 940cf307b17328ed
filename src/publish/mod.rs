//! Publish Orchestrator
//!
//! Publishes a batch of local schemas in dependency order:
//!
//! 1. detect references and order the batch (a cycle fails before any
//!    registry call)
//! 2. for each schema, resolve its references to registry coordinates using
//!    the versions assigned earlier in the same run
//! 3. create the artifact, add a version, or leave it unchanged
//!
//! Batch state is threaded through each step as a value. One schema failing
//! never stops the batch; an authentication failure does, since nothing
//! after it can succeed.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::checksum::Checksum;
use crate::error::{Result, SyncError};
use crate::graph::order_by_dependencies;
use crate::references::detect_all;
use crate::registry::{CompatibilityPolicy, CompatibilityReport, RegistryClient, VersionContent};
use crate::schema::{ContentReference, SchemaDocument, SchemaWithReferences, LATEST};

/// Accumulator threaded through a publish run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishState {
    /// Version each artifact of this run ended up at
    pub published_versions: HashMap<String, String>,
    pub created: usize,
    pub versioned: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl PublishState {
    /// Fold one outcome into the state
    pub fn record(mut self, artifact_id: &str, outcome: &PublishOutcome) -> Self {
        match outcome {
            PublishOutcome::Created { version } => {
                self.created += 1;
                self.published_versions.insert(artifact_id.to_string(), version.clone());
            }
            PublishOutcome::Versioned { version } => {
                self.versioned += 1;
                self.published_versions.insert(artifact_id.to_string(), version.clone());
            }
            PublishOutcome::Unchanged { version } => {
                self.unchanged += 1;
                self.published_versions.insert(artifact_id.to_string(), version.clone());
            }
            PublishOutcome::Failed(_) => self.failed += 1,
        }
        self
    }

    pub fn processed(&self) -> usize {
        self.created + self.versioned + self.unchanged + self.failed
    }
}

/// What happened to one schema
#[derive(Debug)]
pub enum PublishOutcome {
    /// New artifact; its first version
    Created { version: String },
    /// New version of an existing artifact
    Versioned { version: String },
    /// Content and references match the latest version
    Unchanged { version: String },
    Failed(SyncError),
}

impl PublishOutcome {
    pub fn version(&self) -> Option<&str> {
        match self {
            PublishOutcome::Created { version }
            | PublishOutcome::Versioned { version }
            | PublishOutcome::Unchanged { version } => Some(version),
            PublishOutcome::Failed(_) => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PublishOutcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            PublishOutcome::Created { .. } => "created",
            PublishOutcome::Versioned { .. } => "versioned",
            PublishOutcome::Unchanged { .. } => "unchanged",
            PublishOutcome::Failed(_) => "failed",
        }
    }
}

/// Per-schema entry of a [`PublishSummary`]
#[derive(Debug)]
pub struct PublishResult {
    pub artifact_id: String,
    pub outcome: PublishOutcome,
    /// References submitted (or that would have been submitted) with the content
    pub references: Vec<ContentReference>,
}

/// Report of a whole publish run
#[derive(Debug)]
pub struct PublishSummary {
    pub group_id: String,
    /// In publish order
    pub results: Vec<PublishResult>,
    pub state: PublishState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PublishSummary {
    pub fn is_success(&self) -> bool {
        self.state.failed == 0
    }

    pub fn result(&self, artifact_id: &str) -> Option<&PublishResult> {
        self.results.iter().find(|r| r.artifact_id == artifact_id)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PublishResult> {
        self.results.iter().filter(|r| r.outcome.is_failure())
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Resolve a schema's detected references to registry coordinates.
///
/// In-batch artifacts get the version recorded for them earlier in this run;
/// everything else keeps its own coordinates, defaulting to `default_group`
/// and `latest`. References without an artifact id are dropped.
pub fn resolve_references(
    schema: &SchemaWithReferences,
    batch_artifacts: &HashSet<String>,
    published_versions: &HashMap<String, String>,
    default_group: &str,
) -> Vec<ContentReference> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(schema.references.len());

    for reference in &schema.references {
        let Some(artifact_id) = reference.artifact_id.as_deref() else {
            warn!(
                artifact_id = %schema.artifact_id,
                reference = %reference.display_name,
                "reference has no registry coordinates, skipping"
            );
            continue;
        };

        let group_id = reference
            .group_id
            .clone()
            .unwrap_or_else(|| default_group.to_string());

        let version = if batch_artifacts.contains(artifact_id) && group_id == default_group {
            match published_versions.get(artifact_id) {
                Some(version) => version.clone(),
                None => {
                    warn!(
                        artifact_id = %schema.artifact_id,
                        dependency = %artifact_id,
                        "dependency in this batch has no published version yet; publish order is wrong, using latest"
                    );
                    LATEST.to_string()
                }
            }
        } else {
            reference.version.clone().unwrap_or_else(|| LATEST.to_string())
        };

        let content_ref = ContentReference {
            group_id,
            artifact_id: artifact_id.to_string(),
            version,
            name: reference.display_name.clone(),
        };
        if seen.insert(content_ref.clone()) {
            resolved.push(content_ref);
        }
    }

    resolved
}

/// Drives publication of schema batches against one registry
#[derive(Clone)]
pub struct PublishOrchestrator {
    client: Arc<dyn RegistryClient>,
}

impl PublishOrchestrator {
    pub fn new(client: Arc<dyn RegistryClient>) -> Self {
        Self { client }
    }

    /// Detect, order and publish a batch of schemas into `group_id`
    pub async fn publish_batch(
        &self,
        schemas: Vec<SchemaDocument>,
        group_id: &str,
        policy: CompatibilityPolicy,
    ) -> Result<PublishSummary> {
        if group_id.trim().is_empty() {
            return Err(SyncError::Configuration("publish group must not be empty".into()));
        }

        let ordered = order_by_dependencies(detect_all(schemas))?;
        self.publish_ordered(ordered, group_id, policy).await
    }

    /// Publish a batch that is already in dependency order
    pub async fn publish_ordered(
        &self,
        ordered: Vec<SchemaWithReferences>,
        group_id: &str,
        policy: CompatibilityPolicy,
    ) -> Result<PublishSummary> {
        let started_at = Utc::now();
        let batch_artifacts: HashSet<String> = ordered.iter().map(|s| s.artifact_id.clone()).collect();
        let total = ordered.len();

        info!(group = %group_id, schemas = total, policy = %policy, "publishing batch");

        let mut state = PublishState::default();
        let mut results = Vec::with_capacity(total);

        for schema in &ordered {
            let references =
                resolve_references(schema, &batch_artifacts, &state.published_versions, group_id);
            let outcome = self.publish_one(schema, &references, group_id, policy).await?;

            state = state.record(&schema.artifact_id, &outcome);
            log_outcome(&schema.artifact_id, &outcome, &state, total);

            results.push(PublishResult {
                artifact_id: schema.artifact_id.clone(),
                outcome,
                references,
            });
        }

        info!(
            group = %group_id,
            created = state.created,
            versioned = state.versioned,
            unchanged = state.unchanged,
            failed = state.failed,
            "publish finished"
        );

        Ok(PublishSummary {
            group_id: group_id.to_string(),
            results,
            state,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Publish one schema. Only fatal errors escape; everything else is a
    /// [`PublishOutcome::Failed`].
    async fn publish_one(
        &self,
        schema: &SchemaWithReferences,
        references: &[ContentReference],
        group_id: &str,
        policy: CompatibilityPolicy,
    ) -> Result<PublishOutcome> {
        let artifact_id = schema.artifact_id.as_str();
        let content = VersionContent::new(&schema.schema, references.to_vec());

        let attempt = match self.client.get_artifact_metadata(group_id, artifact_id).await {
            Err(e) if e.is_not_found() => self.create(schema, &content, group_id, policy).await,
            Err(e) => Err(e),
            Ok(_) => self.update(schema, &content, group_id, policy).await,
        };

        match attempt {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => Ok(PublishOutcome::Failed(e)),
        }
    }

    async fn create(
        &self,
        schema: &SchemaWithReferences,
        content: &VersionContent,
        group_id: &str,
        policy: CompatibilityPolicy,
    ) -> Result<PublishOutcome> {
        let artifact_id = schema.artifact_id.as_str();
        let created = self
            .client
            .create_artifact(group_id, artifact_id, schema.schema.format(), content)
            .await?;

        if policy.is_enforced() {
            if let Err(e) = self.client.set_compatibility_rule(group_id, artifact_id, policy).await {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!(
                    artifact_id = %artifact_id,
                    policy = %policy,
                    error = %e,
                    "could not configure compatibility rule on new artifact"
                );
            }
        }

        Ok(PublishOutcome::Created {
            version: created.version.version,
        })
    }

    async fn update(
        &self,
        schema: &SchemaWithReferences,
        content: &VersionContent,
        group_id: &str,
        policy: CompatibilityPolicy,
    ) -> Result<PublishOutcome> {
        let artifact_id = schema.artifact_id.as_str();
        let latest = match self.client.get_latest_version(group_id, artifact_id).await {
            Ok(latest) => latest,
            Err(SyncError::VersionNotFound { .. }) => {
                // artifact exists without any version, nothing to compare against
                debug!(artifact_id = %artifact_id, "artifact has no versions yet");
                let version = self.client.create_version(group_id, artifact_id, content).await?;
                return Ok(PublishOutcome::Versioned {
                    version: version.version,
                });
            }
            Err(e) => return Err(e),
        };
        let stored = self
            .client
            .get_version_content(group_id, artifact_id, &latest.version)
            .await?;

        let content_changed = Checksum::of_content(&stored) != *schema.schema.content_hash();
        let references_changed = self
            .references_changed(group_id, artifact_id, &latest.version, &content.references)
            .await?;

        if !content_changed && !references_changed {
            return Ok(PublishOutcome::Unchanged {
                version: latest.version,
            });
        }

        match self
            .client
            .check_compatibility(group_id, artifact_id, content, policy)
            .await
        {
            Ok(CompatibilityReport::Compatible) => {}
            Ok(CompatibilityReport::Incompatible { reason }) => {
                return Ok(PublishOutcome::Failed(SyncError::IncompatibleSchema {
                    artifact_id: artifact_id.to_string(),
                    reason,
                }));
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                // degraded mode: the check could not run, so the registry's own
                // rules are the only guard left
                warn!(
                    artifact_id = %artifact_id,
                    error = %e,
                    "compatibility check failed, publishing new version without it"
                );
            }
        }

        let version = self.client.create_version(group_id, artifact_id, content).await?;
        Ok(PublishOutcome::Versioned {
            version: version.version,
        })
    }

    /// Set comparison when the registry exposes stored references; otherwise
    /// any non-empty reference list counts as a change.
    async fn references_changed(
        &self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
        resolved: &[ContentReference],
    ) -> Result<bool> {
        let stored = match self
            .client
            .get_version_references(group_id, artifact_id, version)
            .await
        {
            Ok(stored) => stored,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(artifact_id = %artifact_id, error = %e, "could not read stored references");
                None
            }
        };

        Ok(match stored {
            Some(stored) => {
                let stored: HashSet<&ContentReference> = stored.iter().collect();
                let resolved: HashSet<&ContentReference> = resolved.iter().collect();
                stored != resolved
            }
            None => !resolved.is_empty(),
        })
    }
}

impl std::fmt::Debug for PublishOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishOrchestrator").finish_non_exhaustive()
    }
}

fn log_outcome(artifact_id: &str, outcome: &PublishOutcome, state: &PublishState, total: usize) {
    let progress = format!("{}/{}", state.processed(), total);
    match outcome {
        PublishOutcome::Failed(e) => warn!(
            artifact_id = %artifact_id,
            progress = %progress,
            error = %e,
            "schema failed"
        ),
        other => info!(
            artifact_id = %artifact_id,
            progress = %progress,
            outcome = other.label(),
            version = other.version().unwrap_or_default(),
            "schema published"
        ),
    }
}
