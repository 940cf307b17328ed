//! Dependency Pull
//!
//! Expands registry dependencies to everything they reference and writes
//! the content under `<output_dir>/<group>/<artifactId>.<ext>`.
//!
//! One file is written per artifact. When a run reaches several versions of
//! the same artifact, the first version written owns the file and the others
//! are reported as conflicts.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::references::detect_references;
use crate::registry::RegistryClient;
use crate::schema::{RegistryDependency, SchemaDocument, LATEST};

/// Everything `seed` depends on, transitively.
///
/// Breadth-first and cycle-safe. The seed comes first, followed by each
/// dependency in the order it was discovered, without duplicates.
pub async fn resolve_transitive_dependencies(
    client: &dyn RegistryClient,
    seed: &RegistryDependency,
) -> Result<Vec<RegistryDependency>> {
    let mut visited: HashSet<RegistryDependency> = HashSet::new();
    let mut queue = VecDeque::from([seed.clone()]);
    let mut resolved = Vec::new();

    while let Some(dependency) = queue.pop_front() {
        if !visited.insert(dependency.clone()) {
            continue;
        }

        let references = direct_dependencies(client, &dependency).await?;
        debug!(
            dependency = %dependency,
            references = references.len(),
            "resolved direct references"
        );

        queue.extend(references.into_iter().filter(|r| !visited.contains(r)));
        resolved.push(dependency);
    }

    Ok(resolved)
}

/// References of one version, from the registry if it keeps them, otherwise
/// detected in the stored content
async fn direct_dependencies(
    client: &dyn RegistryClient,
    dependency: &RegistryDependency,
) -> Result<Vec<RegistryDependency>> {
    let RegistryDependency {
        group_id,
        artifact_id,
        version,
    } = dependency;

    if let Some(references) = client
        .get_version_references(group_id, artifact_id, version)
        .await?
    {
        return Ok(references.into_iter().map(RegistryDependency::from).collect());
    }

    let metadata = client.get_artifact_metadata(group_id, artifact_id).await?;
    let Some(format) = metadata.format() else {
        warn!(
            dependency = %dependency,
            artifact_type = ?metadata.artifact_type,
            "unknown artifact type, not following references"
        );
        return Ok(Vec::new());
    };

    let content = client.get_version_content(group_id, artifact_id, version).await?;
    let document = SchemaDocument::new(artifact_id.as_str(), content, format, format.extension());

    Ok(detect_references(&document)
        .into_iter()
        .filter_map(|reference| {
            let artifact_id = reference.artifact_id?;
            Some(RegistryDependency::new(
                reference.group_id.unwrap_or_else(|| group_id.clone()),
                artifact_id,
                reference.version.unwrap_or_else(|| LATEST.to_string()),
            ))
        })
        .collect())
}

/// A schema written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledSchema {
    pub dependency: RegistryDependency,
    pub path: PathBuf,
}

/// A version that was not written because another version of the same
/// artifact already owns its file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullConflict {
    pub kept: RegistryDependency,
    pub skipped: RegistryDependency,
}

/// Report of a pull run
#[derive(Debug, Default)]
pub struct PullSummary {
    pub pulled: Vec<PulledSchema>,
    pub failed: Vec<(RegistryDependency, SyncError)>,
    pub conflicts: Vec<PullConflict>,
}

impl PullSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Pull `dependencies` and everything they reference into `output_dir`.
///
/// A dependency that cannot be resolved or fetched is recorded and the rest
/// continue; authentication failures abort.
pub async fn pull_dependencies(
    client: &dyn RegistryClient,
    dependencies: &[RegistryDependency],
    output_dir: &Path,
) -> Result<PullSummary> {
    let mut summary = PullSummary::default();
    let mut attempted: HashSet<RegistryDependency> = HashSet::new();
    // (group, artifact) -> version whose content is on disk
    let mut owners: HashMap<(String, String), RegistryDependency> = HashMap::new();

    for dependency in dependencies {
        let closure = match resolve_transitive_dependencies(client, dependency).await {
            Ok(closure) => closure,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(dependency = %dependency, error = %e, "could not resolve dependency");
                summary.failed.push((dependency.clone(), e));
                continue;
            }
        };

        for item in closure {
            if !attempted.insert(item.clone()) {
                continue;
            }
            let key = (item.group_id.clone(), item.artifact_id.clone());
            if let Some(kept) = owners.get(&key) {
                warn!(
                    kept = %kept,
                    skipped = %item,
                    "another version of this artifact was already pulled"
                );
                summary.conflicts.push(PullConflict {
                    kept: kept.clone(),
                    skipped: item,
                });
                continue;
            }
            match pull_one(client, &item, output_dir).await {
                Ok(path) => {
                    debug!(dependency = %item, path = %path.display(), "schema written");
                    owners.insert(key, item.clone());
                    summary.pulled.push(PulledSchema {
                        dependency: item,
                        path,
                    });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(dependency = %item, error = %e, "could not pull schema");
                    summary.failed.push((item, e));
                }
            }
        }
    }

    info!(
        pulled = summary.pulled.len(),
        failed = summary.failed.len(),
        conflicts = summary.conflicts.len(),
        output_dir = %output_dir.display(),
        "pull finished"
    );

    Ok(summary)
}

async fn pull_one(
    client: &dyn RegistryClient,
    dependency: &RegistryDependency,
    output_dir: &Path,
) -> Result<PathBuf> {
    let metadata = client
        .get_artifact_metadata(&dependency.group_id, &dependency.artifact_id)
        .await?;
    let extension = metadata.format().map(|f| f.extension()).unwrap_or("json");

    let content = client
        .get_version_content(&dependency.group_id, &dependency.artifact_id, &dependency.version)
        .await?;

    let dir = output_dir.join(&dependency.group_id);
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.{}", dependency.artifact_id, extension));
    fs::write(&path, content)?;
    Ok(path)
}
