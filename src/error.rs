//! Error types for registry synchronisation

use thiserror::Error;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised while detecting, ordering, publishing or pulling schemas
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Artifact not found: {group_id}/{artifact_id}")]
    ArtifactNotFound { group_id: String, artifact_id: String },

    #[error("Version not found: {group_id}/{artifact_id} version {version}")]
    VersionNotFound {
        group_id: String,
        artifact_id: String,
        version: String,
    },

    #[error("Incompatible schema '{artifact_id}': {reason}")]
    IncompatibleSchema { artifact_id: String, reason: String },

    #[error(
        "Circular dependency detected among artifacts: {}. Break the cycle by extracting the shared type into its own schema that each of them references.",
        .artifacts.join(", ")
    )]
    CircularDependency { artifacts: Vec<String> },

    #[error("Invalid schema '{artifact_id}': {reason}")]
    InvalidSchema { artifact_id: String, reason: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether this error makes every subsequent registry call pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Authentication(_))
    }

    /// Whether this is the "artifact does not exist yet" branch.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SyncError::ArtifactNotFound { .. } | SyncError::VersionNotFound { .. }
        )
    }
}
