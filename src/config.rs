//! Configuration management for schema-sync
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schema-sync.toml)
//! - Environment variables (SCHEMA_SYNC__*)
//!
//! ## Example config file (schema-sync.toml):
//! ```toml
//! [registry]
//! url = "https://registry.example.com"
//! group = "com.acme.orders"
//! compatibility = "BACKWARD"
//! timeout_secs = 30
//!
//! [auth]
//! token_endpoint = "https://sso.example.com/realms/registry/protocol/openid-connect/token"
//! client_id = "schema-publisher"
//! client_secret = "..."
//!
//! [schemas]
//! dirs = ["schemas"]
//!
//! [pull]
//! output_dir = "target/schemas"
//! dependencies = [
//!     { group_id = "com.acme.shared", artifact_id = "Address", version = "latest" },
//! ]
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::schema::RegistryDependency;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Registry connection and publish settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Client-credentials authentication (omit for an open registry)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,

    /// Where local schemas live
    #[serde(default)]
    pub schemas: SchemasConfig,

    /// Dependencies to pull from the registry
    #[serde(default)]
    pub pull: PullConfig,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the registry (without the `/apis/registry/v3` suffix)
    #[serde(default)]
    pub url: String,

    /// Group that published artifacts belong to
    #[serde(default = "default_group")]
    pub group: String,

    /// Compatibility policy enforced on new versions
    #[serde(default)]
    pub compatibility: CompatibilityPolicy,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Compatibility rule levels understood by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompatibilityPolicy {
    #[default]
    Backward,
    BackwardTransitive,
    Forward,
    ForwardTransitive,
    Full,
    FullTransitive,
    None,
}

impl CompatibilityPolicy {
    /// Rule configuration value as the registry spells it
    pub fn as_rule_config(&self) -> &'static str {
        match self {
            CompatibilityPolicy::Backward => "BACKWARD",
            CompatibilityPolicy::BackwardTransitive => "BACKWARD_TRANSITIVE",
            CompatibilityPolicy::Forward => "FORWARD",
            CompatibilityPolicy::ForwardTransitive => "FORWARD_TRANSITIVE",
            CompatibilityPolicy::Full => "FULL",
            CompatibilityPolicy::FullTransitive => "FULL_TRANSITIVE",
            CompatibilityPolicy::None => "NONE",
        }
    }

    pub fn is_enforced(&self) -> bool {
        *self != CompatibilityPolicy::None
    }
}

impl fmt::Display for CompatibilityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_rule_config())
    }
}

impl std::str::FromStr for CompatibilityPolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "BACKWARD" => Ok(CompatibilityPolicy::Backward),
            "BACKWARD_TRANSITIVE" => Ok(CompatibilityPolicy::BackwardTransitive),
            "FORWARD" => Ok(CompatibilityPolicy::Forward),
            "FORWARD_TRANSITIVE" => Ok(CompatibilityPolicy::ForwardTransitive),
            "FULL" => Ok(CompatibilityPolicy::Full),
            "FULL_TRANSITIVE" => Ok(CompatibilityPolicy::FullTransitive),
            "NONE" => Ok(CompatibilityPolicy::None),
            other => Err(SyncError::Configuration(format!(
                "unknown compatibility policy '{}'",
                other
            ))),
        }
    }
}

/// OAuth2 client-credentials settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,

    #[serde(default)]
    pub scope: Option<String>,

    /// Refresh this many seconds before expiry
    #[serde(default = "default_refresh_buffer_secs")]
    pub refresh_buffer_secs: u64,

    /// Lifetime assumed when the token endpoint omits `expires_in`
    #[serde(default = "default_token_lifetime_secs")]
    pub default_token_lifetime_secs: u64,
}

/// Local schema discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemasConfig {
    /// Directories scanned for schema files
    #[serde(default = "default_schema_dirs")]
    pub dirs: Vec<PathBuf>,

    /// Relative path prefixes to skip
    #[serde(default)]
    pub skip_prefixes: Vec<String>,
}

/// Pull settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullConfig {
    /// Where pulled schemas are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Explicit dependencies; their references are pulled transitively
    #[serde(default)]
    pub dependencies: Vec<RegistryDependency>,
}

// Default value functions
fn default_group() -> String {
    crate::schema::DEFAULT_GROUP.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_refresh_buffer_secs() -> u64 {
    30
}

fn default_token_lifetime_secs() -> u64 {
    300
}

fn default_schema_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("schemas")]
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("target/schemas")
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            group: default_group(),
            compatibility: CompatibilityPolicy::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SchemasConfig {
    fn default() -> Self {
        Self {
            dirs: default_schema_dirs(),
            skip_prefixes: Vec::new(),
        }
    }
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            dependencies: Vec::new(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "schema-sync.toml",
            ".schema-sync.toml",
            "config/schema-sync.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "schema-sync") {
            let xdg_config = config_dir.config_dir().join("schema-sync.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // SCHEMA_SYNC__REGISTRY__URL, SCHEMA_SYNC__AUTH__CLIENT_SECRET, ...
        builder = builder.add_source(
            Environment::with_prefix("SCHEMA_SYNC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Check the settings every registry operation needs
    pub fn validate(&self) -> Result<()> {
        if self.registry.url.trim().is_empty() {
            return Err(SyncError::Configuration("registry.url is not set".into()));
        }
        url::Url::parse(&self.registry.url).map_err(|e| {
            SyncError::Configuration(format!("registry.url '{}' is invalid: {}", self.registry.url, e))
        })?;
        if self.registry.group.trim().is_empty() {
            return Err(SyncError::Configuration("registry.group is empty".into()));
        }
        if self.registry.timeout_secs == 0 {
            return Err(SyncError::Configuration("registry.timeout_secs must be positive".into()));
        }

        if let Some(auth) = &self.auth {
            for (name, value) in [
                ("auth.token_endpoint", &auth.token_endpoint),
                ("auth.client_id", &auth.client_id),
                ("auth.client_secret", &auth.client_secret),
            ] {
                if value.trim().is_empty() {
                    return Err(SyncError::Configuration(format!("{} is not set", name)));
                }
            }
            if auth.refresh_buffer_secs >= auth.default_token_lifetime_secs {
                return Err(SyncError::Configuration(
                    "auth.refresh_buffer_secs must be shorter than auth.default_token_lifetime_secs".into(),
                ));
            }
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.registry.timeout_secs)
    }
}
