//! Apicurio Registry v3 REST client

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{
    ArtifactMetadata, CompatibilityPolicy, CompatibilityReport, CreatedArtifact, RegistryClient,
    VersionContent, VersionMetadata,
};
use crate::auth::{ClientCredentialsProvider, CredentialCache};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::schema::{ContentReference, SchemaFormat, LATEST};

const API_PATH: [&str; 3] = ["apis", "registry", "v3"];

/// Registry error body (RFC 7807 problem details plus Apicurio's `causes`)
#[derive(Debug, Default, Deserialize)]
struct ProblemDetails {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    causes: Vec<ProblemCause>,
}

#[derive(Debug, Deserialize)]
struct ProblemCause {
    #[serde(default)]
    description: Option<String>,
}

impl ProblemDetails {
    /// Best human-readable reason in an error body, falling back to the raw text
    fn reason(body: &str) -> String {
        let Ok(problem) = serde_json::from_str::<ProblemDetails>(body) else {
            return body.trim().to_string();
        };
        let mut reason = problem
            .detail
            .or(problem.title)
            .unwrap_or_else(|| body.trim().to_string());
        let causes: Vec<String> = problem
            .causes
            .into_iter()
            .filter_map(|c| c.description)
            .collect();
        if !causes.is_empty() {
            reason = format!("{} ({})", reason, causes.join("; "));
        }
        reason
    }
}

/// [`RegistryClient`] over HTTP
#[derive(Debug, Clone)]
pub struct ApicurioRegistryClient {
    api_base: Url,
    http_client: reqwest::Client,
    credentials: Option<Arc<CredentialCache>>,
}

impl ApicurioRegistryClient {
    /// Client for the registry at `base_url` (with or without the `/apis/registry/v3` suffix)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut api_base = Url::parse(base_url)
            .map_err(|e| SyncError::Configuration(format!("invalid registry URL '{}': {}", base_url, e)))?;
        if api_base.cannot_be_a_base() {
            return Err(SyncError::Configuration(format!(
                "registry URL '{}' cannot be used as a base",
                base_url
            )));
        }
        if !api_base.path().trim_end_matches('/').ends_with("/apis/registry/v3") {
            api_base
                .path_segments_mut()
                .map_err(|_| SyncError::Configuration(format!("invalid registry URL '{}'", base_url)))?
                .pop_if_empty()
                .extend(API_PATH);
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            api_base,
            http_client,
            credentials: None,
        })
    }

    /// Attach a bearer credential source to every request
    pub fn with_credentials(mut self, credentials: Arc<CredentialCache>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Build a client (and its credential cache, if `[auth]` is set) from configuration
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        config.validate()?;
        let timeout = config.request_timeout();
        let client = Self::new(&config.registry.url, timeout)?;

        match &config.auth {
            Some(auth) => {
                let provider = ClientCredentialsProvider::from_config(auth, timeout)?;
                let cache = CredentialCache::with_refresh_buffer(
                    provider,
                    Duration::from_secs(auth.refresh_buffer_secs),
                );
                Ok(client.with_credentials(Arc::new(cache)))
            }
            None => Ok(client),
        }
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn artifact_url(&self, group_id: &str, artifact_id: &str, rest: &[&str]) -> Url {
        let mut segments = vec!["groups", group_id, "artifacts", artifact_id];
        segments.extend_from_slice(rest);
        self.url(&segments)
    }

    /// Send a request with credentials attached; 401 becomes an authentication error
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let (request, sent_token) = match &self.credentials {
            Some(credentials) => {
                let token = credentials.valid_state().await?;
                (request.bearer_auth(token.access_token()), Some(token))
            }
            None => (request, None),
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Network(format!("request timed out: {}", e))
            } else {
                SyncError::Network(e.to_string())
            }
        })?;

        debug!(status = %response.status(), url = %response.url(), "registry responded");

        if response.status() == StatusCode::UNAUTHORIZED {
            if let (Some(credentials), Some(token)) = (&self.credentials, &sent_token) {
                if !credentials.invalidate_if_current(token) {
                    debug!("rejected token was already replaced");
                }
            }
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Authentication(format!(
                "registry rejected credentials: {}",
                ProblemDetails::reason(&body)
            )));
        }

        Ok(response)
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| SyncError::Parse(format!("unexpected registry response: {}", e)))
    }

    fn version_expression(version: &str) -> String {
        if version == LATEST {
            "branch=latest".to_string()
        } else {
            version.to_string()
        }
    }
}

/// Map a non-success status to an error; `not_found` supplies the 404 variant
async fn error_for_status(response: Response, not_found: impl FnOnce() -> SyncError) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(not_found());
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::Http {
        status: status.as_u16(),
        body,
    })
}

/// Status mapping shared by artifact and version creation
async fn error_for_create(response: Response, group_id: &str, artifact_id: &str) -> Result<Response> {
    match response.status() {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            let body = response.text().await.unwrap_or_default();
            Err(SyncError::InvalidSchema {
                artifact_id: artifact_id.to_string(),
                reason: ProblemDetails::reason(&body),
            })
        }
        StatusCode::CONFLICT => {
            let body = response.text().await.unwrap_or_default();
            Err(SyncError::IncompatibleSchema {
                artifact_id: artifact_id.to_string(),
                reason: ProblemDetails::reason(&body),
            })
        }
        _ => {
            error_for_status(response, || SyncError::ArtifactNotFound {
                group_id: group_id.to_string(),
                artifact_id: artifact_id.to_string(),
            })
            .await
        }
    }
}

fn artifact_not_found(group_id: &str, artifact_id: &str) -> impl FnOnce() -> SyncError {
    let (group_id, artifact_id) = (group_id.to_string(), artifact_id.to_string());
    move || SyncError::ArtifactNotFound { group_id, artifact_id }
}

fn version_not_found(group_id: &str, artifact_id: &str, version: &str) -> impl FnOnce() -> SyncError {
    let (group_id, artifact_id, version) = (group_id.to_string(), artifact_id.to_string(), version.to_string());
    move || SyncError::VersionNotFound {
        group_id,
        artifact_id,
        version,
    }
}

#[async_trait]
impl RegistryClient for ApicurioRegistryClient {
    async fn get_artifact_metadata(&self, group_id: &str, artifact_id: &str) -> Result<ArtifactMetadata> {
        let url = self.artifact_url(group_id, artifact_id, &[]);
        debug!(group = %group_id, artifact_id = %artifact_id, "fetching artifact metadata");

        let response = self.send(self.http_client.get(url)).await?;
        let response = error_for_status(response, artifact_not_found(group_id, artifact_id)).await?;
        Self::decode(response).await
    }

    async fn get_latest_version(&self, group_id: &str, artifact_id: &str) -> Result<VersionMetadata> {
        let url = self.artifact_url(group_id, artifact_id, &["versions", "branch=latest"]);

        let response = self.send(self.http_client.get(url)).await?;
        let response = error_for_status(response, version_not_found(group_id, artifact_id, LATEST)).await?;
        Self::decode(response).await
    }

    async fn get_version_content(&self, group_id: &str, artifact_id: &str, version: &str) -> Result<String> {
        let expression = Self::version_expression(version);
        let url = self.artifact_url(group_id, artifact_id, &["versions", expression.as_str(), "content"]);

        let response = self.send(self.http_client.get(url)).await?;
        let response = error_for_status(response, version_not_found(group_id, artifact_id, version)).await?;
        response.text().await.map_err(|e| SyncError::Network(e.to_string()))
    }

    async fn get_version_references(
        &self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
    ) -> Result<Option<Vec<ContentReference>>> {
        let expression = Self::version_expression(version);
        let url = self.artifact_url(group_id, artifact_id, &["versions", expression.as_str(), "references"]);

        let response = self.send(self.http_client.get(url)).await?;
        let response = error_for_status(response, version_not_found(group_id, artifact_id, version)).await?;
        Ok(Some(Self::decode(response).await?))
    }

    async fn create_artifact(
        &self,
        group_id: &str,
        artifact_id: &str,
        format: SchemaFormat,
        content: &VersionContent,
    ) -> Result<CreatedArtifact> {
        let url = self.url(&["groups", group_id, "artifacts"]);
        let body = json!({
            "artifactId": artifact_id,
            "artifactType": format.artifact_type(),
            "firstVersion": { "content": content },
        });
        debug!(
            group = %group_id,
            artifact_id = %artifact_id,
            artifact_type = format.artifact_type(),
            references = content.references.len(),
            "creating artifact"
        );

        let response = self.send(self.http_client.post(url).json(&body)).await?;
        let response = error_for_create(response, group_id, artifact_id).await?;
        Self::decode(response).await
    }

    async fn create_version(
        &self,
        group_id: &str,
        artifact_id: &str,
        content: &VersionContent,
    ) -> Result<VersionMetadata> {
        let url = self.artifact_url(group_id, artifact_id, &["versions"]);
        debug!(
            group = %group_id,
            artifact_id = %artifact_id,
            references = content.references.len(),
            "creating version"
        );

        let response = self
            .send(self.http_client.post(url).json(&json!({ "content": content })))
            .await?;
        let response = error_for_create(response, group_id, artifact_id).await?;
        Self::decode(response).await
    }

    async fn check_compatibility(
        &self,
        group_id: &str,
        artifact_id: &str,
        content: &VersionContent,
        policy: CompatibilityPolicy,
    ) -> Result<CompatibilityReport> {
        if !policy.is_enforced() {
            return Ok(CompatibilityReport::Compatible);
        }

        let mut url = self.artifact_url(group_id, artifact_id, &["versions"]);
        url.query_pairs_mut().append_pair("dryRun", "true");
        debug!(group = %group_id, artifact_id = %artifact_id, policy = %policy, "checking compatibility");

        let response = self
            .send(self.http_client.post(url).json(&json!({ "content": content })))
            .await?;

        match response.status() {
            StatusCode::CONFLICT => {
                let body = response.text().await.unwrap_or_default();
                Ok(CompatibilityReport::Incompatible {
                    reason: ProblemDetails::reason(&body),
                })
            }
            // the registry validates content before rules
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let body = response.text().await.unwrap_or_default();
                Err(SyncError::InvalidSchema {
                    artifact_id: artifact_id.to_string(),
                    reason: ProblemDetails::reason(&body),
                })
            }
            _ => {
                error_for_status(response, artifact_not_found(group_id, artifact_id)).await?;
                Ok(CompatibilityReport::Compatible)
            }
        }
    }

    async fn set_compatibility_rule(
        &self,
        group_id: &str,
        artifact_id: &str,
        policy: CompatibilityPolicy,
    ) -> Result<()> {
        let config = policy.as_rule_config();
        let url = self.artifact_url(group_id, artifact_id, &["rules", "COMPATIBILITY"]);

        let response = self
            .send(self.http_client.put(url).json(&json!({ "config": config })))
            .await?;
        if response.status() != StatusCode::NOT_FOUND {
            error_for_status(response, artifact_not_found(group_id, artifact_id)).await?;
            return Ok(());
        }

        debug!(group = %group_id, artifact_id = %artifact_id, "no compatibility rule yet, creating it");
        let url = self.artifact_url(group_id, artifact_id, &["rules"]);
        let response = self
            .send(
                self.http_client
                    .post(url)
                    .json(&json!({ "ruleType": "COMPATIBILITY", "config": config })),
            )
            .await?;
        error_for_status(response, artifact_not_found(group_id, artifact_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_base_suffix_added_once() {
        let client = ApicurioRegistryClient::new("http://localhost:8080", Duration::from_secs(5)).unwrap();
        assert_eq!(client.api_base().as_str(), "http://localhost:8080/apis/registry/v3");

        let client =
            ApicurioRegistryClient::new("http://localhost:8080/apis/registry/v3/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.url(&["groups", "g"]).as_str(),
            "http://localhost:8080/apis/registry/v3/groups/g"
        );
    }

    #[test]
    fn test_path_segments_are_escaped() {
        let client = ApicurioRegistryClient::new("http://localhost:8080", Duration::from_secs(5)).unwrap();
        let url = client.artifact_url("com.acme", "a b/c", &["versions", "branch=latest"]);
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/apis/registry/v3/groups/com.acme/artifacts/a%20b%2Fc/versions/branch=latest"
        );
    }

    #[test]
    fn test_invalid_url_is_configuration_error() {
        assert!(matches!(
            ApicurioRegistryClient::new("not a url", Duration::from_secs(5)),
            Err(SyncError::Configuration(_))
        ));
    }

    #[test]
    fn test_problem_reason() {
        let body = r#"{"detail": "Incompatible artifact", "causes": [{"description": "field removed", "context": "/fields"}]}"#;
        assert_eq!(ProblemDetails::reason(body), "Incompatible artifact (field removed)");
        assert_eq!(ProblemDetails::reason("plain text\n"), "plain text");
    }
}
