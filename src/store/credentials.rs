//! Access-token resolution for the hosted document store.
//!
//! Sources are tried in order. A source that is simply not configured (unset
//! variable, missing token file, no metadata server) passes to the next one; a
//! source that is configured but broken fails the whole resolution.

use crate::utils::default_config_dir;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_ACCESS_TOKEN: &str = "METEO_SYNC_ACCESS_TOKEN";
pub const ENV_TOKEN_FILE: &str = "METEO_SYNC_TOKEN_FILE";
pub const DEFAULT_TOKEN_FILE_NAME: &str = "oauth_token.json";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_METADATA_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("No credential source produced an access token")]
    NoCredentials,

    #[error("Failed to read token file '{0}'")]
    TokenFileRead(PathBuf, #[source] io::Error),

    #[error("Failed to parse token file '{0}'")]
    TokenFileParse(PathBuf, #[source] serde_json::Error),

    #[error("Token in '{0}' is expired and cannot be refreshed")]
    TokenExpired(PathBuf),

    #[error("Failed to write refreshed token to '{0}'")]
    TokenFileWrite(PathBuf, #[source] io::Error),

    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Token request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("Token request to {url} failed with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid token response from {0}")]
    InvalidResponse(String, #[source] reqwest::Error),
}

/// One place an access token can come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// A ready bearer token in an environment variable.
    EnvironmentToken { var: String },
    /// An authorized-user token file (`token`, `refresh_token`, `expiry`, ...),
    /// refreshed and rewritten in place when expired.
    TokenFile { path: PathBuf },
    /// The compute metadata server of the hosting VM.
    MetadataServer { url: String },
}

impl CredentialSource {
    fn describe(&self) -> String {
        match self {
            CredentialSource::EnvironmentToken { var } => format!("environment variable {}", var),
            CredentialSource::TokenFile { path } => format!("token file {}", path.display()),
            CredentialSource::MetadataServer { url } => format!("metadata server {}", url),
        }
    }
}

/// A resolved bearer token and where it came from.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub source: CredentialSource,
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    /// Project billed for API quota, when the token file names one.
    pub quota_project: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("source", &self.source)
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("quota_project", &self.quota_project)
            .finish()
    }
}

impl Credentials {
    /// Credentials from a token supplied directly, e.g. by a test or a caller
    /// with its own token management.
    pub fn from_token(access_token: impl Into<String>) -> Self {
        Self {
            source: CredentialSource::EnvironmentToken { var: String::new() },
            access_token: access_token.into(),
            expires_at: None,
            quota_project: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct AuthorizedUserFile {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    expiry: Option<String>,
    #[serde(default)]
    quota_project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Ordered list of credential sources.
pub struct CredentialChain {
    sources: Vec<CredentialSource>,
    client: Client,
}

impl CredentialChain {
    pub fn new(sources: Vec<CredentialSource>) -> Result<Self, CredentialError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(CredentialError::ClientBuild)?;
        Ok(Self { sources, client })
    }

    /// Environment token, then the token file (`METEO_SYNC_TOKEN_FILE` or
    /// `<config dir>/meteo_sync/oauth_token.json`), then the metadata server.
    pub fn standard() -> Result<Self, CredentialError> {
        let mut sources = vec![CredentialSource::EnvironmentToken {
            var: ENV_ACCESS_TOKEN.to_string(),
        }];
        let token_file = std::env::var_os(ENV_TOKEN_FILE)
            .map(PathBuf::from)
            .or_else(|| {
                default_config_dir()
                    .ok()
                    .map(|dir| dir.join(DEFAULT_TOKEN_FILE_NAME))
            });
        if let Some(path) = token_file {
            sources.push(CredentialSource::TokenFile { path });
        }
        sources.push(CredentialSource::MetadataServer {
            url: DEFAULT_METADATA_URL.to_string(),
        });
        Self::new(sources)
    }

    pub fn sources(&self) -> &[CredentialSource] {
        &self.sources
    }

    /// Returns the first source's credentials.
    pub async fn resolve(&self) -> Result<Credentials, CredentialError> {
        for source in &self.sources {
            debug!("Trying credentials from {}", source.describe());
            let resolved = match source {
                CredentialSource::EnvironmentToken { var } => environment_token(source, var),
                CredentialSource::TokenFile { path } => self.token_file(source, path).await?,
                CredentialSource::MetadataServer { url } => self.metadata_server(source, url).await?,
            };
            if let Some(credentials) = resolved {
                info!("Using credentials from {}", source.describe());
                return Ok(credentials);
            }
        }
        Err(CredentialError::NoCredentials)
    }

    async fn token_file(
        &self,
        source: &CredentialSource,
        path: &Path,
    ) -> Result<Option<Credentials>, CredentialError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CredentialError::TokenFileRead(path.to_path_buf(), e)),
        };
        let mut raw: Map<String, Value> = serde_json::from_slice(&bytes)
            .map_err(|e| CredentialError::TokenFileParse(path.to_path_buf(), e))?;
        let file: AuthorizedUserFile = serde_json::from_value(Value::Object(raw.clone()))
            .map_err(|e| CredentialError::TokenFileParse(path.to_path_buf(), e))?;

        let expires_at = file.expiry.as_deref().and_then(parse_expiry);
        if let Some(token) = file.token.as_deref().filter(|t| !t.is_empty()) {
            if !is_expired(expires_at, Utc::now()) {
                return Ok(Some(Credentials {
                    source: source.clone(),
                    access_token: token.to_string(),
                    expires_at,
                    quota_project: file.quota_project_id.clone(),
                }));
            }
        }

        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            file.refresh_token.as_deref(),
            file.client_id.as_deref(),
            file.client_secret.as_deref(),
        ) else {
            return Err(CredentialError::TokenExpired(path.to_path_buf()));
        };

        let token_uri = file.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        warn!("Access token in {} expired, refreshing", path.display());
        let response = self
            .client
            .post(token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await
            .map_err(|e| CredentialError::NetworkRequest(token_uri.to_string(), e))?;
        let refreshed = read_token_response(response, token_uri).await?;

        let expires_at = refreshed
            .expires_in
            .map(|secs| Utc::now() + TimeDelta::seconds(secs));
        raw.insert("token".to_string(), Value::String(refreshed.access_token.clone()));
        if let Some(expiry) = expires_at {
            raw.insert(
                "expiry".to_string(),
                Value::String(expiry.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()),
            );
        }
        let updated = serde_json::to_vec_pretty(&raw)
            .map_err(|e| CredentialError::TokenFileParse(path.to_path_buf(), e))?;
        tokio::fs::write(path, updated)
            .await
            .map_err(|e| CredentialError::TokenFileWrite(path.to_path_buf(), e))?;

        Ok(Some(Credentials {
            source: source.clone(),
            access_token: refreshed.access_token,
            expires_at,
            quota_project: file.quota_project_id,
        }))
    }

    async fn metadata_server(
        &self,
        source: &CredentialSource,
        url: &str,
    ) -> Result<Option<Credentials>, CredentialError> {
        let response = match self
            .client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                debug!("Metadata server {} unreachable: {}", url, e);
                return Ok(None);
            }
            Err(e) => return Err(CredentialError::NetworkRequest(url.to_string(), e)),
        };
        let token = read_token_response(response, url).await?;
        Ok(Some(Credentials {
            source: source.clone(),
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + TimeDelta::seconds(secs)),
            access_token: token.access_token,
            quota_project: None,
        }))
    }
}

fn environment_token(source: &CredentialSource, var: &str) -> Option<Credentials> {
    let token = std::env::var(var).ok()?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(Credentials {
        source: source.clone(),
        access_token: token.to_string(),
        expires_at: None,
        quota_project: None,
    })
}

async fn read_token_response(
    response: reqwest::Response,
    url: &str,
) -> Result<TokenResponse, CredentialError> {
    let response = match response.error_for_status() {
        Ok(resp) => resp,
        Err(e) => {
            warn!("Token endpoint {} rejected the request: {:?}", url, e);
            return Err(match e.status() {
                Some(status) => CredentialError::HttpStatus {
                    url: url.to_string(),
                    status,
                    source: e,
                },
                None => CredentialError::NetworkRequest(url.to_string(), e),
            });
        }
    };
    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| CredentialError::InvalidResponse(url.to_string(), e))
}

/// Parses token-file expiry stamps: RFC 3339, or naive UTC with optional fraction.
fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = value.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc())
}

fn is_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(expiry) => expiry - TimeDelta::seconds(EXPIRY_MARGIN_SECS) <= now,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::tempdir;

    // Nothing listens on the discard port, so the connection is refused.
    const UNREACHABLE_METADATA: &str = "http://127.0.0.1:9/token";

    fn chain(sources: Vec<CredentialSource>) -> CredentialChain {
        match CredentialChain::new(sources) {
            Ok(chain) => chain,
            Err(e) => panic!("client build failed: {e}"),
        }
    }

    #[test]
    fn test_parse_expiry_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single();
        assert_eq!(parse_expiry("2024-05-01T12:00:00Z"), expected);
        assert_eq!(parse_expiry("2024-05-01T15:00:00+03:00"), expected);
        assert_eq!(parse_expiry("2024-05-01T12:00:00"), expected);
        assert!(parse_expiry("2024-05-01T12:00:00.250000Z").is_some());
        assert_eq!(parse_expiry("soon"), None);
    }

    #[test]
    fn test_expiry_margin() {
        let now = Utc::now();
        assert!(!is_expired(None, now));
        assert!(is_expired(Some(now + TimeDelta::seconds(30)), now));
        assert!(!is_expired(Some(now + TimeDelta::seconds(600)), now));
    }

    #[tokio::test]
    async fn test_environment_token_wins() -> Result<(), CredentialError> {
        let var = "METEO_SYNC_TEST_TOKEN_ENV_WINS";
        std::env::set_var(var, "  abc123 ");
        let credentials = chain(vec![
            CredentialSource::EnvironmentToken { var: var.to_string() },
            CredentialSource::MetadataServer { url: UNREACHABLE_METADATA.to_string() },
        ])
        .resolve()
        .await?;
        std::env::remove_var(var);

        assert_eq!(credentials.access_token, "abc123");
        assert_eq!(
            credentials.source,
            CredentialSource::EnvironmentToken { var: var.to_string() }
        );
        assert!(!format!("{:?}", credentials).contains("abc123"));
        Ok(())
    }

    #[tokio::test]
    async fn test_token_file_used_when_env_missing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("token.json");
        let expiry = (Utc::now() + TimeDelta::hours(1)).to_rfc3339();
        std::fs::write(
            &path,
            json!({"token": "file-token", "expiry": expiry, "quota_project_id": "meteo"}).to_string(),
        )?;

        let credentials = chain(vec![
            CredentialSource::EnvironmentToken { var: "METEO_SYNC_TEST_UNSET_VAR".to_string() },
            CredentialSource::TokenFile { path: path.clone() },
        ])
        .resolve()
        .await?;
        assert_eq!(credentials.access_token, "file-token");
        assert_eq!(credentials.quota_project.as_deref(), Some("meteo"));
        assert_eq!(credentials.source, CredentialSource::TokenFile { path });
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_fails() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("token.json");
        std::fs::write(&path, json!({"token": "old", "expiry": "2001-01-01T00:00:00Z"}).to_string())?;

        let result = chain(vec![
            CredentialSource::TokenFile { path },
            CredentialSource::MetadataServer { url: UNREACHABLE_METADATA.to_string() },
        ])
        .resolve()
        .await;
        assert!(matches!(result, Err(CredentialError::TokenExpired(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_broken_token_file_fails_fast() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("token.json");
        std::fs::write(&path, "[1, 2")?;

        let result = chain(vec![CredentialSource::TokenFile { path }]).resolve().await;
        assert!(matches!(result, Err(CredentialError::TokenFileParse(_, _))));
        Ok(())
    }

    #[tokio::test]
    async fn test_chain_exhausted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = chain(vec![
            CredentialSource::EnvironmentToken { var: "METEO_SYNC_TEST_ALSO_UNSET".to_string() },
            CredentialSource::TokenFile { path: dir.path().join("missing.json") },
            CredentialSource::MetadataServer { url: UNREACHABLE_METADATA.to_string() },
        ])
        .resolve()
        .await;
        assert!(matches!(result, Err(CredentialError::NoCredentials)));
        Ok(())
    }
}
