//! Bearer credentials for the calendar API.
//!
//! The registrar only ever asks for a bearer; how it is obtained (a token
//! injected by CI, or an "authorized user" file with a refresh token) is
//! decided by the [`CredentialProvider`] it was built with.
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use promo_http::{HttpClient, HttpError, RequestOpts};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tokens expiring within this window are treated as already expired.
pub const EXPIRY_SKEW_SECS: i64 = 225;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credential file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no access token available")]
    Missing,
    #[error("credential cannot be refreshed: {0}")]
    NotRefreshable(&'static str),
    #[error("token refresh failed: {0}")]
    Refresh(#[from] HttpError),
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Whether [`CredentialProvider::bearer`] would currently succeed with a live token.
    fn has_valid_credential(&self) -> bool;

    /// Obtain a fresh access token.
    async fn refresh(&mut self) -> Result<(), CredentialError>;

    fn bearer(&self) -> Result<&str, CredentialError>;

    /// Refresh first if the current token is missing or about to expire.
    async fn ensure_valid(&mut self) -> Result<(), CredentialError> {
        if !self.has_valid_credential() {
            self.refresh().await?;
        }
        Ok(())
    }
}

/// A pre-issued access token. Never refreshed.
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into().trim().to_string(),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken").field("token", &"<redacted>").finish()
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    fn has_valid_credential(&self) -> bool {
        !self.token.is_empty()
    }

    async fn refresh(&mut self) -> Result<(), CredentialError> {
        Err(CredentialError::NotRefreshable("static access token"))
    }

    fn bearer(&self) -> Result<&str, CredentialError> {
        if self.token.is_empty() {
            return Err(CredentialError::Missing);
        }
        Ok(&self.token)
    }
}

/// On-disk "authorized user" credentials as written by Google's client libraries.
///
/// Unknown fields are kept so rewriting the file does not lose them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl AuthorizedUser {
    /// Live at `now` if the token exists and does not expire within the skew window.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        let has_token = self.token.as_deref().is_some_and(|t| !t.trim().is_empty());
        match self.expiry {
            Some(expiry) => has_token && expiry - TimeDelta::seconds(EXPIRY_SKEW_SECS) > now,
            None => has_token,
        }
    }
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Credentials backed by an authorized-user JSON file, refreshed in place.
pub struct AuthorizedUserFile {
    path: PathBuf,
    user: AuthorizedUser,
    http: HttpClient,
}

impl AuthorizedUserFile {
    pub fn load(path: impl AsRef<Path>, http: HttpClient) -> Result<Self, CredentialError> {
        let path = path.as_ref().to_path_buf();
        let raw = std::fs::read_to_string(&path).map_err(|source| CredentialError::Io {
            path: path.clone(),
            source,
        })?;
        let user = serde_json::from_str(&raw).map_err(|source| CredentialError::Parse {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, user, http })
    }

    fn persist(&self) -> Result<(), CredentialError> {
        let body = serde_json::to_string_pretty(&self.user).map_err(|source| {
            CredentialError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;
        std::fs::write(&self.path, body).map_err(|source| CredentialError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

#[async_trait]
impl CredentialProvider for AuthorizedUserFile {
    fn has_valid_credential(&self) -> bool {
        self.user.is_valid_at(Utc::now())
    }

    async fn refresh(&mut self) -> Result<(), CredentialError> {
        let refresh_token = self
            .user
            .refresh_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(CredentialError::NotRefreshable("no refresh_token in credential file"))?;

        let request = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token,
            client_id: &self.user.client_id,
            client_secret: &self.user.client_secret,
        };
        let resp: RefreshResponse = self
            .http
            .post_form_opts(
                &self.user.token_uri,
                &request,
                RequestOpts {
                    allow_absolute: true,
                    ..Default::default()
                },
            )
            .await?;

        let expiry = resp
            .expires_in
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        self.user.token = Some(resp.access_token);
        self.user.expiry = expiry;
        if let Some(rotated) = resp.refresh_token {
            self.user.refresh_token = Some(rotated);
        }
        self.persist()?;
        tracing::info!(path = %self.path.display(), expiry = ?self.user.expiry, "credentials.refreshed");
        Ok(())
    }

    fn bearer(&self) -> Result<&str, CredentialError> {
        self.user
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(CredentialError::Missing)
    }
}
