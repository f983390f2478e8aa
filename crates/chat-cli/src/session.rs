//! Persisted login session
//!
//! The session file holds the bearer token issued at login. It is created by
//! `login`, read by every authenticated command, and removed by `logout` or
//! when the user service no longer accepts the token.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use chat_gateway::auth::AuthContext;
use chat_gateway::client::{TokenResponse, UserProfile};

use crate::error::{CliError, CliResult};

/// A stored login
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Gateway the token was issued through
    pub gateway_url: String,
    pub access_token: String,
    pub token_type: String,
    pub created_at: DateTime<Utc>,
    /// Absent when the user service did not report a lifetime
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Identity from the last successful `me` check
    #[serde(default)]
    pub user: Option<UserProfile>,
}

impl Session {
    pub fn from_token(gateway_url: &str, token: &TokenResponse, now: DateTime<Utc>) -> Self {
        let expires_at = token
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
            .map(|lifetime| now + lifetime);

        Self {
            gateway_url: gateway_url.to_string(),
            access_token: token.access_token.clone(),
            token_type: token.token_type.clone(),
            created_at: now,
            expires_at,
            user: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn auth_context(&self) -> AuthContext {
        AuthContext::with_token(self.access_token.as_str())
    }
}

/// JSON file holding at most one [`Session`]
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/chat-gateway/session.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|c| c.join("chat-gateway"))
            .unwrap_or_else(|| PathBuf::from(".chat-gateway"))
            .join("session.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored session, if there is one
    pub fn load(&self) -> CliResult<Option<Session>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            CliError(format!(
                "Session file {} is corrupt ({e}); run `chat-cli logout` to reset it",
                self.path.display()
            ))
        })
    }

    pub fn save(&self, session: &Session) -> CliResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, content)?;
        restrict_permissions(&self.path)?;
        tracing::debug!("Saved session to {}", self.path.display());
        Ok(())
    }

    /// Remove the stored session. Returns whether one existed.
    pub fn clear(&self) -> CliResult<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!("Removed session {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Credentials for the next request.
    ///
    /// Anonymous when nothing is stored or the stored token has expired.
    pub fn auth_context(&self) -> CliResult<AuthContext> {
        let Some(session) = self.load()? else {
            return Ok(AuthContext::anonymous());
        };
        if session.is_expired(Utc::now()) {
            tracing::debug!("Stored session expired, sending request without credentials");
            return Ok(AuthContext::anonymous());
        }
        Ok(session.auth_context())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
