//! Credentials for authenticated API calls

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::errors::ConsoleError;

/// An opaque bearer token attached to every service call
#[derive(Clone)]
pub struct AccessToken {
    secret: SecretString,
}

impl AccessToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            secret: SecretString::from(raw.into()),
        }
    }

    /// Reveal the raw token for the Authorization header
    pub fn reveal(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(redacted)")
    }
}

/// Where the console gets its identity and bearer token from
///
/// Token renewal and the redirect-to-login dance belong to whoever hosts
/// the session; the engine only asks for the current token before a call.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Current bearer token
    async fn access_token(&self) -> Result<AccessToken, ConsoleError>;

    /// Owner recorded on deployments created by this session
    fn username(&self) -> &str;
}

/// Fixed credentials, as read from `credentials.json` or the environment
#[derive(Clone, Deserialize)]
pub struct StaticCredentials {
    username: String,
    token: SecretString,
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: SecretString::from(token.into()),
        }
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("username", &self.username)
            .field("token", &"redacted")
            .finish()
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn access_token(&self) -> Result<AccessToken, ConsoleError> {
        Ok(AccessToken {
            secret: self.token.clone(),
        })
    }

    fn username(&self) -> &str {
        &self.username
    }
}
