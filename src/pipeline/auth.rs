//! Basic authentication against an external credential verifier

use crate::pipeline::headers::{paths, AUTHORIZATION, BASIC_CHALLENGE};
use crate::pipeline::types::*;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::HeaderMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Credential verifier: `Some(role)` when the user is authenticated
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, user_name: &UserName, password: &str)
        -> PipelineResult<Option<Role>>;
}

/// User name and password decoded from an `Authorization: Basic` header
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub user_name: UserName,
    pub password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BasicCredentials {
    pub fn from_headers(headers: &HeaderMap) -> PipelineResult<Self> {
        let header = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(PipelineError::MissingCredentials)?;

        let (scheme, encoded) = header
            .trim()
            .split_once(' ')
            .ok_or(PipelineError::MissingCredentials)?;
        if !scheme.eq_ignore_ascii_case(BASIC_CHALLENGE) {
            return Err(PipelineError::MissingCredentials);
        }

        let decoded = STANDARD
            .decode(encoded.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or(PipelineError::MissingCredentials)?;

        // Passwords may contain ':'; user names may not
        let (user_name, password) = decoded
            .split_once(':')
            .ok_or(PipelineError::MissingCredentials)?;

        Ok(Self {
            user_name: UserName::try_new(user_name.to_string())
                .map_err(|_| PipelineError::MissingCredentials)?,
            password: password.to_string(),
        })
    }
}

/// Configuration for the authentication stage
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Paths that bypass authentication
    pub bypass_paths: HashSet<BypassPath>,
    /// Role every authenticated caller must hold, if any
    pub required_role: Option<Role>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let mut bypass_paths = HashSet::new();
        bypass_paths.insert(
            BypassPath::try_new(paths::IS_ALIVE.to_string())
                .expect("IS_ALIVE constant should be a valid path"),
        );

        Self {
            bypass_paths,
            required_role: None,
        }
    }
}

/// Authentication stage state
pub struct BasicAuth {
    config: AuthConfig,
    authenticator: Arc<dyn Authenticator>,
}

impl BasicAuth {
    pub fn new(config: AuthConfig, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            config,
            authenticator,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn bypasses(&self, path: &str) -> bool {
        BypassPath::try_new(path.to_string())
            .map(|path| self.config.bypass_paths.contains(&path))
            .unwrap_or(false)
    }

    /// Resolve the caller behind `headers`, enforcing the required role
    pub async fn authenticate(&self, headers: &HeaderMap) -> PipelineResult<AuthenticatedUser> {
        let credentials = BasicCredentials::from_headers(headers).inspect_err(|_| {
            warn!("Missing or malformed Authorization header");
        })?;

        let role = self
            .authenticator
            .authenticate(&credentials.user_name, &credentials.password)
            .await?
            .ok_or_else(|| {
                warn!(user_name = %credentials.user_name, "Invalid credentials");
                PipelineError::InvalidCredentials
            })?;

        if let Some(required) = &self.config.required_role {
            if &role != required {
                warn!(
                    user_name = %credentials.user_name,
                    role = %role,
                    required_role = %required,
                    "Caller lacks the required role"
                );
                return Err(PipelineError::PermissionDenied);
            }
        }

        Ok(AuthenticatedUser {
            user_name: credentials.user_name,
            role,
        })
    }
}
