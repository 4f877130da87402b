//! Configuration for resolving connection URIs.

use crate::database::DEFAULT_API_PREFIX;
use crate::{LakebaseError, Result};
use secrecy::SecretString;
use std::time::Duration;

/// Environment variable holding the workspace base URL.
pub const ENV_HOST: &str = "DATABRICKS_HOST";
/// Environment variable holding the service principal id.
pub const ENV_CLIENT_ID: &str = "DATABRICKS_CLIENT_ID";
/// Environment variable holding the service principal OAuth secret.
pub const ENV_CLIENT_SECRET: &str = "DATABRICKS_CLIENT_SECRET";
/// Environment variable holding an existing bearer token.
pub const ENV_TOKEN: &str = "DATABRICKS_TOKEN";
/// Environment variable holding the database instance name.
pub const ENV_INSTANCE_NAME: &str = "LAKEBASE_INSTANCE_NAME";
/// Environment variable overriding the database API prefix.
pub const ENV_API_PREFIX: &str = "LAKEBASE_API_PREFIX";

/// Everything needed to resolve one connection URI.
///
/// Use the builder methods for ergonomic configuration:
///
/// ```
/// use lakebase::ResolverConfig;
/// use std::time::Duration;
///
/// let config = ResolverConfig::new("https://adb-123.azuredatabricks.net", "sp-1", "pgh-stateful-backend")
///     .with_secret("sp-oauth-secret")
///     .with_request_timeout(Duration::from_secs(30));
///
/// assert_eq!(config.api_prefix, "/api/2.0/database");
/// assert!(config.bearer_token.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Workspace base URL
    pub workspace_url: String,

    /// Service principal id (OAuth client id and Postgres user)
    pub principal_id: String,

    /// Service principal OAuth secret; required unless `bearer_token` is set
    pub principal_secret: Option<SecretString>,

    /// Existing bearer token; skips the token exchange when set
    pub bearer_token: Option<SecretString>,

    /// Database instance name
    pub instance_name: String,

    /// Database API prefix (default: `/api/2.0/database`)
    pub api_prefix: String,

    /// Per-request timeout for the default HTTP caller (default: none)
    pub request_timeout: Option<Duration>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            workspace_url: String::new(),
            principal_id: String::new(),
            principal_secret: None,
            bearer_token: None,
            instance_name: String::new(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            request_timeout: None,
        }
    }
}

impl ResolverConfig {
    /// Creates a configuration for the given workspace, principal and
    /// instance.
    pub fn new(
        workspace_url: impl Into<String>,
        principal_id: impl Into<String>,
        instance_name: impl Into<String>,
    ) -> Self {
        Self {
            workspace_url: workspace_url.into(),
            principal_id: principal_id.into(),
            instance_name: instance_name.into(),
            ..Default::default()
        }
    }

    /// Sets the service principal OAuth secret.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.principal_secret = Some(SecretString::from(secret.into()));
        self
    }

    /// Sets an existing bearer token. An empty token is treated as unset.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.bearer_token = if token.trim().is_empty() {
            None
        } else {
            Some(SecretString::from(token))
        };
        self
    }

    /// Sets the database API prefix.
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    /// Sets the per-request timeout used by the default HTTP caller.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Reads configuration from the process environment.
    ///
    /// | Variable | Field | Required |
    /// |----------|-------|----------|
    /// | `DATABRICKS_HOST` | `workspace_url` | yes |
    /// | `DATABRICKS_CLIENT_ID` | `principal_id` | yes |
    /// | `LAKEBASE_INSTANCE_NAME` | `instance_name` | yes |
    /// | `DATABRICKS_CLIENT_SECRET` | `principal_secret` | unless a token is set |
    /// | `DATABRICKS_TOKEN` | `bearer_token` | no |
    /// | `LAKEBASE_API_PREFIX` | `api_prefix` | no |
    ///
    /// # Errors
    ///
    /// Returns [`LakebaseError::InvalidInput`] naming the first missing
    /// required variable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// [`from_env`](Self::from_env) is this with `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| {
                LakebaseError::InvalidInput(format!("environment variable {} is not set", key))
            })
        };

        let mut config = Self::new(
            required(ENV_HOST)?,
            required(ENV_CLIENT_ID)?,
            required(ENV_INSTANCE_NAME)?,
        );

        if let Some(secret) = get(ENV_CLIENT_SECRET) {
            config = config.with_secret(secret);
        }
        if let Some(token) = get(ENV_TOKEN) {
            config = config.with_bearer_token(token);
        }
        if let Some(prefix) = get(ENV_API_PREFIX) {
            config = config.with_api_prefix(prefix);
        }

        if config.principal_secret.is_none() && config.bearer_token.is_none() {
            return Err(LakebaseError::InvalidInput(format!(
                "either {} or {} must be set",
                ENV_CLIENT_SECRET, ENV_TOKEN
            )));
        }

        Ok(config)
    }
}
