//! Connection URI resolution.
//!
//! [`CredentialResolver`] hides the whole exchange behind one call:
//!
//! 1. Exchange the service principal secret for a bearer token (skipped when
//!    the caller already has one).
//! 2. Look up the instance's read-write hostname.
//! 3. Request a scoped database credential with a fresh `request_id`.
//! 4. Compose the `postgresql://` URI.
//!
//! Steps run strictly in this order. When the endpoint lookup fails the
//! credentials endpoint is never called, so a failing lookup always surfaces
//! as [`LakebaseError::EndpointLookup`] even if the credential request would
//! also have failed.
//!
//! Nothing is cached: every call re-authenticates and mints a new
//! credential. Nothing is retried either; see [`crate::retry`] for an opt-in
//! caller-side policy.

use crate::callers::rest::RestCaller;
use crate::database::{LakebaseClient, DEFAULT_API_PREFIX};
use crate::http::HttpCaller;
use crate::oauth::{exchange_client_credentials, ServicePrincipal};
use crate::token::BearerToken;
use crate::uri::ConnectionUri;
use crate::validation::{normalize_base_url, require_non_empty, validate_instance_name};
use crate::{LakebaseError, ResolverConfig, Result};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Resolves connection URIs using an injected [`HttpCaller`].
///
/// The resolver holds no per-call state and can be shared freely; concurrent
/// calls each perform their own token exchange and credential request.
///
/// # Example
///
/// ```no_run
/// use lakebase::callers::rest::RestCaller;
/// use lakebase::{CredentialResolver, ServicePrincipal};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> lakebase::Result<()> {
///     let resolver = CredentialResolver::new(Arc::new(RestCaller::new()?));
///     let principal = ServicePrincipal::new("833d0305-84b4-4746-a67c-e84eec3b7712", "oauth-secret");
///
///     let uri = resolver
///         .resolve("https://adb-123.azuredatabricks.net", &principal, None, "pgh-stateful-backend")
///         .await?;
///
///     println!("connecting with {}", uri); // password is masked
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct CredentialResolver {
    caller: Arc<dyn HttpCaller>,
    api_prefix: String,
}

impl CredentialResolver {
    /// Creates a resolver that sends requests through `caller`.
    pub fn new(caller: Arc<dyn HttpCaller>) -> Self {
        Self {
            caller,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
        }
    }

    /// Overrides the database API prefix.
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    /// Resolves a connection URI for `instance_name`.
    ///
    /// When `bearer_token` is `Some` and non-blank the token exchange is
    /// skipped and the principal secret is not used.
    ///
    /// # Errors
    ///
    /// - [`LakebaseError::InvalidInput`]: a malformed argument; nothing was sent
    /// - [`LakebaseError::AuthExchange`]: step 1 failed; nothing else was sent
    /// - [`LakebaseError::EndpointLookup`]: step 2 failed; no credential requested
    /// - [`LakebaseError::CredentialFetch`]: step 3 failed
    /// - [`LakebaseError::Transport`]: a request got no response
    #[instrument(
        skip(self, principal, bearer_token),
        fields(principal_id = %principal.id(), caller = self.caller.name())
    )]
    pub async fn resolve(
        &self,
        workspace_url: &str,
        principal: &ServicePrincipal,
        bearer_token: Option<BearerToken>,
        instance_name: &str,
    ) -> Result<ConnectionUri> {
        let base_url = normalize_base_url(workspace_url)?;
        require_non_empty("principal id", principal.id())?;
        validate_instance_name(instance_name)?;

        let bearer_token = bearer_token.filter(|token| !token.is_blank());
        if bearer_token.is_none() {
            require_non_empty("principal secret", principal.secret().expose_secret())?;
        }

        let token = match bearer_token {
            Some(token) => {
                debug!("using caller-supplied bearer token");
                token
            }
            None => exchange_client_credentials(&*self.caller, &base_url, principal).await?,
        };

        let client = LakebaseClient::new(Arc::clone(&self.caller), &base_url, token)?
            .with_api_prefix(self.api_prefix.as_str());

        let dns = client.read_write_dns(instance_name).await?;

        let request_id = Uuid::new_v4().to_string();
        let credential = client
            .generate_credential(&[instance_name], &request_id)
            .await?;

        let uri = ConnectionUri::new(principal.id(), credential.token().expose_secret(), dns);
        info!(host = uri.host(), "resolved connection URI");
        Ok(uri)
    }

    /// Resolves a connection URI from a [`ResolverConfig`].
    ///
    /// The config's `api_prefix` takes precedence over the resolver's.
    pub async fn resolve_config(&self, config: &ResolverConfig) -> Result<ConnectionUri> {
        let secret = config
            .principal_secret
            .as_ref()
            .map(|s| s.expose_secret().to_string())
            .unwrap_or_default();
        let principal = ServicePrincipal::new(config.principal_id.as_str(), secret);
        let bearer_token = config
            .bearer_token
            .as_ref()
            .map(|token| BearerToken::new(token.expose_secret()));

        self.clone()
            .with_api_prefix(config.api_prefix.as_str())
            .resolve(&config.workspace_url, &principal, bearer_token, &config.instance_name)
            .await
    }
}

/// Resolves a connection URI over HTTPS with a default [`RestCaller`].
///
/// `existing_bearer_token` may be `None` or an empty string to request a
/// token exchange with `principal_id` / `principal_secret`.
///
/// # Example
///
/// ```no_run
/// #[tokio::main]
/// async fn main() -> lakebase::Result<()> {
///     let uri = lakebase::resolve_connection_uri(
///         "https://adb-123.azuredatabricks.net",
///         "833d0305-84b4-4746-a67c-e84eec3b7712",
///         "oauth-secret",
///         None,
///         "pgh-stateful-backend",
///     )
///     .await?;
///
///     let conn_str = uri.expose_secret(); // hand this to the Postgres driver
///     # let _ = conn_str;
///     Ok(())
/// }
/// ```
pub async fn resolve_connection_uri(
    workspace_base_url: &str,
    principal_id: &str,
    principal_secret: &str,
    existing_bearer_token: Option<&str>,
    database_instance_name: &str,
) -> Result<ConnectionUri> {
    let resolver = CredentialResolver::new(Arc::new(RestCaller::new()?));
    let principal = ServicePrincipal::new(principal_id, principal_secret);
    let bearer_token = existing_bearer_token.map(BearerToken::new);

    resolver
        .resolve(workspace_base_url, &principal, bearer_token, database_instance_name)
        .await
}

/// Resolves a connection URI from a [`ResolverConfig`] with a [`RestCaller`]
/// honoring the configured request timeout.
pub async fn resolve_from_config(config: &ResolverConfig) -> Result<ConnectionUri> {
    let caller = RestCaller::with_timeout(config.request_timeout)?;
    CredentialResolver::new(Arc::new(caller))
        .resolve_config(config)
        .await
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("caller", &self.caller.name())
            .field("api_prefix", &self.api_prefix)
            .finish()
    }
}
