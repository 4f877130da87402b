//! Client for the workspace database API.
//!
//! Covers the three calls the resolver and the provisioning workflow need:
//! instance metadata lookup, scoped credential generation, and instance
//! creation.

use crate::error::{http_status_reason, quote_body_without, truncate_body, Operation};
use crate::http::{Auth, Body, HttpCaller};
use crate::token::{timestamp_from, BearerToken, DatabaseCredential};
use crate::validation::{join_url, validate_instance_name};
use crate::{LakebaseError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Default API prefix for database endpoints.
pub const DEFAULT_API_PREFIX: &str = "/api/2.0/database";

/// Capacity used when provisioning a new instance.
pub const DEFAULT_CAPACITY: &str = "CU_1";

/// Instance metadata as returned by `GET {api_prefix}/instances/{name}`.
///
/// Every field is optional on the wire. A field with an unexpected shape is
/// dropped rather than failing the whole lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInstance {
    /// Instance name; empty when the response omits it
    #[serde(default, deserialize_with = "lenient_name")]
    pub name: String,

    /// Read-write hostname; absent while the instance is still starting
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub read_write_dns: Option<String>,

    /// Read-only hostname, when readable secondaries exist
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub read_only_dns: Option<String>,

    /// Lifecycle state (e.g. `STARTING`, `AVAILABLE`)
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<String>,

    /// Compute capacity (e.g. `CU_1`)
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub capacity: Option<String>,

    /// Server-assigned unique id
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub uid: Option<String>,

    /// Postgres major version
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub pg_version: Option<String>,

    /// Identity that created the instance
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub creator: Option<String>,

    /// Creation timestamp
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub creation_time: Option<DateTime<Utc>>,
}

const TOKEN_FIELD: &str = "token";

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_name<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_string(deserializer).map(Option::unwrap_or_default)
}

fn lenient_timestamp<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(timestamp_from))
}

/// Database API client bound to one workspace and bearer token.
///
/// # Example
///
/// ```no_run
/// use lakebase::callers::rest::RestCaller;
/// use lakebase::{BearerToken, LakebaseClient};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> lakebase::Result<()> {
///     let caller = Arc::new(RestCaller::new()?);
///     let client = LakebaseClient::new(
///         caller,
///         "https://adb-123.azuredatabricks.net",
///         BearerToken::new("dapi-..."),
///     )?;
///
///     let instance = client.create_instance("pgh-stateful-backend", "CU_1").await?;
///     println!("created {}", instance.name);
///     Ok(())
/// }
/// ```
pub struct LakebaseClient {
    caller: Arc<dyn HttpCaller>,
    base_url: String,
    auth: Auth,
    api_prefix: String,
}

impl LakebaseClient {
    /// Creates a client for `base_url` using `token` on every request.
    ///
    /// # Errors
    ///
    /// Returns [`LakebaseError::InvalidInput`] if the base URL is malformed
    /// or the token is blank.
    pub fn new(
        caller: Arc<dyn HttpCaller>,
        base_url: &str,
        token: BearerToken,
    ) -> Result<Self> {
        let base_url = crate::validation::normalize_base_url(base_url)?;
        if token.is_blank() {
            return Err(LakebaseError::InvalidInput(
                "bearer token cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            caller,
            base_url,
            auth: Auth::Bearer(token.secret().clone()),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
        })
    }

    /// Overrides the API prefix (default `/api/2.0/database`).
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.api_prefix = format!("/{}", prefix.trim_matches('/'));
        self
    }

    /// Returns the API prefix in use.
    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, &format!("{}/{}", self.api_prefix, path))
    }

    /// Fetches instance metadata.
    ///
    /// # Errors
    ///
    /// - [`LakebaseError::EndpointLookup`]: non-2xx status or unparseable body
    /// - [`LakebaseError::Transport`]: no response was received
    #[instrument(skip(self))]
    pub async fn get_instance(&self, name: &str) -> Result<DatabaseInstance> {
        validate_instance_name(name)?;
        let lookup_error = |status: Option<u16>, reason: String| {
            LakebaseError::EndpointLookup {
                instance: name.to_string(),
                status,
                reason,
            }
        };

        let response = self
            .caller
            .get(&self.url(&format!("instances/{}", name)), &self.auth)
            .await
            .map_err(|e| LakebaseError::transport(Operation::EndpointLookup, e))?;

        if !response.is_success() {
            warn!(status = response.status, "instance lookup failed");
            return Err(lookup_error(
                Some(response.status),
                http_status_reason(response.status, &response.body),
            ));
        }

        response.json().map_err(|e| {
            lookup_error(
                None,
                format!(
                    "unexpected instance metadata ({}): {}",
                    e,
                    truncate_body(&response.body)
                ),
            )
        })
    }

    /// Resolves the read-write hostname of an instance.
    ///
    /// # Errors
    ///
    /// Same as [`get_instance`](Self::get_instance), plus
    /// [`LakebaseError::EndpointLookup`] when the instance has no
    /// `read_write_dns` yet.
    pub async fn read_write_dns(&self, name: &str) -> Result<String> {
        let instance = self.get_instance(name).await?;
        let dns = instance
            .read_write_dns
            .filter(|dns| !dns.trim().is_empty())
            .ok_or_else(|| LakebaseError::EndpointLookup {
                instance: name.to_string(),
                status: None,
                reason: format!(
                    "instance metadata has no 'read_write_dns' (state: {})",
                    instance.state.as_deref().unwrap_or("unknown")
                ),
            })?;

        debug!(instance = name, dns = %dns, "resolved read-write endpoint");
        Ok(dns)
    }

    /// Requests a credential scoped to `instance_names`.
    ///
    /// `request_id` is sent as the idempotency key; callers must use a fresh
    /// value per request.
    ///
    /// # Errors
    ///
    /// - [`LakebaseError::CredentialFetch`]: non-2xx status, a body that is
    ///   not JSON, or no `token` in the response. A body that mentions `token`
    ///   is never quoted in the message.
    /// - [`LakebaseError::Transport`]: no response was received
    #[instrument(skip(self))]
    pub async fn generate_credential(
        &self,
        instance_names: &[&str],
        request_id: &str,
    ) -> Result<DatabaseCredential> {
        let first = instance_names.first().ok_or_else(|| {
            LakebaseError::InvalidInput("at least one instance name is required".to_string())
        })?;
        for name in instance_names {
            validate_instance_name(name)?;
        }

        let fetch_error = |status: Option<u16>, reason: String| {
            LakebaseError::CredentialFetch {
                instance: instance_names.join(","),
                status,
                reason,
            }
        };

        let body = Body::Json(json!({
            "instance_names": instance_names,
            "request_id": request_id,
        }));

        let response = self
            .caller
            .post(&self.url("credentials"), &self.auth, body)
            .await
            .map_err(|e| LakebaseError::transport(Operation::CredentialFetch, e))?;

        if !response.is_success() {
            warn!(status = response.status, instance = %first, "credential request failed");
            return Err(fetch_error(
                Some(response.status),
                http_status_reason(
                    response.status,
                    &quote_body_without(&response.body, TOKEN_FIELD),
                ),
            ));
        }

        let parsed: Value = response.json().map_err(|e| {
            fetch_error(
                None,
                format!(
                    "response is not valid JSON ({}): {}",
                    e,
                    quote_body_without(&response.body, TOKEN_FIELD)
                ),
            )
        })?;

        let token = parsed
            .get(TOKEN_FIELD)
            .and_then(Value::as_str)
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                fetch_error(
                    None,
                    format!(
                        "response has no usable '{}' field: {}",
                        TOKEN_FIELD,
                        quote_body_without(&response.body, TOKEN_FIELD)
                    ),
                )
            })?;

        // Optional; an unreadable expiry is dropped.
        let expiration_time = parsed.get("expiration_time").and_then(timestamp_from);

        debug!(expiration_time = ?expiration_time, "obtained database credential");
        Ok(DatabaseCredential::new(token, expiration_time))
    }

    /// Creates a new database instance.
    ///
    /// Instances take a while to start; the returned metadata usually has no
    /// `read_write_dns` until the state reaches `AVAILABLE`.
    ///
    /// # Errors
    ///
    /// - [`LakebaseError::Provisioning`]: non-2xx status (including an
    ///   instance that already exists) or unparseable body
    /// - [`LakebaseError::Transport`]: no response was received
    #[instrument(skip(self))]
    pub async fn create_instance(&self, name: &str, capacity: &str) -> Result<DatabaseInstance> {
        validate_instance_name(name)?;
        crate::validation::require_non_empty("capacity", capacity)?;

        let provisioning_error = |status: Option<u16>, reason: String| {
            LakebaseError::Provisioning {
                instance: name.to_string(),
                status,
                reason,
            }
        };

        let body = Body::Json(json!({ "name": name, "capacity": capacity }));
        let response = self
            .caller
            .post(&self.url("instances"), &self.auth, body)
            .await
            .map_err(|e| LakebaseError::transport(Operation::Provisioning, e))?;

        if !response.is_success() {
            warn!(status = response.status, "instance creation failed");
            return Err(provisioning_error(
                Some(response.status),
                http_status_reason(response.status, &response.body),
            ));
        }

        let instance: DatabaseInstance = response.json().map_err(|e| {
            provisioning_error(
                None,
                format!(
                    "unexpected instance metadata ({}): {}",
                    e,
                    truncate_body(&response.body)
                ),
            )
        })?;

        info!(instance = %instance.name, state = ?instance.state, "created database instance");
        Ok(instance)
    }
}
