//! OAuth 2.0 client-credentials exchange for service principals.

use crate::error::{http_status_reason, quote_body_without, Operation};
use crate::http::{Auth, Body, HttpCaller};
use crate::token::{seconds_from, BearerToken};
use crate::validation::join_url;
use crate::{LakebaseError, Result};
use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, instrument, warn};

/// Token endpoint, relative to the workspace base URL.
pub const TOKEN_PATH: &str = "/oidc/v1/token";

/// Grant type sent in the form body.
pub const GRANT_TYPE: &str = "client_credentials";

/// Scope requested for the token.
pub const SCOPE: &str = "all-apis";

const ACCESS_TOKEN_FIELD: &str = "access_token";

/// A service principal: a machine identity plus its long-lived OAuth secret.
///
/// The id doubles as the Postgres user name in the connection URI.
#[derive(Debug, Clone)]
pub struct ServicePrincipal {
    id: String,
    secret: SecretString,
}

impl ServicePrincipal {
    /// Creates a principal from its id and secret.
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    /// Returns the principal id (OAuth client id).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the principal secret.
    pub fn secret(&self) -> &SecretString {
        &self.secret
    }
}

/// Exchanges a service principal's credentials for a bearer token.
///
/// Sends `POST {base_url}/oidc/v1/token` with HTTP Basic authentication and
/// the form body `grant_type=client_credentials&scope=all-apis`.
///
/// `base_url` must already be normalized (see
/// [`normalize_base_url`](crate::validation::normalize_base_url)).
///
/// # Errors
///
/// - [`LakebaseError::AuthExchange`]: non-2xx status, a body that is not JSON,
///   or no `access_token` in the response. A body that mentions
///   `access_token` is never quoted in the message.
/// - [`LakebaseError::Transport`]: no response was received
#[instrument(skip(caller, principal), fields(principal_id = %principal.id()))]
pub async fn exchange_client_credentials(
    caller: &dyn HttpCaller,
    base_url: &str,
    principal: &ServicePrincipal,
) -> Result<BearerToken> {
    let url = join_url(base_url, TOKEN_PATH);
    let auth = Auth::Basic {
        username: principal.id().to_string(),
        password: principal.secret().clone(),
    };
    let body = Body::Form(vec![
        ("grant_type".to_string(), GRANT_TYPE.to_string()),
        ("scope".to_string(), SCOPE.to_string()),
    ]);

    let response = caller
        .post(&url, &auth, body)
        .await
        .map_err(|e| LakebaseError::transport(Operation::TokenExchange, e))?;

    if !response.is_success() {
        warn!(status = response.status, "token endpoint rejected the exchange");
        return Err(LakebaseError::AuthExchange {
            status: Some(response.status),
            reason: http_status_reason(
                response.status,
                &quote_body_without(&response.body, ACCESS_TOKEN_FIELD),
            ),
        });
    }

    let parsed: Value = response.json().map_err(|e| LakebaseError::AuthExchange {
        status: None,
        reason: format!(
            "response is not valid JSON ({}): {}",
            e,
            quote_body_without(&response.body, ACCESS_TOKEN_FIELD)
        ),
    })?;

    let access_token = parsed
        .get(ACCESS_TOKEN_FIELD)
        .and_then(Value::as_str)
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| LakebaseError::AuthExchange {
            status: None,
            reason: format!(
                "response has no usable '{}' field: {}",
                ACCESS_TOKEN_FIELD,
                quote_body_without(&response.body, ACCESS_TOKEN_FIELD)
            ),
        })?;

    // Optional; an unreadable lifetime leaves the expiry unknown.
    let expires_in = parsed.get("expires_in").and_then(seconds_from);

    debug!(expires_in = ?expires_in, "obtained bearer token");
    Ok(BearerToken::from_exchange(access_token, expires_in))
}
