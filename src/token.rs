//! Short-lived tokens handed out by the workspace API.
//!
//! Neither type here is ever written to disk or cached between resolver
//! invocations. Both wrap their secret in [`SecretString`] so `Debug` output
//! is redacted.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

/// OAuth access token used as `Authorization: Bearer` on API calls.
#[derive(Debug, Clone)]
pub struct BearerToken {
    value: SecretString,
    obtained_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl BearerToken {
    /// Wraps a token obtained elsewhere (e.g. an ambient session token).
    ///
    /// The expiry is unknown, so [`is_expired`](Self::is_expired) always
    /// returns `false` for such tokens.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: SecretString::from(value.into()),
            obtained_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Builds a token from an OAuth response, computing the expiry from
    /// `expires_in` seconds when the server reported it.
    pub fn from_exchange(value: impl Into<String>, expires_in: Option<u64>) -> Self {
        let obtained_at = Utc::now();
        let expires_at = expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| obtained_at + Duration::seconds(secs));

        Self {
            value: SecretString::from(value.into()),
            obtained_at,
            expires_at,
        }
    }

    /// Returns the token material.
    pub fn secret(&self) -> &SecretString {
        &self.value
    }

    /// When the token was obtained.
    pub fn obtained_at(&self) -> DateTime<Utc> {
        self.obtained_at
    }

    /// When the token expires, if the issuer said.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns `true` once a known expiry has passed.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    pub(crate) fn is_blank(&self) -> bool {
        self.value.expose_secret().trim().is_empty()
    }
}

/// Password-equivalent credential scoped to named database instances.
#[derive(Debug, Clone)]
pub struct DatabaseCredential {
    token: SecretString,
    expiration_time: Option<DateTime<Utc>>,
}

impl DatabaseCredential {
    /// Creates a credential from the API's `token` and optional
    /// `expiration_time`.
    pub fn new(token: impl Into<String>, expiration_time: Option<DateTime<Utc>>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            expiration_time,
        }
    }

    /// Returns the credential material.
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// When the credential stops being accepted, if reported.
    pub fn expiration_time(&self) -> Option<DateTime<Utc>> {
        self.expiration_time
    }
}

/// Reads a lifetime in seconds sent either as a JSON number or a numeric
/// string. Anything else yields `None`.
pub(crate) fn seconds_from(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads a timestamp sent as RFC 3339 or as Unix seconds (number or numeric
/// string). Anything else yields `None`.
pub(crate) fn timestamp_from(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|at| at.with_timezone(&Utc))
                .ok()
                .or_else(|| s.parse::<i64>().ok().and_then(|secs| DateTime::from_timestamp(secs, 0)))
        }
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}
