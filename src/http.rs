//! HTTP capability used by every workspace API call.
//!
//! This module defines the [`HttpCaller`] trait that the resolver, the
//! database client, and the agent client are written against. Production code
//! uses [`RestCaller`](crate::callers::rest::RestCaller); tests inject
//! [`MockCaller`](crate::callers::mock::MockCaller) or point a `RestCaller` at
//! a local mock server.

use crate::error::TransportError;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::de::DeserializeOwned;

/// How a request authenticates.
#[derive(Debug, Clone)]
pub enum Auth {
    /// HTTP Basic authentication (used only for the OAuth token exchange).
    Basic {
        /// Client id
        username: String,
        /// Client secret
        password: SecretString,
    },
    /// `Authorization: Bearer <token>`.
    Bearer(SecretString),
}

impl Auth {
    /// Short label for logs; never includes credential material.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Basic { .. } => "basic",
            Self::Bearer(_) => "bearer",
        }
    }
}

/// Request body for `POST`.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Sent as `application/json`.
    Json(serde_json::Value),
    /// Sent as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
}

/// A received HTTP response, fully buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Raw response body
    pub body: String,
}

impl HttpResponse {
    /// Creates a response from a status and body.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns `true` for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parses the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

/// Minimal HTTP client interface.
///
/// Implementations return `Ok` for every response that arrived, whatever its
/// status; interpreting the status is the caller's job. `Err` is reserved for
/// requests that produced no response at all.
///
/// Bearer-authenticated requests must send `Content-Type: application/json`
/// and `Accept: application/json`.
///
/// All implementations must be `Send + Sync` so one caller can be shared
/// across tasks.
#[async_trait]
pub trait HttpCaller: Send + Sync {
    /// Returns the implementation name (e.g., "rest", "mock").
    fn name(&self) -> &str;

    /// Sends a `GET` request.
    async fn get(&self, url: &str, auth: &Auth) -> Result<HttpResponse, TransportError>;

    /// Sends a `POST` request with the given body.
    async fn post(&self, url: &str, auth: &Auth, body: Body)
        -> Result<HttpResponse, TransportError>;
}
