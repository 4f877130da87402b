//! Error types for Lakebase operations.

use std::fmt;
use thiserror::Error;

/// Result type alias using [`LakebaseError`].
pub type Result<T> = std::result::Result<T, LakebaseError>;

/// Boxed error produced by an [`HttpCaller`](crate::HttpCaller) when a request
/// never yields an HTTP response (connection refused, TLS failure, timeout).
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Upstream bodies quoted in error messages are cut to this many characters.
const MAX_BODY_IN_ERROR: usize = 512;

/// The remote operation that was in flight when a transport error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// OAuth client-credentials exchange against `/oidc/v1/token`.
    TokenExchange,
    /// Instance metadata lookup.
    EndpointLookup,
    /// Scoped database credential request.
    CredentialFetch,
    /// Database instance creation.
    Provisioning,
    /// Serving endpoint invocation.
    AgentInvocation,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenExchange => write!(f, "token exchange"),
            Self::EndpointLookup => write!(f, "endpoint lookup"),
            Self::CredentialFetch => write!(f, "credential fetch"),
            Self::Provisioning => write!(f, "instance provisioning"),
            Self::AgentInvocation => write!(f, "agent invocation"),
        }
    }
}

/// Errors that can occur while talking to the workspace API.
///
/// Messages identify the failing step and quote the upstream status and body
/// where one exists. Tokens and secrets are never part of a message.
#[derive(Debug, Error)]
pub enum LakebaseError {
    /// A caller-supplied argument failed validation. No request was sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The OAuth token exchange was rejected or returned no `access_token`.
    #[error("token exchange failed: {reason}")]
    AuthExchange {
        /// Upstream status, when a non-2xx response was received
        status: Option<u16>,
        /// What went wrong, including the upstream body when it is safe to quote
        reason: String,
    },

    /// Instance metadata could not be read or had no `read_write_dns`.
    #[error("endpoint lookup for instance '{instance}' failed: {reason}")]
    EndpointLookup {
        /// Database instance name
        instance: String,
        /// Upstream status, when a non-2xx response was received
        status: Option<u16>,
        /// What went wrong, including upstream status/body when available
        reason: String,
    },

    /// The credentials endpoint failed or returned no `token`.
    #[error("credential fetch for instance '{instance}' failed: {reason}")]
    CredentialFetch {
        /// Database instance name
        instance: String,
        /// Upstream status, when a non-2xx response was received
        status: Option<u16>,
        /// What went wrong, including upstream status/body when available
        reason: String,
    },

    /// Creating a database instance failed.
    #[error("provisioning instance '{instance}' failed: {reason}")]
    Provisioning {
        /// Database instance name
        instance: String,
        /// Upstream status, when a non-2xx response was received
        status: Option<u16>,
        /// What went wrong, including upstream status/body when available
        reason: String,
    },

    /// A serving endpoint answered with something other than 200.
    #[error("agent endpoint '{endpoint}' returned status {status}: {body}")]
    AgentInvocation {
        /// Serving endpoint name
        endpoint: String,
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// No HTTP response was received.
    #[error("{operation}: HTTP transport error: {source}")]
    Transport {
        /// Operation in flight
        operation: Operation,
        /// Underlying client error, unchanged
        #[source]
        source: TransportError,
    },

    /// A query against the database instance failed.
    #[cfg(feature = "postgres")]
    #[error("database {context} failed: {source}")]
    Database {
        /// What was being done (e.g. "connect", "list tables")
        context: &'static str,
        /// Underlying driver error
        #[source]
        source: sqlx::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LakebaseError {
    /// Wraps a transport failure with the operation that was in flight.
    pub fn transport(operation: Operation, source: TransportError) -> Self {
        Self::Transport { operation, source }
    }

    /// Returns `true` if retrying the same call could plausibly succeed.
    ///
    /// Transport failures and upstream 5xx/429 responses are transient.
    /// Rejections (4xx) and malformed responses point at configuration
    /// problems and are not.
    ///
    /// # Example
    ///
    /// ```
    /// use lakebase::LakebaseError;
    ///
    /// let err = LakebaseError::AgentInvocation {
    ///     endpoint: "my-agent".to_string(),
    ///     status: 503,
    ///     body: String::new(),
    /// };
    /// assert!(err.is_transient());
    ///
    /// let err = LakebaseError::AuthExchange {
    ///     status: Some(401),
    ///     reason: "HTTP 401: invalid_client".to_string(),
    /// };
    /// assert!(!err.is_transient());
    /// ```
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::AgentInvocation { status, .. } => is_transient_status(*status),
            Self::AuthExchange { status, .. }
            | Self::EndpointLookup { status, .. }
            | Self::CredentialFetch { status, .. }
            | Self::Provisioning { status, .. } => status.is_some_and(is_transient_status),
            #[cfg(feature = "postgres")]
            Self::Database { source, .. } => {
                matches!(source, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
            }
            _ => false,
        }
    }

    /// Returns the upstream HTTP status, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AgentInvocation { status, .. } => Some(*status),
            Self::AuthExchange { status, .. }
            | Self::EndpointLookup { status, .. }
            | Self::CredentialFetch { status, .. }
            | Self::Provisioning { status, .. } => *status,
            _ => None,
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Formats a non-success response as `HTTP <status>: <body>`.
pub(crate) fn http_status_reason(status: u16, body: &str) -> String {
    format!("HTTP {}: {}", status, truncate_body(body))
}

/// Quotes an upstream body unless it carries `secret_field` as a JSON key, in
/// which case only a placeholder is returned.
pub(crate) fn quote_body_without(body: &str, secret_field: &str) -> String {
    if body.contains(&format!("\"{}\"", secret_field)) {
        format!("<body withheld: contains '{}'>", secret_field)
    } else {
        truncate_body(body)
    }
}

/// Trims an upstream body so it can be quoted in an error message.
pub(crate) fn truncate_body(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= MAX_BODY_IN_ERROR {
        return body.to_string();
    }
    let cut: String = body.chars().take(MAX_BODY_IN_ERROR).collect();
    format!("{}... (truncated)", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = LakebaseError::EndpointLookup {
            instance: "pgh-stateful-backend".to_string(),
            status: Some(404),
            reason: "HTTP 404: not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "endpoint lookup for instance 'pgh-stateful-backend' failed: HTTP 404: not found"
        );
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_transport_error_keeps_source() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = LakebaseError::transport(Operation::TokenExchange, Box::new(inner));

        assert!(err.to_string().starts_with("token exchange: HTTP transport error"));
        assert!(err.source().is_some());
        assert!(err.is_transient());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_transient_classification() {
        let server_error = LakebaseError::CredentialFetch {
            instance: "db".to_string(),
            status: Some(502),
            reason: http_status_reason(502, "bad gateway"),
        };
        assert!(server_error.is_transient());

        let throttled = LakebaseError::AuthExchange {
            status: Some(429),
            reason: http_status_reason(429, ""),
        };
        assert!(throttled.is_transient());

        let missing_field = LakebaseError::CredentialFetch {
            instance: "db".to_string(),
            status: None,
            reason: "response has no 'token' field: {}".to_string(),
        };
        assert!(!missing_field.is_transient());

        let not_found = LakebaseError::EndpointLookup {
            instance: "db".to_string(),
            status: Some(404),
            reason: http_status_reason(404, "{}"),
        };
        assert!(!not_found.is_transient());

        assert!(!LakebaseError::InvalidInput("empty".to_string()).is_transient());
    }

    #[test]
    fn test_classification_ignores_reason_text() {
        // A body that looks like a status line must not change the outcome.
        let err = LakebaseError::Provisioning {
            instance: "db".to_string(),
            status: Some(400),
            reason: "HTTP 503: quoted from upstream".to_string(),
        };
        assert!(!err.is_transient());

        let err = LakebaseError::AuthExchange {
            status: None,
            reason: "HTTP 500: not really".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_quote_body_without_secret_field() {
        assert_eq!(
            quote_body_without(r#"{"error":"invalid_client"}"#, "access_token"),
            r#"{"error":"invalid_client"}"#
        );

        let quoted = quote_body_without(r#"{"access_token":42}"#, "access_token");
        assert!(!quoted.contains("42"));
        assert!(quoted.contains("withheld"));

        assert_eq!(
            quote_body_without("invalid token for workspace", "token"),
            "invalid token for workspace"
        );
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("  short  "), "short");

        let long = "x".repeat(600);
        let cut = truncate_body(&long);
        assert!(cut.ends_with("... (truncated)"));
        assert_eq!(cut.len(), 512 + "... (truncated)".len());
    }
}
