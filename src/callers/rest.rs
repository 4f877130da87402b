//! `reqwest`-backed HTTP caller.

use crate::error::TransportError;
use crate::http::{Auth, Body, HttpCaller, HttpResponse};
use crate::{LakebaseError, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("lakebase-rs/", env!("CARGO_PKG_VERSION"));

/// Production [`HttpCaller`] over a shared `reqwest::Client`.
///
/// The client keeps its own connection pool; cloning a `RestCaller` shares it.
///
/// # Example
///
/// ```no_run
/// use lakebase::callers::rest::RestCaller;
/// use std::time::Duration;
///
/// let caller = RestCaller::with_timeout(Some(Duration::from_secs(30)))?;
/// # Ok::<(), lakebase::LakebaseError>(())
/// ```
#[derive(Debug, Clone)]
pub struct RestCaller {
    client: Client,
}

impl RestCaller {
    /// Creates a caller with no request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self> {
        Self::with_timeout(None)
    }

    /// Creates a caller whose requests time out after `timeout`, if set.
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|e| {
            LakebaseError::Other(anyhow::anyhow!("failed to build HTTP client: {}", e))
        })?;

        Ok(Self { client })
    }

    /// Wraps an existing `reqwest::Client`.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn execute(&self, request: RequestBuilder) -> std::result::Result<HttpResponse, TransportError> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, bytes = body.len(), "received response");
        Ok(HttpResponse { status, body })
    }
}

fn apply_auth(request: RequestBuilder, auth: &Auth) -> RequestBuilder {
    match auth {
        Auth::Basic { username, password } => {
            request.basic_auth(username, Some(password.expose_secret()))
        }
        Auth::Bearer(token) => request
            .bearer_auth(token.expose_secret())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json"),
    }
}

#[async_trait]
impl HttpCaller for RestCaller {
    fn name(&self) -> &str {
        "rest"
    }

    async fn get(&self, url: &str, auth: &Auth) -> std::result::Result<HttpResponse, TransportError> {
        debug!(method = "GET", url, auth = auth.scheme(), "sending request");
        let request = apply_auth(self.client.get(url), auth);
        self.execute(request).await
    }

    async fn post(
        &self,
        url: &str,
        auth: &Auth,
        body: Body,
    ) -> std::result::Result<HttpResponse, TransportError> {
        debug!(method = "POST", url, auth = auth.scheme(), "sending request");
        let request = apply_auth(self.client.post(url), auth);
        let request = match body {
            Body::Json(value) => request.json(&value),
            Body::Form(pairs) => request.form(&pairs),
        };
        self.execute(request).await
    }
}
