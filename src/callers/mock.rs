//! Mock HTTP caller for testing.
//!
//! This caller answers from canned responses keyed by method and path,
//! records every request it sees, and can inject transport failures to
//! simulate an unreachable workspace.

use crate::error::TransportError;
use crate::http::{Auth, Body, HttpCaller, HttpResponse};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A request observed by [`MockCaller`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// `GET` or `POST`
    pub method: String,
    /// Full request URL
    pub url: String,
    /// Path component of the URL
    pub path: String,
    /// Authentication used for the request
    pub auth: Auth,
    /// Body, for `POST`
    pub body: Option<Body>,
}

#[derive(Debug, Clone)]
enum Reply {
    Response(HttpResponse),
    TransportFailure(String),
}

type RouteKey = (String, String);

/// Mock HTTP caller.
///
/// Clones share state, so a test can hand one clone to the code under test
/// and keep another for setup and assertions. Each route holds a queue of
/// replies; the last reply is sticky and repeats once the queue is drained.
/// Unrouted requests get a 404.
///
/// # Example
///
/// ```
/// use lakebase::callers::mock::MockCaller;
/// use lakebase::{Auth, HttpCaller};
/// use secrecy::SecretString;
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() {
///     let mock = MockCaller::new();
///     mock.respond("GET", "/api/2.0/database/instances/db", 200, json!({"read_write_dns": "h"}))
///         .await;
///
///     let auth = Auth::Bearer(SecretString::from("t".to_string()));
///     let resp = mock
///         .get("https://host/api/2.0/database/instances/db", &auth)
///         .await
///         .unwrap();
///     assert_eq!(resp.status, 200);
///     assert_eq!(mock.calls_to("/api/2.0/database/instances/db").await, 1);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockCaller {
    routes: Arc<RwLock<HashMap<RouteKey, VecDeque<Reply>>>>,
    calls: Arc<RwLock<Vec<RecordedCall>>>,
}

impl MockCaller {
    /// Creates a mock caller with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a JSON response for `method path`.
    pub async fn respond(&self, method: &str, path: &str, status: u16, body: serde_json::Value) {
        self.push(method, path, Reply::Response(HttpResponse::new(status, body.to_string())))
            .await;
    }

    /// Queues a raw-body response for `method path`.
    pub async fn respond_raw(&self, method: &str, path: &str, status: u16, body: &str) {
        self.push(method, path, Reply::Response(HttpResponse::new(status, body)))
            .await;
    }

    /// Queues a transport failure (no response) for `method path`.
    pub async fn fail(&self, method: &str, path: &str, message: &str) {
        self.push(method, path, Reply::TransportFailure(message.to_string()))
            .await;
    }

    /// Returns every recorded request, oldest first.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Counts recorded requests whose path equals `path`.
    pub async fn calls_to(&self, path: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|call| call.path == path)
            .count()
    }

    async fn push(&self, method: &str, path: &str, reply: Reply) {
        let mut routes = self.routes.write().await;
        routes
            .entry((method.to_uppercase(), path.to_string()))
            .or_default()
            .push_back(reply);
    }

    async fn dispatch(
        &self,
        method: &str,
        url: &str,
        auth: &Auth,
        body: Option<Body>,
    ) -> Result<HttpResponse, TransportError> {
        let path = path_of(url);

        self.calls.write().await.push(RecordedCall {
            method: method.to_string(),
            url: url.to_string(),
            path: path.clone(),
            auth: auth.clone(),
            body,
        });

        let reply = {
            let mut routes = self.routes.write().await;
            match routes.get_mut(&(method.to_string(), path)) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Response(resp)) => Ok(resp),
            Some(Reply::TransportFailure(message)) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                message,
            ))),
            None => Ok(HttpResponse::new(
                404,
                r#"{"error_code":"NOT_FOUND","message":"no mock route"}"#,
            )),
        }
    }
}

fn path_of(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    }
}

#[async_trait]
impl HttpCaller for MockCaller {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get(&self, url: &str, auth: &Auth) -> Result<HttpResponse, TransportError> {
        self.dispatch("GET", url, auth, None).await
    }

    async fn post(&self, url: &str, auth: &Auth, body: Body) -> Result<HttpResponse, TransportError> {
        self.dispatch("POST", url, auth, Some(body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serde_json::json;

    fn bearer() -> Auth {
        Auth::Bearer(SecretString::from("tok".to_string()))
    }

    #[tokio::test]
    async fn test_queued_replies_then_sticky_last() {
        let mock = MockCaller::new();
        mock.respond("GET", "/x", 500, json!({})).await;
        mock.respond("GET", "/x", 200, json!({"ok": true})).await;

        let first = mock.get("https://h/x", &bearer()).await.unwrap();
        let second = mock.get("https://h/x", &bearer()).await.unwrap();
        let third = mock.get("https://h/x", &bearer()).await.unwrap();

        assert_eq!(first.status, 500);
        assert_eq!(second.status, 200);
        assert_eq!(third.status, 200);
    }

    #[tokio::test]
    async fn test_unrouted_is_404() {
        let mock = MockCaller::new();
        let resp = mock.get("https://h/nowhere", &bearer()).await.unwrap();
        assert_eq!(resp.status, 404);
    }

    #[tokio::test]
    async fn test_transport_failure_injection() {
        let mock = MockCaller::new();
        mock.fail("POST", "/oidc/v1/token", "connection refused").await;

        let result = mock
            .post("https://h/oidc/v1/token", &bearer(), Body::Form(vec![]))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_calls_are_recorded_across_clones() {
        let mock = MockCaller::new();
        let handle = mock.clone();

        mock.post("https://h/api/2.0/database/credentials", &bearer(), Body::Json(json!({})))
            .await
            .unwrap();

        let calls = handle.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, "POST");
        assert_eq!(calls[0].path, "/api/2.0/database/credentials");
        assert_eq!(calls[0].body, Some(Body::Json(json!({}))));
        assert_eq!(handle.calls_to("/api/2.0/database/credentials").await, 1);
    }
}
