//! Client for querying a deployed agent serving endpoint.
//!
//! A deployed agent persists its conversation state in the checkpoint store,
//! keyed by the `thread_id` and `user_id` passed as custom inputs. Reusing a
//! thread id across invocations continues the same conversation.

use crate::error::{truncate_body, Operation};
use crate::http::{Auth, Body, HttpCaller};
use crate::token::BearerToken;
use crate::validation::{join_url, normalize_base_url, require_non_empty, validate_endpoint_name};
use crate::{LakebaseError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `user`, `assistant` or `system`
    pub role: String,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// Creates a message with an arbitrary role.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Creates a `user` message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/// Custom inputs the agent requires alongside the messages.
///
/// Without a `thread_id` the agent starts a fresh conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomInputs {
    /// End user the conversation belongs to
    pub user_id: String,
    /// Conversation thread to continue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl CustomInputs {
    /// Inputs for a new conversation.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            thread_id: None,
        }
    }

    /// Continues the given thread.
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }
}

#[derive(Serialize)]
struct InvocationRequest<'a> {
    messages: &'a [ChatMessage],
    custom_inputs: &'a CustomInputs,
}

/// Returns a fresh thread id for a new conversation.
pub fn new_thread_id() -> String {
    Uuid::new_v4().to_string()
}

/// Invokes serving endpoints in one workspace.
///
/// # Example
///
/// ```no_run
/// use lakebase::agent::{new_thread_id, AgentClient, ChatMessage, CustomInputs};
/// use lakebase::callers::rest::RestCaller;
/// use lakebase::BearerToken;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> lakebase::Result<()> {
///     let client = AgentClient::new(
///         Arc::new(RestCaller::new()?),
///         "https://adb-123.azuredatabricks.net",
///         BearerToken::new("dapi-..."),
///     )?;
///
///     let inputs = CustomInputs::new("user_123").with_thread_id(new_thread_id());
///     client
///         .invoke("postgres_linked_agent", &[ChatMessage::user("I have a dog called charles.")], &inputs)
///         .await?;
///     let reply = client
///         .invoke("postgres_linked_agent", &[ChatMessage::user("whats my dogs name?")], &inputs)
///         .await?;
///     println!("{}", reply);
///     Ok(())
/// }
/// ```
pub struct AgentClient {
    caller: Arc<dyn HttpCaller>,
    base_url: String,
    auth: Auth,
}

impl AgentClient {
    /// Creates a client for `base_url` using `token` on every request.
    pub fn new(caller: Arc<dyn HttpCaller>, base_url: &str, token: BearerToken) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;
        if token.is_blank() {
            return Err(LakebaseError::InvalidInput(
                "bearer token cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            caller,
            base_url,
            auth: Auth::Bearer(token.secret().clone()),
        })
    }

    /// Sends `messages` to the serving endpoint and returns its JSON reply.
    ///
    /// # Errors
    ///
    /// - [`LakebaseError::InvalidInput`]: bad endpoint name, no messages, or
    ///   empty `user_id`
    /// - [`LakebaseError::AgentInvocation`]: any status other than 200
    /// - [`LakebaseError::Json`]: a 200 reply that is not JSON
    /// - [`LakebaseError::Transport`]: no response was received
    #[instrument(skip(self, messages, custom_inputs), fields(messages = messages.len()))]
    pub async fn invoke(
        &self,
        endpoint: &str,
        messages: &[ChatMessage],
        custom_inputs: &CustomInputs,
    ) -> Result<serde_json::Value> {
        validate_endpoint_name(endpoint)?;
        require_non_empty("user_id", &custom_inputs.user_id)?;
        if messages.is_empty() {
            return Err(LakebaseError::InvalidInput(
                "at least one message is required".to_string(),
            ));
        }

        let url = join_url(
            &self.base_url,
            &format!("/serving-endpoints/{}/invocations", endpoint),
        );
        let body = serde_json::to_value(InvocationRequest {
            messages,
            custom_inputs,
        })?;

        let response = self
            .caller
            .post(&url, &self.auth, Body::Json(body))
            .await
            .map_err(|e| LakebaseError::transport(Operation::AgentInvocation, e))?;

        if response.status != 200 {
            warn!(status = response.status, "agent invocation failed");
            return Err(LakebaseError::AgentInvocation {
                endpoint: endpoint.to_string(),
                status: response.status,
                body: truncate_body(&response.body),
            });
        }

        debug!(thread_id = ?custom_inputs.thread_id, "agent replied");
        Ok(response.json()?)
    }
}
