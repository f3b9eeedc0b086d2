//! Page-side tools: open/poll/close a page context and post messages.
//!
//! A host stands in for its pages: `sw_client_open` registers one with the
//! worker, `sw_client_poll` drains what the worker has posted to it since the
//! last poll, and `sw_message` delivers a page message with a reply channel.

use std::collections::HashMap;
use std::sync::Arc;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_core::{Error, WorkerMessage};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{Mutex, oneshot};

use super::json_result;
use crate::error::ToolError;
use crate::worker::{ClientId, Worker};

/// Receivers for the pages the host has opened.
#[derive(Clone, Default)]
pub struct ClientInboxes {
    inner: Arc<Mutex<HashMap<ClientId, UnboundedReceiver<WorkerMessage>>>>,
}

impl ClientInboxes {
    pub async fn open(&self, worker: &Worker) -> ClientId {
        let (id, rx) = worker.clients().open();
        self.inner.lock().await.insert(id, rx);
        id
    }

    /// Everything posted to `id` since the last poll.
    pub async fn drain(&self, id: ClientId) -> Result<Vec<WorkerMessage>, ToolError> {
        let mut inboxes = self.inner.lock().await;
        let rx = inboxes.get_mut(&id).ok_or(ToolError::UnknownClient(id))?;
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        Ok(messages)
    }

    pub async fn close(&self, worker: &Worker, id: ClientId) -> bool {
        let removed = self.inner.lock().await.remove(&id).is_some();
        worker.clients().close(id) || removed
    }
}

/// Parameters for the sw_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MessageParams {
    /// Message payload, e.g. {"type": "CHECK_CACHE_REFRESH"}.
    pub payload: serde_json::Value,

    /// Attach a reply channel (default: true).
    #[serde(default = "default_true")]
    pub expect_reply: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MessageOutput {
    /// The worker's reply, if one was sent.
    pub reply: Option<WorkerMessage>,
    /// The payload was not a known message and was dropped.
    pub ignored: bool,
}

/// Parameters naming an open page.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientParams {
    pub client_id: ClientId,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientOpenOutput {
    pub client_id: ClientId,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientPollOutput {
    pub client_id: ClientId,
    pub messages: Vec<WorkerMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientCloseOutput {
    pub closed: bool,
}

/// Implementation of the sw_message tool.
pub async fn message_impl(worker: &Worker, params: MessageParams) -> Result<CallToolResult, McpError> {
    let (tx, rx) = if params.expect_reply {
        let (tx, rx) = oneshot::channel();
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let ignored = match worker.handle_message(&params.payload, tx).await {
        Ok(()) => false,
        Err(Error::Protocol(_)) => true,
        Err(e) => return Err(e.into()),
    };

    let reply = match rx {
        Some(rx) => rx.await.ok(),
        None => None,
    };
    json_result(&MessageOutput { reply, ignored })
}

pub async fn client_open_impl(worker: &Worker, inboxes: &ClientInboxes) -> Result<CallToolResult, McpError> {
    let client_id = inboxes.open(worker).await;
    json_result(&ClientOpenOutput { client_id })
}

pub async fn client_poll_impl(inboxes: &ClientInboxes, params: ClientParams) -> Result<CallToolResult, McpError> {
    let messages = inboxes.drain(params.client_id).await?;
    json_result(&ClientPollOutput { client_id: params.client_id, messages })
}

pub async fn client_close_impl(
    worker: &Worker, inboxes: &ClientInboxes, params: ClientParams,
) -> Result<CallToolResult, McpError> {
    let closed = inboxes.close(worker, params.client_id).await;
    json_result(&ClientCloseOutput { closed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::parse_output;
    use crate::worker::testing::{T0, fixture};
    use serde_json::json;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn check() -> MessageParams {
        MessageParams { payload: json!({"type": "CHECK_CACHE_REFRESH"}), expect_reply: true }
    }

    #[tokio::test]
    async fn test_check_reply_and_broadcast() {
        let fx = fixture().await.activated().await;
        let inboxes = ClientInboxes::default();
        let opened: ClientOpenOutput = parse_output(&client_open_impl(&fx.worker, &inboxes).await.unwrap());

        let output: MessageOutput = parse_output(&message_impl(&fx.worker, check()).await.unwrap());
        assert_eq!(output.reply, Some(WorkerMessage::CacheRefreshResult { refreshed: false, timestamp: T0 }));

        fx.clock.set(T0 + DAY_MS);
        let output: MessageOutput = parse_output(&message_impl(&fx.worker, check()).await.unwrap());
        assert_eq!(output.reply, Some(WorkerMessage::CacheRefreshResult { refreshed: true, timestamp: T0 + DAY_MS }));

        let params = ClientParams { client_id: opened.client_id };
        let polled: ClientPollOutput = parse_output(&client_poll_impl(&inboxes, params.clone()).await.unwrap());
        assert_eq!(polled.messages, vec![WorkerMessage::CacheCleared { timestamp: T0 + DAY_MS }]);

        let polled: ClientPollOutput = parse_output(&client_poll_impl(&inboxes, params).await.unwrap());
        assert!(polled.messages.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_message_is_ignored() {
        let fx = fixture().await.activated().await;
        let params = MessageParams { payload: json!({"kind": "hello"}), expect_reply: true };

        let output: MessageOutput = parse_output(&message_impl(&fx.worker, params).await.unwrap());
        assert!(output.ignored);
        assert!(output.reply.is_none());
    }

    #[tokio::test]
    async fn test_message_without_reply_channel() {
        let fx = fixture().await.activated().await;
        let params = MessageParams { expect_reply: false, ..check() };

        let output: MessageOutput = parse_output(&message_impl(&fx.worker, params).await.unwrap());
        assert!(!output.ignored);
        assert!(output.reply.is_none());
    }

    #[tokio::test]
    async fn test_closed_client() {
        let fx = fixture().await;
        let inboxes = ClientInboxes::default();
        let id = inboxes.open(&fx.worker).await;

        let closed: ClientCloseOutput =
            parse_output(&client_close_impl(&fx.worker, &inboxes, ClientParams { client_id: id }).await.unwrap());
        assert!(closed.closed);
        assert_eq!(fx.worker.clients().count(), 0);

        let err = client_poll_impl(&inboxes, ClientParams { client_id: id }).await.unwrap_err();
        assert_eq!(err.code.0, -32007);
    }
}
