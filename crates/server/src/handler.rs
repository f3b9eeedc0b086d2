//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the worker's hooks.
use std::sync::Arc;

use crate::tools::{
    ClientInboxes, ClientParams, FetchParams, MessageParams, NotificationClickParams, PushParams, SyncParams, cache,
    fetch, lifecycle, message,
};
use crate::worker::Worker;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for sw-cache.
#[derive(Clone)]
pub struct CacheWorkerServer {
    worker: Arc<Worker>,
    inboxes: ClientInboxes,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl CacheWorkerServer {
    /// Create a new server handler around a shared worker.
    pub fn new(worker: Arc<Worker>) -> Self {
        Self { worker, inboxes: ClientInboxes::default(), tool_router: Self::tool_router() }
    }

    #[tool(description = "Install the worker: fetch every static URL and store them as a new cache generation. \
                          All-or-nothing.")]
    async fn sw_install(&self) -> Result<CallToolResult, McpError> {
        lifecycle::install_impl(&self.worker).await
    }

    #[tool(description = "Activate the worker: delete old cache generations, run the refresh check and start \
                          intercepting fetches.")]
    async fn sw_activate(&self) -> Result<CallToolResult, McpError> {
        lifecycle::activate_impl(&self.worker).await
    }

    /// Route one request through the fetch interceptor.
    ///
    /// Non-GET requests, and every request before activation, pass through.
    #[tool(description = "Intercept a request. Returns the response and whether it came from network, cache \
                          or the offline page.")]
    async fn sw_fetch(&self, params: Parameters<FetchParams>) -> Result<CallToolResult, McpError> {
        fetch::fetch_impl(&self.worker, params.0).await
    }

    #[tool(description = "Send a page message to the worker, e.g. {\"type\": \"CHECK_CACHE_REFRESH\"}. \
                          Returns the worker's reply.")]
    async fn sw_message(&self, params: Parameters<MessageParams>) -> Result<CallToolResult, McpError> {
        message::message_impl(&self.worker, params.0).await
    }

    #[tool(description = "Open a page context that receives worker broadcasts such as CACHE_CLEARED.")]
    async fn sw_client_open(&self) -> Result<CallToolResult, McpError> {
        message::client_open_impl(&self.worker, &self.inboxes).await
    }

    #[tool(description = "Drain messages the worker posted to a page context since the last poll.")]
    async fn sw_client_poll(&self, params: Parameters<ClientParams>) -> Result<CallToolResult, McpError> {
        message::client_poll_impl(&self.inboxes, params.0).await
    }

    #[tool(description = "Close a page context.")]
    async fn sw_client_close(&self, params: Parameters<ClientParams>) -> Result<CallToolResult, McpError> {
        message::client_close_impl(&self.worker, &self.inboxes, params.0).await
    }

    #[tool(description = "Deliver a background sync event.")]
    async fn sw_sync(&self, params: Parameters<SyncParams>) -> Result<CallToolResult, McpError> {
        lifecycle::sync_impl(&self.worker, params.0)
    }

    #[tool(description = "Deliver a push event. Returns the notification the host should display.")]
    async fn sw_push(&self, params: Parameters<PushParams>) -> Result<CallToolResult, McpError> {
        lifecycle::push_impl(&self.worker, params.0)
    }

    #[tool(description = "Deliver a notification click. Returns the page to open, if any.")]
    async fn sw_notification_click(
        &self, params: Parameters<NotificationClickParams>,
    ) -> Result<CallToolResult, McpError> {
        lifecycle::notification_click_impl(&self.worker, params.0)
    }

    #[tool(description = "Look up the stored response for a URL in the current cache generation.")]
    async fn cache_get(&self, params: Parameters<cache::CacheGetParams>) -> Result<CallToolResult, McpError> {
        cache::get_impl(&self.worker, params.0).await
    }

    #[tool(description = "Purge expired or cache-busted entries, or every cache generation but the current one.")]
    async fn cache_purge(&self, params: Parameters<cache::CachePurgeParams>) -> Result<CallToolResult, McpError> {
        cache::purge_impl(&self.worker, params.0).await
    }

    #[tool(description = "Report the worker state, the current cache generation and the last full cache clear.")]
    async fn cache_status(&self) -> Result<CallToolResult, McpError> {
        cache::status_impl(&self.worker).await
    }
}

impl ServerHandler for CacheWorkerServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "sw-cache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::testing::fixture;

    #[tokio::test]
    async fn test_every_tool_is_routed() {
        let fx = fixture().await;
        let server = CacheWorkerServer::new(fx.worker.clone());

        let mut names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "cache_get",
                "cache_purge",
                "cache_status",
                "sw_activate",
                "sw_client_close",
                "sw_client_open",
                "sw_client_poll",
                "sw_fetch",
                "sw_install",
                "sw_message",
                "sw_notification_click",
                "sw_push",
                "sw_sync",
            ]
        );
    }

    #[tokio::test]
    async fn test_server_info() {
        let fx = fixture().await;
        let info = CacheWorkerServer::new(fx.worker.clone()).get_info();
        assert_eq!(info.server_info.name, "sw-cache");
    }
}
