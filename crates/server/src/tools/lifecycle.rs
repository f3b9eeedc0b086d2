//! Lifecycle tools: install, activate, sync, push and notification clicks.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::worker::{ActivateReport, LifecycleState, PushNotification, Worker};

/// Output from the sw_install tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InstallOutput {
    pub generation: String,
    /// Static assets stored in the new generation.
    pub entries: u64,
    pub state: LifecycleState,
}

/// Output from the sw_activate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ActivateOutput {
    #[serde(flatten)]
    pub report: ActivateReport,
    pub state: LifecycleState,
}

/// Parameters for the sw_sync tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncParams {
    /// Sync registration tag.
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncOutput {
    pub handled: bool,
}

/// Parameters for the sw_push tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PushParams {
    /// Push message data, if the push carried any.
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PushOutput {
    pub notification: Option<PushNotification>,
}

/// Parameters for the sw_notification_click tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NotificationClickParams {
    /// The action button clicked, or empty for the notification body.
    #[serde(default)]
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NotificationClickOutput {
    /// Page the host should open, if any.
    pub open_url: Option<String>,
}

pub async fn install_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let handle = worker.install().await?;
    let entries = worker.db().count_entries(&handle).await?;
    json_result(&InstallOutput { generation: handle.name().to_string(), entries, state: worker.lifecycle() })
}

pub async fn activate_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let report = worker.activate().await?;
    json_result(&ActivateOutput { report, state: worker.lifecycle() })
}

pub fn sync_impl(worker: &Worker, params: SyncParams) -> Result<CallToolResult, McpError> {
    json_result(&SyncOutput { handled: worker.handle_sync(&params.tag) })
}

pub fn push_impl(worker: &Worker, params: PushParams) -> Result<CallToolResult, McpError> {
    let notification = worker.handle_push(params.payload.as_ref())?;
    json_result(&PushOutput { notification })
}

pub fn notification_click_impl(worker: &Worker, params: NotificationClickParams) -> Result<CallToolResult, McpError> {
    let open_url = worker
        .handle_notification_click(&params.action)
        .map(|url| url.to_string());
    json_result(&NotificationClickOutput { open_url })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::parse_output;
    use crate::worker::testing::fixture;

    #[tokio::test]
    async fn test_install_then_activate() {
        let fx = fixture().await;

        let result = install_impl(&fx.worker).await.unwrap();
        let output: InstallOutput = parse_output(&result);
        assert_eq!(output.entries, 5);
        assert_eq!(output.state, LifecycleState::Installed);

        let result = activate_impl(&fx.worker).await.unwrap();
        let output: ActivateOutput = parse_output(&result);
        assert_eq!(output.state, LifecycleState::Activated);
        assert!(!output.report.refreshed);
    }

    #[tokio::test]
    async fn test_install_failure_maps_to_error_code() {
        let fx = fixture().await;
        fx.network.set_offline(true);

        let err = install_impl(&fx.worker).await.unwrap_err();
        assert_eq!(err.code.0, -32006);
    }

    #[tokio::test]
    async fn test_push_and_sync() {
        let fx = fixture().await;

        let result = sync_impl(&fx.worker, SyncParams { tag: "background-sync".into() }).unwrap();
        assert!(parse_output::<SyncOutput>(&result).handled);

        let result = push_impl(&fx.worker, PushParams { payload: None }).unwrap();
        assert!(parse_output::<PushOutput>(&result).notification.is_none());

        let params = PushParams { payload: Some(serde_json::json!({"title": "Hi"})) };
        let result = push_impl(&fx.worker, params).unwrap();
        let output: PushOutput = parse_output(&result);
        assert_eq!(output.notification.unwrap().title, "Hi");
    }

    #[tokio::test]
    async fn test_notification_click() {
        let fx = fixture().await;
        let params = NotificationClickParams { action: "explore".into() };
        let output: NotificationClickOutput = parse_output(&notification_click_impl(&fx.worker, params).unwrap());
        assert_eq!(output.open_url.as_deref(), Some("http://localhost:5000/"));
    }
}
