//! Background sync, push and notification-click hooks.
//!
//! These only describe and log; displaying anything is up to the host.

use serde::{Deserialize, Serialize};
use url::Url;

use super::Worker;

/// The only sync tag the worker recognises.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

const ICON: &str = "/static/icons/icon-192x192.png";
const BADGE: &str = "/static/icons/icon-72x72.png";

/// What a push payload asks the host to show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PushNotification {
    pub title: String,
    pub body: Option<String>,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub arrived_at: i64,
    pub primary_key: Option<serde_json::Value>,
    pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushPayload {
    #[serde(default)]
    title: String,
    body: Option<String>,
    primary_key: Option<serde_json::Value>,
}

impl Worker {
    /// Returns whether the tag was recognised.
    pub fn handle_sync(&self, tag: &str) -> bool {
        if tag == BACKGROUND_SYNC_TAG {
            tracing::info!(tag, "background sync triggered");
            true
        } else {
            tracing::debug!(tag, "ignoring unknown sync tag");
            false
        }
    }

    /// Describe the notification a push payload asks for.
    ///
    /// A push without data shows nothing. Data that is not a JSON object is a
    /// protocol error.
    pub fn handle_push(
        &self, payload: Option<&serde_json::Value>,
    ) -> Result<Option<PushNotification>, swcache_core::Error> {
        let Some(payload) = payload else {
            tracing::debug!("push without data");
            return Ok(None);
        };
        let data: PushPayload = serde_json::from_value(payload.clone())
            .map_err(|e| swcache_core::Error::Protocol(format!("push payload: {e}")))?;
        tracing::info!(title = %data.title, "push message received");

        let icon = self.asset(ICON);
        let action = |action: &str, title: &str| NotificationAction {
            action: action.into(),
            title: title.into(),
            icon: icon.clone(),
        };

        Ok(Some(PushNotification {
            title: data.title,
            body: data.body,
            badge: self.asset(BADGE),
            vibrate: vec![100, 50, 100],
            arrived_at: self.clock.now_ms(),
            primary_key: data.primary_key,
            actions: vec![action("explore", "View"), action("close", "Close")],
            icon,
        }))
    }

    /// The page to open for a notification click, if any.
    pub fn handle_notification_click(&self, action: &str) -> Option<Url> {
        if action == "explore" {
            tracing::info!("notification click opens the app");
            Some(self.origin.clone())
        } else {
            None
        }
    }

    fn asset(&self, path: &str) -> String {
        self.origin
            .join(path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| path.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::testing::{T0, fixture};
    use serde_json::json;

    #[tokio::test]
    async fn test_sync_tags() {
        let fx = fixture().await;
        assert!(fx.worker.handle_sync("background-sync"));
        assert!(!fx.worker.handle_sync("other"));
    }

    #[tokio::test]
    async fn test_push_payload_fields() {
        let fx = fixture().await;
        let payload = json!({"title": "Bill split", "body": "Alex paid you back", "primaryKey": 3});
        let notification = fx.worker.handle_push(Some(&payload)).unwrap().unwrap();

        assert_eq!(notification.title, "Bill split");
        assert_eq!(notification.body.as_deref(), Some("Alex paid you back"));
        assert_eq!(notification.icon, "http://localhost:5000/static/icons/icon-192x192.png");
        assert_eq!(notification.badge, "http://localhost:5000/static/icons/icon-72x72.png");
        assert_eq!(notification.primary_key, Some(json!(3)));
        assert_eq!(notification.arrived_at, T0);
        assert_eq!(notification.vibrate, vec![100, 50, 100]);

        let actions: Vec<&str> = notification.actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(actions, vec!["explore", "close"]);
    }

    #[tokio::test]
    async fn test_push_without_data() {
        let fx = fixture().await;
        assert_eq!(fx.worker.handle_push(None).unwrap(), None);
    }

    #[tokio::test]
    async fn test_push_rejects_non_object() {
        let fx = fixture().await;
        let result = fx.worker.handle_push(Some(&json!([1, 2])));
        assert!(matches!(result, Err(swcache_core::Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_notification_click() {
        let fx = fixture().await;
        assert_eq!(
            fx.worker.handle_notification_click("explore").map(|u| u.to_string()),
            Some("http://localhost:5000/".to_string())
        );
        assert_eq!(fx.worker.handle_notification_click("close"), None);
    }
}
