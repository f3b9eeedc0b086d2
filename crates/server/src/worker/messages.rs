//! The message hook: page requests answered over a reply channel.

use swcache_core::{Error, PageMessage, WorkerMessage};
use tokio::sync::oneshot;

use super::Worker;

impl Worker {
    /// Handle one page message.
    ///
    /// `CHECK_CACHE_REFRESH` runs the refresh evaluation unthrottled and sends
    /// exactly one `CACHE_REFRESH_RESULT` on `reply`. A payload that is not a
    /// known message is dropped without a reply and returned as
    /// `Error::Protocol`.
    pub async fn handle_message(
        &self, payload: &serde_json::Value, reply: Option<oneshot::Sender<WorkerMessage>>,
    ) -> Result<(), Error> {
        let message = match PageMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed client message");
                return Err(e);
            }
        };

        match message {
            PageMessage::CheckCacheRefresh => {
                tracing::info!("checking cache refresh status at client request");
                let refreshed = self.perform_auto_refresh().await;
                let result = WorkerMessage::CacheRefreshResult { refreshed, timestamp: self.clock.now_ms() };

                match reply {
                    Some(tx) => {
                        if tx.send(result).is_err() {
                            tracing::debug!("client went away before the refresh result was sent");
                        }
                    }
                    None => tracing::warn!(refreshed, "CHECK_CACHE_REFRESH arrived without a reply channel"),
                }
            }
        }
        Ok(())
    }
}
