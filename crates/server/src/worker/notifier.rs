//! Open page contexts and message fan-out.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use swcache_core::WorkerMessage;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use super::lock;

pub type ClientId = u64;

/// Pages currently controlled by the worker.
///
/// Delivery is best-effort: a page that is not open receives nothing, and
/// nothing is queued for pages that open later.
#[derive(Default)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    clients: Mutex<HashMap<ClientId, UnboundedSender<WorkerMessage>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page. It receives every message posted from now on.
    pub fn open(&self) -> (ClientId, UnboundedReceiver<WorkerMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = unbounded_channel();
        lock(&self.clients).insert(id, tx);
        tracing::debug!(client = id, "client opened");
        (id, rx)
    }

    pub fn close(&self, id: ClientId) -> bool {
        let closed = lock(&self.clients).remove(&id).is_some();
        if closed {
            tracing::debug!(client = id, "client closed");
        }
        closed
    }

    pub fn count(&self) -> usize {
        lock(&self.clients).len()
    }

    /// Post to every open page. Pages whose receiver is gone are dropped.
    ///
    /// Returns the number of pages the message reached.
    pub fn broadcast(&self, message: &WorkerMessage) -> usize {
        let mut clients = lock(&self.clients);
        clients.retain(|id, tx| {
            let delivered = tx.send(message.clone()).is_ok();
            if !delivered {
                tracing::debug!(client = id, "dropping closed client");
            }
            delivered
        });
        clients.len()
    }
}
