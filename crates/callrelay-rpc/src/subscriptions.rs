//! WebSocket subscription bookkeeping.
//!
//! Callers hold a local [`SubscriptionId`] that survives reconnects. The
//! node-assigned id changes every time the subscription is re-established,
//! so the manager keeps the mapping and routes notifications through it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Client-side subscription handle, stable across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receiving side of one subscription.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    /// `params.result` of every `eth_subscription` notification.
    pub notifications: mpsc::UnboundedReceiver<Value>,
    /// Connection-level failures affecting this subscription. Non-terminal.
    pub errors: mpsc::UnboundedReceiver<TransportError>,
}

struct Entry {
    kind: String,
    params: Vec<Value>,
    server_id: Option<String>,
    notifications: mpsc::UnboundedSender<Value>,
    errors: mpsc::UnboundedSender<TransportError>,
}

#[derive(Clone, Default)]
pub struct SubscriptionManager {
    entries: Arc<Mutex<HashMap<SubscriptionId, Entry>>>,
    next_id: Arc<AtomicU64>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriptionId, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Track a new subscription; it receives nothing until [`bind`](Self::bind) is called.
    pub fn register(&self, kind: impl Into<String>, params: Vec<Value>) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (notif_tx, notif_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        self.lock().insert(
            id,
            Entry {
                kind: kind.into(),
                params,
                server_id: None,
                notifications: notif_tx,
                errors: err_tx,
            },
        );
        Subscription {
            id,
            notifications: notif_rx,
            errors: err_rx,
        }
    }

    /// Attach the node-assigned id. Returns `false` if the subscription was removed meanwhile.
    pub fn bind(&self, id: SubscriptionId, server_id: impl Into<String>) -> bool {
        match self.lock().get_mut(&id) {
            Some(entry) => {
                entry.server_id = Some(server_id.into());
                true
            }
            None => false,
        }
    }

    /// Forward a notification addressed to `server_id`.
    pub fn dispatch(&self, server_id: &str, message: Value) {
        let entries = self.lock();
        let target = entries
            .values()
            .find(|e| e.server_id.as_deref() == Some(server_id));
        match target {
            Some(entry) => {
                let _ = entry.notifications.send(message);
            }
            None => tracing::debug!(server_id, "notification for unknown subscription"),
        }
    }

    /// Stop tracking `id`; returns the node id to `eth_unsubscribe`, if bound.
    pub fn remove(&self, id: SubscriptionId) -> Option<String> {
        self.lock().remove(&id).and_then(|e| e.server_id)
    }

    /// Forget all node ids after a disconnect and tell every subscriber.
    pub fn connection_lost(&self, reason: &str) {
        for entry in self.lock().values_mut() {
            entry.server_id = None;
            let _ = entry
                .errors
                .send(TransportError::WebSocket(format!("connection lost: {reason}")));
        }
    }

    /// Report a failure on one subscription only.
    pub fn report_error(&self, id: SubscriptionId, error: TransportError) {
        if let Some(entry) = self.lock().get(&id) {
            let _ = entry.errors.send(error);
        }
    }

    /// `(id, kind, params)` of every tracked subscription, for re-subscribing.
    pub fn active(&self) -> Vec<(SubscriptionId, String, Vec<Value>)> {
        self.lock()
            .iter()
            .map(|(id, e)| (*id, e.kind.clone(), e.params.clone()))
            .collect()
    }

    pub fn server_id(&self, id: SubscriptionId) -> Option<String> {
        self.lock().get(&id).and_then(|e| e.server_id.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notifications_route_by_server_id() {
        let mgr = SubscriptionManager::new();
        let mut a = mgr.register("logs", vec![json!({"address": "0x01"})]);
        let mut b = mgr.register("logs", vec![json!({"address": "0x02"})]);
        assert!(mgr.bind(a.id, "0xaaa"));
        assert!(mgr.bind(b.id, "0xbbb"));

        mgr.dispatch("0xbbb", json!({"blockNumber": "0x1"}));
        assert_eq!(b.notifications.try_recv().unwrap()["blockNumber"], "0x1");
        assert!(a.notifications.try_recv().is_err());
    }

    #[test]
    fn unbound_subscription_receives_nothing() {
        let mgr = SubscriptionManager::new();
        let mut sub = mgr.register("logs", vec![]);
        mgr.dispatch("0xaaa", json!({}));
        assert!(sub.notifications.try_recv().is_err());
    }

    #[test]
    fn connection_lost_unbinds_and_reports() {
        let mgr = SubscriptionManager::new();
        let mut sub = mgr.register("logs", vec![]);
        mgr.bind(sub.id, "0xaaa");

        mgr.connection_lost("reset by peer");
        assert_eq!(mgr.server_id(sub.id), None);
        assert!(matches!(sub.errors.try_recv(), Ok(TransportError::WebSocket(_))));

        // Rebinding after reconnect keeps the local id.
        mgr.bind(sub.id, "0xccc");
        mgr.dispatch("0xccc", json!(1));
        assert_eq!(sub.notifications.try_recv().unwrap(), json!(1));
    }

    #[test]
    fn remove_returns_server_id() {
        let mgr = SubscriptionManager::new();
        let sub = mgr.register("logs", vec![]);
        let other = mgr.register("newHeads", vec![]);
        mgr.bind(sub.id, "0xaaa");

        assert_eq!(mgr.remove(sub.id), Some("0xaaa".to_string()));
        assert_eq!(mgr.remove(other.id), None);
        assert!(mgr.is_empty());
        assert!(!mgr.bind(sub.id, "0xddd"));
    }

    #[test]
    fn local_ids_are_unique() {
        let mgr = SubscriptionManager::new();
        let a = mgr.register("logs", vec![]);
        let b = mgr.register("logs", vec![]);
        assert_ne!(a.id, b.id);
        assert_eq!(mgr.active().len(), 2);
    }
}
