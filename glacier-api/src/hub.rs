use std::sync::Arc;

use dashmap::DashMap;
use glacier_core::models::{Destination, OutboundNotification, Principal};
use glacier_core::upstream::NotificationPublisher;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Handle for a client connection
pub type ConnectionId = String;

/// Frame pushed to a browser: a destination plus its JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerFrame {
    pub destination: String,
    pub payload: serde_json::Value,
}

impl ServerFrame {
    pub fn new(destination: impl Into<String>, payload: &impl Serialize) -> serde_json::Result<Self> {
        Ok(Self {
            destination: destination.into(),
            payload: serde_json::to_value(payload)?,
        })
    }
}

#[derive(Debug, Clone)]
struct Connection {
    id: ConnectionId,
    sender: mpsc::Sender<ServerFrame>,
}

/// In-memory hub routing notifications to the live connections of each wall.
///
/// A wall may be open in several tabs; every connection of the principal receives every
/// notification for it.
#[derive(Clone, Default)]
pub struct ClientHub {
    /// principal -> live connections
    walls: Arc<DashMap<Principal, Vec<Connection>>>,
}

impl ClientHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the outbound queue of a connection for `principal`.
    ///
    /// `on_register` runs while the principal's entry is locked, so it is ordered with respect
    /// to the `on_last` callback of a concurrent [`ClientHub::unregister`].
    pub fn register(
        &self,
        principal: &Principal,
        connection_id: ConnectionId,
        sender: mpsc::Sender<ServerFrame>,
        on_register: impl FnOnce(),
    ) {
        let mut connections = self.walls.entry(principal.clone()).or_default();
        connections.push(Connection {
            id: connection_id.clone(),
            sender,
        });
        on_register();

        info!(
            principal = %principal,
            connection_id = %connection_id,
            connections = connections.len(),
            "Wall connection registered"
        );
    }

    /// Remove a connection. `on_last` runs, under the entry lock, when it was the principal's
    /// last one.
    pub fn unregister(&self, principal: &Principal, connection_id: &str, on_last: impl FnOnce()) {
        let dashmap::mapref::entry::Entry::Occupied(mut entry) = self.walls.entry(principal.clone())
        else {
            debug!(principal = %principal, connection_id, "Connection already unregistered");
            return;
        };

        entry.get_mut().retain(|c| c.id != connection_id);
        let remaining = entry.get().len();
        if remaining == 0 {
            on_last();
            entry.remove();
        }

        info!(
            principal = %principal,
            connection_id,
            remaining,
            "Wall connection unregistered"
        );
    }

    #[must_use]
    pub fn connection_count(&self, principal: &str) -> usize {
        self.walls.get(principal).map_or(0, |c| c.len())
    }

    #[must_use]
    pub fn total_connections(&self) -> usize {
        self.walls.iter().map(|c| c.len()).sum()
    }

    /// Queue `frame` on every connection of `principal`. Returns the number of connections
    /// that accepted it.
    pub fn send_to(&self, principal: &Principal, frame: &ServerFrame) -> usize {
        let Some(mut connections) = self.walls.get_mut(principal) else {
            debug!(principal = %principal, destination = %frame.destination, "No connection for wall");
            return 0;
        };

        let mut delivered = 0;
        connections.retain(|connection| match connection.sender.try_send(frame.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    principal = %principal,
                    connection_id = %connection.id,
                    "Client too slow; frame dropped"
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(principal = %principal, connection_id = %connection.id, "Pruning closed connection");
                false
            }
        });
        delivered
    }
}

impl NotificationPublisher for ClientHub {
    fn publish(&self, destination: &Destination, notification: &OutboundNotification) {
        match ServerFrame::new(destination.to_string(), notification) {
            Ok(frame) => {
                self.send_to(destination.principal(), &frame);
            }
            Err(e) => warn!(destination = %destination, error = %e, "Failed to encode notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glacier_core::models::{Hashtag, NotificationKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn principal(id: &str) -> Principal {
        Principal::new(id).unwrap()
    }

    fn connect(hub: &ClientHub, id: &str, connection: &str, buffer: usize) -> mpsc::Receiver<ServerFrame> {
        let (tx, rx) = mpsc::channel(buffer);
        hub.register(&principal(id), connection.to_string(), tx, || {});
        rx
    }

    fn deletion(principal_id: &str, id: &str) -> (Destination, OutboundNotification) {
        (
            Destination::new(
                principal(principal_id),
                Hashtag::new("rust").unwrap(),
                NotificationKind::Deletion,
            ),
            OutboundNotification::StatusDeleted { id: id.to_string() },
        )
    }

    #[tokio::test]
    async fn test_publish_reaches_every_connection_of_the_wall() {
        let hub = ClientHub::new();
        let mut tab1 = connect(&hub, "a", "c1", 8);
        let mut tab2 = connect(&hub, "a", "c2", 8);
        let mut other = connect(&hub, "b", "c3", 8);

        let (dest, notification) = deletion("a", "7");
        hub.publish(&dest, &notification);

        for rx in [&mut tab1, &mut tab2] {
            let frame = rx.recv().await.unwrap();
            assert_eq!(frame.destination, "/topic/hashtags/a/rust/deletion");
            assert_eq!(frame.payload, serde_json::json!({"id": "7"}));
        }
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_connections_are_pruned() {
        let hub = ClientHub::new();
        let rx = connect(&hub, "a", "c1", 8);
        let _live = connect(&hub, "a", "c2", 8);
        drop(rx);

        let (dest, notification) = deletion("a", "1");
        hub.publish(&dest, &notification);
        assert_eq!(hub.connection_count("a"), 1);
    }

    #[tokio::test]
    async fn test_on_last_runs_only_for_last_connection() {
        let hub = ClientHub::new();
        let last = AtomicUsize::new(0);
        let p = principal("a");
        let _rx1 = connect(&hub, "a", "c1", 8);
        let _rx2 = connect(&hub, "a", "c2", 8);

        hub.unregister(&p, "c1", || {
            last.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(last.load(Ordering::SeqCst), 0);

        hub.unregister(&p, "c2", || {
            last.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(last.load(Ordering::SeqCst), 1);
        assert_eq!(hub.total_connections(), 0);

        // unknown connection is a no-op
        hub.unregister(&p, "c2", || {
            last.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(last.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_frame_but_keeps_connection() {
        let hub = ClientHub::new();
        let _rx = connect(&hub, "a", "c1", 1);
        let frame = ServerFrame::new("/x", &serde_json::json!({})).unwrap();

        assert_eq!(hub.send_to(&principal("a"), &frame), 1);
        assert_eq!(hub.send_to(&principal("a"), &frame), 0);
        assert_eq!(hub.connection_count("a"), 1);
    }
}
