use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use tether_types::events::GatewayEvent;

pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Who is online and how to reach them. Routing only talks to this trait,
/// so the registry can move out of process without touching the hub.
pub trait Presence: Send + Sync {
    /// Enqueue `event` for `user_id`. Returns false if the user is offline
    /// or the frame was dropped.
    fn send_to_user(&self, user_id: i64, event: GatewayEvent) -> bool;

    /// Enqueue `event` for every online user in `user_ids` except `except`.
    /// Returns how many mailboxes accepted it.
    fn send_to_users(&self, user_ids: &[i64], event: &GatewayEvent, except: i64) -> usize;
}

/// The sending side of one connection's mailbox, as held by the
/// connection itself. It does not keep the mailbox open: once the registry
/// entry is replaced or removed, the writer drains and stops.
#[derive(Clone)]
pub struct Outbox {
    user_id: i64,
    conn_id: Uuid,
    tx: mpsc::WeakSender<GatewayEvent>,
}

impl Outbox {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Enqueue an event for this connection only.
    pub fn push(&self, event: GatewayEvent) -> bool {
        match self.tx.upgrade() {
            Some(tx) => enqueue(self.user_id, &tx, event),
            None => false,
        }
    }
}

/// Registry of live gateway connections, one per user.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    mailbox_capacity: usize,

    /// user_id -> (conn_id, mailbox sender)
    user_channels: RwLock<HashMap<i64, (Uuid, mpsc::Sender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                mailbox_capacity: mailbox_capacity.max(1),
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a new connection for `user_id`, replacing any previous one.
    /// The replaced connection's mailbox closes once its sender is dropped.
    pub fn register_user_channel(&self, user_id: i64) -> (Outbox, mpsc::Receiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.inner.mailbox_capacity);
        let outbox = Outbox {
            user_id,
            conn_id,
            tx: tx.downgrade(),
        };

        if let Some((old_conn, _)) = self.write().insert(user_id, (conn_id, tx)) {
            debug!("User {} reconnected, replacing connection {}", user_id, old_conn);
        }
        (outbox, rx)
    }

    /// Unregister a connection, but only if it is still the current one for
    /// that user. Returns whether an entry was removed.
    pub fn unregister_user_channel(&self, user_id: i64, conn_id: Uuid) -> bool {
        let mut channels = self.write();
        match channels.get(&user_id) {
            Some((stored, _)) if *stored == conn_id => {
                channels.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub fn online_count(&self) -> usize {
        self.read().len()
    }

    // A panic while holding the lock cannot leave the map half-updated,
    // so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<i64, (Uuid, mpsc::Sender<GatewayEvent>)>> {
        self.inner.user_channels.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<i64, (Uuid, mpsc::Sender<GatewayEvent>)>> {
        self.inner.user_channels.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

impl Presence for Dispatcher {
    fn send_to_user(&self, user_id: i64, event: GatewayEvent) -> bool {
        let channels = self.read();
        match channels.get(&user_id) {
            Some((_, tx)) => enqueue(user_id, tx, event),
            None => false,
        }
    }

    fn send_to_users(&self, user_ids: &[i64], event: &GatewayEvent, except: i64) -> usize {
        let channels = self.read();
        user_ids
            .iter()
            .filter(|id| **id != except)
            .filter_map(|id| channels.get(id).map(|(_, tx)| (*id, tx)))
            .filter(|(id, tx)| enqueue(*id, tx, event.clone()))
            .count()
    }
}

/// Non-blocking enqueue. A full mailbox drops the frame.
fn enqueue(user_id: i64, tx: &mpsc::Sender<GatewayEvent>, event: GatewayEvent) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!("Mailbox full for user {}, dropping frame", user_id);
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reconnect_replaces_previous_connection() {
        let dispatcher = Dispatcher::default();
        let (first, mut first_rx) = dispatcher.register_user_channel(7);
        let (second, mut second_rx) = dispatcher.register_user_channel(7);
        assert_ne!(first.conn_id(), second.conn_id());
        assert_eq!(dispatcher.online_count(), 1);

        // The displaced mailbox is closed.
        assert!(first_rx.recv().await.is_none());
        assert!(!first.push(GatewayEvent::Ready { user_id: 7 }));

        assert!(dispatcher.send_to_user(7, GatewayEvent::Ready { user_id: 7 }));
        assert!(matches!(second_rx.recv().await, Some(GatewayEvent::Ready { user_id: 7 })));

        // Stale unregister leaves the live entry alone.
        assert!(!dispatcher.unregister_user_channel(7, first.conn_id()));
        assert_eq!(dispatcher.online_count(), 1);
        assert!(dispatcher.unregister_user_channel(7, second.conn_id()));
        assert_eq!(dispatcher.online_count(), 0);
        assert!(!dispatcher.send_to_user(7, GatewayEvent::Ready { user_id: 7 }));
    }

    #[tokio::test]
    async fn full_mailbox_drops_frames() {
        let dispatcher = Dispatcher::new(1);
        let (_outbox, mut rx) = dispatcher.register_user_channel(1);

        assert!(dispatcher.send_to_user(1, GatewayEvent::Ready { user_id: 1 }));
        assert!(!dispatcher.send_to_user(1, GatewayEvent::error("x", "dropped")));

        assert!(matches!(rx.recv().await, Some(GatewayEvent::Ready { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn fan_out_skips_sender_and_offline_users() {
        let dispatcher = Dispatcher::default();
        let (_a, mut a_rx) = dispatcher.register_user_channel(1);
        let (_b, mut b_rx) = dispatcher.register_user_channel(2);

        let event = GatewayEvent::Ready { user_id: 0 };
        assert_eq!(dispatcher.send_to_users(&[1, 2, 3], &event, 1), 1);
        assert!(b_rx.try_recv().is_ok());
        assert!(a_rx.try_recv().is_err());
        assert!(!dispatcher.send_to_user(3, event));
    }
}
