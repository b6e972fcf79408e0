//! Live push channels, one per user.
//!
//! The registry maps a user id to at most one channel. Registering again
//! replaces the previous entry (no fan-out to several devices). Delivery is
//! best-effort: a missing or closed channel is logged and skipped, never
//! reported to the caller. The durable copy of every event is the
//! notification row written before [`Dispatcher::push`] is called.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::Notification;

/// JSON object pushed to connected clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Notification> for PushEvent {
    fn from(value: &Notification) -> Self {
        Self {
            id: value.id,
            title: value.title.clone(),
            message: value.message.clone(),
            created_at: value.created_at,
        }
    }
}

/// Identifies one registration, so a stale connection cannot remove the
/// channel of a newer one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

#[derive(Debug)]
struct Channel {
    id: ChannelId,
    sender: mpsc::UnboundedSender<PushEvent>,
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    channels: DashMap<String, Channel>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sender` as the live channel of `user_id`, replacing any
    /// previous one.
    pub fn register(&self, user_id: &str, sender: mpsc::UnboundedSender<PushEvent>) -> ChannelId {
        let id = ChannelId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if self
            .channels
            .insert(user_id.to_string(), Channel { id, sender })
            .is_some()
        {
            tracing::debug!(user_id, "replaced live channel");
        }
        id
    }

    /// Drop the live channel of `user_id`, whatever it is.
    pub fn unregister(&self, user_id: &str) -> bool {
        self.channels.remove(user_id).is_some()
    }

    /// Drop the channel of `user_id` only if it is still `channel_id`.
    pub fn release(&self, user_id: &str, channel_id: ChannelId) -> bool {
        self.channels
            .remove_if(user_id, |_, channel| channel.id == channel_id)
            .is_some()
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.channels
            .get(user_id)
            .is_some_and(|channel| !channel.sender.is_closed())
    }

    pub fn connected(&self) -> usize {
        self.channels.len()
    }

    /// Liveness probe: remove every channel whose receiver is gone.
    ///
    /// Returns the number of evicted channels.
    pub fn evict_dead(&self) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, channel| !channel.sender.is_closed());
        let evicted = before.saturating_sub(self.channels.len());
        if evicted > 0 {
            tracing::info!(evicted, "evicted dead push channels");
        }
        evicted
    }

    /// Best-effort live delivery of an already persisted notification.
    ///
    /// Returns whether a live channel accepted the event.
    pub fn push(&self, notification: &Notification) -> bool {
        let user_id = notification.user_id.as_str();
        let failed = match self.channels.get(user_id) {
            None => return false,
            Some(channel) => match channel.sender.send(PushEvent::from(notification)) {
                Ok(()) => return true,
                Err(_) => channel.id,
            },
        };

        // The shard guard above is released before removing.
        tracing::warn!(user_id, notification_id = %notification.id, "push channel closed, evicting");
        self.release(user_id, failed);
        false
    }

    pub fn push_all(&self, notifications: &[Notification]) {
        for notification in notifications {
            self.push(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(user_id: &str) -> Notification {
        Notification::new(user_id, "Ride Completed", "Thanks for riding", Utc::now())
    }

    #[test]
    fn push_without_channel_is_not_an_error() {
        let dispatcher = Dispatcher::new();
        assert!(!dispatcher.push(&notification("alice")));
    }

    #[test]
    fn push_reaches_registered_channel() {
        let dispatcher = Dispatcher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.register("alice", tx);

        let n = notification("alice");
        assert!(dispatcher.push(&n));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.id, n.id);
        assert_eq!(event.title, "Ride Completed");
    }

    #[test]
    fn reconnect_replaces_previous_channel() {
        let dispatcher = Dispatcher::new();
        let (old_tx, mut old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();
        let old_id = dispatcher.register("alice", old_tx);
        dispatcher.register("alice", new_tx);

        assert!(dispatcher.push(&notification("alice")));
        assert!(new_rx.try_recv().is_ok());
        assert!(old_rx.try_recv().is_err());

        // The old socket going away must not drop the new registration.
        assert!(!dispatcher.release("alice", old_id));
        assert!(dispatcher.is_connected("alice"));
    }

    #[test]
    fn closed_channel_is_evicted_on_push() {
        let dispatcher = Dispatcher::new();
        let (tx, rx) = mpsc::unbounded_channel();
        dispatcher.register("alice", tx);
        drop(rx);

        assert!(!dispatcher.push(&notification("alice")));
        assert_eq!(dispatcher.connected(), 0);
    }

    #[test]
    fn evict_dead_keeps_live_channels() {
        let dispatcher = Dispatcher::new();
        let (alive_tx, _alive_rx) = mpsc::unbounded_channel();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        dispatcher.register("alice", alive_tx);
        dispatcher.register("bob", dead_tx);
        drop(dead_rx);

        assert_eq!(dispatcher.evict_dead(), 1);
        assert!(dispatcher.is_connected("alice"));
        assert!(!dispatcher.is_connected("bob"));
    }

    #[test]
    fn unregister_removes_channel() {
        let dispatcher = Dispatcher::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        dispatcher.register("alice", tx);
        assert!(dispatcher.unregister("alice"));
        assert!(!dispatcher.unregister("alice"));
    }
}
