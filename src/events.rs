//! In-process per-league notification bus.
//!
//! Fire-and-forget fan-out: writers emit, SSE subscribers receive, and
//! nobody waits on anybody. Subscribers re-fetch league state on
//! notification rather than trusting a payload.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Notification payloads sent to league subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LeagueEvent {
    /// Sent once when a subscriber connects.
    Hello,
    /// League state changed (merge committed).
    Updated,
    /// Win records were refreshed from the provider.
    WinsSync,
}

/// Per-league broadcast channels, created lazily on first subscribe.
#[derive(Default)]
pub struct EventBus {
    channels: Mutex<HashMap<String, broadcast::Sender<LeagueEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a league's notifications.
    pub fn subscribe(&self, league_id: &str) -> broadcast::Receiver<LeagueEvent> {
        let mut channels = self.lock();
        channels
            .entry(league_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Emit an event to a league's subscribers. A league nobody is
    /// watching is a no-op, and dead channels are pruned on the way.
    pub fn emit(&self, league_id: &str, event: LeagueEvent) {
        let mut channels = self.lock();
        if let Some(sender) = channels.get(league_id) {
            if sender.receiver_count() == 0 {
                channels.remove(league_id);
            } else {
                // Send only fails with zero receivers, checked above.
                let _ = sender.send(event);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, broadcast::Sender<LeagueEvent>>> {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
