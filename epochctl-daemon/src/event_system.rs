#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub const EVENT_ENQUEUED: &str = "enqueued";
pub const EVENT_REJECTED: &str = "rejected";
pub const EVENT_BOUNDARY: &str = "boundary";
pub const EVENT_APPLY_ERROR: &str = "apply_error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub ty: String,
    pub detail: String,
}

impl Event {
    pub fn new(ty: &str, detail: impl Into<String>) -> Self {
        Self { ty: ty.to_string(), detail: detail.into() }
    }
}

/// Pub/sub for scheduler and server events over a broadcast channel.
///
/// Publishing never blocks and never fails: with no subscriber the event is dropped,
/// and slow subscribers observe `Lagged` rather than stalling the boundary handler.
#[derive(Clone)]
pub struct EventSystem {
    tx: broadcast::Sender<Event>,
}

impl EventSystem {
    pub fn new(buffer: usize) -> Self {
        let (tx, _rx) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> { self.tx.subscribe() }

    pub fn publish(&self, ty: &str, detail: impl Into<String>) {
        let _ = self.tx.send(Event::new(ty, detail));
    }
}

impl Default for EventSystem {
    fn default() -> Self { Self::new(256) }
}
