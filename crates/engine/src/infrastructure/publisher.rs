//! Broadcast publish adapter.
//!
//! The transport layer subscribes to the broadcast channel and fans engine
//! events out to connected clients. Publishing never blocks and a missing
//! subscriber is not an error.

use tokio::sync::broadcast;

use delve_domain::EngineEvent;

use crate::infrastructure::ports::PublisherPort;

pub struct BroadcastPublisher {
    sender: broadcast::Sender<EngineEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Transport-side handle; lagging receivers drop the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl PublisherPort for BroadcastPublisher {
    fn publish(&self, event: EngineEvent) {
        // Err means no live subscribers; gameplay does not care.
        let _ = self.sender.send(event);
    }
}

/// Test publisher that records everything it is handed.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingPublisher {
    pub events: std::sync::Mutex<Vec<EngineEvent>>,
}

#[cfg(test)]
impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events.lock().expect("publisher poisoned"))
    }
}

#[cfg(test)]
impl PublisherPort for RecordingPublisher {
    fn publish(&self, event: EngineEvent) {
        self.events.lock().expect("publisher poisoned").push(event);
    }
}
