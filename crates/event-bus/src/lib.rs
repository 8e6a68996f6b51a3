/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use tokio::sync::broadcast;

/// Decouples the controller from the UI: the controller publishes, the UI
/// subscribes and renders, neither imports the other's internals.
#[derive(Debug, Clone)]
pub enum Event {
    StatusChange {
        request_id: String,
        status: String,
    },
    Progress {
        request_id: String,
        message: String,
    },
    PasteDetected,
    MultilineBegin,
    MultilineEnd,
    Error {
        kind: String,
        human_message: String,
        request_id: Option<String>,
    },
}

/// A single-producer-many-consumer notification bus. Delivery is
/// best-effort and in-order per publisher: a `tokio::sync::broadcast`
/// channel preserves send order but drops the oldest buffered event for
/// any subscriber that falls more than `capacity` events behind, rather
/// than blocking the publisher.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publishing with no subscribers is not an error; the event is simply
    /// dropped.
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_in_publish_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(Event::StatusChange {
            request_id: "req_1".into(),
            status: "pending".into(),
        });
        bus.publish(Event::StatusChange {
            request_id: "req_1".into(),
            status: "processing".into(),
        });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first, Event::StatusChange { status, .. } if status == "pending"));
        assert!(matches!(second, Event::StatusChange { status, .. } if status == "processing"));
    }

    #[tokio::test]
    async fn publishing_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.publish(Event::PasteDetected);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_their_own_copy() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(Event::MultilineBegin);
        assert!(matches!(a.recv().await.unwrap(), Event::MultilineBegin));
        assert!(matches!(b.recv().await.unwrap(), Event::MultilineBegin));
    }
}
