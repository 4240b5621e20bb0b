// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus - Pub/Sub for container events
//
// In-memory event streaming on tokio broadcast channels. The IPC facade
// subscribes here to forward ProcessStateChanged signals; tests subscribe to
// observe lifecycle transitions. Events are delivered in publish order.

use crate::domain::container::ContainerId;
use crate::domain::events::ContainerEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

/// Event bus for publishing and subscribing to container events.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ContainerEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity. Capacity
    /// bounds how many events are buffered before old ones are dropped.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create an event bus with the default capacity (1000).
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: ContainerEvent) {
        let _receiver_count = self.sender.send(event).unwrap_or(0);
    }

    /// Subscribe to all container events.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to events for a single container.
    pub fn subscribe_container(&self, id: ContainerId) -> ContainerEventReceiver {
        ContainerEventReceiver {
            receiver: self.sender.subscribe(),
            id,
        }
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver for all container events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<ContainerEvent>,
}

impl EventReceiver {
    /// Receive the next event, waiting until one is available.
    pub async fn recv(&mut self) -> Result<ContainerEvent, EventBusError> {
        self.receiver.recv().await.map_err(into_bus_error)
    }

    /// Receive an event without blocking.
    pub fn try_recv(&mut self) -> Result<ContainerEvent, EventBusError> {
        self.receiver.try_recv().map_err(|err| match err {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to a single container's events.
pub struct ContainerEventReceiver {
    receiver: broadcast::Receiver<ContainerEvent>,
    id: ContainerId,
}

impl ContainerEventReceiver {
    /// Receive the next event for the subscribed container, skipping events
    /// from other containers.
    pub async fn recv(&mut self) -> Result<ContainerEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(into_bus_error)?;
            if event.container_id() == self.id {
                return Ok(event);
            }
        }
    }
}

fn into_bus_error(err: broadcast::error::RecvError) -> EventBusError {
    match err {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("event bus is closed")]
    Closed,

    #[error("no events available")]
    Empty,

    #[error("receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::container::LifecycleState;
    use chrono::Utc;

    fn state_event(id: i32, from: LifecycleState, to: LifecycleState) -> ContainerEvent {
        ContainerEvent::StateChanged {
            id: ContainerId(id),
            from,
            to,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_and_subscribe() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        bus.publish(state_event(
            1,
            LifecycleState::Created,
            LifecycleState::Preloaded,
        ));

        let received = receiver.recv().await.unwrap();
        match received {
            ContainerEvent::StateChanged { id, to, .. } => {
                assert_eq!(id, ContainerId(1));
                assert_eq!(to, LifecycleState::Preloaded);
            }
            other => panic!("expected StateChanged event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn container_filtering() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe_container(ContainerId(2));

        bus.publish(state_event(
            1,
            LifecycleState::Created,
            LifecycleState::Preloaded,
        ));
        bus.publish(state_event(
            2,
            LifecycleState::Created,
            LifecycleState::Preloaded,
        ));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.container_id(), ContainerId(2));
    }

    #[tokio::test]
    async fn multiple_subscribers_see_every_event() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(ContainerEvent::ProcessStateChanged {
            id: ContainerId(3),
            pid: 4711,
            is_running: false,
            exit_code: 0,
            at: Utc::now(),
        });

        assert!(first.recv().await.is_ok());
        assert!(second.recv().await.is_ok());
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();

        for pid in 0..8 {
            bus.publish(ContainerEvent::ProcessStateChanged {
                id: ContainerId(1),
                pid,
                is_running: false,
                exit_code: 0,
                at: Utc::now(),
            });
        }

        for expected in 0..8 {
            match receiver.recv().await.unwrap() {
                ContainerEvent::ProcessStateChanged { pid, .. } => assert_eq!(pid, expected),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }
}
