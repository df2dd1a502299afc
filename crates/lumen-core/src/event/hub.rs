// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::{Mutex, PoisonError};

/// Fans one stream of notifications out to any number of subscribers.
///
/// Each subscriber owns the receiving end of its own unbounded `flume`
/// channel, so a slow consumer never blocks the publisher and a dropped
/// receiver is pruned on the next [`NotificationHub::publish`]. This replaces
/// observer registration between the renderer and its dependents.
#[derive(Debug)]
pub struct NotificationHub<T: Clone + Send + 'static> {
    subscribers: Mutex<Vec<flume::Sender<T>>>,
}

impl<T: Clone + Send + 'static> NotificationHub<T> {
    /// Creates a hub with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a new subscriber.
    ///
    /// ## Returns
    /// The receiving end of a channel that gets every notification published
    /// from now on.
    pub fn subscribe(&self) -> flume::Receiver<T> {
        let (sender, receiver) = flume::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    /// Sends `event` to every live subscriber.
    ///
    /// ## Returns
    /// The number of subscribers that received the event.
    pub fn publish(&self, event: T) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        log::trace!(
            "NotificationHub: delivered an event to {} subscriber(s).",
            subscribers.len()
        );
        subscribers.len()
    }

    /// Number of subscribers still registered.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<T: Clone + Send + 'static> Default for NotificationHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flume::TryRecvError;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum TestEvent {
        Resized { width: u32, height: u32 },
        Recreated(u64),
    }

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let hub = NotificationHub::<TestEvent>::new();
        assert_eq!(hub.publish(TestEvent::Recreated(1)), 0);
    }

    #[test]
    fn every_subscriber_receives_every_event() {
        let hub = NotificationHub::new();
        let a = hub.subscribe();
        let b = hub.subscribe();

        hub.publish(TestEvent::Resized {
            width: 800,
            height: 600,
        });
        hub.publish(TestEvent::Recreated(2));

        for rx in [&a, &b] {
            assert_eq!(
                rx.try_recv(),
                Ok(TestEvent::Resized {
                    width: 800,
                    height: 600
                })
            );
            assert_eq!(rx.try_recv(), Ok(TestEvent::Recreated(2)));
            assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        }
    }

    #[test]
    fn late_subscribers_miss_earlier_events() {
        let hub = NotificationHub::new();
        hub.publish(TestEvent::Recreated(1));
        let rx = hub.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let hub = NotificationHub::new();
        let kept = hub.subscribe();
        drop(hub.subscribe());
        assert_eq!(hub.subscriber_count(), 2);

        assert_eq!(hub.publish(TestEvent::Recreated(3)), 1);
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(kept.try_recv(), Ok(TestEvent::Recreated(3)));
    }

    #[test]
    fn events_cross_threads() {
        let hub = std::sync::Arc::new(NotificationHub::new());
        let rx = hub.subscribe();
        let publisher = {
            let hub = hub.clone();
            thread::spawn(move || {
                for generation in 0..10 {
                    hub.publish(TestEvent::Recreated(generation));
                }
            })
        };
        publisher.join().expect("publisher thread panicked");

        let received: Vec<_> = (0..10)
            .map(|_| rx.recv_timeout(Duration::from_millis(100)))
            .collect::<Result<_, _>>()
            .expect("all events should arrive");
        assert_eq!(received.last(), Some(&TestEvent::Recreated(9)));
    }
}
