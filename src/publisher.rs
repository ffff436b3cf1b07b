//! Topic-based in-process event bus.
//!
//! Delivery is synchronous on the publishing thread, in subscription order. Worker threads
//! never touch listeners directly: they hold an [`EventSender`] and enqueue events which the
//! owning thread delivers with [`Publisher::drain`], preserving publication order.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::mpsc::{channel, Receiver, Sender},
};

use crate::{
    error::RideError,
    event::{topics, Event, EventData},
};

pub type Listener = Box<dyn FnMut(&Event) -> Result<(), RideError>>;

/// Callback attached to a single handle (a run or an introspection) rather than to a topic.
pub type Callback = Box<dyn FnMut(&Event) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    prefix: String,
    listener: Listener,
}

/// Thread-safe handle for posting events to a [`Publisher`] from worker threads.
#[derive(Debug, Clone)]
pub struct EventSender(Sender<Event>);

impl EventSender {
    pub fn send(&self, event: Event) -> Result<(), RideError> {
        Ok(self.0.send(event)?)
    }
}

pub struct Publisher {
    subscriptions: Vec<Subscription>,
    next_id: u64,
    queue_tx: Sender<Event>,
    queue_rx: Receiver<Event>,
}

impl Default for Publisher {
    fn default() -> Self {
        let (queue_tx, queue_rx) = channel();
        Publisher {
            subscriptions: Vec::new(),
            next_id: 0,
            queue_tx,
            queue_rx,
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field(
                "subscriptions",
                &self
                    .subscriptions
                    .iter()
                    .map(|s| s.prefix.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for every topic equal to or below `prefix`.
    pub fn subscribe<F>(&mut self, prefix: impl Into<String>, listener: F) -> SubscriptionId
    where
        F: FnMut(&Event) -> Result<(), RideError> + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            prefix: prefix.into(),
            listener: Box::new(listener),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        before != self.subscriptions.len()
    }

    pub fn sender(&self) -> EventSender {
        EventSender(self.queue_tx.clone())
    }

    /// Deliver `event` to every matching listener. Listener failures (errors or panics) are
    /// logged and re-published on [`topics::LOG_EXCEPTION`]; they never stop delivery to the
    /// remaining listeners.
    pub fn publish(&mut self, event: Event) {
        tracing::trace!("[Publisher] {}", event);
        let failures = self.deliver(&event);
        if event.topic == topics::LOG_EXCEPTION {
            return;
        }
        for (topic, error) in failures {
            let failure = Event::new(
                topics::LOG_EXCEPTION,
                EventData::ListenerFailure { topic, error },
            );
            // Failures while reporting failures are only logged.
            self.deliver(&failure);
        }
    }

    /// Deliver every event queued through an [`EventSender`], in the order they were sent.
    /// Returns the number of events delivered.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.queue_rx.try_recv() {
            self.publish(event);
            count += 1;
        }
        count
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn deliver(&mut self, event: &Event) -> Vec<(String, RideError)> {
        let mut failures = Vec::new();
        for subscription in self
            .subscriptions
            .iter_mut()
            .filter(|s| topics::matches(&s.prefix, &event.topic))
        {
            let listener = &mut subscription.listener;
            let result = catch_unwind(AssertUnwindSafe(|| listener(event)));
            let error = match result {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => error,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "listener panicked".to_string());
                    RideError::Internal(message)
                }
            };
            tracing::error!(
                "[Publisher] listener on '{}' failed for {}: {}",
                subscription.prefix,
                event.topic,
                error
            );
            failures.push((event.topic.clone(), error));
        }
        failures
    }
}

/// Per-handle event tap. Worker threads post into the relay; the owning thread pumps it,
/// calling the handle's callbacks before forwarding each event to the project bus.
pub struct Relay {
    tx: Sender<Event>,
    rx: Receiver<Event>,
    callbacks: Vec<Callback>,
    forward: EventSender,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl Relay {
    pub fn new(forward: EventSender) -> Self {
        let (tx, rx) = channel();
        Relay {
            tx,
            rx,
            callbacks: Vec::new(),
            forward,
        }
    }

    /// Handle for worker threads; their events reach callbacks on the next [`Relay::pump`].
    pub fn sender(&self) -> EventSender {
        EventSender(self.tx.clone())
    }

    pub fn on_event<F>(&mut self, callback: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Hand `event` to the callbacks, then to the project bus.
    pub fn post(&mut self, event: Event) {
        for callback in self.callbacks.iter_mut() {
            callback(&event);
        }
        if self.forward.send(event).is_err() {
            tracing::debug!("[Relay] Publisher is gone, event not forwarded");
        }
    }

    /// Post everything workers queued so far. Returns the number of events.
    pub fn pump(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.post(event);
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};
    use test_log::test;

    #[test]
    fn prefix_subscription_receives_sub_topics_in_order() {
        let mut publisher = Publisher::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let a = seen.clone();
        publisher.subscribe(topics::DATAFILE, move |e| {
            a.borrow_mut().push(format!("first:{}", e.topic));
            Ok(())
        });
        let b = seen.clone();
        publisher.subscribe("ride", move |e| {
            b.borrow_mut().push(format!("second:{}", e.topic));
            Ok(())
        });

        publisher.publish(Event::bare(topics::DATAFILE_SAVED));
        publisher.publish(Event::bare(topics::RUNNER_LOG));

        assert_eq!(
            *seen.borrow(),
            vec![
                "first:ride.datafile.saved",
                "second:ride.datafile.saved",
                "second:ride.runner.log"
            ]
        );
    }

    #[test]
    fn prefix_match_respects_segments() {
        assert!(topics::matches("ride.datafile", "ride.datafile.saved"));
        assert!(topics::matches("ride.datafile", "ride.datafile"));
        assert!(!topics::matches("ride.data", "ride.datafile.saved"));
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let mut publisher = Publisher::new();
        let delivered = Rc::new(RefCell::new(0));
        let failures = Rc::new(RefCell::new(Vec::new()));
        publisher.subscribe("ride", |_| Err(RideError::Data("boom".to_string())));
        publisher.subscribe("ride.datafile", |_| panic!("listener exploded"));
        let d = delivered.clone();
        publisher.subscribe("ride.datafile", move |_| {
            *d.borrow_mut() += 1;
            Ok(())
        });
        let f = failures.clone();
        publisher.subscribe(topics::LOG_EXCEPTION, move |e| {
            f.borrow_mut().push(e.data.clone());
            Ok(())
        });

        publisher.publish(Event::bare(topics::DATAFILE_OPENED));

        assert_eq!(*delivered.borrow(), 1);
        assert_eq!(failures.borrow().len(), 2);
    }

    #[test]
    fn queued_events_are_drained_in_order() {
        let mut publisher = Publisher::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        publisher.subscribe(topics::RUNNER, move |e| {
            s.borrow_mut().push(e.data.to_string());
            Ok(())
        });
        let sender = publisher.sender();
        let handle = std::thread::spawn(move || {
            for i in 0..3 {
                sender
                    .send(Event::new(
                        topics::RUNNER_LOG,
                        EventData::Log {
                            level: "INFO".to_string(),
                            text: i.to_string(),
                        },
                    ))
                    .unwrap();
            }
        });
        handle.join().unwrap();

        assert_eq!(publisher.drain(), 3);
        assert_eq!(*seen.borrow(), vec!["INFO, 0", "INFO, 1", "INFO, 2"]);
    }

    #[test]
    fn relay_calls_back_before_forwarding() {
        let mut publisher = Publisher::new();
        let order = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let o = order.clone();
        publisher.subscribe(topics::RUNNER, move |e| {
            o.lock().push(format!("bus:{}", e.topic));
            Ok(())
        });
        let mut relay = Relay::new(publisher.sender());
        let o = order.clone();
        relay.on_event(move |e| o.lock().push(format!("handle:{}", e.topic)));

        let worker = relay.sender();
        std::thread::spawn(move || worker.send(Event::bare(topics::RUNNER_LOG)).unwrap())
            .join()
            .unwrap();
        assert!(order.lock().is_empty());
        assert_eq!(relay.pump(), 1);
        relay.post(Event::bare(topics::RUNNER_PAUSED));
        publisher.drain();

        assert_eq!(
            *order.lock(),
            vec![
                "handle:ride.runner.log",
                "handle:ride.runner.paused",
                "bus:ride.runner.log",
                "bus:ride.runner.paused"
            ]
        );
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut publisher = Publisher::new();
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        let id = publisher.subscribe("ride", move |_| {
            *c.borrow_mut() += 1;
            Ok(())
        });
        publisher.publish(Event::bare(topics::DATAFILE_SAVED));
        assert!(publisher.unsubscribe(id));
        publisher.publish(Event::bare(topics::DATAFILE_SAVED));
        assert_eq!(*count.borrow(), 1);
    }
}
