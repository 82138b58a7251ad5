//! Lifecycle signals
//!
//! A `Signal<E>` is an ordered list of subscriber callbacks. `send` calls them
//! synchronously on the caller's task, in subscription order, and stops at the
//! first subscriber error, which propagates to the sender.
//!
//! ```rust,ignore
//! let signals = SignalBus::new();
//! let id = signals.heartbeat.connect(|event| {
//!     tracing::info!(tick = event.tick, "heartbeat");
//!     Ok(())
//! });
//! signals.heartbeat.disconnect(id);
//! ```

use crate::event::{
    HandlerResultEvent, HeartbeatEvent, MissingReceiptHandleEvent, ReadyEvent, ShutdownEvent,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Error returned by a subscriber
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

type Subscriber<E> = Arc<dyn Fn(&E) -> Result<(), SubscriberError> + Send + Sync>;

/// Identity of a connected subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A subscriber failed while a signal was being sent
#[derive(Error, Debug)]
#[error("Subscriber of signal '{signal}' failed: {source}")]
pub struct SignalError {
    pub signal: &'static str,
    pub subscription: SubscriptionId,
    pub source: SubscriberError,
}

/// Named, ordered set of subscribers for events of type `E`
pub struct Signal<E> {
    name: &'static str,
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber<E>)>>,
}

impl<E> Signal<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Append a subscriber
    pub fn connect<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&E) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(subscriber)));
        id
    }

    /// Remove a subscriber, returning whether it was connected
    pub fn disconnect(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every subscriber in order
    ///
    /// Works on a snapshot, so subscribers may connect or disconnect while
    /// being called.
    pub fn send(&self, event: &E) -> Result<(), SignalError> {
        let snapshot: Vec<(SubscriptionId, Subscriber<E>)> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, subscriber) in snapshot {
            subscriber(event).map_err(|source| SignalError {
                signal: self.name,
                subscription: id,
                source,
            })?;
        }
        Ok(())
    }
}

impl<E> fmt::Debug for Signal<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("subscribers", &self.len())
            .finish()
    }
}

/// The five lifecycle signals of a consumer
#[derive(Debug)]
pub struct SignalBus {
    /// Startup complete, polling begins
    pub ready: Signal<ReadyEvent>,
    /// Once per poll cycle
    pub heartbeat: Signal<HeartbeatEvent>,
    /// Drain initiated
    pub shutdown: Signal<ShutdownEvent>,
    /// After every execution, before finalization
    pub handler_result: Signal<HandlerResultEvent>,
    /// Finalization found no receipt handle
    pub missing_receipt_handle: Signal<MissingReceiptHandleEvent>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self {
            ready: Signal::new("ready"),
            heartbeat: Signal::new("heartbeat"),
            shutdown: Signal::new("shutdown"),
            handler_result: Signal::new("handler_result"),
            missing_receipt_handle: Signal::new("missing_receipt_handle"),
        }
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_subscribers_called_in_order() {
        let signal: Signal<u32> = Signal::new("test");
        let calls = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let calls = calls.clone();
            signal.connect(move |value: &u32| {
                calls.lock().unwrap().push(format!("{tag}:{value}"));
                Ok(())
            });
        }

        signal.send(&7).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["first:7", "second:7", "third:7"]);
    }

    #[test]
    fn test_error_aborts_remaining_subscribers() {
        let signal: Signal<()> = Signal::new("heartbeat");
        let reached = Arc::new(Mutex::new(false));

        signal.connect(|_| Ok(()));
        let failing = signal.connect(|_| Err("heartbeat test".into()));
        let flag = reached.clone();
        signal.connect(move |_| {
            *flag.lock().unwrap() = true;
            Ok(())
        });

        let err = signal.send(&()).unwrap_err();
        assert_eq!(err.signal, "heartbeat");
        assert_eq!(err.subscription, failing);
        assert_eq!(err.source.to_string(), "heartbeat test");
        assert!(!*reached.lock().unwrap());
    }

    #[test]
    fn test_disconnect_by_identity() {
        let signal: Signal<()> = Signal::new("ready");
        let a = signal.connect(|_| Ok(()));
        let b = signal.connect(|_| Err("should be gone".into()));
        assert_eq!(signal.len(), 2);

        assert!(signal.disconnect(b));
        assert!(!signal.disconnect(b));
        assert_eq!(signal.len(), 1);
        assert!(signal.send(&()).is_ok());

        assert!(signal.disconnect(a));
        assert!(signal.is_empty());
    }

    #[test]
    fn test_send_without_subscribers() {
        let signal: Signal<String> = Signal::new("shutdown");
        assert!(signal.send(&"noop".to_string()).is_ok());
    }

    #[test]
    fn test_subscriber_may_disconnect_itself() {
        let signal: Arc<Signal<()>> = Arc::new(Signal::new("once"));
        let slot = Arc::new(Mutex::new(None::<SubscriptionId>));

        let (sig, id_slot) = (signal.clone(), slot.clone());
        let id = signal.connect(move |_| {
            if let Some(id) = *id_slot.lock().unwrap() {
                sig.disconnect(id);
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(id);

        signal.send(&()).unwrap();
        assert!(signal.is_empty());
    }

    #[test]
    fn test_bus_names() {
        let bus = SignalBus::new();
        assert_eq!(bus.ready.name(), "ready");
        assert_eq!(bus.heartbeat.name(), "heartbeat");
        assert_eq!(bus.shutdown.name(), "shutdown");
        assert_eq!(bus.handler_result.name(), "handler_result");
        assert_eq!(bus.missing_receipt_handle.name(), "missing_receipt_handle");
    }
}
