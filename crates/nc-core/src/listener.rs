//! Listener event streams and the per-operation result callback.
//!
//! Multi-shot listeners are modelled as enum-tagged events pushed into a
//! [`Listener`] sink. The usual sink is an unbounded channel with a single
//! consumer per session; [`Listener::adapt`] lets a translation layer feed
//! one event type into a sink of another without spawning a forwarder.
//!
//! Events emitted inside a [`hold_events`] scope are queued and handed to
//! their sinks only when the scope's [`HeldEvents`] are delivered. The router
//! wraps every controller call in such a scope so that no sink runs while the
//! controller lock is held.

use std::cell::RefCell;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::errors::Status;
use crate::medium::Medium;
use crate::payload::Payload;
use crate::types::{ConnectionResponseInfo, DistanceInfo, EndpointId, PayloadProgressInfo};

/// Connection lifecycle events for one endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Channel established; both sides must now accept or reject
    Initiated {
        endpoint_id: EndpointId,
        info: ConnectionResponseInfo,
    },
    /// Both sides accepted
    Accepted { endpoint_id: EndpointId },
    /// Either side rejected
    Rejected {
        endpoint_id: EndpointId,
        status: Status,
    },
    Disconnected { endpoint_id: EndpointId },
    /// Connection moved to another medium
    BandwidthChanged {
        endpoint_id: EndpointId,
        medium: Medium,
    },
}

impl ConnectionEvent {
    pub fn endpoint_id(&self) -> &EndpointId {
        match self {
            ConnectionEvent::Initiated { endpoint_id, .. }
            | ConnectionEvent::Accepted { endpoint_id }
            | ConnectionEvent::Rejected { endpoint_id, .. }
            | ConnectionEvent::Disconnected { endpoint_id }
            | ConnectionEvent::BandwidthChanged { endpoint_id, .. } => endpoint_id,
        }
    }
}

/// Discovery events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscoveryEvent {
    EndpointFound {
        endpoint_id: EndpointId,
        endpoint_info: Bytes,
        service_id: String,
    },
    EndpointLost { endpoint_id: EndpointId },
    EndpointDistanceChanged {
        endpoint_id: EndpointId,
        distance: DistanceInfo,
    },
}

/// Payload events. `Received` hands over ownership of the payload.
#[derive(Debug)]
pub enum PayloadEvent {
    Received {
        endpoint_id: EndpointId,
        payload: Payload,
    },
    Progress {
        endpoint_id: EndpointId,
        info: PayloadProgressInfo,
    },
}

/// Sink for a stream of events of type `E`.
///
/// Cloning shares the same sink. Emitting never blocks.
pub struct Listener<E> {
    sink: Arc<dyn Fn(E) + Send + Sync>,
}

pub type ConnectionListener = Listener<ConnectionEvent>;
pub type DiscoveryListener = Listener<DiscoveryEvent>;
pub type PayloadListener = Listener<PayloadEvent>;

impl<E: Send + 'static> Listener<E> {
    /// Listener backed by an unbounded channel; the receiver is the single
    /// consumer of the stream.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = Self::from_fn(move |event| {
            // Receiver gone means nobody is interested any more.
            let _ = tx.send(event);
        });
        (listener, rx)
    }

    pub fn from_fn(f: impl Fn(E) + Send + Sync + 'static) -> Self {
        Self { sink: Arc::new(f) }
    }

    /// Listener that drops every event.
    pub fn noop() -> Self {
        Self::from_fn(|_| {})
    }

    /// Deliver `event`, or hold it until the enclosing [`hold_events`]
    /// scope on this thread has ended.
    pub fn emit(&self, event: E) {
        let sink = Arc::clone(&self.sink);
        let deferred = HELD_EVENTS.with(|held| match held.borrow_mut().as_mut() {
            Some(queue) => {
                queue.push(Box::new(move || (*sink)(event)));
                None
            }
            None => Some((sink, event)),
        });
        if let Some((sink, event)) = deferred {
            (*sink)(event)
        }
    }

    /// Listener for events of type `F` that translates each one with `map`
    /// and forwards it into this sink.
    pub fn adapt<F, M>(&self, map: M) -> Listener<F>
    where
        F: Send + 'static,
        M: Fn(F) -> E + Send + Sync + 'static,
    {
        let sink = Arc::clone(&self.sink);
        Listener::from_fn(move |event| (*sink)(map(event)))
    }
}

impl<E> Clone for Listener<E> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<E> std::fmt::Debug for Listener<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").finish_non_exhaustive()
    }
}

// ============================================================================
// Held delivery
// ============================================================================

type Delivery = Box<dyn FnOnce()>;

thread_local! {
    static HELD_EVENTS: RefCell<Option<Vec<Delivery>>> = const { RefCell::new(None) };
}

/// Events emitted on this thread while a [`hold_events`] scope was active.
#[must_use = "held events are lost unless delivered"]
pub struct HeldEvents {
    queue: Vec<Delivery>,
}

impl HeldEvents {
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Invoke the held sinks in emission order.
    pub fn deliver(self) {
        for delivery in self.queue {
            delivery();
        }
    }
}

/// Run `f`, holding back every event emitted on this thread until the
/// returned [`HeldEvents`] are delivered. Sinks never run inside `f`.
pub fn hold_events<R>(f: impl FnOnce() -> R) -> (R, HeldEvents) {
    let outer = HELD_EVENTS.with(|held| held.borrow_mut().replace(Vec::new()));
    let result = f();
    let queue = HELD_EVENTS.with(|held| {
        let mut held = held.borrow_mut();
        let queue = held.take().unwrap_or_default();
        *held = outer;
        queue
    });
    (result, HeldEvents { queue })
}

/// Completion callback of one router operation.
///
/// Completed exactly once: [`ResultCallback::complete`] consumes it, and a
/// callback dropped without a result (its task was discarded at shutdown or
/// refused) reports [`Status::Error`].
pub struct ResultCallback {
    cb: Option<Box<dyn FnOnce(Status) + Send>>,
}

impl ResultCallback {
    pub fn new(f: impl FnOnce(Status) + Send + 'static) -> Self {
        Self {
            cb: Some(Box::new(f)),
        }
    }

    /// Callback paired with a receiver resolving to the reported status.
    pub fn channel() -> (Self, oneshot::Receiver<Status>) {
        let (tx, rx) = oneshot::channel();
        let cb = Self::new(move |status| {
            let _ = tx.send(status);
        });
        (cb, rx)
    }

    /// Callback that discards the result.
    pub fn ignore() -> Self {
        Self::new(|_| {})
    }

    pub fn complete(mut self, status: Status) {
        if let Some(cb) = self.cb.take() {
            cb(status);
        }
    }
}

impl Drop for ResultCallback {
    fn drop(&mut self) {
        if let Some(cb) = self.cb.take() {
            cb(Status::Error);
        }
    }
}

impl std::fmt::Debug for ResultCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCallback")
            .field("pending", &self.cb.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_channel_listener_delivers_in_order() {
        let (listener, mut rx) = ConnectionListener::channel();
        let id = EndpointId::from("ABCD");
        listener.emit(ConnectionEvent::Accepted {
            endpoint_id: id.clone(),
        });
        listener.clone().emit(ConnectionEvent::Disconnected {
            endpoint_id: id.clone(),
        });

        assert_eq!(
            rx.try_recv().unwrap(),
            ConnectionEvent::Accepted {
                endpoint_id: id.clone()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ConnectionEvent::Disconnected { endpoint_id: id }
        );
    }

    #[test]
    fn test_adapt_translates() {
        let (listener, mut rx) = Listener::<String>::channel();
        let numbers: Listener<u32> = listener.adapt(|n: u32| format!("n={}", n));
        numbers.emit(7);
        assert_eq!(rx.try_recv().unwrap(), "n=7");
    }

    #[test]
    fn test_emit_after_receiver_dropped() {
        let (listener, rx) = DiscoveryListener::channel();
        drop(rx);
        listener.emit(DiscoveryEvent::EndpointLost {
            endpoint_id: EndpointId::from("WXYZ"),
        });
    }

    #[test]
    fn test_hold_events_defers_until_delivered() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        let listener = Listener::<u32>::from_fn(move |n| {
            seen2.fetch_add(n as usize, Ordering::SeqCst);
        });

        let (value, held) = hold_events(|| {
            listener.emit(1);
            listener.emit(2);
            assert_eq!(seen.load(Ordering::SeqCst), 0);
            "done"
        });
        assert_eq!(value, "done");
        assert_eq!(held.len(), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        held.deliver();
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        listener.emit(4);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_nested_hold_keeps_outer_scope() {
        let (listener, mut rx) = Listener::<u32>::channel();
        let ((), outer) = hold_events(|| {
            listener.emit(1);
            let ((), inner) = hold_events(|| listener.emit(2));
            inner.deliver();
            listener.emit(3);
        });
        assert_eq!(rx.try_recv().unwrap(), 2);
        assert!(rx.try_recv().is_err());
        outer.deliver();
        assert_eq!(rx.try_recv().unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap(), 3);
    }

    #[test]
    fn test_result_callback_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let cb = ResultCallback::new(move |status| {
            assert_eq!(status, Status::Success);
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        cb.complete(Status::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_callback_reports_error() {
        let (cb, mut rx) = ResultCallback::channel();
        drop(cb);
        assert_eq!(rx.try_recv().unwrap(), Status::Error);
    }
}
