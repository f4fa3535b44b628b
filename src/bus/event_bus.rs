use futures_util::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};

use super::BusError;
use crate::metrics::Metrics;
use crate::models::Event;

// ============================================================================
// In-Memory Event Bus
// ============================================================================
//
// Multicast: every published event goes to every live subscription, each
// through its own queue, so a slow subscriber never starves another.
//
// Backlog: while nobody is subscribed, events are kept and handed to the
// next subscriber in publish order. Late subscribers only see events
// published after they attached (or the backlog, if one is pending).
//
// Ordering: publish holds the state lock while fanning out, so every
// subscriber observes the same order, which is the publish call order.
//
// Overflow: Unbounded never rejects. Bounded{capacity} rejects the publish
// with BusError::Overflow when the backlog or any subscriber queue is full;
// the event is then delivered to nobody.
//
// ============================================================================

/// Stream of events handed out by [`EventBus::subscribe`]
pub type EventStream = BoxStream<'static, Event>;

/// Buffering policy for the backlog and for each subscriber queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BufferPolicy {
    #[default]
    Unbounded,
    Bounded { capacity: usize },
}

impl BufferPolicy {
    fn capacity(&self) -> Option<usize> {
        match self {
            BufferPolicy::Unbounded => None,
            // mpsc::channel panics on zero
            BufferPolicy::Bounded { capacity } => Some((*capacity).max(1)),
        }
    }
}

enum SubscriberQueue {
    Unbounded(mpsc::UnboundedSender<Event>),
    Bounded(mpsc::Sender<Event>),
}

impl SubscriberQueue {
    fn is_closed(&self) -> bool {
        match self {
            SubscriberQueue::Unbounded(tx) => tx.is_closed(),
            SubscriberQueue::Bounded(tx) => tx.is_closed(),
        }
    }

    fn is_full(&self) -> bool {
        match self {
            SubscriberQueue::Unbounded(_) => false,
            SubscriberQueue::Bounded(tx) => tx.capacity() == 0,
        }
    }

    fn deliver(&self, event: Event) -> bool {
        match self {
            SubscriberQueue::Unbounded(tx) => tx.send(event).is_ok(),
            SubscriberQueue::Bounded(tx) => tx.try_send(event).is_ok(),
        }
    }
}

#[derive(Default)]
struct BusState {
    subscribers: Vec<SubscriberQueue>,
    backlog: VecDeque<Event>,
    closed: bool,
}

struct BusInner {
    state: Mutex<BusState>,
    policy: BufferPolicy,
    metrics: Option<Arc<Metrics>>,
}

/// Cloneable handle to a shared in-memory bus
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BufferPolicy::Unbounded)
    }
}

impl EventBus {
    pub fn new(policy: BufferPolicy) -> Self {
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState::default()),
                policy,
                metrics: None,
            }),
        }
    }

    pub fn with_metrics(policy: BufferPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState::default()),
                policy,
                metrics: Some(metrics),
            }),
        }
    }

    pub fn policy(&self) -> BufferPolicy {
        self.inner.policy
    }

    fn lock_state(&self) -> MutexGuard<'_, BusState> {
        // Critical sections never panic midway, so a poisoned state is still consistent
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish an event to every live subscriber.
    ///
    /// Never blocks. With no subscriber attached the event joins the backlog.
    pub fn publish(&self, event: impl Into<Event>) -> Result<(), BusError> {
        let event = event.into();
        let mut state = self.lock_state();

        let result = self.publish_locked(&mut state, event);
        match (&result, &self.inner.metrics) {
            (Ok(()), Some(metrics)) => metrics.record_published(state.backlog.len()),
            (Err(e), Some(metrics)) => metrics.record_rejected(e.reason()),
            _ => {}
        }

        if let Err(ref e) = result {
            tracing::warn!(error = %e, "Publish rejected");
        }
        result
    }

    fn publish_locked(&self, state: &mut BusState, event: Event) -> Result<(), BusError> {
        if state.closed {
            return Err(BusError::Closed);
        }

        let capacity = self.inner.policy.capacity();
        if let Some(capacity) = capacity {
            let any_full = state.subscribers.iter().any(|s| !s.is_closed() && s.is_full());
            if any_full {
                return Err(BusError::Overflow { capacity });
            }
        }

        // Only publish sends, under this lock, so a failed delivery means the
        // subscriber is gone; it is pruned here
        let mut delivered = 0usize;
        state.subscribers.retain(|subscriber| {
            let ok = subscriber.deliver(event.clone());
            delivered += usize::from(ok);
            ok
        });

        if delivered == 0 {
            if let Some(capacity) = capacity {
                if state.backlog.len() >= capacity {
                    return Err(BusError::Overflow { capacity });
                }
            }
            tracing::debug!(
                backlog = state.backlog.len() + 1,
                "No subscriber attached, buffering event"
            );
            state.backlog.push_back(event);
        }

        Ok(())
    }

    /// Open a new, independent subscription.
    ///
    /// A pending backlog is drained into this subscription first.
    pub fn subscribe(&self) -> EventStream {
        let mut state = self.lock_state();
        let backlog: Vec<Event> = state.backlog.drain(..).collect();

        if !backlog.is_empty() {
            tracing::info!(replayed = backlog.len(), "Replaying buffered events to new subscriber");
        }
        if let Some(metrics) = &self.inner.metrics {
            metrics.set_backlog(0);
        }

        let (queue, stream) = match self.inner.policy.capacity() {
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (
                    SubscriberQueue::Unbounded(tx),
                    UnboundedReceiverStream::new(rx).boxed(),
                )
            }
            Some(capacity) => {
                // The backlog never exceeds capacity, so it always fits
                let (tx, rx) = mpsc::channel(capacity);
                (SubscriberQueue::Bounded(tx), ReceiverStream::new(rx).boxed())
            }
        };

        for event in backlog {
            if !queue.deliver(event) {
                tracing::warn!("Backlog event did not fit the new subscription and was dropped");
            }
        }

        // On a closed bus the queue is dropped here and the stream ends after the backlog
        if !state.closed {
            state.subscribers.push(queue);
        }

        tracing::debug!(subscribers = state.subscribers.len(), "New subscription opened");
        stream
    }

    /// Close the bus. Subscriptions end once their queues are drained and
    /// further publishes fail with [`BusError::Closed`].
    pub fn close(&self) {
        let mut state = self.lock_state();
        if !state.closed {
            state.closed = true;
            state.subscribers.clear();
            tracing::info!("Event bus closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock_state();
        state.subscribers.retain(|s| !s.is_closed());
        state.subscribers.len()
    }

    /// Events waiting for the next subscriber
    pub fn backlog_len(&self) -> usize {
        self.lock_state().backlog.len()
    }
}
