//! In-process message broker.
//!
//! [`EmbeddedBroker`] implements [`Provider`] entirely in memory. It supports
//! queues, topics, temporary queues, durable and shared durable topic
//! subscriptions, selectors, consumer priorities, prefetch windows and
//! message expiry. Undelivered prefetched messages are returned to the queue
//! and flagged as redelivered when a subscription closes.

mod queue;
mod subscription;

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::{sync::mpsc, time::Instant};
use tracing::debug;

use self::{
    queue::{ConsumerSlot, QueueKey, QueueState},
    subscription::{BrokerSubscription, SubscriptionKind},
};
use crate::{
    destination::Destination,
    message::JmsMessage,
    provider::{MessageFilter, Provider, ProviderError, Subscription, SubscriptionSpec},
};

struct TopicSubscriber {
    key: QueueKey,
    filter: MessageFilter,
}

struct DurableState {
    shared: bool,
    active: usize,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<QueueKey, QueueState>,
    topics: HashMap<Destination, Vec<TopicSubscriber>>,
    durable: HashMap<QueueKey, DurableState>,
    temporary: HashSet<Destination>,
    next_consumer: u64,
    next_temporary: u64,
}

impl BrokerState {
    fn publish(&mut self, topic: &Destination, message: &JmsMessage, now: Instant) -> usize {
        let Some(subscribers) = self.topics.get(topic) else {
            return 0;
        };
        let mut delivered = 0;
        for subscriber in subscribers {
            if !subscriber.filter.accepts(message) {
                continue;
            }
            let queue = self.queues.entry(subscriber.key.clone()).or_default();
            queue.buffer.push_back(message.clone());
            queue.dispatch(now);
            delivered += 1;
        }
        delivered
    }

    fn subscribe_topic(
        &mut self,
        spec: &SubscriptionSpec,
    ) -> Result<(QueueKey, SubscriptionKind), ProviderError> {
        let topic = spec.destination.clone();
        let Some(durable) = &spec.durable else {
            self.next_consumer += 1;
            let key = QueueKey::Transient(self.next_consumer);
            self.register_topic_subscriber(&topic, key.clone(), spec.filter.clone());
            return Ok((key, SubscriptionKind::Transient { topic }));
        };

        let key = QueueKey::Durable {
            topic: topic.clone(),
            name: durable.name.clone(),
        };
        match self.durable.get_mut(&key) {
            Some(state) if state.active > 0 && !(state.shared && durable.shared) => {
                return Err(ProviderError::SubscriptionInUse {
                    name: durable.name.clone(),
                });
            }
            Some(state) => {
                state.shared = durable.shared;
                state.active += 1;
            }
            None => {
                self.durable.insert(
                    key.clone(),
                    DurableState {
                        shared: durable.shared,
                        active: 1,
                    },
                );
                self.register_topic_subscriber(&topic, key.clone(), spec.filter.clone());
            }
        }
        Ok((key, SubscriptionKind::Durable))
    }

    fn register_topic_subscriber(&mut self, topic: &Destination, key: QueueKey, filter: MessageFilter) {
        self.queues.entry(key.clone()).or_default();
        self.topics
            .entry(topic.clone())
            .or_default()
            .push(TopicSubscriber { key, filter });
    }
}

struct Inner {
    name: String,
    sequence: AtomicU64,
    state: Mutex<BrokerState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer buffered messages on `key` to consumers with free credit.
    fn pump(&self, key: &QueueKey) {
        let mut state = self.lock();
        if let Some(queue) = state.queues.get_mut(key) {
            queue.dispatch(Instant::now());
        }
    }
}

/// In-memory [`Provider`].
///
/// Cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct EmbeddedBroker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EmbeddedBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedBroker")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl Default for EmbeddedBroker {
    fn default() -> Self { Self::new("relaymq") }
}

impl EmbeddedBroker {
    /// Create an empty broker; `name` prefixes generated identifiers.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                sequence: AtomicU64::new(0),
                state: Mutex::new(BrokerState::default()),
            }),
        }
    }

    /// Broker name.
    #[must_use]
    pub fn name(&self) -> &str { &self.inner.name }

    /// Number of messages buffered on a queue and not yet handed to a
    /// consumer.
    #[must_use]
    pub fn queue_depth(&self, destination: &Destination) -> usize {
        self.inner
            .lock()
            .queues
            .get(&QueueKey::Destination(destination.clone()))
            .map_or(0, |queue| queue.buffer.len())
    }

    /// Number of messages retained for a durable subscription.
    #[must_use]
    pub fn durable_depth(&self, topic: &Destination, name: &str) -> usize {
        let key = QueueKey::Durable {
            topic: topic.clone(),
            name: name.to_owned(),
        };
        self.inner
            .lock()
            .queues
            .get(&key)
            .map_or(0, |queue| queue.buffer.len())
    }

    /// Whether `destination` is a live temporary queue.
    #[must_use]
    pub fn has_temporary_queue(&self, destination: &Destination) -> bool {
        self.inner.lock().temporary.contains(destination)
    }

    /// Number of consumers attached to a queue.
    #[must_use]
    pub fn consumer_count(&self, destination: &Destination) -> usize {
        self.inner
            .lock()
            .queues
            .get(&QueueKey::Destination(destination.clone()))
            .map_or(0, |queue| queue.consumers.len())
    }

    fn stamp(&self, destination: &Destination, message: &mut JmsMessage) -> String {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("ID:{}-{sequence}", self.inner.name);
        let now_ms = Utc::now().timestamp_millis();
        message.message_id = Some(id.clone());
        message.destination = Some(destination.clone());
        message.timestamp = Some(now_ms);
        message.redelivered = false;
        match message.time_to_live.take().filter(|ttl| !ttl.is_zero()) {
            Some(ttl) => {
                let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
                message.expiration = now_ms.saturating_add(millis);
                message.expires_at = Some(Instant::now() + ttl);
            }
            None => {
                message.expiration = 0;
                message.expires_at = None;
            }
        }
        id
    }
}

#[async_trait]
impl Provider for EmbeddedBroker {
    async fn send(
        &self,
        destination: &Destination,
        mut message: JmsMessage,
    ) -> Result<String, ProviderError> {
        let id = self.stamp(destination, &mut message);
        let now = Instant::now();
        let mut state = self.inner.lock();
        match destination {
            Destination::TemporaryQueue(_) if !state.temporary.contains(destination) => {
                return Err(ProviderError::TemporaryDestinationDeleted(destination.clone()));
            }
            Destination::Queue(_) | Destination::TemporaryQueue(_) => {
                let queue = state
                    .queues
                    .entry(QueueKey::Destination(destination.clone()))
                    .or_default();
                queue.buffer.push_back(message);
                queue.dispatch(now);
            }
            Destination::Topic(_) | Destination::TemporaryTopic(_) => {
                let subscribers = state.publish(destination, &message, now);
                debug!(destination = %destination, subscribers, "published to topic");
            }
        }
        debug!(destination = %destination, message_id = %id, "message accepted");
        Ok(id)
    }

    async fn create_temporary_queue(&self) -> Result<Destination, ProviderError> {
        let mut state = self.inner.lock();
        state.next_temporary += 1;
        let destination =
            Destination::TemporaryQueue(format!("{}.temp.{}", self.inner.name, state.next_temporary));
        state.temporary.insert(destination.clone());
        state
            .queues
            .insert(QueueKey::Destination(destination.clone()), QueueState::default());
        debug!(destination = %destination, "temporary queue created");
        Ok(destination)
    }

    async fn delete_temporary_destination(
        &self,
        destination: &Destination,
    ) -> Result<(), ProviderError> {
        if !destination.is_temporary() {
            return Err(ProviderError::Unsupported(
                "only temporary destinations can be deleted",
            ));
        }
        let mut state = self.inner.lock();
        if !state.temporary.remove(destination) {
            return Err(ProviderError::TemporaryDestinationDeleted(destination.clone()));
        }
        state
            .queues
            .remove(&QueueKey::Destination(destination.clone()));
        debug!(destination = %destination, "temporary queue deleted");
        Ok(())
    }

    async fn subscribe(
        &self,
        spec: SubscriptionSpec,
    ) -> Result<Box<dyn Subscription>, ProviderError> {
        let mut state = self.inner.lock();
        let (key, kind, filter) = match &spec.destination {
            Destination::TemporaryQueue(_) if !state.temporary.contains(&spec.destination) => {
                return Err(ProviderError::TemporaryDestinationDeleted(
                    spec.destination.clone(),
                ));
            }
            Destination::Queue(_) | Destination::TemporaryQueue(_) => (
                QueueKey::Destination(spec.destination.clone()),
                SubscriptionKind::Queue,
                spec.filter.clone(),
            ),
            Destination::Topic(_) | Destination::TemporaryTopic(_) => {
                let (key, kind) = state.subscribe_topic(&spec)?;
                (key, kind, MessageFilter::All)
            }
        };

        state.next_consumer += 1;
        let consumer = state.next_consumer;
        let (tx, rx) = mpsc::channel(spec.prefetch.get());
        let queue = state.queues.entry(key.clone()).or_default();
        queue.consumers.push(ConsumerSlot {
            id: consumer,
            priority: spec.priority,
            filter: filter.clone(),
            tx,
        });
        queue.dispatch(Instant::now());
        drop(state);

        debug!(
            destination = %spec.destination,
            consumer,
            priority = spec.priority,
            filter = ?spec.filter,
            "subscription opened"
        );
        Ok(Box::new(BrokerSubscription {
            broker: Arc::clone(&self.inner),
            key,
            consumer,
            rx,
            kind,
            dynamic: filter.is_dynamic(),
        }))
    }
}
