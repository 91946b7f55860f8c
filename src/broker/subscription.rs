//! Consumer handle returned by [`super::EmbeddedBroker`].

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Inner, queue::QueueKey};
use crate::{destination::Destination, message::JmsMessage, provider::Subscription};

/// How often buffered messages are re-offered to a consumer with a dynamic
/// filter while it waits.
const DYNAMIC_FILTER_RECHECK: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub(super) enum SubscriptionKind {
    Queue,
    Transient { topic: Destination },
    Durable,
}

pub(super) struct BrokerSubscription {
    pub(super) broker: Arc<Inner>,
    pub(super) key: QueueKey,
    pub(super) consumer: u64,
    pub(super) rx: mpsc::Receiver<JmsMessage>,
    pub(super) kind: SubscriptionKind,
    pub(super) dynamic: bool,
}

impl BrokerSubscription {
    fn detach(&mut self) {
        let mut state = self.broker.lock();
        if let Some(queue) = state.queues.get_mut(&self.key) {
            queue.remove_consumer(self.consumer);
        }

        let mut undelivered = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            undelivered.push(message);
        }
        self.rx.close();

        match &self.kind {
            SubscriptionKind::Transient { topic } => {
                state.queues.remove(&self.key);
                if let Some(subscribers) = state.topics.get_mut(topic) {
                    subscribers.retain(|s| s.key != self.key);
                }
            }
            SubscriptionKind::Durable => {
                if let Some(durable) = state.durable.get_mut(&self.key) {
                    durable.active = durable.active.saturating_sub(1);
                }
                if let Some(queue) = state.queues.get_mut(&self.key) {
                    queue.requeue(undelivered);
                    queue.dispatch(tokio::time::Instant::now());
                }
            }
            SubscriptionKind::Queue => {
                if let Some(queue) = state.queues.get_mut(&self.key) {
                    queue.requeue(undelivered);
                    queue.dispatch(tokio::time::Instant::now());
                }
            }
        }
    }
}

#[async_trait]
impl Subscription for BrokerSubscription {
    async fn receive(&mut self) -> Option<JmsMessage> {
        loop {
            self.broker.pump(&self.key);
            if !self.dynamic {
                let message = self.rx.recv().await;
                self.broker.pump(&self.key);
                return message;
            }
            tokio::select! {
                message = self.rx.recv() => {
                    self.broker.pump(&self.key);
                    return message;
                }
                () = tokio::time::sleep(DYNAMIC_FILTER_RECHECK) => {}
            }
        }
    }

    async fn close(self: Box<Self>) { drop(self); }
}

impl Drop for BrokerSubscription {
    fn drop(&mut self) { self.detach(); }
}
