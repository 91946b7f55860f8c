//! Buffered queue state and consumer dispatch.

use std::collections::VecDeque;

use tokio::{
    sync::mpsc::{self, error::TrySendError},
    time::Instant,
};

use crate::{destination::Destination, message::JmsMessage, provider::MessageFilter};

/// Identifies a message buffer inside the broker.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(super) enum QueueKey {
    /// A queue or temporary queue.
    Destination(Destination),
    /// The private buffer of a non-durable topic subscriber.
    Transient(u64),
    /// The buffer retained for a durable topic subscription.
    Durable { topic: Destination, name: String },
}

pub(super) struct ConsumerSlot {
    pub(super) id: u64,
    pub(super) priority: i32,
    pub(super) filter: MessageFilter,
    pub(super) tx: mpsc::Sender<JmsMessage>,
}

impl ConsumerSlot {
    fn has_credit(&self) -> bool { !self.tx.is_closed() && self.tx.capacity() > 0 }
}

#[derive(Default)]
pub(super) struct QueueState {
    pub(super) buffer: VecDeque<JmsMessage>,
    pub(super) consumers: Vec<ConsumerSlot>,
    last_served: Option<u64>,
}

impl QueueState {
    /// Return messages to the head of the queue, preserving their order.
    pub(super) fn requeue(&mut self, messages: Vec<JmsMessage>) {
        for mut message in messages.into_iter().rev() {
            message.redelivered = true;
            self.buffer.push_front(message);
        }
    }

    pub(super) fn remove_consumer(&mut self, id: u64) -> Option<ConsumerSlot> {
        let index = self.consumers.iter().position(|slot| slot.id == id)?;
        Some(self.consumers.remove(index))
    }

    /// Pick the consumer for `message`: the highest priority consumer with
    /// credit whose filter accepts it, rotating among equal priorities.
    fn pick(&self, message: &JmsMessage) -> Option<usize> {
        let candidates: Vec<usize> = self
            .consumers
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.has_credit() && slot.filter.accepts(message))
            .map(|(index, _)| index)
            .collect();
        let top = candidates
            .iter()
            .map(|&index| self.consumers[index].priority)
            .max()?;
        let mut best: Vec<usize> = candidates
            .into_iter()
            .filter(|&index| self.consumers[index].priority == top)
            .collect();
        best.sort_by_key(|&index| self.consumers[index].id);
        let after_last = self.last_served.and_then(|last| {
            best.iter()
                .copied()
                .find(|&index| self.consumers[index].id > last)
        });
        after_last.or_else(|| best.first().copied())
    }

    /// Hand buffered messages to consumers with credit, dropping expired ones.
    pub(super) fn dispatch(&mut self, now: Instant) {
        let mut index = 0;
        while index < self.buffer.len() {
            if self.buffer[index].is_expired_at(now) {
                self.buffer.remove(index);
                continue;
            }
            let Some(slot_index) = self.pick(&self.buffer[index]) else {
                index += 1;
                continue;
            };
            let Some(message) = self.buffer.remove(index) else {
                break;
            };
            let slot = &self.consumers[slot_index];
            match slot.tx.try_send(message) {
                Ok(()) => self.last_served = Some(slot.id),
                Err(TrySendError::Full(message) | TrySendError::Closed(message)) => {
                    self.buffer.insert(index, message);
                    index += 1;
                }
            }
        }
    }
}
