//! Pending reply bookkeeping.
//!
//! Entries are removed through [`DashMap::remove`] or
//! [`DashMap::remove_if`] only; whichever path removes an entry owns its
//! completion sender, so each request completes at most once.

use std::time::Duration;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::{sync::oneshot, time::Instant};

use crate::{error::JmsError, message::JmsMessage, metrics};

pub(crate) type ReplyResult = Result<JmsMessage, JmsError>;

pub(crate) struct PendingReply {
    tx: oneshot::Sender<ReplyResult>,
    original_correlation_id: Option<String>,
    created: Instant,
    deadline: Instant,
    timeout: Duration,
}

impl PendingReply {
    pub(crate) fn new(
        tx: oneshot::Sender<ReplyResult>,
        original_correlation_id: Option<String>,
        timeout: Duration,
        now: Instant,
    ) -> Self {
        Self {
            tx,
            original_correlation_id,
            created: now,
            deadline: now + timeout,
            timeout,
        }
    }

    fn finish(self, result: ReplyResult) {
        metrics::dec_pending();
        // the caller may have stopped waiting
        let _ = self.tx.send(result);
    }
}

#[derive(Default)]
pub(crate) struct PendingReplies {
    entries: DashMap<String, PendingReply>,
}

impl PendingReplies {
    pub(crate) fn insert(&self, id: String, entry: PendingReply) -> Result<(), JmsError> {
        match self.entries.entry(id) {
            Entry::Occupied(occupied) => Err(JmsError::DuplicateCorrelationId(occupied.key().clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                metrics::inc_pending();
                Ok(())
            }
        }
    }

    pub(crate) fn contains(&self, id: &str) -> bool { self.entries.contains_key(id) }

    pub(crate) fn len(&self) -> usize { self.entries.len() }

    /// Complete the entry for `id` with `message`, restoring the caller's
    /// correlation id on it. Hands the message back when nothing is pending.
    pub(crate) fn complete(&self, id: &str, mut message: JmsMessage) -> Result<Duration, JmsMessage> {
        let Some((_, entry)) = self.entries.remove(id) else {
            return Err(message);
        };
        if let Some(original) = &entry.original_correlation_id {
            message.correlation_id = Some(original.clone());
        }
        let elapsed = entry.created.elapsed();
        entry.finish(Ok(message));
        Ok(elapsed)
    }

    /// Drop the entry for `id` without signalling the caller.
    pub(crate) fn cancel(&self, id: &str) -> bool {
        self.entries
            .remove(id)
            .map(|_| metrics::dec_pending())
            .is_some()
    }

    /// Move the entry registered under `old` to `new`. Returns `Ok(false)`
    /// when `old` already completed.
    pub(crate) fn rekey(&self, old: &str, new: String) -> Result<bool, JmsError> {
        let Some((_, entry)) = self.entries.remove(old) else {
            return Ok(false);
        };
        match self.entries.entry(new) {
            Entry::Occupied(occupied) => {
                let id = occupied.key().clone();
                drop(occupied);
                entry.finish(Err(JmsError::DuplicateCorrelationId(id.clone())));
                Err(JmsError::DuplicateCorrelationId(id))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(true)
            }
        }
    }

    /// Fail every entry whose deadline is at or before `now`, returning how
    /// many expired.
    pub(crate) fn expire(&self, now: Instant) -> usize {
        let due: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| entry.key().clone())
            .collect();
        let mut expired = 0;
        for id in due {
            if let Some((id, entry)) = self.entries.remove_if(&id, |_, entry| entry.deadline <= now) {
                let timeout = entry.timeout;
                entry.finish(Err(JmsError::ReplyTimeout {
                    correlation_id: id,
                    timeout,
                }));
                metrics::inc_timeouts();
                expired += 1;
            }
        }
        expired
    }

    /// Fail every entry with `error`.
    pub(crate) fn fail_all(&self, error: impl Fn() -> JmsError) -> usize {
        let ids: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        ids.into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .map(|(_, entry)| entry.finish(Err(error())))
            .count()
    }
}
