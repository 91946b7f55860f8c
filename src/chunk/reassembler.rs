//! Inbound helper that rebuilds chunk collections.
//!
//! [`Reassembler`] buffers data chunks per [`CollectionId`] in sequence order,
//! whatever order they arrive in. A collection completes once its final marker
//! has been seen and every sequence `1..=N` is present. Partial collections
//! are capped in size and evicted after a timeout.

use std::{
    collections::{BTreeMap, HashMap, hash_map::Entry},
    num::NonZeroUsize,
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use tokio::time::Instant;

use super::{ChunkHeader, CollectionId, ReassemblyError};
use crate::message::{Body, JmsMessage};

#[derive(Debug)]
struct PartialCollection {
    template: JmsMessage,
    chunks: BTreeMap<u32, Bytes>,
    total: Option<u32>,
    size: usize,
    started_at: Instant,
}

impl PartialCollection {
    fn new(template: JmsMessage, started_at: Instant) -> Self {
        Self {
            template,
            chunks: BTreeMap::new(),
            total: None,
            size: 0,
            started_at,
        }
    }

    fn accept(
        &mut self,
        collection: &CollectionId,
        header: &ChunkHeader,
        body: &Body,
        limit: NonZeroUsize,
    ) -> Result<(), ReassemblyError> {
        match *header {
            ChunkHeader::Data { sequence, .. } => {
                if let Some(total) = self.total.filter(|&total| sequence > total) {
                    return Err(ReassemblyError::SequenceBeyondTotal {
                        collection: collection.clone(),
                        sequence,
                        total,
                    });
                }
                if self.chunks.contains_key(&sequence) {
                    return Err(ReassemblyError::DuplicateSequence {
                        collection: collection.clone(),
                        sequence,
                    });
                }
                let payload = body.as_bytes().cloned().unwrap_or_default();
                let attempted = self.size.saturating_add(payload.len());
                if attempted > limit.get() {
                    return Err(ReassemblyError::TooLarge {
                        collection: collection.clone(),
                        attempted,
                        limit,
                    });
                }
                self.size = attempted;
                self.chunks.insert(sequence, payload);
            }
            ChunkHeader::Final { total, .. } => {
                if self.total.is_some() {
                    return Err(ReassemblyError::DuplicateFinal {
                        collection: collection.clone(),
                    });
                }
                if let Some(&sequence) = self.chunks.keys().next_back().filter(|&&s| s > total) {
                    return Err(ReassemblyError::SequenceBeyondTotal {
                        collection: collection.clone(),
                        sequence,
                        total,
                    });
                }
                self.total = Some(total);
            }
        }
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.total
            .is_some_and(|total| usize::try_from(total).is_ok_and(|t| t == self.chunks.len()))
    }

    fn into_message(self) -> JmsMessage {
        let mut payload = BytesMut::with_capacity(self.size);
        for chunk in self.chunks.into_values() {
            payload.extend_from_slice(&chunk);
        }
        let mut message = self.template;
        ChunkHeader::strip(&mut message);
        message.body = Body::Bytes(payload.freeze());
        message
    }
}

/// Stateful chunk reassembler with timeout-based eviction.
#[derive(Debug)]
pub struct Reassembler {
    max_message_size: NonZeroUsize,
    timeout: Duration,
    buffers: HashMap<CollectionId, PartialCollection>,
}

impl Reassembler {
    /// Create a reassembler capping rebuilt payloads at `max_message_size`
    /// bytes and evicting partial collections older than `timeout`.
    #[must_use]
    pub fn new(max_message_size: NonZeroUsize, timeout: Duration) -> Self {
        Self {
            max_message_size,
            timeout,
            buffers: HashMap::new(),
        }
    }

    /// Feed `message` using the current time.
    ///
    /// Returns `Ok(Some(_))` for ordinary messages and for the chunk that
    /// completes a collection, `Ok(None)` while more chunks are required.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError`] if the chunk is malformed, duplicated,
    /// beyond the announced total or over the size cap.
    pub fn push(&mut self, message: JmsMessage) -> Result<Option<JmsMessage>, ReassemblyError> {
        self.push_at(message, Instant::now())
    }

    /// Feed `message` using an explicit clock reading.
    ///
    /// # Errors
    ///
    /// See [`Reassembler::push`].
    pub fn push_at(
        &mut self,
        message: JmsMessage,
        now: Instant,
    ) -> Result<Option<JmsMessage>, ReassemblyError> {
        self.purge_expired_at(now);

        let Some(header) = ChunkHeader::read(&message)? else {
            return Ok(Some(message));
        };
        let collection = header.collection().clone();

        let mut entry = match self.buffers.entry(collection.clone()) {
            Entry::Occupied(occupied) => occupied,
            Entry::Vacant(vacant) => {
                let template = JmsMessage {
                    body: Body::Empty,
                    ..message.clone()
                };
                vacant.insert_entry(PartialCollection::new(template, now))
            }
        };

        if let Err(err) =
            entry
                .get_mut()
                .accept(&collection, &header, &message.body, self.max_message_size)
        {
            entry.remove();
            return Err(err);
        }
        if entry.get().is_complete() {
            return Ok(Some(entry.remove().into_message()));
        }
        Ok(None)
    }

    /// Remove partial collections that exceeded the timeout.
    ///
    /// Returns the identifiers of evicted collections.
    pub fn purge_expired(&mut self) -> Vec<CollectionId> { self.purge_expired_at(Instant::now()) }

    /// Remove partial collections that exceeded the timeout using an explicit
    /// clock reading.
    pub fn purge_expired_at(&mut self, now: Instant) -> Vec<CollectionId> {
        let mut evicted = Vec::new();
        let timeout = self.timeout;
        self.buffers.retain(|collection, partial| {
            let expired = now.saturating_duration_since(partial.started_at) >= timeout;
            if expired {
                evicted.push(collection.clone());
            }
            !expired
        });
        evicted
    }

    /// Number of partial collections currently buffered.
    #[must_use]
    pub fn buffered_len(&self) -> usize { self.buffers.len() }
}
