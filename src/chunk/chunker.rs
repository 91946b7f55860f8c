//! Outbound helper that splits a bytes payload into a chunk collection.

use std::num::NonZeroUsize;

use bytes::Bytes;

use super::{CHUNK_LAST, CHUNK_TOTAL, ChunkingError, CollectionId, GROUP_ID, GROUP_SEQ};
use crate::message::{Body, JmsMessage, PropertyValue};

/// Splits bytes payloads into chunks of at most `max_chunk_size` bytes.
#[derive(Clone, Copy, Debug)]
pub struct Chunker {
    max_chunk_size: NonZeroUsize,
}

impl Chunker {
    /// Create a chunker capping chunk bodies at `max_chunk_size` bytes.
    #[must_use]
    pub const fn new(max_chunk_size: NonZeroUsize) -> Self { Self { max_chunk_size } }

    /// Maximum chunk body size in bytes.
    #[must_use]
    pub const fn max_chunk_size(&self) -> NonZeroUsize { self.max_chunk_size }

    /// Whether `payload` is large enough to be split.
    #[must_use]
    pub fn needs_chunking(&self, payload: &Bytes) -> bool { payload.len() > self.max_chunk_size.get() }

    /// Split `payload` into data chunks and a trailing final marker.
    ///
    /// Every chunk copies the headers and properties of `template`.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkingError::TooManyChunks`] if the chunk count does not
    /// fit a sequence number.
    pub fn split(
        &self,
        collection: &CollectionId,
        template: &JmsMessage,
        payload: &Bytes,
    ) -> Result<Vec<JmsMessage>, ChunkingError> {
        let size = self.max_chunk_size.get();
        let count = payload.len().div_ceil(size);
        let total = u32::try_from(count)
            .map_err(|_| ChunkingError::TooManyChunks { len: payload.len() })?;

        let group = PropertyValue::String(collection.as_str().to_owned());
        let mut chunks = Vec::with_capacity(count + 1);
        for (sequence, start) in (1..=total).zip((0..payload.len()).step_by(size)) {
            let end = (start + size).min(payload.len());
            let mut chunk = JmsMessage {
                body: Body::Bytes(payload.slice(start..end)),
                ..template.clone()
            };
            chunk.set_property(GROUP_ID, group.clone());
            chunk.set_property(GROUP_SEQ, i64::from(sequence));
            chunk.set_property(CHUNK_LAST, false);
            chunks.push(chunk);
        }

        let mut marker = JmsMessage {
            body: Body::Empty,
            ..template.clone()
        };
        marker.set_property(GROUP_ID, group);
        marker.set_property(CHUNK_TOTAL, i64::from(total));
        marker.set_property(CHUNK_LAST, true);
        chunks.push(marker);
        Ok(chunks)
    }
}
