//! Chunk metadata carried in message properties.

use super::{CHUNK_LAST, CHUNK_TOTAL, CollectionId, GROUP_ID, GROUP_SEQ, ReassemblyError};
use crate::message::JmsMessage;

/// Position of a message within a chunk collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkHeader {
    /// A slice of the payload.
    Data {
        /// Collection the chunk belongs to.
        collection: CollectionId,
        /// One-based position.
        sequence: u32,
    },
    /// The empty marker closing a collection.
    Final {
        /// Collection the marker closes.
        collection: CollectionId,
        /// Number of data chunks in the collection.
        total: u32,
    },
}

impl ChunkHeader {
    /// Read chunk metadata from `message`.
    ///
    /// Returns `Ok(None)` for messages that are not part of a collection.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError::MalformedHeader`] when the chunk marker is
    /// present but the remaining properties are missing or mistyped.
    pub fn read(message: &JmsMessage) -> Result<Option<Self>, ReassemblyError> {
        let Some(last) = message.property(CHUNK_LAST) else {
            return Ok(None);
        };
        let last = last.as_bool().ok_or(ReassemblyError::MalformedHeader {
            property: CHUNK_LAST,
        })?;
        let collection = message
            .property(GROUP_ID)
            .and_then(|value| value.as_str())
            .map(CollectionId::from)
            .ok_or(ReassemblyError::MalformedHeader { property: GROUP_ID })?;

        let number = |property: &'static str| {
            message
                .property(property)
                .and_then(|value| value.as_i64())
                .and_then(|value| u32::try_from(value).ok())
                .ok_or(ReassemblyError::MalformedHeader { property })
        };

        if last {
            Ok(Some(Self::Final {
                collection,
                total: number(CHUNK_TOTAL)?,
            }))
        } else {
            let sequence = number(GROUP_SEQ)?;
            if sequence == 0 {
                return Err(ReassemblyError::ZeroSequence { collection });
            }
            Ok(Some(Self::Data {
                collection,
                sequence,
            }))
        }
    }

    /// Collection this header belongs to.
    #[must_use]
    pub fn collection(&self) -> &CollectionId {
        match self {
            Self::Data { collection, .. } | Self::Final { collection, .. } => collection,
        }
    }

    /// Remove chunk properties from `message`.
    pub fn strip(message: &mut JmsMessage) {
        for property in [GROUP_ID, GROUP_SEQ, CHUNK_TOTAL, CHUNK_LAST] {
            message.properties.remove(property);
        }
    }
}
