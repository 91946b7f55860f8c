//! Errors raised while splitting or rebuilding chunked payloads.

use std::num::NonZeroUsize;

use thiserror::Error;

use super::CollectionId;

/// Errors produced while splitting an outbound payload.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// The payload needs more chunks than a sequence number can address.
    #[error("payload of {len} bytes needs too many chunks")]
    TooManyChunks {
        /// Payload length in bytes.
        len: usize,
    },
}

/// Errors produced while reassembling inbound chunks.
///
/// Any error discards the partial collection it concerns.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReassemblyError {
    /// A chunk property is missing or has the wrong type.
    #[error("malformed chunk property {property}")]
    MalformedHeader {
        /// Offending property name.
        property: &'static str,
    },
    /// Sequence numbers start at one.
    #[error("chunk of collection {collection} has sequence zero")]
    ZeroSequence {
        /// Collection the chunk belongs to.
        collection: CollectionId,
    },
    /// The same sequence arrived twice.
    #[error("duplicate chunk {sequence} for collection {collection}")]
    DuplicateSequence {
        /// Collection the chunk belongs to.
        collection: CollectionId,
        /// Repeated sequence number.
        sequence: u32,
    },
    /// A second final marker arrived.
    #[error("duplicate final marker for collection {collection}")]
    DuplicateFinal {
        /// Collection the marker belongs to.
        collection: CollectionId,
    },
    /// A chunk claims a position past the announced total.
    #[error("chunk {sequence} exceeds total {total} for collection {collection}")]
    SequenceBeyondTotal {
        /// Collection the chunk belongs to.
        collection: CollectionId,
        /// Offending sequence number.
        sequence: u32,
        /// Total announced by the final marker.
        total: u32,
    },
    /// The reassembled payload would exceed the configured cap.
    #[error("collection {collection} reached {attempted} bytes, above the {limit} byte limit")]
    TooLarge {
        /// Collection being reassembled.
        collection: CollectionId,
        /// Size the payload would have reached.
        attempted: usize,
        /// Configured cap.
        limit: NonZeroUsize,
    },
}
