//! Transparent chunking of large byte payloads.
//!
//! Producers split bytes bodies larger than `maxChunkSize` into a collection
//! of data chunks followed by an empty final marker; consumers feed every
//! inbound message through a [`Reassembler`], which passes ordinary messages
//! straight through and rebuilds chunked ones regardless of arrival order.
//!
//! Chunk metadata travels in message properties:
//!
//! | property | data chunk | final marker |
//! |----------|------------|--------------|
//! | [`GROUP_ID`] | collection id | collection id |
//! | [`GROUP_SEQ`] | `1..=N` | absent |
//! | [`CHUNK_LAST`] | `false` | `true` |
//! | [`CHUNK_TOTAL`] | absent | `N` |

pub mod chunker;
pub mod error;
pub mod header;
pub mod id;
pub mod reassembler;

pub use chunker::Chunker;
pub use error::{ChunkingError, ReassemblyError};
pub use header::ChunkHeader;
pub use id::CollectionId;
pub use reassembler::Reassembler;

/// Collection identifier shared by every chunk of one payload.
pub const GROUP_ID: &str = "JMSXGroupID";
/// One-based position of a data chunk.
pub const GROUP_SEQ: &str = "JMSXGroupSeq";
/// Number of data chunks, carried by the final marker.
pub const CHUNK_TOTAL: &str = "RelayChunkTotal";
/// Whether the message is the final marker of a collection.
pub const CHUNK_LAST: &str = "RelayChunkLast";

#[cfg(test)]
mod tests;
