//! Identifier generation.
//!
//! Correlation tokens and exchange ids come from an [`IdGenerator`] handed to
//! the component, so tests can swap in a deterministic sequence.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// Source of unique identifiers.
pub trait IdGenerator: fmt::Debug + Send + Sync {
    /// Return a new identifier, unique for the lifetime of the generator.
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String { uuid::Uuid::new_v4().to_string() }
}

/// `<prefix>-<n>` identifiers counting up from a seed.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    /// Start counting at `seed`.
    #[must_use]
    pub fn new(prefix: impl Into<String>, seed: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(seed),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}
