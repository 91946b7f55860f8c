//! Canonical error and result types for the crate.
//!
//! Each layer owns a focused error enum ([`BindingError`], [`ConfigError`],
//! [`ProviderError`], [`ReassemblyError`]); `JmsError` is the single surface
//! attached to an [`Exchange`](crate::exchange::Exchange) or returned from
//! producer, consumer and reply manager operations.

use std::time::Duration;

use thiserror::Error;

use crate::{
    binding::BindingError,
    chunk::{ChunkingError, ReassemblyError},
    config::ConfigError,
    consumer::ConsumerState,
    provider::ProviderError,
};

/// Top-level error type exposed by `relaymq`.
///
/// `ReplyTimeout` is kept distinct from [`JmsError::Remote`] so callers can
/// tell "never answered" apart from "answered with an error".
#[derive(Debug, Error)]
pub enum JmsError {
    /// The exchange could not be converted to or from a wire message.
    #[error("binding failed: {0}")]
    Binding(#[from] BindingError),
    /// A logical destination name could not be mapped to a destination.
    #[error("cannot resolve destination {name}: {reason}")]
    DestinationResolution {
        /// The logical name that failed to resolve.
        name: String,
        /// Resolver supplied explanation.
        reason: String,
    },
    /// No reply arrived before the pending entry's deadline.
    #[error("no reply received within {timeout:?} for correlation id {correlation_id}")]
    ReplyTimeout {
        /// Correlation identifier of the abandoned request.
        correlation_id: String,
        /// Timeout that applied to the request.
        timeout: Duration,
    },
    /// The configuration is structurally invalid.
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),
    /// The provider rejected an operation.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    /// The reply manager shut down while the request was pending.
    #[error("reply manager stopped before a reply arrived")]
    ReplyManagerStopped,
    /// Another request already uses this correlation identifier.
    #[error("correlation id {0} is already awaiting a reply")]
    DuplicateCorrelationId(String),
    /// A lifecycle operation was attempted in the wrong state.
    #[error("{operation} is not allowed while the consumer is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The state the consumer was in.
        state: ConsumerState,
    },
    /// Splitting an outbound payload into chunks failed.
    #[error("chunking failed: {0}")]
    Chunking(#[from] ChunkingError),
    /// Inbound chunks could not be reassembled.
    #[error("chunk reassembly failed: {0}")]
    Reassembly(#[from] ReassemblyError),
    /// The remote processor answered with an error reply.
    #[error("remote processing failed: {0}")]
    Remote(String),
    /// Processor supplied failure raised while handling an exchange.
    #[error("processing failed: {0}")]
    Processing(String),
}

impl JmsError {
    /// Build a [`JmsError::Processing`] from any displayable cause.
    #[must_use]
    pub fn processing(cause: impl std::fmt::Display) -> Self { Self::Processing(cause.to_string()) }

    /// Returns true if this error is a reply timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool { matches!(self, Self::ReplyTimeout { .. }) }
}

/// Canonical result alias used by `relaymq` public APIs.
pub type Result<T, E = JmsError> = std::result::Result<T, E>;
