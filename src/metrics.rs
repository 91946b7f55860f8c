//! Metric helpers for `relaymq`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the counter tracking messages handed to the provider.
pub const MESSAGES_SENT: &str = "relaymq_messages_sent_total";
/// Name of the counter tracking messages dispatched to processors.
pub const MESSAGES_RECEIVED: &str = "relaymq_messages_received_total";
/// Name of the gauge tracking requests awaiting a reply.
pub const PENDING_REPLIES: &str = "relaymq_pending_replies";
/// Name of the counter tracking requests that timed out.
pub const REPLY_TIMEOUTS: &str = "relaymq_reply_timeouts_total";
/// Name of the counter tracking replies without a pending request.
pub const ORPHANED_REPLIES: &str = "relaymq_orphaned_replies_total";
/// Name of the counter tracking processor failures.
pub const PROCESSING_ERRORS: &str = "relaymq_processing_errors_total";

/// Which side of a request/reply a message travelled on.
#[derive(Clone, Copy, Debug)]
pub enum Kind {
    /// Request or fire-and-forget message.
    Request,
    /// Reply message.
    Reply,
}

impl Kind {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "only used as a label"))]
    fn as_str(self) -> &'static str {
        match self {
            Kind::Request => "request",
            Kind::Reply => "reply",
        }
    }
}

/// Record a message handed to the provider; each chunk of a split payload
/// counts once.
pub fn inc_sent(kind: Kind) {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_SENT, "kind" => kind.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record a message dispatched to a processor.
pub fn inc_received() {
    #[cfg(feature = "metrics")]
    counter!(MESSAGES_RECEIVED).increment(1);
}

/// Increment the pending replies gauge.
pub fn inc_pending() {
    #[cfg(feature = "metrics")]
    gauge!(PENDING_REPLIES).increment(1.0);
}

/// Decrement the pending replies gauge.
pub fn dec_pending() {
    #[cfg(feature = "metrics")]
    gauge!(PENDING_REPLIES).decrement(1.0);
}

/// Record a request that timed out.
pub fn inc_timeouts() {
    #[cfg(feature = "metrics")]
    counter!(REPLY_TIMEOUTS).increment(1);
}

/// Record a reply that matched no pending request.
pub fn inc_orphans() {
    #[cfg(feature = "metrics")]
    counter!(ORPHANED_REPLIES).increment(1);
}

/// Record a processor failure.
pub fn inc_processing_errors() {
    #[cfg(feature = "metrics")]
    counter!(PROCESSING_ERRORS).increment(1);
}
