//! Errors raised while converting between exchanges and wire messages.

use thiserror::Error;

use crate::message::MessageType;

/// Errors produced by [`MessageBinding`](super::MessageBinding).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BindingError {
    /// The exchange has no body and null bodies are disallowed.
    #[error("message body is empty and null bodies are not allowed")]
    NullBody,
    /// The body cannot be converted to the requested message type.
    #[error("cannot convert a {from} body to a {to} message")]
    UnsupportedConversion {
        /// Kind of the exchange body.
        from: &'static str,
        /// Requested message type.
        to: MessageType,
    },
    /// A standard header carries a value of the wrong shape.
    #[error("invalid value for header {name}: {reason}")]
    InvalidHeader {
        /// Header name.
        name: String,
        /// What was wrong with the value.
        reason: String,
    },
    /// The reply-to header is neither a destination nor a destination string.
    #[error("invalid reply-to destination: {0}")]
    InvalidReplyTo(String),
    /// Serializing an object body failed.
    #[error("failed to encode object body: {0}")]
    ObjectEncode(String),
    /// Deserializing an object body failed.
    #[error("failed to decode object body: {0}")]
    ObjectDecode(String),
}

impl BindingError {
    pub(crate) fn invalid_header(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            name: name.to_owned(),
            reason: reason.into(),
        }
    }
}
