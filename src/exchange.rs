//! In-flight exchanges handed to producers and processors.
//!
//! An [`Exchange`] carries the inbound [`ExchangeMessage`], an optional out
//! message holding the reply, the [`ExchangePattern`] and any error raised
//! while processing it. Errors are attached here instead of being thrown
//! across task boundaries.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::{destination::Destination, error::JmsError, message::Body};

/// Whether the sender expects a reply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExchangePattern {
    /// Fire and forget.
    #[default]
    InOnly,
    /// Request/reply.
    InOut,
}

/// Value carried by an exchange header.
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderValue {
    /// String value.
    String(String),
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Single character.
    Char(char),
    /// Point in time.
    Timestamp(DateTime<Utc>),
    /// Raw bytes; not a valid property value unless explicitly allowed.
    Bytes(Bytes),
    /// A destination, used for `JMSReplyTo` and `JMSDestination`.
    Destination(Destination),
}

impl HeaderValue {
    /// Render the value as a string where a lossless rendering exists.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::String(value) => Some(value.clone()),
            Self::Bool(value) => Some(value.to_string()),
            Self::Int(value) => Some(value.to_string()),
            Self::Float(value) => Some(value.to_string()),
            Self::Char(value) => Some(value.to_string()),
            Self::Timestamp(value) => Some(value.to_rfc3339()),
            Self::Destination(value) => Some(value.to_string()),
            Self::Bytes(_) => None,
        }
    }

    /// Borrow the value as a string slice if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Return the value as an integer where a conversion exists.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    /// Return the value as a boolean where a conversion exists.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self { Self::String(value.to_owned()) }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self { Self::String(value) }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self { Self::Bool(value) }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self { Self::Int(value) }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self { Self::Int(i64::from(value)) }
}

impl From<u8> for HeaderValue {
    fn from(value: u8) -> Self { Self::Int(i64::from(value)) }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self { Self::Float(value) }
}

impl From<char> for HeaderValue {
    fn from(value: char) -> Self { Self::Char(value) }
}

impl From<DateTime<Utc>> for HeaderValue {
    fn from(value: DateTime<Utc>) -> Self { Self::Timestamp(value) }
}

impl From<Bytes> for HeaderValue {
    fn from(value: Bytes) -> Self { Self::Bytes(value) }
}

impl From<Destination> for HeaderValue {
    fn from(value: Destination) -> Self { Self::Destination(value) }
}

/// Unordered header map.
pub type Headers = HashMap<String, HeaderValue>;

/// Body and headers of one side of an exchange.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExchangeMessage {
    /// Message body.
    pub body: Body,
    /// Message headers.
    pub headers: Headers,
}

impl ExchangeMessage {
    /// Create a message with `body` and no headers.
    #[must_use]
    pub fn new(body: impl Into<Body>) -> Self {
        Self {
            body: body.into(),
            headers: Headers::new(),
        }
    }

    /// Look up a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&HeaderValue> { self.headers.get(name) }

    /// Set a header, returning the previous value.
    pub fn set_header(
        &mut self,
        name: impl Into<String>,
        value: impl Into<HeaderValue>,
    ) -> Option<HeaderValue> {
        self.headers.insert(name.into(), value.into())
    }

    /// Remove a header, returning its value.
    pub fn remove_header(&mut self, name: &str) -> Option<HeaderValue> { self.headers.remove(name) }
}

/// A unit of work travelling through a producer or a consumer.
#[derive(Debug, Default)]
pub struct Exchange {
    id: String,
    pattern: ExchangePattern,
    input: ExchangeMessage,
    output: Option<ExchangeMessage>,
    error: Option<JmsError>,
}

impl Exchange {
    /// Create an exchange with an explicit identifier.
    #[must_use]
    pub fn new(id: impl Into<String>, pattern: ExchangePattern, input: ExchangeMessage) -> Self {
        Self {
            id: id.into(),
            pattern,
            input,
            output: None,
            error: None,
        }
    }

    /// Create a fire-and-forget exchange with a random identifier.
    #[must_use]
    pub fn in_only(body: impl Into<Body>) -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            ExchangePattern::InOnly,
            ExchangeMessage::new(body),
        )
    }

    /// Create a request/reply exchange with a random identifier.
    #[must_use]
    pub fn in_out(body: impl Into<Body>) -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            ExchangePattern::InOut,
            ExchangeMessage::new(body),
        )
    }

    /// Add a header to the inbound message.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.input.set_header(name, value);
        self
    }

    /// Exchange identifier.
    #[must_use]
    pub fn id(&self) -> &str { &self.id }

    /// Exchange pattern.
    #[must_use]
    pub fn pattern(&self) -> ExchangePattern { self.pattern }

    /// Borrow the inbound message.
    #[must_use]
    pub fn input(&self) -> &ExchangeMessage { &self.input }

    /// Mutably borrow the inbound message.
    pub fn input_mut(&mut self) -> &mut ExchangeMessage { &mut self.input }

    /// Borrow the out message, if one was set.
    #[must_use]
    pub fn output(&self) -> Option<&ExchangeMessage> { self.output.as_ref() }

    /// Set the out message.
    pub fn set_output(&mut self, message: ExchangeMessage) { self.output = Some(message); }

    /// The out message when set, otherwise the inbound message.
    #[must_use]
    pub fn reply_message(&self) -> &ExchangeMessage { self.output.as_ref().unwrap_or(&self.input) }

    /// Look up an inbound header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&HeaderValue> { self.input.header(name) }

    /// Set an inbound header.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        self.input.set_header(name, value);
    }

    /// Borrow the inbound body.
    #[must_use]
    pub fn body(&self) -> &Body { &self.input.body }

    /// Replace the inbound body.
    pub fn set_body(&mut self, body: impl Into<Body>) { self.input.body = body.into(); }

    /// Attach an error to the exchange.
    pub fn set_error(&mut self, error: JmsError) { self.error = Some(error); }

    /// Borrow the attached error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&JmsError> { self.error.as_ref() }

    /// Take the attached error, leaving none behind.
    pub fn take_error(&mut self) -> Option<JmsError> { self.error.take() }

    /// Whether an error is attached.
    #[must_use]
    pub fn is_failed(&self) -> bool { self.error.is_some() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_message_prefers_output() {
        let mut exchange = Exchange::in_out("request");
        assert_eq!(exchange.reply_message().body.as_text(), Some("request"));
        exchange.set_output(ExchangeMessage::new("reply"));
        assert_eq!(exchange.reply_message().body.as_text(), Some("reply"));
    }

    #[test]
    fn header_values_convert_from_strings() {
        assert_eq!(HeaderValue::from(" 42 ").as_i64(), Some(42));
        assert_eq!(HeaderValue::from("true").as_bool(), Some(true));
        assert_eq!(HeaderValue::from(Bytes::from_static(b"x")).to_text(), None);
    }

    #[test]
    fn errors_are_attached_and_taken() {
        let mut exchange = Exchange::in_only("x");
        exchange.set_error(JmsError::Remote("boom".into()));
        assert!(exchange.is_failed());
        assert!(matches!(exchange.take_error(), Some(JmsError::Remote(_))));
        assert!(!exchange.is_failed());
    }
}
