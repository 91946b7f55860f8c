//! Provider-native wire message model.
//!
//! [`JmsMessage`] mirrors a JMS message: standard header fields, a property
//! map and one of the body kinds in [`Body`]. The binding layer converts
//! exchanges to and from this representation; providers only move it around.

use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use tokio::time::Instant;

use crate::{binding::BindingError, config::ConfigError, destination::Destination};

/// Default JMS priority.
pub const DEFAULT_PRIORITY: u8 = 4;
/// Highest JMS priority.
pub const MAX_PRIORITY: u8 = 9;

/// Message persistence requested from the provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// The provider may lose the message on failure.
    NonPersistent,
    /// The provider must store the message before acknowledging the send.
    #[default]
    Persistent,
}

impl DeliveryMode {
    /// Numeric representation used in the `JMSDeliveryMode` header.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::NonPersistent => 1,
            Self::Persistent => 2,
        }
    }

    /// Selector literal for this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NonPersistent => "NON_PERSISTENT",
            Self::Persistent => "PERSISTENT",
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "1" | "NON_PERSISTENT" => Ok(Self::NonPersistent),
            "2" | "PERSISTENT" => Ok(Self::Persistent),
            other => Err(ConfigError::InvalidValue {
                option: "deliveryMode",
                value: other.to_owned(),
            }),
        }
    }
}

/// Wire message body kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    /// Text message.
    Text,
    /// Bytes message.
    Bytes,
    /// Map message.
    Map,
    /// Serialized object message.
    Object,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "Text",
            Self::Bytes => "Bytes",
            Self::Map => "Map",
            Self::Object => "Object",
        };
        f.write_str(name)
    }
}

impl FromStr for MessageType {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Text" | "text" => Ok(Self::Text),
            "Bytes" | "bytes" => Ok(Self::Bytes),
            "Map" | "map" => Ok(Self::Map),
            "Object" | "object" => Ok(Self::Object),
            other => Err(ConfigError::InvalidValue {
                option: "jmsMessageType",
                value: other.to_owned(),
            }),
        }
    }
}

/// Primitive value allowed as a message property or map entry.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    /// String value.
    String(String),
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Double(f64),
    /// Single character.
    Char(char),
    /// Raw bytes; only providers with extended property support accept these.
    Bytes(Bytes),
}

impl PropertyValue {
    /// Borrow the value as a string if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Return the value as an integer if it is numeric.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "selector comparisons tolerate truncation")]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Double(value) => Some(*value as i64),
            Self::String(value) => value.parse().ok(),
            _ => None,
        }
    }

    /// Return the value as a boolean if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::String(value) => value.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) => f.write_str(value),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Double(value) => write!(f, "{value}"),
            Self::Char(value) => write!(f, "{value}"),
            Self::Bytes(value) => write!(f, "<{} bytes>", value.len()),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self { Self::String(value.to_owned()) }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self { Self::String(value) }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self { Self::Bool(value) }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self { Self::Int(value) }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self { Self::Int(i64::from(value)) }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self { Self::Double(value) }
}

/// Serialized object body together with the Rust type name that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectPayload {
    type_name: String,
    bytes: Bytes,
}

impl ObjectPayload {
    /// Serialize `value` with `bincode`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::ObjectEncode`] if serialization fails.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, BindingError> {
        let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| BindingError::ObjectEncode(e.to_string()))?;
        Ok(Self {
            type_name: std::any::type_name::<T>().to_owned(),
            bytes: Bytes::from(bytes),
        })
    }

    /// Deserialize the payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::ObjectDecode`] if the bytes do not decode as `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BindingError> {
        let (value, _) = bincode::serde::decode_from_slice(&self.bytes, bincode::config::standard())
            .map_err(|e| BindingError::ObjectDecode(e.to_string()))?;
        Ok(value)
    }

    /// Rust type name recorded at encode time.
    #[must_use]
    pub fn type_name(&self) -> &str { &self.type_name }

    /// Encoded bytes.
    #[must_use]
    pub fn bytes(&self) -> &Bytes { &self.bytes }
}

/// Message body shared by exchanges and wire messages.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Bytes),
    /// String keyed map of primitive values.
    Map(BTreeMap<String, PropertyValue>),
    /// Serialized object.
    Object(ObjectPayload),
}

impl Body {
    /// Message type naturally produced by this body, if any.
    #[must_use]
    pub fn natural_type(&self) -> Option<MessageType> {
        match self {
            Self::Empty => None,
            Self::Text(_) => Some(MessageType::Text),
            Self::Bytes(_) => Some(MessageType::Bytes),
            Self::Map(_) => Some(MessageType::Map),
            Self::Object(_) => Some(MessageType::Object),
        }
    }

    /// Borrow the body as text if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Borrow the body as bytes if it is a bytes body.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Whether the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { matches!(self, Self::Empty) }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self { Self::Text(value.to_owned()) }
}

impl From<String> for Body {
    fn from(value: String) -> Self { Self::Text(value) }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self { Self::Bytes(value) }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self { Self::Bytes(Bytes::from(value)) }
}

impl From<BTreeMap<String, PropertyValue>> for Body {
    fn from(value: BTreeMap<String, PropertyValue>) -> Self { Self::Map(value) }
}

impl From<ObjectPayload> for Body {
    fn from(value: ObjectPayload) -> Self { Self::Object(value) }
}

/// A provider-native message.
///
/// `message_id`, `timestamp`, `destination`, `expiration` and `expires_at` are
/// assigned by the provider when the message is sent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JmsMessage {
    /// Provider assigned identifier.
    pub message_id: Option<String>,
    /// Correlation identifier.
    pub correlation_id: Option<String>,
    /// Destination the receiver should reply to.
    pub reply_to: Option<Destination>,
    /// Destination the message was sent to.
    pub destination: Option<Destination>,
    /// Persistence mode.
    pub delivery_mode: DeliveryMode,
    /// Priority in `0..=9`.
    pub priority: u8,
    /// Send time in milliseconds since the Unix epoch.
    pub timestamp: Option<i64>,
    /// Expiry time in milliseconds since the Unix epoch; zero never expires.
    pub expiration: i64,
    /// Requested time to live, consumed by the provider at send time.
    pub time_to_live: Option<Duration>,
    /// Provider clock deadline derived from `time_to_live`.
    pub expires_at: Option<Instant>,
    /// Whether the provider delivered this message before.
    pub redelivered: bool,
    /// Application supplied message type.
    pub jms_type: Option<String>,
    /// Message properties.
    pub properties: BTreeMap<String, PropertyValue>,
    /// Message body.
    pub body: Body,
}

impl JmsMessage {
    /// Create a message with `body` and default headers.
    #[must_use]
    pub fn new(body: impl Into<Body>) -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            body: body.into(),
            ..Self::default()
        }
    }

    /// Look up a property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyValue> { self.properties.get(name) }

    /// Look up a property rendered as a string.
    #[must_use]
    pub fn string_property(&self, name: &str) -> Option<String> {
        self.properties.get(name).map(ToString::to_string)
    }

    /// Set a property, returning the previous value.
    pub fn set_property(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyValue> {
        self.properties.insert(name.into(), value.into())
    }

    /// Whether the provider-assigned deadline has passed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}
