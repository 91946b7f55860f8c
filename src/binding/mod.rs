//! Conversion between exchange messages and provider wire messages.
//!
//! [`MessageBinding`] maps bodies to text, bytes, map or object messages,
//! copies standard `JMS*` headers to the wire header fields, and writes every
//! other valid header as a property whose key is encoded by the configured
//! [`KeyFormatStrategy`]. Inbound messages surface the standard headers plus
//! decoded properties.

mod body;
pub mod error;
pub mod headers;

use std::{str::FromStr, sync::Arc};

use chrono::SecondsFormat;
use tracing::{debug, trace};

pub use self::{
    error::BindingError,
    headers::{HeaderPattern, is_internal_header, is_standard_jms_header, matches_pattern},
};
use crate::{
    destination::Destination,
    exchange::{ExchangeMessage, HeaderValue},
    key_format::{DefaultKeyFormat, KeyFormatStrategy},
    message::{DeliveryMode, JmsMessage, MAX_PRIORITY, MessageType, PropertyValue},
};

/// Options controlling the binding.
#[derive(Clone, Debug)]
pub struct BindingSettings {
    /// Leave `JMSCorrelationID` to the provider message id.
    pub use_message_id_as_correlation_id: bool,
    /// Accept exchanges without a body.
    pub allow_null_body: bool,
    /// Force every outbound message to this type.
    pub message_type: Option<MessageType>,
    /// Render timestamp headers as ISO-8601 instead of RFC 2822.
    pub format_dates_iso8601: bool,
    /// Surface every inbound `JMSX*` property.
    pub include_all_jmsx_properties: bool,
    /// Header name patterns allowed through even with non-primitive values.
    pub allow_additional_headers: Vec<HeaderPattern>,
}

impl Default for BindingSettings {
    fn default() -> Self {
        Self {
            use_message_id_as_correlation_id: false,
            allow_null_body: true,
            message_type: None,
            format_dates_iso8601: false,
            include_all_jmsx_properties: false,
            allow_additional_headers: Vec::new(),
        }
    }
}

/// Bidirectional exchange/wire message mapper.
#[derive(Clone, Debug)]
pub struct MessageBinding {
    key_format: Arc<dyn KeyFormatStrategy>,
    settings: BindingSettings,
}

impl Default for MessageBinding {
    fn default() -> Self { Self::new(Arc::new(DefaultKeyFormat), BindingSettings::default()) }
}

impl MessageBinding {
    /// Create a binding using `key_format` for property names.
    #[must_use]
    pub fn new(key_format: Arc<dyn KeyFormatStrategy>, settings: BindingSettings) -> Self {
        Self {
            key_format,
            settings,
        }
    }

    /// Active settings.
    #[must_use]
    pub fn settings(&self) -> &BindingSettings { &self.settings }

    /// Key format used for property names.
    #[must_use]
    pub fn key_format(&self) -> &Arc<dyn KeyFormatStrategy> { &self.key_format }

    /// Convert an exchange message into a wire message.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError`] when the body cannot be represented as the
    /// requested message type, when the body is missing and null bodies are
    /// disallowed, or when a standard header carries an invalid value.
    pub fn to_wire(&self, message: &ExchangeMessage) -> Result<JmsMessage, BindingError> {
        if message.body.is_empty() && !self.settings.allow_null_body {
            return Err(BindingError::NullBody);
        }
        let body = match self.forced_type(message)? {
            Some(target) => body::convert(&message.body, target)?,
            None => message.body.clone(),
        };

        let mut wire = JmsMessage::new(body);
        for (name, value) in &message.headers {
            self.append_header(&mut wire, name, value)?;
        }
        Ok(wire)
    }

    /// Convert a wire message into an exchange message.
    #[must_use]
    pub fn from_wire(&self, wire: &JmsMessage) -> ExchangeMessage {
        let mut message = ExchangeMessage::new(wire.body.clone());
        let map = &mut message.headers;

        if let Some(id) = &wire.correlation_id {
            map.insert(headers::JMS_CORRELATION_ID.into(), id.clone().into());
        }
        map.insert(
            headers::JMS_DELIVERY_MODE.into(),
            wire.delivery_mode.as_i64().into(),
        );
        if let Some(destination) = &wire.destination {
            map.insert(headers::JMS_DESTINATION.into(), destination.clone().into());
        }
        map.insert(headers::JMS_EXPIRATION.into(), wire.expiration.into());
        if let Some(id) = &wire.message_id {
            map.insert(headers::JMS_MESSAGE_ID.into(), id.clone().into());
        }
        map.insert(headers::JMS_PRIORITY.into(), wire.priority.into());
        map.insert(headers::JMS_REDELIVERED.into(), wire.redelivered.into());
        if let Some(timestamp) = wire.timestamp {
            map.insert(headers::JMS_TIMESTAMP.into(), timestamp.into());
        }
        if let Some(reply_to) = &wire.reply_to {
            map.insert(headers::JMS_REPLY_TO.into(), reply_to.clone().into());
        }
        if let Some(jms_type) = &wire.jms_type {
            map.insert(headers::JMS_TYPE.into(), jms_type.clone().into());
        }

        for (name, value) in &wire.properties {
            if name.starts_with("JMSX")
                && !self.settings.include_all_jmsx_properties
                && name != headers::JMSX_GROUP_ID
                && name != headers::JMSX_USER_ID
            {
                continue;
            }
            let key = self.key_format.decode_key(name);
            map.insert(key, property_to_header(value));
        }
        message
    }

    fn forced_type(&self, message: &ExchangeMessage) -> Result<Option<MessageType>, BindingError> {
        match message.header(headers::MESSAGE_TYPE) {
            Some(value) => {
                let text = value.to_text().unwrap_or_default();
                MessageType::from_str(&text)
                    .map(Some)
                    .map_err(|e| BindingError::invalid_header(headers::MESSAGE_TYPE, e.to_string()))
            }
            None => Ok(self.settings.message_type),
        }
    }

    fn append_header(
        &self,
        wire: &mut JmsMessage,
        name: &str,
        value: &HeaderValue,
    ) -> Result<(), BindingError> {
        if is_standard_jms_header(name) {
            return self.append_standard_header(wire, name, value);
        }
        if is_internal_header(name) {
            trace!(header = name, "dropping internal header");
            return Ok(());
        }

        let property = self.valid_property_value(value).or_else(|| {
            self.settings
                .allow_additional_headers
                .iter()
                .any(|pattern| pattern.matches(name))
                .then(|| {
                    debug!(header = name, "allowing additional header with non-primitive value");
                    additional_property_value(value)
                })
        });
        match property {
            Some(property) => {
                wire.set_property(self.key_format.encode_key(name), property);
            }
            None => debug!(header = name, value = ?value, "ignoring non primitive header"),
        }
        Ok(())
    }

    fn append_standard_header(
        &self,
        wire: &mut JmsMessage,
        name: &str,
        value: &HeaderValue,
    ) -> Result<(), BindingError> {
        match name {
            headers::JMS_CORRELATION_ID if !self.settings.use_message_id_as_correlation_id => {
                wire.correlation_id = value.to_text();
            }
            headers::JMS_REPLY_TO => {
                wire.reply_to = Some(match value {
                    HeaderValue::Destination(destination) => destination.clone(),
                    HeaderValue::String(text) if !text.is_empty() => Destination::parse(text, false),
                    other => return Err(BindingError::InvalidReplyTo(format!("{other:?}"))),
                });
            }
            headers::JMS_TYPE => wire.jms_type = value.to_text(),
            headers::JMS_PRIORITY => {
                let priority = value
                    .as_i64()
                    .and_then(|p| u8::try_from(p).ok())
                    .filter(|p| *p <= MAX_PRIORITY)
                    .ok_or_else(|| BindingError::invalid_header(name, "expected 0..=9"))?;
                wire.priority = priority;
            }
            headers::JMS_DELIVERY_MODE => {
                let text = value.to_text().unwrap_or_default();
                wire.delivery_mode = DeliveryMode::from_str(&text).map_err(|_| {
                    BindingError::invalid_header(name, "expected PERSISTENT or NON_PERSISTENT")
                })?;
            }
            headers::JMS_EXPIRATION => {
                wire.expiration = value
                    .as_i64()
                    .ok_or_else(|| BindingError::invalid_header(name, "expected an integer"))?;
            }
            _ => trace!(header = name, "ignoring provider assigned JMS header"),
        }
        Ok(())
    }

    fn valid_property_value(&self, value: &HeaderValue) -> Option<PropertyValue> {
        match value {
            HeaderValue::String(v) => Some(PropertyValue::String(v.clone())),
            HeaderValue::Bool(v) => Some(PropertyValue::Bool(*v)),
            HeaderValue::Int(v) => Some(PropertyValue::Int(*v)),
            HeaderValue::Float(v) => Some(PropertyValue::Double(*v)),
            HeaderValue::Char(v) => Some(PropertyValue::Char(*v)),
            HeaderValue::Timestamp(v) if self.settings.format_dates_iso8601 => Some(
                PropertyValue::String(v.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ),
            HeaderValue::Timestamp(v) => Some(PropertyValue::String(v.to_rfc2822())),
            HeaderValue::Bytes(_) | HeaderValue::Destination(_) => None,
        }
    }
}

fn additional_property_value(value: &HeaderValue) -> PropertyValue {
    match value {
        HeaderValue::Bytes(bytes) => PropertyValue::Bytes(bytes.clone()),
        other => PropertyValue::String(other.to_text().unwrap_or_default()),
    }
}

fn property_to_header(value: &PropertyValue) -> HeaderValue {
    match value {
        PropertyValue::String(v) => HeaderValue::String(v.clone()),
        PropertyValue::Bool(v) => HeaderValue::Bool(*v),
        PropertyValue::Int(v) => HeaderValue::Int(*v),
        PropertyValue::Double(v) => HeaderValue::Float(*v),
        PropertyValue::Char(v) => HeaderValue::Char(*v),
        PropertyValue::Bytes(v) => HeaderValue::Bytes(v.clone()),
    }
}

#[cfg(test)]
mod tests;
