//! Header key encoding for provider property names.
//!
//! Providers only accept Java-identifier-like property names, so application
//! header keys containing `.` or `-` are escaped before they are written as
//! message properties and unescaped when read back. [`KeyFormat`] selects the
//! policy per component or endpoint.

use std::{fmt, str::FromStr, sync::Arc};

use crate::config::ConfigError;

const DOT: &str = ".";
const DOT_TOKEN: &str = "_DOT_";
const HYPHEN: &str = "-";
const HYPHEN_TOKEN: &str = "_HYPHEN_";

/// Encode and decode header keys to and from provider-safe property names.
pub trait KeyFormatStrategy: fmt::Debug + Send + Sync {
    /// Encode an application header key into a property name.
    fn encode_key(&self, key: &str) -> String;

    /// Decode a property name back into the application header key.
    fn decode_key(&self, key: &str) -> String;
}

/// Escapes `.` as `_DOT_` and `-` as `_HYPHEN_`.
///
/// Decoding is lenient: names without tokens pass through unchanged.
///
/// ```
/// use relaymq::key_format::{DefaultKeyFormat, KeyFormatStrategy};
///
/// let format = DefaultKeyFormat;
/// assert_eq!(format.encode_key("foo.bar-baz"), "foo_DOT_bar_HYPHEN_baz");
/// assert_eq!(format.decode_key("foo_DOT_bar_HYPHEN_baz"), "foo.bar-baz");
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultKeyFormat;

impl KeyFormatStrategy for DefaultKeyFormat {
    fn encode_key(&self, key: &str) -> String {
        key.replace(DOT, DOT_TOKEN).replace(HYPHEN, HYPHEN_TOKEN)
    }

    fn decode_key(&self, key: &str) -> String {
        // Single pass so a token never starts inside the previous one.
        let mut decoded = String::with_capacity(key.len());
        let mut rest = key;
        while let Some(ch) = rest.chars().next() {
            if let Some(tail) = rest.strip_prefix(DOT_TOKEN) {
                decoded.push_str(DOT);
                rest = tail;
            } else if let Some(tail) = rest.strip_prefix(HYPHEN_TOKEN) {
                decoded.push_str(HYPHEN);
                rest = tail;
            } else {
                decoded.push(ch);
                rest = &rest[ch.len_utf8()..];
            }
        }
        decoded
    }
}

/// Leaves keys untouched, for providers accepting arbitrary property names.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughKeyFormat;

impl KeyFormatStrategy for PassthroughKeyFormat {
    fn encode_key(&self, key: &str) -> String { key.to_owned() }

    fn decode_key(&self, key: &str) -> String { key.to_owned() }
}

/// Built-in key format policies selectable through configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyFormat {
    /// [`DefaultKeyFormat`].
    #[default]
    Default,
    /// [`PassthroughKeyFormat`].
    Passthrough,
}

impl KeyFormat {
    /// Return a shareable strategy for this policy.
    #[must_use]
    pub fn strategy(self) -> Arc<dyn KeyFormatStrategy> {
        match self {
            Self::Default => Arc::new(DefaultKeyFormat),
            Self::Passthrough => Arc::new(PassthroughKeyFormat),
        }
    }
}

impl FromStr for KeyFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "default" => Ok(Self::Default),
            "passthrough" => Ok(Self::Passthrough),
            other => Err(ConfigError::InvalidValue {
                option: "jmsKeyFormatStrategy",
                value: other.to_owned(),
            }),
        }
    }
}
