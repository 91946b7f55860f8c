//! Endpoint addressing.
//!
//! An endpoint URI names a destination and carries options as a query
//! string: `queue:orders?replyTo=replies&requestTimeout=500`. A leading
//! `jms:` scheme is accepted and ignored. Option values are taken verbatim;
//! no percent-decoding is applied.

use crate::{
    config::{ConfigError, EndpointConfig},
    destination::{is_topic_prefix, normalize_destination_name},
};

/// A destination name plus the options that apply to it.
#[derive(Clone, Debug)]
pub struct Endpoint {
    uri: String,
    destination_name: String,
    config: EndpointConfig,
}

impl Endpoint {
    /// Build an endpoint from a destination name and a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the name is empty or the configuration is
    /// invalid.
    pub fn new(destination_name: impl Into<String>, config: EndpointConfig) -> Result<Self, ConfigError> {
        let destination_name = destination_name.into();
        if normalize_destination_name(&destination_name).is_empty() {
            return Err(ConfigError::InvalidUri {
                uri: destination_name,
                reason: "missing destination name",
            });
        }
        config.validate()?;
        Ok(Self {
            uri: destination_name.clone(),
            destination_name,
            config,
        })
    }

    /// Parse `uri`, applying its options on top of `defaults`.
    ///
    /// ```
    /// use relaymq::{config::EndpointConfig, endpoint::Endpoint};
    ///
    /// let endpoint = Endpoint::parse("queue:orders?concurrentConsumers=3", EndpointConfig::default())
    ///     .expect("valid endpoint");
    /// assert_eq!(endpoint.destination_name(), "queue:orders");
    /// assert_eq!(endpoint.config().concurrent_consumers.get(), 3);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the URI is malformed, an option is unknown
    /// or invalid, or the resulting configuration fails validation.
    pub fn parse(uri: &str, defaults: EndpointConfig) -> Result<Self, ConfigError> {
        let rest = uri.strip_prefix("jms:").unwrap_or(uri);
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        if normalize_destination_name(path).is_empty() {
            return Err(ConfigError::InvalidUri {
                uri: uri.to_owned(),
                reason: "missing destination name",
            });
        }

        let mut config = defaults;
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let Some((name, value)) = pair.split_once('=') else {
                return Err(ConfigError::InvalidUri {
                    uri: uri.to_owned(),
                    reason: "option without a value",
                });
            };
            config.set_option(name, value)?;
        }
        config.validate()?;

        Ok(Self {
            uri: uri.to_owned(),
            destination_name: path.to_owned(),
            config,
        })
    }

    /// The URI the endpoint was created from.
    #[must_use]
    pub fn uri(&self) -> &str { &self.uri }

    /// Destination name including any type prefix.
    #[must_use]
    pub fn destination_name(&self) -> &str { &self.destination_name }

    /// Whether unprefixed names resolve to topics.
    #[must_use]
    pub fn is_pub_sub_domain(&self) -> bool { is_topic_prefix(&self.destination_name) }

    /// Endpoint options.
    #[must_use]
    pub fn config(&self) -> &EndpointConfig { &self.config }
}
