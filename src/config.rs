//! Endpoint configuration.
//!
//! [`EndpointConfig`] holds every option an endpoint understands, with the
//! defaults applied when an option is not set. Options arrive either through
//! the typed fields or by name through [`EndpointConfig::set_option`], which
//! is what endpoint URI query strings use.

use std::{fmt, num::NonZeroUsize, str::FromStr, time::Duration};

use thiserror::Error;

use crate::{
    binding::{BindingSettings, HeaderPattern},
    key_format::KeyFormat,
    message::{DEFAULT_PRIORITY, DeliveryMode, MAX_PRIORITY, MessageType},
    selector::{Selector, SelectorError},
};

/// Default time to wait for a reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
/// Default interval between reply timeout sweeps.
pub const DEFAULT_CHECKER_INTERVAL: Duration = Duration::from_secs(1);
/// Default time after which incomplete chunk collections are dropped.
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(60);
/// Default cap on a reassembled payload.
pub const DEFAULT_MAX_REASSEMBLED_SIZE: NonZeroUsize = match NonZeroUsize::new(64 * 1024 * 1024) {
    Some(size) => size,
    None => NonZeroUsize::MAX,
};

/// Configuration errors detected while parsing or validating options.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A temporary reply queue cannot be combined with a fixed `replyTo`.
    #[error("replyToType=Temporary is not allowed together with a fixed replyTo queue")]
    TemporaryWithFixedReplyTo,
    /// Shared and exclusive reply queues need a `replyTo` name.
    #[error("replyToType={0} requires replyTo to be set")]
    MissingReplyTo(ReplyToType),
    /// Temporary reply queues need a cached consumer.
    #[error("replyToCacheLevelName=CACHE_NONE is not allowed with temporary reply queues")]
    CacheNoneWithTemporaryQueue,
    /// The timeout checker interval must be positive.
    #[error("requestTimeoutCheckerInterval must be greater than zero")]
    InvalidCheckerInterval,
    /// Durable and shared subscriptions need a name.
    #[error("durable or shared subscriptions require subscriptionName")]
    MissingSubscriptionName,
    /// The option name is not recognised.
    #[error("unknown option {0}")]
    UnknownOption(String),
    /// The option value could not be parsed.
    #[error("invalid value {value:?} for option {option}")]
    InvalidValue {
        /// Option name.
        option: &'static str,
        /// Rejected value.
        value: String,
    },
    /// The selector expression is malformed.
    #[error("invalid selector: {0}")]
    InvalidSelector(#[from] SelectorError),
    /// The endpoint URI is malformed.
    #[error("invalid endpoint uri {uri:?}: {reason}")]
    InvalidUri {
        /// Offending URI.
        uri: String,
        /// What was wrong with it.
        reason: &'static str,
    },
}

/// Kind of reply queue used for request/reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyToType {
    /// A temporary queue created per reply manager.
    Temporary,
    /// A fixed queue possibly shared with other clients; replies are filtered
    /// by correlation id.
    Shared,
    /// A fixed queue owned by this client; every reply on it is ours.
    Exclusive,
}

impl fmt::Display for ReplyToType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Temporary => "Temporary",
            Self::Shared => "Shared",
            Self::Exclusive => "Exclusive",
        })
    }
}

impl FromStr for ReplyToType {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Temporary" => Ok(Self::Temporary),
            "Shared" => Ok(Self::Shared),
            "Exclusive" => Ok(Self::Exclusive),
            other => Err(invalid("replyToType", other)),
        }
    }
}

/// Caching of provider resources used by reply listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheLevel {
    /// Recreate the consumer for every receive.
    None,
    /// Cache the connection.
    Connection,
    /// Cache the session.
    Session,
    /// Cache the consumer.
    Consumer,
    /// Let the container decide.
    Auto,
}

impl FromStr for CacheLevel {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "CACHE_NONE" => Ok(Self::None),
            "CACHE_CONNECTION" => Ok(Self::Connection),
            "CACHE_SESSION" => Ok(Self::Session),
            "CACHE_CONSUMER" => Ok(Self::Consumer),
            "CACHE_AUTO" => Ok(Self::Auto),
            other => Err(invalid("replyToCacheLevelName", other)),
        }
    }
}

/// Every option understood by an endpoint.
#[derive(Clone, Debug)]
pub struct EndpointConfig {
    /// Fixed reply queue name.
    pub reply_to: Option<String>,
    /// Explicit reply queue kind; derived from `reply_to` when unset.
    pub reply_to_type: Option<ReplyToType>,
    /// Reply-to destination forced onto outbound messages.
    pub reply_to_override: Option<String>,
    /// Correlate replies by the provider message id.
    pub use_message_id_as_correlation_id: bool,
    /// Property carrying the correlation id instead of `JMSCorrelationID`.
    pub correlation_property: Option<String>,
    /// Time to wait for a reply.
    pub request_timeout: Duration,
    /// Interval between reply timeout sweeps.
    pub request_timeout_checker_interval: Duration,
    /// Cache level for reply listeners.
    pub reply_to_cache_level: Option<CacheLevel>,
    /// Number of reply listener tasks.
    pub reply_to_concurrent_consumers: NonZeroUsize,
    /// Never ask for nor send replies.
    pub disable_reply_to: bool,
    /// Keep caller supplied QoS headers and reply-to.
    pub preserve_message_qos: bool,
    /// Apply the endpoint priority, delivery mode and time to live.
    pub explicit_qos_enabled: bool,
    /// Endpoint priority.
    pub priority: u8,
    /// Endpoint delivery mode.
    pub delivery_mode: DeliveryMode,
    /// Endpoint time to live.
    pub time_to_live: Option<Duration>,
    /// Number of consumer worker tasks.
    pub concurrent_consumers: NonZeroUsize,
    /// Split fire-and-forget byte payloads above this size.
    pub max_chunk_size: Option<NonZeroUsize>,
    /// Cap on reassembled chunk payloads.
    pub max_reassembled_size: NonZeroUsize,
    /// Age at which incomplete chunk collections are dropped.
    pub chunk_reassembly_timeout: Duration,
    /// Message selector for consumers.
    pub selector: Option<Selector>,
    /// Durable or shared subscription name.
    pub subscription_name: Option<String>,
    /// Share the subscription between consumers.
    pub subscription_shared: bool,
    /// Retain messages while no consumer is attached.
    pub subscription_durable: bool,
    /// Surface every inbound `JMSX*` property.
    pub include_all_jmsx_properties: bool,
    /// Header patterns allowed with non-primitive values.
    pub allow_additional_headers: Vec<String>,
    /// Return from `stop` before the workers have drained.
    pub async_stop_listener: bool,
    /// Render date headers as ISO-8601.
    pub format_dates_iso8601: bool,
    /// Consumer priority hint passed to the provider.
    pub consumer_priority: Option<i32>,
    /// Start consumers on creation.
    pub auto_startup: bool,
    /// Forced outbound message type.
    pub message_type: Option<MessageType>,
    /// Accept exchanges without a body.
    pub allow_null_body: bool,
    /// Endpoint key format; the component default applies when unset.
    pub key_format: Option<KeyFormat>,
    /// Skip messages published by the same connection. Accepted for
    /// compatibility; the embedded broker ignores it.
    pub pub_sub_no_local: bool,
    /// Number of messages a consumer may hold ahead of processing.
    pub prefetch: NonZeroUsize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            reply_to: None,
            reply_to_type: None,
            reply_to_override: None,
            use_message_id_as_correlation_id: false,
            correlation_property: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            request_timeout_checker_interval: DEFAULT_CHECKER_INTERVAL,
            reply_to_cache_level: None,
            reply_to_concurrent_consumers: NonZeroUsize::MIN,
            disable_reply_to: false,
            preserve_message_qos: false,
            explicit_qos_enabled: false,
            priority: DEFAULT_PRIORITY,
            delivery_mode: DeliveryMode::Persistent,
            time_to_live: None,
            concurrent_consumers: NonZeroUsize::MIN,
            max_chunk_size: None,
            max_reassembled_size: DEFAULT_MAX_REASSEMBLED_SIZE,
            chunk_reassembly_timeout: DEFAULT_REASSEMBLY_TIMEOUT,
            selector: None,
            subscription_name: None,
            subscription_shared: false,
            subscription_durable: false,
            include_all_jmsx_properties: false,
            allow_additional_headers: Vec::new(),
            async_stop_listener: false,
            format_dates_iso8601: false,
            consumer_priority: None,
            auto_startup: true,
            message_type: None,
            allow_null_body: true,
            key_format: None,
            pub_sub_no_local: false,
            prefetch: NonZeroUsize::MIN,
        }
    }
}

impl EndpointConfig {
    /// Set an option by its URI name, returning `self` for chaining.
    ///
    /// # Errors
    ///
    /// See [`EndpointConfig::set_option`].
    pub fn with_option(mut self, name: &str, value: &str) -> Result<Self, ConfigError> {
        self.set_option(name, value)?;
        Ok(self)
    }

    /// Set an option by its URI name.
    ///
    /// Durations are given in milliseconds; a `timeToLive` of `-1` or `0`
    /// disables expiry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownOption`] for unrecognised names and
    /// [`ConfigError::InvalidValue`] for unparsable values.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        match name {
            "replyTo" => self.reply_to = non_empty(value),
            "replyToType" => self.reply_to_type = Some(value.parse()?),
            "replyToOverride" => self.reply_to_override = non_empty(value),
            "useMessageIDAsCorrelationID" => {
                self.use_message_id_as_correlation_id = parse_bool("useMessageIDAsCorrelationID", value)?;
            }
            "correlationProperty" => self.correlation_property = non_empty(value),
            "requestTimeout" => self.request_timeout = parse_millis("requestTimeout", value)?,
            "requestTimeoutCheckerInterval" => {
                self.request_timeout_checker_interval =
                    parse_millis("requestTimeoutCheckerInterval", value)?;
            }
            "replyToCacheLevelName" => self.reply_to_cache_level = Some(value.parse()?),
            "replyToConcurrentConsumers" => {
                self.reply_to_concurrent_consumers = parse_count("replyToConcurrentConsumers", value)?;
            }
            "disableReplyTo" => self.disable_reply_to = parse_bool("disableReplyTo", value)?,
            "preserveMessageQos" => {
                self.preserve_message_qos = parse_bool("preserveMessageQos", value)?;
            }
            "explicitQosEnabled" => {
                self.explicit_qos_enabled = parse_bool("explicitQosEnabled", value)?;
            }
            "priority" => {
                self.priority = value
                    .parse::<u8>()
                    .ok()
                    .filter(|p| *p <= MAX_PRIORITY)
                    .ok_or_else(|| invalid("priority", value))?;
            }
            "deliveryMode" => self.delivery_mode = value.parse()?,
            "timeToLive" => {
                let millis: i64 = value.parse().map_err(|_| invalid("timeToLive", value))?;
                self.time_to_live = u64::try_from(millis)
                    .ok()
                    .filter(|m| *m > 0)
                    .map(Duration::from_millis);
            }
            "concurrentConsumers" => {
                self.concurrent_consumers = parse_count("concurrentConsumers", value)?;
            }
            "maxChunkSize" => self.max_chunk_size = Some(parse_count("maxChunkSize", value)?),
            "maxReassembledSize" => {
                self.max_reassembled_size = parse_count("maxReassembledSize", value)?;
            }
            "chunkReassemblyTimeout" => {
                self.chunk_reassembly_timeout = parse_millis("chunkReassemblyTimeout", value)?;
            }
            "selector" => self.selector = Some(Selector::parse(value)?),
            "subscriptionName" => self.subscription_name = non_empty(value),
            "subscriptionShared" => {
                self.subscription_shared = parse_bool("subscriptionShared", value)?;
            }
            "subscriptionDurable" => {
                self.subscription_durable = parse_bool("subscriptionDurable", value)?;
            }
            "includeAllJMSXProperties" => {
                self.include_all_jmsx_properties = parse_bool("includeAllJMSXProperties", value)?;
            }
            "allowAdditionalHeaders" => {
                self.allow_additional_headers = value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_owned)
                    .collect();
            }
            "asyncStopListener" => {
                self.async_stop_listener = parse_bool("asyncStopListener", value)?;
            }
            "formatDateHeadersToIso8601" => {
                self.format_dates_iso8601 = parse_bool("formatDateHeadersToIso8601", value)?;
            }
            "artemisConsumerPriority" => {
                self.consumer_priority =
                    Some(value.parse().map_err(|_| invalid("artemisConsumerPriority", value))?);
            }
            "autoStartup" => self.auto_startup = parse_bool("autoStartup", value)?,
            "jmsMessageType" => self.message_type = Some(value.parse()?),
            "allowNullBody" => self.allow_null_body = parse_bool("allowNullBody", value)?,
            "jmsKeyFormatStrategy" => self.key_format = Some(value.parse()?),
            "pubSubNoLocal" => self.pub_sub_no_local = parse_bool("pubSubNoLocal", value)?,
            "prefetch" => self.prefetch = parse_count("prefetch", value)?,
            other => return Err(ConfigError::UnknownOption(other.to_owned())),
        }
        Ok(())
    }

    /// Reply queue kind in effect: the explicit type, otherwise `Shared` when
    /// `reply_to` is set and `Temporary` when it is not.
    #[must_use]
    pub fn effective_reply_to_type(&self) -> ReplyToType {
        self.reply_to_type.unwrap_or(if self.reply_to.is_some() {
            ReplyToType::Shared
        } else {
            ReplyToType::Temporary
        })
    }

    /// Check option combinations.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.reply_to_type, &self.reply_to) {
            (Some(ReplyToType::Temporary), Some(_)) => {
                return Err(ConfigError::TemporaryWithFixedReplyTo);
            }
            (Some(kind @ (ReplyToType::Shared | ReplyToType::Exclusive)), None) => {
                return Err(ConfigError::MissingReplyTo(kind));
            }
            _ => {}
        }
        if self.reply_to_cache_level == Some(CacheLevel::None)
            && self.effective_reply_to_type() == ReplyToType::Temporary
        {
            return Err(ConfigError::CacheNoneWithTemporaryQueue);
        }
        if self.request_timeout_checker_interval.is_zero() {
            return Err(ConfigError::InvalidCheckerInterval);
        }
        if (self.subscription_durable || self.subscription_shared) && self.subscription_name.is_none() {
            return Err(ConfigError::MissingSubscriptionName);
        }
        Ok(())
    }

    /// Binding options derived from this configuration.
    #[must_use]
    pub fn binding_settings(&self) -> BindingSettings {
        BindingSettings {
            use_message_id_as_correlation_id: self.use_message_id_as_correlation_id,
            allow_null_body: self.allow_null_body,
            message_type: self.message_type,
            format_dates_iso8601: self.format_dates_iso8601,
            include_all_jmsx_properties: self.include_all_jmsx_properties,
            allow_additional_headers: self
                .allow_additional_headers
                .iter()
                .map(|pattern| HeaderPattern::new(pattern))
                .collect(),
        }
    }
}

fn invalid(option: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        option,
        value: value.to_owned(),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

fn parse_bool(option: &'static str, value: &str) -> Result<bool, ConfigError> {
    value.parse().map_err(|_| invalid(option, value))
}

fn parse_millis(option: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .parse()
        .map(Duration::from_millis)
        .map_err(|_| invalid(option, value))
}

fn parse_count(option: &'static str, value: &str) -> Result<NonZeroUsize, ConfigError> {
    value.parse().map_err(|_| invalid(option, value))
}
