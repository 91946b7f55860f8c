//! Destinations and pluggable destination resolution.
//!
//! A [`Destination`] names a queue or topic on the provider. Logical names are
//! mapped to destinations by a [`DestinationResolver`]; the default
//! [`DynamicDestinationResolver`] understands `queue:`/`topic:` prefixes while
//! [`MappedDestinationResolver`] consults an explicit table and may fail.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::error::JmsError;

const QUEUE_PREFIX: &str = "queue:";
const TOPIC_PREFIX: &str = "topic:";
const TEMP_QUEUE_PREFIX: &str = "temp-queue:";
const TEMP_TOPIC_PREFIX: &str = "temp-topic:";

/// Physical queue or topic reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Destination {
    /// Point-to-point queue.
    Queue(String),
    /// Publish/subscribe topic.
    Topic(String),
    /// Provider-created queue scoped to the creating connection.
    TemporaryQueue(String),
    /// Provider-created topic scoped to the creating connection.
    TemporaryTopic(String),
}

impl Destination {
    /// Create a queue destination.
    #[must_use]
    pub fn queue(name: impl Into<String>) -> Self { Self::Queue(name.into()) }

    /// Create a topic destination.
    #[must_use]
    pub fn topic(name: impl Into<String>) -> Self { Self::Topic(name.into()) }

    /// Return the physical name without any type prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Queue(name)
            | Self::Topic(name)
            | Self::TemporaryQueue(name)
            | Self::TemporaryTopic(name) => name,
        }
    }

    /// Whether the destination uses publish/subscribe semantics.
    #[must_use]
    pub fn is_topic(&self) -> bool { matches!(self, Self::Topic(_) | Self::TemporaryTopic(_)) }

    /// Whether the destination was created by the provider on demand.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::TemporaryQueue(_) | Self::TemporaryTopic(_))
    }

    /// Parse a destination string, honouring `queue:`, `topic:`,
    /// `temp-queue:` and `temp-topic:` prefixes (with or without `//`).
    ///
    /// Names without a prefix become topics when `pub_sub_domain` is set and
    /// queues otherwise.
    ///
    /// ```
    /// use relaymq::destination::Destination;
    ///
    /// assert_eq!(Destination::parse("topic:news", false), Destination::topic("news"));
    /// assert_eq!(Destination::parse("queue://orders", true), Destination::queue("orders"));
    /// assert_eq!(Destination::parse("orders", false), Destination::queue("orders"));
    /// ```
    #[must_use]
    pub fn parse(value: &str, pub_sub_domain: bool) -> Self {
        let strip = |rest: &str| rest.trim_start_matches("//").to_owned();
        if let Some(rest) = value.strip_prefix(QUEUE_PREFIX) {
            Self::Queue(strip(rest))
        } else if let Some(rest) = value.strip_prefix(TOPIC_PREFIX) {
            Self::Topic(strip(rest))
        } else if let Some(rest) = value.strip_prefix(TEMP_QUEUE_PREFIX) {
            Self::TemporaryQueue(strip(rest))
        } else if let Some(rest) = value.strip_prefix(TEMP_TOPIC_PREFIX) {
            Self::TemporaryTopic(strip(rest))
        } else if pub_sub_domain {
            Self::Topic(value.to_owned())
        } else {
            Self::Queue(value.to_owned())
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue(name) => write!(f, "queue://{name}"),
            Self::Topic(name) => write!(f, "topic://{name}"),
            Self::TemporaryQueue(name) => write!(f, "temp-queue://{name}"),
            Self::TemporaryTopic(name) => write!(f, "temp-topic://{name}"),
        }
    }
}

/// Strip any destination type prefix from `name`.
#[must_use]
pub fn normalize_destination_name(name: &str) -> &str {
    [TEMP_QUEUE_PREFIX, TEMP_TOPIC_PREFIX, QUEUE_PREFIX, TOPIC_PREFIX]
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .map_or(name, |rest| rest.trim_start_matches("//"))
}

/// Whether `name` carries an explicit topic prefix.
#[must_use]
pub fn is_topic_prefix(name: &str) -> bool {
    name.starts_with(TOPIC_PREFIX) || name.starts_with(TEMP_TOPIC_PREFIX)
}

/// Whether `name` carries an explicit queue prefix.
#[must_use]
pub fn is_queue_prefix(name: &str) -> bool {
    name.starts_with(QUEUE_PREFIX) || name.starts_with(TEMP_QUEUE_PREFIX)
}

/// Map logical destination names to physical destinations.
pub trait DestinationResolver: fmt::Debug + Send + Sync {
    /// Resolve `name`; `pub_sub_domain` selects topics for unprefixed names.
    ///
    /// # Errors
    ///
    /// Returns [`JmsError::DestinationResolution`] when the name cannot be
    /// mapped.
    fn resolve(&self, name: &str, pub_sub_domain: bool) -> Result<Destination, JmsError>;
}

/// Resolves names by parsing their type prefix; never fails on non-empty names.
#[derive(Clone, Copy, Debug, Default)]
pub struct DynamicDestinationResolver;

impl DestinationResolver for DynamicDestinationResolver {
    fn resolve(&self, name: &str, pub_sub_domain: bool) -> Result<Destination, JmsError> {
        if normalize_destination_name(name).is_empty() {
            return Err(JmsError::DestinationResolution {
                name: name.to_owned(),
                reason: "destination name is empty".to_owned(),
            });
        }
        Ok(Destination::parse(name, pub_sub_domain))
    }
}

/// Resolves names through an explicit table of logical names.
///
/// Unmapped names fail unless a fallback resolver is configured.
#[derive(Debug, Default)]
pub struct MappedDestinationResolver {
    table: HashMap<String, Destination>,
    fallback: Option<DynamicDestinationResolver>,
}

impl MappedDestinationResolver {
    /// Create an empty, strict resolver.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Map `logical` to `destination`.
    #[must_use]
    pub fn with_mapping(mut self, logical: impl Into<String>, destination: Destination) -> Self {
        self.table.insert(logical.into(), destination);
        self
    }

    /// Fall back to prefix parsing for unmapped names.
    #[must_use]
    pub fn with_dynamic_fallback(mut self) -> Self {
        self.fallback = Some(DynamicDestinationResolver);
        self
    }
}

impl DestinationResolver for MappedDestinationResolver {
    fn resolve(&self, name: &str, pub_sub_domain: bool) -> Result<Destination, JmsError> {
        let key = normalize_destination_name(name);
        if let Some(destination) = self.table.get(key).or_else(|| self.table.get(name)) {
            return Ok(destination.clone());
        }
        match &self.fallback {
            Some(fallback) => fallback.resolve(name, pub_sub_domain),
            None => Err(JmsError::DestinationResolution {
                name: name.to_owned(),
                reason: "no mapping registered".to_owned(),
            }),
        }
    }
}
