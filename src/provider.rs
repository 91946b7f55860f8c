//! Provider seam.
//!
//! A [`Provider`] moves [`JmsMessage`]s between destinations. The reply
//! manager, producers and consumers only talk to this trait, so any broker
//! client can sit behind it; [`crate::broker::EmbeddedBroker`] is the bundled
//! in-process implementation.

use std::{fmt, num::NonZeroUsize, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::{destination::Destination, message::JmsMessage, selector::Selector};

/// Errors raised by a provider.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The destination does not exist and cannot be created implicitly.
    #[error("unknown destination {0}")]
    UnknownDestination(Destination),
    /// The temporary destination was deleted.
    #[error("temporary destination {0} has been deleted")]
    TemporaryDestinationDeleted(Destination),
    /// An exclusive durable subscription already has an active consumer.
    #[error("durable subscription {name} already has an active consumer")]
    SubscriptionInUse {
        /// Subscription name.
        name: String,
    },
    /// The provider does not support the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    /// The provider connection failed.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Filter applied by the provider before a message reaches a subscription.
#[derive(Clone, Default)]
pub enum MessageFilter {
    /// Accept every message.
    #[default]
    All,
    /// Accept messages matching a selector expression.
    Selector(Selector),
    /// Accept messages matching a predicate evaluated at dispatch time.
    ///
    /// Providers re-evaluate dynamic filters for buffered messages, so a
    /// message rejected once may be accepted later.
    Dynamic(Arc<dyn Fn(&JmsMessage) -> bool + Send + Sync>),
}

impl MessageFilter {
    /// Whether `message` passes the filter.
    #[must_use]
    pub fn accepts(&self, message: &JmsMessage) -> bool {
        match self {
            Self::All => true,
            Self::Selector(selector) => selector.matches(message),
            Self::Dynamic(predicate) => predicate(message),
        }
    }

    /// Whether the filter must be re-evaluated over time.
    #[must_use]
    pub fn is_dynamic(&self) -> bool { matches!(self, Self::Dynamic(_)) }
}

impl fmt::Debug for MessageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Selector(selector) => f.debug_tuple("Selector").field(&selector.source()).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Durable topic subscription settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DurableSubscription {
    /// Subscription name; messages are retained under it while no consumer is
    /// attached.
    pub name: String,
    /// Whether several consumers may share the subscription.
    pub shared: bool,
}

/// Everything a provider needs to open a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionSpec {
    /// Queue or topic to consume from.
    pub destination: Destination,
    /// Message filter.
    pub filter: MessageFilter,
    /// Consumer priority hint; higher values are served first.
    pub priority: i32,
    /// Durable subscription settings for topics.
    pub durable: Option<DurableSubscription>,
    /// Number of messages the provider may push ahead of `receive`.
    pub prefetch: NonZeroUsize,
}

impl SubscriptionSpec {
    /// Subscribe to `destination` with default settings.
    #[must_use]
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            filter: MessageFilter::All,
            priority: 0,
            durable: None,
            prefetch: NonZeroUsize::MIN,
        }
    }

    /// Set the message filter.
    #[must_use]
    pub fn with_filter(mut self, filter: MessageFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the consumer priority hint.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Make the topic subscription durable.
    #[must_use]
    pub fn with_durable(mut self, name: impl Into<String>, shared: bool) -> Self {
        self.durable = Some(DurableSubscription {
            name: name.into(),
            shared,
        });
        self
    }

    /// Set the prefetch window.
    #[must_use]
    pub fn with_prefetch(mut self, prefetch: NonZeroUsize) -> Self {
        self.prefetch = prefetch;
        self
    }
}

/// An open consumer on a provider destination.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message.
    ///
    /// Returns `None` once the subscription can no longer deliver, for
    /// example because its temporary destination was deleted. Cancelling the
    /// returned future never loses a message.
    async fn receive(&mut self) -> Option<JmsMessage>;

    /// Close the subscription, returning undelivered prefetched messages to
    /// the provider.
    async fn close(self: Box<Self>);
}

/// Message-oriented middleware client.
#[async_trait]
pub trait Provider: fmt::Debug + Send + Sync + 'static {
    /// Send `message` to `destination`, returning the provider assigned
    /// message identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the provider rejects the message.
    async fn send(&self, destination: &Destination, message: JmsMessage)
    -> Result<String, ProviderError>;

    /// Create a temporary queue owned by this connection.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the queue cannot be created.
    async fn create_temporary_queue(&self) -> Result<Destination, ProviderError>;

    /// Delete a temporary destination; open subscriptions on it end.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the destination is not temporary or was
    /// already deleted.
    async fn delete_temporary_destination(
        &self,
        destination: &Destination,
    ) -> Result<(), ProviderError>;

    /// Open a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the destination or durable subscription is
    /// unavailable.
    async fn subscribe(&self, spec: SubscriptionSpec)
    -> Result<Box<dyn Subscription>, ProviderError>;
}
