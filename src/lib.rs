#![doc(html_root_url = "https://docs.rs/relaymq/latest")]
//! Public API for the `relaymq` library.
//!
//! This crate provides the request/reply core of a JMS-style messaging
//! client: message binding, reply correlation, producers, listener
//! consumers, and an embedded in-memory broker implementing the provider
//! seam.

pub mod binding;
pub mod broker;
pub mod chunk;
pub mod component;
pub mod config;
pub mod consumer;
pub mod destination;
pub mod endpoint;
pub mod error;
pub mod exchange;
pub mod id;
pub mod key_format;
pub mod message;
pub mod metrics;
pub mod producer;
pub mod provider;
pub mod reply;
pub mod selector;

pub use binding::{BindingError, MessageBinding};
pub use broker::EmbeddedBroker;
pub use component::JmsComponent;
pub use config::{CacheLevel, ConfigError, EndpointConfig, ReplyToType};
pub use consumer::{Consumer, ConsumerState, Processor, processor_fn};
pub use destination::{Destination, DestinationResolver, DynamicDestinationResolver};
pub use endpoint::Endpoint;
/// Result type alias re-exported for convenience.
pub use error::{JmsError, Result};
pub use exchange::{Exchange, ExchangeMessage, ExchangePattern, HeaderValue};
pub use id::{IdGenerator, SequentialIdGenerator, UuidGenerator};
pub use key_format::{KeyFormat, KeyFormatStrategy};
pub use message::{Body, DeliveryMode, JmsMessage, MessageType, PropertyValue};
pub use producer::Producer;
pub use provider::{Provider, ProviderError, Subscription, SubscriptionSpec};
pub use reply::{ReplyFuture, ReplyManager};
pub use selector::Selector;
