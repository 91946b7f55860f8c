//! Component: the factory tying a provider to endpoints.
//!
//! A [`JmsComponent`] holds the provider, the destination resolver, the id
//! generator and the defaults every endpoint it parses inherits. Producers and
//! consumers created from the same component share the provider connection.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use relaymq::{broker::EmbeddedBroker, component::JmsComponent, exchange::Exchange};
//!
//! # async fn demo() -> Result<(), relaymq::JmsError> {
//! let component = JmsComponent::new(Arc::new(EmbeddedBroker::new("demo")));
//! let producer = component.create_producer("queue:greetings?replyTo=replies")?;
//! let mut exchange = Exchange::in_out("World");
//! producer.request(&mut exchange, None).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::{
    binding::MessageBinding,
    config::{ConfigError, EndpointConfig},
    consumer::{Consumer, Processor},
    destination::{DestinationResolver, DynamicDestinationResolver},
    endpoint::Endpoint,
    error::JmsError,
    id::{IdGenerator, UuidGenerator},
    key_format::{KeyFormat, KeyFormatStrategy},
    producer::Producer,
    provider::Provider,
};

/// Endpoint factory bound to one provider.
#[derive(Clone, Debug)]
pub struct JmsComponent {
    provider: Arc<dyn Provider>,
    resolver: Arc<dyn DestinationResolver>,
    ids: Arc<dyn IdGenerator>,
    key_format: Arc<dyn KeyFormatStrategy>,
    defaults: EndpointConfig,
}

impl JmsComponent {
    /// Create a component with default options, dynamic destination
    /// resolution and UUID identifiers.
    #[must_use]
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            resolver: Arc::new(DynamicDestinationResolver),
            ids: Arc::new(UuidGenerator),
            key_format: KeyFormat::Default.strategy(),
            defaults: EndpointConfig::default(),
        }
    }

    /// Options inherited by every endpoint; URI options override them.
    #[must_use]
    pub fn with_defaults(mut self, defaults: EndpointConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Use a built-in key format for endpoints that do not choose one.
    #[must_use]
    pub fn with_key_format(self, format: KeyFormat) -> Self {
        self.with_key_format_strategy(format.strategy())
    }

    /// Use a custom key format for endpoints that do not choose one.
    #[must_use]
    pub fn with_key_format_strategy(mut self, strategy: Arc<dyn KeyFormatStrategy>) -> Self {
        self.key_format = strategy;
        self
    }

    /// Replace the destination resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn DestinationResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replace the generator used for correlation ids, exchange ids and
    /// chunk collection ids.
    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// The provider endpoints are created against.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn Provider> { &self.provider }

    /// Component-level endpoint defaults.
    #[must_use]
    pub fn defaults(&self) -> &EndpointConfig { &self.defaults }

    /// Parse `uri` on top of the component defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed URIs, unknown options, invalid
    /// values, or inconsistent option combinations.
    pub fn endpoint(&self, uri: &str) -> Result<Endpoint, ConfigError> {
        Endpoint::parse(uri, self.defaults.clone())
    }

    /// Create a producer for `endpoint`, an [`Endpoint`] or a URI.
    ///
    /// # Errors
    ///
    /// Returns [`JmsError`] if the URI is invalid or the destination cannot
    /// be resolved.
    pub fn create_producer(&self, endpoint: impl IntoEndpoint) -> Result<Producer, JmsError> {
        let endpoint = endpoint.into_endpoint(self)?;
        debug!(uri = endpoint.uri(), "creating producer");
        Producer::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.resolver),
            Arc::clone(&self.ids),
            self.binding(&endpoint),
            endpoint,
        )
    }

    /// Create a consumer for `endpoint` dispatching to `processor`.
    ///
    /// The consumer starts immediately unless the endpoint sets
    /// `autoStartup=false`.
    ///
    /// # Errors
    ///
    /// Returns [`JmsError`] if the URI is invalid or auto-startup fails.
    pub async fn create_consumer(
        &self,
        endpoint: impl IntoEndpoint,
        processor: Arc<dyn Processor>,
    ) -> Result<Consumer, JmsError> {
        let endpoint = endpoint.into_endpoint(self)?;
        let consumer = Consumer::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.resolver),
            Arc::clone(&self.ids),
            self.binding(&endpoint),
            &endpoint,
            processor,
        );
        if endpoint.config().auto_startup {
            consumer.start().await?;
        } else {
            debug!(uri = endpoint.uri(), "consumer created without starting");
        }
        Ok(consumer)
    }

    fn binding(&self, endpoint: &Endpoint) -> MessageBinding {
        let config = endpoint.config();
        let key_format = config
            .key_format
            .map_or_else(|| Arc::clone(&self.key_format), KeyFormat::strategy);
        MessageBinding::new(key_format, config.binding_settings())
    }
}

/// Values a [`JmsComponent`] can turn into an [`Endpoint`].
pub trait IntoEndpoint {
    /// Convert `self`, applying the component defaults where relevant.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a URI cannot be parsed.
    fn into_endpoint(self, component: &JmsComponent) -> Result<Endpoint, ConfigError>;
}

impl IntoEndpoint for Endpoint {
    fn into_endpoint(self, _: &JmsComponent) -> Result<Endpoint, ConfigError> { Ok(self) }
}

impl IntoEndpoint for &Endpoint {
    fn into_endpoint(self, _: &JmsComponent) -> Result<Endpoint, ConfigError> { Ok(self.clone()) }
}

impl IntoEndpoint for &str {
    fn into_endpoint(self, component: &JmsComponent) -> Result<Endpoint, ConfigError> {
        component.endpoint(self)
    }
}

impl IntoEndpoint for String {
    fn into_endpoint(self, component: &JmsComponent) -> Result<Endpoint, ConfigError> {
        component.endpoint(&self)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;
    use crate::{
        broker::EmbeddedBroker,
        consumer::{ConsumerState, processor_fn},
        exchange::Exchange,
        key_format::PassthroughKeyFormat,
    };

    fn component() -> JmsComponent {
        JmsComponent::new(Arc::new(EmbeddedBroker::new("component")))
    }

    #[test]
    fn endpoints_inherit_component_defaults() {
        let defaults = EndpointConfig::default()
            .with_option("requestTimeout", "500")
            .expect("valid option");
        let component = component().with_defaults(defaults);

        let inherited = component.endpoint("queue:a").expect("endpoint");
        assert_eq!(inherited.config().request_timeout, Duration::from_millis(500));
        let overridden = component
            .endpoint("queue:a?requestTimeout=50")
            .expect("endpoint");
        assert_eq!(overridden.config().request_timeout, Duration::from_millis(50));
    }

    #[rstest]
    #[case("queue:a?jmsKeyFormatStrategy=default", "a_DOT_b")]
    #[case("queue:a", "a.b")]
    fn endpoint_key_format_overrides_component(#[case] uri: &str, #[case] expected: &str) {
        let component = component().with_key_format_strategy(Arc::new(PassthroughKeyFormat));
        let endpoint = component.endpoint(uri).expect("endpoint");
        assert_eq!(component.binding(&endpoint).key_format().encode_key("a.b"), expected);
    }

    #[test]
    fn producers_reject_invalid_uris() {
        let error = component()
            .create_producer("queue:a?replyToType=Temporary&replyTo=fixed")
            .expect_err("invalid combination");
        assert!(matches!(error, JmsError::Configuration(ConfigError::TemporaryWithFixedReplyTo)));
    }

    #[tokio::test]
    async fn consumers_honour_auto_startup() {
        let component = component();
        let processor = Arc::new(processor_fn(|_: &mut Exchange| Ok(())));

        let started = component
            .create_consumer("queue:a", processor.clone())
            .await
            .expect("consumer");
        assert_eq!(started.state(), ConsumerState::Started);

        let idle = component
            .create_consumer("queue:b?autoStartup=false", processor)
            .await
            .expect("consumer");
        assert_eq!(idle.state(), ConsumerState::Created);
        assert_eq!(idle.destination_name(), "queue:b");
    }
}
