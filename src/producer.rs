//! Producer.
//!
//! A [`Producer`] sends exchanges to its endpoint destination. Fire-and-forget
//! exchanges return once the provider accepted the message; request/reply
//! exchanges register with the producer's [`ReplyManager`], which is started
//! on the first request. A producer is cheap to clone and safe to share
//! between concurrent callers; every request gets its own pending entry.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::{
    binding::{MessageBinding, headers},
    chunk::{Chunker, CollectionId},
    destination::{Destination, DestinationResolver},
    endpoint::Endpoint,
    error::JmsError,
    exchange::{Exchange, ExchangePattern, HeaderValue},
    id::IdGenerator,
    message::{Body, DEFAULT_PRIORITY, DeliveryMode, JmsMessage, PropertyValue},
    metrics,
    provider::Provider,
    reply::{CorrelationStrategy, ReplyManager, ReplySettings},
};

struct Inner {
    provider: Arc<dyn Provider>,
    resolver: Arc<dyn DestinationResolver>,
    ids: Arc<dyn IdGenerator>,
    binding: MessageBinding,
    endpoint: Endpoint,
    destination: Destination,
    resolved: DashMap<String, Destination>,
    reply_settings: ReplySettings,
    reply_manager: OnceCell<ReplyManager>,
    chunker: Option<Chunker>,
}

/// Sends exchanges to one endpoint.
#[derive(Clone)]
pub struct Producer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("destination", &self.inner.destination)
            .finish_non_exhaustive()
    }
}

impl Producer {
    /// Create a producer for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`JmsError`] if the endpoint destination cannot be resolved or
    /// the reply options are invalid.
    pub fn new(
        provider: Arc<dyn Provider>,
        resolver: Arc<dyn DestinationResolver>,
        ids: Arc<dyn IdGenerator>,
        binding: MessageBinding,
        endpoint: Endpoint,
    ) -> Result<Self, JmsError> {
        let destination = resolver.resolve(endpoint.destination_name(), endpoint.is_pub_sub_domain())?;
        let reply_settings = ReplySettings::from_config(endpoint.config())?;
        let chunker = endpoint.config().max_chunk_size.map(Chunker::new);
        debug!(destination = %destination, uri = endpoint.uri(), "producer created");
        Ok(Self {
            inner: Arc::new(Inner {
                provider,
                resolver,
                ids,
                binding,
                endpoint,
                destination,
                resolved: DashMap::new(),
                reply_settings,
                reply_manager: OnceCell::new(),
                chunker,
            }),
        })
    }

    /// The endpoint this producer sends to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint { &self.inner.endpoint }

    /// Resolved endpoint destination.
    #[must_use]
    pub fn destination(&self) -> &Destination { &self.inner.destination }

    /// Number of distinct dynamic destination names resolved so far.
    #[must_use]
    pub fn resolved_destinations(&self) -> usize { self.inner.resolved.len() }

    /// The reply manager, once a request started it.
    #[must_use]
    pub fn reply_manager(&self) -> Option<&ReplyManager> { self.inner.reply_manager.get() }

    /// Send `exchange` without waiting for a reply.
    ///
    /// Byte payloads above `maxChunkSize` are split into chunks. The provider
    /// message id is stored in the `JMSMessageID` header.
    ///
    /// # Errors
    ///
    /// Returns [`JmsError`] if the destination cannot be resolved, the body
    /// cannot be bound, or the provider rejects the message.
    pub async fn send(&self, exchange: &mut Exchange) -> Result<(), JmsError> {
        let config = self.inner.endpoint.config();
        let destination = self.destination_for(exchange)?;
        let mut wire = self.inner.binding.to_wire(exchange.input())?;
        self.apply_qos(&mut wire, None);
        wire.reply_to = if config.disable_reply_to {
            None
        } else if let Some(name) = &config.reply_to_override {
            Some(self.inner.resolver.resolve(name, false)?)
        } else if config.preserve_message_qos {
            wire.reply_to
        } else {
            None
        };

        let oversized = match (&self.inner.chunker, &wire.body) {
            (Some(chunker), Body::Bytes(payload)) if chunker.needs_chunking(payload) => {
                Some((chunker, payload.clone()))
            }
            _ => None,
        };
        let message_id = match oversized {
            Some((chunker, payload)) => {
                self.send_chunked(chunker, &destination, &wire, &payload)
                    .await?
            }
            None => {
                let message_id = self.inner.provider.send(&destination, wire).await?;
                metrics::inc_sent(metrics::Kind::Request);
                message_id
            }
        };
        debug!(destination = %destination, message_id = %message_id, "message sent");
        exchange.set_header(headers::JMS_MESSAGE_ID, message_id);
        Ok(())
    }

    /// Send `exchange` and wait for the correlated reply, which becomes the
    /// exchange's out message.
    ///
    /// The wait is bounded by `timeout`, else the `RelayJmsRequestTimeout`
    /// header in milliseconds, else the endpoint `requestTimeout`.
    ///
    /// # Errors
    ///
    /// Returns [`JmsError::ReplyTimeout`] when no reply arrived in time,
    /// [`JmsError::Remote`] when the reply is an error reply, and any error
    /// raised while sending.
    pub async fn request(&self, exchange: &mut Exchange, timeout: Option<Duration>) -> Result<(), JmsError> {
        let manager = self.reply_manager_or_start().await?;
        let header_timeout = exchange
            .input_mut()
            .remove_header(headers::REQUEST_TIMEOUT)
            .as_ref()
            .and_then(HeaderValue::as_i64)
            .and_then(|millis| u64::try_from(millis).ok())
            .map(Duration::from_millis);
        let timeout = timeout
            .or(header_timeout)
            .unwrap_or(manager.settings().request_timeout);
        let destination = self.destination_for(exchange)?;

        let correlation = &manager.settings().descriptor.correlation;
        let caller_id = match correlation {
            CorrelationStrategy::Property(name) => exchange.header(name),
            CorrelationStrategy::CorrelationId | CorrelationStrategy::MessageId => {
                exchange.header(headers::JMS_CORRELATION_ID)
            }
        }
        .and_then(HeaderValue::to_text);
        let mut future = manager.register(caller_id.as_deref(), Some(timeout))?;

        let mut wire = self.inner.binding.to_wire(exchange.input())?;
        match correlation {
            CorrelationStrategy::CorrelationId => {
                wire.correlation_id = Some(future.correlation_id().to_owned());
            }
            CorrelationStrategy::MessageId => wire.correlation_id = None,
            CorrelationStrategy::Property(name) => {
                wire.set_property(name.clone(), future.correlation_id());
            }
        }
        wire.reply_to = Some(manager.reply_to().clone());
        self.apply_qos(&mut wire, Some(timeout));

        let message_id = self.inner.provider.send(&destination, wire).await?;
        metrics::inc_sent(metrics::Kind::Request);
        debug!(
            destination = %destination,
            message_id = %message_id,
            correlation_id = future.correlation_id(),
            ?timeout,
            "request sent"
        );
        if future.is_provisional() {
            future.update_correlation_id(message_id.clone())?;
        }
        exchange.set_header(headers::JMS_MESSAGE_ID, message_id);

        let reply = future.await?;
        if reply
            .property(headers::ERROR_REPLY)
            .and_then(PropertyValue::as_bool)
            == Some(true)
        {
            let cause = reply.body.as_text().unwrap_or("remote failure").to_owned();
            return Err(JmsError::Remote(cause));
        }
        exchange.set_output(self.inner.binding.from_wire(&reply));
        Ok(())
    }

    /// Send `exchange` according to its pattern, attaching any failure to the
    /// exchange instead of returning it.
    pub async fn process(&self, exchange: &mut Exchange) {
        let result = if exchange.pattern() == ExchangePattern::InOut
            && !self.inner.endpoint.config().disable_reply_to
        {
            self.request(exchange, None).await
        } else {
            self.send(exchange).await
        };
        if let Err(e) = result {
            debug!(exchange = exchange.id(), error = %e, "exchange failed");
            exchange.set_error(e);
        }
    }

    /// Stop the reply manager, failing outstanding requests.
    pub async fn stop(&self) {
        if let Some(manager) = self.inner.reply_manager.get() {
            manager.stop().await;
        }
    }

    async fn reply_manager_or_start(&self) -> Result<&ReplyManager, JmsError> {
        let inner = &self.inner;
        inner
            .reply_manager
            .get_or_try_init(|| {
                ReplyManager::start(
                    Arc::clone(&inner.provider),
                    inner.resolver.as_ref(),
                    Arc::clone(&inner.ids),
                    inner.reply_settings.clone(),
                )
            })
            .await
    }

    fn destination_for(&self, exchange: &mut Exchange) -> Result<Destination, JmsError> {
        let Some(name) = exchange
            .input_mut()
            .remove_header(headers::DESTINATION_NAME)
            .as_ref()
            .and_then(HeaderValue::to_text)
            .filter(|name| !name.is_empty())
        else {
            return Ok(self.inner.destination.clone());
        };
        if let Some(destination) = self.inner.resolved.get(&name) {
            trace!(name = %name, "dynamic destination cached");
            return Ok(destination.clone());
        }
        let destination = self
            .inner
            .resolver
            .resolve(&name, self.inner.endpoint.is_pub_sub_domain())?;
        debug!(name = %name, destination = %destination, "dynamic destination resolved");
        Ok(self
            .inner
            .resolved
            .entry(name)
            .or_insert(destination)
            .clone())
    }

    fn apply_qos(&self, wire: &mut JmsMessage, request_timeout: Option<Duration>) {
        let config = self.inner.endpoint.config();
        if !config.preserve_message_qos {
            if config.explicit_qos_enabled {
                wire.priority = config.priority;
                wire.delivery_mode = config.delivery_mode;
            } else {
                wire.priority = DEFAULT_PRIORITY;
                wire.delivery_mode = DeliveryMode::Persistent;
            }
        }
        let explicit_ttl = (config.explicit_qos_enabled || config.preserve_message_qos)
            .then_some(config.time_to_live)
            .flatten();
        wire.time_to_live = match request_timeout {
            Some(timeout) => config.time_to_live.or(Some(timeout)),
            None => explicit_ttl,
        };
    }

    async fn send_chunked(
        &self,
        chunker: &Chunker,
        destination: &Destination,
        template: &JmsMessage,
        payload: &Bytes,
    ) -> Result<String, JmsError> {
        let collection = CollectionId::new(self.inner.ids.next_id());
        let chunks = chunker.split(&collection, template, payload)?;
        let count = chunks.len();
        let mut last_id = String::new();
        for chunk in chunks {
            last_id = self.inner.provider.send(destination, chunk).await?;
            metrics::inc_sent(metrics::Kind::Request);
        }
        debug!(
            destination = %destination,
            collection = %collection,
            chunks = count - 1,
            bytes = payload.len(),
            "payload sent in chunks"
        );
        Ok(last_id)
    }
}
