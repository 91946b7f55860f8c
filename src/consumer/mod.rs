//! Consumer.
//!
//! A [`Consumer`] runs `concurrentConsumers` worker tasks, each with its own
//! provider subscription, and hands every inbound message to a
//! [`Processor`]. Requests carrying a reply-to destination are answered with
//! the exchange's out message, or with an error reply when processing fails.
//!
//! Lifecycle:
//!
//! ```text
//! Created --start--> Started <--suspend/resume--> Suspended
//!                       |                             |
//!                       +-----------stop--------------+--> Stopped --start--> Started
//! any --shutdown--> Shutdown
//! ```
//!
//! Destination, concurrency and selector may only change while the consumer
//! is created or stopped; the next start applies them.

mod reply;
mod worker;

use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use derive_more::Display;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info};

use self::worker::{Worker, WorkerContext};
use crate::{
    binding::MessageBinding,
    chunk::Reassembler,
    config::EndpointConfig,
    destination::DestinationResolver,
    endpoint::Endpoint,
    error::JmsError,
    exchange::Exchange,
    id::IdGenerator,
    provider::{MessageFilter, Provider, Subscription, SubscriptionSpec},
    selector::Selector,
};

/// Lifecycle state of a [`Consumer`].
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum ConsumerState {
    /// Created but never started.
    #[display("created")]
    Created,
    /// Workers are receiving messages.
    #[display("started")]
    Started,
    /// Workers are paused.
    #[display("suspended")]
    Suspended,
    /// Workers have been stopped; the consumer may be restarted.
    #[display("stopped")]
    Stopped,
    /// The consumer has been shut down for good.
    #[display("shut down")]
    Shutdown,
}

/// Handles exchanges received by a [`Consumer`].
///
/// Errors, whether returned or attached to the exchange, are logged and,
/// for requests, sent back as an error reply.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// Process one exchange; set an out message to control the reply.
    async fn process(&self, exchange: &mut Exchange) -> Result<(), JmsError>;
}

/// [`Processor`] wrapping a synchronous closure; see [`processor_fn`].
pub struct FnProcessor<F>(F);

/// Wrap a synchronous closure as a [`Processor`].
///
/// ```
/// use relaymq::consumer::processor_fn;
///
/// let _greeter = processor_fn(|exchange| {
///     let name = exchange.body().as_text().unwrap_or_default().to_owned();
///     exchange.set_body(format!("Hello {name}"));
///     Ok(())
/// });
/// ```
pub fn processor_fn<F>(f: F) -> FnProcessor<F>
where
    F: Fn(&mut Exchange) -> Result<(), JmsError> + Send + Sync + 'static,
{
    FnProcessor(f)
}

#[async_trait]
impl<F> Processor for FnProcessor<F>
where
    F: Fn(&mut Exchange) -> Result<(), JmsError> + Send + Sync + 'static,
{
    async fn process(&self, exchange: &mut Exchange) -> Result<(), JmsError> { (self.0)(exchange) }
}

#[derive(Clone, Debug)]
struct ListenerSettings {
    destination_name: String,
    pub_sub_domain: bool,
    concurrency: NonZeroUsize,
    selector: Option<Selector>,
}

struct Running {
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

/// Listener container for one endpoint.
pub struct Consumer {
    provider: Arc<dyn Provider>,
    resolver: Arc<dyn DestinationResolver>,
    config: EndpointConfig,
    context: Arc<WorkerContext>,
    settings: Mutex<ListenerSettings>,
    state: watch::Sender<ConsumerState>,
    suspended: watch::Sender<bool>,
    running: AsyncMutex<Option<Running>>,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("settings", &*self.settings())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Consumer {
    /// Create a consumer for `endpoint` in the [`ConsumerState::Created`]
    /// state.
    #[must_use]
    pub fn new(
        provider: Arc<dyn Provider>,
        resolver: Arc<dyn DestinationResolver>,
        ids: Arc<dyn IdGenerator>,
        binding: MessageBinding,
        endpoint: &Endpoint,
        processor: Arc<dyn Processor>,
    ) -> Self {
        let config = endpoint.config().clone();
        let context = Arc::new(WorkerContext {
            provider: Arc::clone(&provider),
            binding,
            processor,
            ids,
            reassembler: Mutex::new(Reassembler::new(
                config.max_reassembled_size,
                config.chunk_reassembly_timeout,
            )),
            disable_reply_to: config.disable_reply_to,
            correlation_property: config.correlation_property.clone(),
        });
        let settings = ListenerSettings {
            destination_name: endpoint.destination_name().to_owned(),
            pub_sub_domain: endpoint.is_pub_sub_domain(),
            concurrency: config.concurrent_consumers,
            selector: config.selector.clone(),
        };
        Self {
            provider,
            resolver,
            config,
            context,
            settings: Mutex::new(settings),
            state: watch::Sender::new(ConsumerState::Created),
            suspended: watch::Sender::new(false),
            running: AsyncMutex::new(None),
        }
    }

    fn settings(&self) -> MutexGuard<'_, ListenerSettings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConsumerState { *self.state.borrow() }

    /// Watch lifecycle transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> { self.state.subscribe() }

    /// Destination name the next start consumes from.
    #[must_use]
    pub fn destination_name(&self) -> String { self.settings().destination_name.clone() }

    /// Number of workers the next start spawns.
    #[must_use]
    pub fn concurrent_consumers(&self) -> NonZeroUsize { self.settings().concurrency }

    /// Change the destination.
    ///
    /// # Errors
    ///
    /// Returns [`JmsError::InvalidState`] unless the consumer is created or
    /// stopped.
    pub fn set_destination_name(&self, name: impl Into<String>) -> Result<(), JmsError> {
        let mut settings = self.reconfigurable("set_destination_name")?;
        settings.destination_name = name.into();
        Ok(())
    }

    /// Change the number of workers.
    ///
    /// # Errors
    ///
    /// Returns [`JmsError::InvalidState`] unless the consumer is created or
    /// stopped.
    pub fn set_concurrent_consumers(&self, concurrency: NonZeroUsize) -> Result<(), JmsError> {
        self.reconfigurable("set_concurrent_consumers")?.concurrency = concurrency;
        Ok(())
    }

    /// Change the message selector.
    ///
    /// # Errors
    ///
    /// Returns [`JmsError::InvalidState`] unless the consumer is created or
    /// stopped.
    pub fn set_selector(&self, selector: Option<Selector>) -> Result<(), JmsError> {
        self.reconfigurable("set_selector")?.selector = selector;
        Ok(())
    }

    fn reconfigurable(&self, operation: &'static str) -> Result<MutexGuard<'_, ListenerSettings>, JmsError> {
        match self.state() {
            ConsumerState::Created | ConsumerState::Stopped => Ok(self.settings()),
            state => Err(JmsError::InvalidState { operation, state }),
        }
    }

    /// Open the subscriptions and start the workers. Starting a suspended
    /// consumer resumes it; starting a started one does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`JmsError`] if the consumer was shut down, the destination
    /// cannot be resolved, or the provider refuses a subscription.
    pub async fn start(&self) -> Result<(), JmsError> {
        let mut running = self.running.lock().await;
        match self.state() {
            ConsumerState::Started => return Ok(()),
            ConsumerState::Suspended => return self.resume(),
            ConsumerState::Shutdown => {
                return Err(JmsError::InvalidState {
                    operation: "start",
                    state: ConsumerState::Shutdown,
                });
            }
            ConsumerState::Created | ConsumerState::Stopped => {}
        }

        let settings = self.settings().clone();
        let spec = self.subscription_spec(&settings)?;
        let mut subscriptions: Vec<Box<dyn Subscription>> = Vec::with_capacity(settings.concurrency.get());
        for _ in 0..settings.concurrency.get() {
            match self.provider.subscribe(spec.clone()).await {
                Ok(subscription) => subscriptions.push(subscription),
                Err(e) => {
                    for subscription in subscriptions {
                        subscription.close().await;
                    }
                    return Err(e.into());
                }
            }
        }

        self.suspended.send_replace(false);
        let tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();
        for (index, subscription) in subscriptions.into_iter().enumerate() {
            let worker = Worker {
                index,
                context: Arc::clone(&self.context),
                subscription,
                shutdown: shutdown.clone(),
                suspended: self.suspended.subscribe(),
            };
            tracker.spawn(worker.run());
        }
        tracker.close();
        *running = Some(Running { tracker, shutdown });
        self.state.send_replace(ConsumerState::Started);
        info!(
            destination = %spec.destination,
            concurrency = settings.concurrency.get(),
            selector = ?settings.selector.as_ref().map(Selector::source),
            "consumer started"
        );
        Ok(())
    }

    fn subscription_spec(&self, settings: &ListenerSettings) -> Result<SubscriptionSpec, JmsError> {
        let destination = self
            .resolver
            .resolve(&settings.destination_name, settings.pub_sub_domain)?;
        let mut spec = SubscriptionSpec::new(destination.clone())
            .with_priority(self.config.consumer_priority.unwrap_or(0))
            .with_prefetch(self.config.prefetch);
        if let Some(selector) = &settings.selector {
            spec = spec.with_filter(MessageFilter::Selector(selector.clone()));
        }
        if destination.is_topic()
            && (self.config.subscription_durable || self.config.subscription_shared)
            && let Some(name) = &self.config.subscription_name
        {
            spec = spec.with_durable(name.clone(), self.config.subscription_shared);
        }
        Ok(spec)
    }

    /// Pause the workers; buffered messages wait until [`Consumer::resume`].
    ///
    /// # Errors
    ///
    /// Returns [`JmsError::InvalidState`] unless the consumer is started or
    /// suspended.
    pub fn suspend(&self) -> Result<(), JmsError> {
        match self.state() {
            ConsumerState::Suspended => Ok(()),
            ConsumerState::Started => {
                self.suspended.send_replace(true);
                self.state.send_replace(ConsumerState::Suspended);
                debug!("consumer suspended");
                Ok(())
            }
            state => Err(JmsError::InvalidState {
                operation: "suspend",
                state,
            }),
        }
    }

    /// Resume suspended workers.
    ///
    /// # Errors
    ///
    /// Returns [`JmsError::InvalidState`] unless the consumer is started or
    /// suspended.
    pub fn resume(&self) -> Result<(), JmsError> {
        match self.state() {
            ConsumerState::Started => Ok(()),
            ConsumerState::Suspended => {
                self.suspended.send_replace(false);
                self.state.send_replace(ConsumerState::Started);
                debug!("consumer resumed");
                Ok(())
            }
            state => Err(JmsError::InvalidState {
                operation: "resume",
                state,
            }),
        }
    }

    /// Stop the workers and close their subscriptions.
    ///
    /// Waits for in-flight messages to finish unless `asyncStopListener` is
    /// set, in which case the workers drain in the background.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(Running { tracker, shutdown }) = running.take() else {
            return;
        };
        shutdown.cancel();
        if self.state() != ConsumerState::Shutdown {
            self.state.send_replace(ConsumerState::Stopped);
        }
        if self.config.async_stop_listener {
            debug!("consumer stopping in the background");
        } else {
            tracker.wait().await;
        }
        info!(destination = %self.settings().destination_name, "consumer stopped");
    }

    /// Stop the consumer for good.
    pub async fn shutdown(&self) {
        self.state.send_replace(ConsumerState::Shutdown);
        self.stop().await;
    }
}

#[cfg(test)]
mod tests;
