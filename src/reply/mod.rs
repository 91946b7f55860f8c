//! Reply manager.
//!
//! A [`ReplyManager`] owns the reply destination of a producer, the map of
//! requests awaiting a reply, the listener tasks consuming replies and the
//! supervisor that expires overdue requests. Each request moves from sent to
//! awaiting reply and ends exactly once: completed by a correlated reply,
//! timed out by the supervisor, or failed when the manager stops.
//!
//! Reply queues come in three flavours:
//!
//! - temporary: one provider temporary queue per manager, deleted on stop;
//! - exclusive: a fixed queue owned by this manager, every reply on it is
//!   ours;
//! - shared: a fixed queue other clients also read, consumed with a filter
//!   accepting only correlation ids pending here.

mod future;
mod pending;

use std::{
    sync::{
        Arc,
        Weak,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use tokio::{
    sync::oneshot,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

pub use self::future::ReplyFuture;
use self::pending::{PendingReplies, PendingReply};
use crate::{
    config::{CacheLevel, ConfigError, EndpointConfig, ReplyToType},
    destination::{Destination, DestinationResolver},
    error::JmsError,
    id::IdGenerator,
    message::JmsMessage,
    metrics,
    provider::{MessageFilter, Provider, Subscription, SubscriptionSpec},
};

/// Prefix of correlation ids generated by the reply manager.
pub const GENERATED_CORRELATION_ID_PREFIX: &str = "Relay-";

/// How long a reply that arrived before its request was re-keyed is kept.
pub const EARLY_REPLY_GRACE: Duration = Duration::from_secs(5);

/// Where replies are read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyDestination {
    /// A temporary queue created by the manager.
    Temporary,
    /// A fixed queue shared with other clients.
    Shared(String),
    /// A fixed queue owned by this manager.
    Exclusive(String),
}

/// How a reply is matched to its request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorrelationStrategy {
    /// `JMSCorrelationID` carries a caller supplied or generated token.
    CorrelationId,
    /// `JMSCorrelationID` of the reply carries the request message id.
    MessageId,
    /// The named property carries the token on both request and reply.
    Property(String),
}

/// Resolved reply destination policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyDescriptor {
    /// Reply queue.
    pub destination: ReplyDestination,
    /// Cache level for reply listeners.
    pub cache_level: CacheLevel,
    /// Correlation strategy.
    pub correlation: CorrelationStrategy,
}

impl ReplyDescriptor {
    /// Derive the reply policy from endpoint options.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for invalid option combinations.
    pub fn from_config(config: &EndpointConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let name = config.reply_to.clone().unwrap_or_default();
        let destination = match config.effective_reply_to_type() {
            ReplyToType::Temporary => ReplyDestination::Temporary,
            ReplyToType::Shared => ReplyDestination::Shared(name),
            ReplyToType::Exclusive => ReplyDestination::Exclusive(name),
        };
        let correlation = match (&config.correlation_property, config.use_message_id_as_correlation_id) {
            (Some(property), _) => CorrelationStrategy::Property(property.clone()),
            (None, true) => CorrelationStrategy::MessageId,
            (None, false) => CorrelationStrategy::CorrelationId,
        };
        Ok(Self {
            destination,
            cache_level: config.reply_to_cache_level.unwrap_or(CacheLevel::Consumer),
            correlation,
        })
    }
}

/// Everything a reply manager needs to run.
#[derive(Clone, Debug)]
pub struct ReplySettings {
    /// Reply destination policy.
    pub descriptor: ReplyDescriptor,
    /// Default time to wait for a reply.
    pub request_timeout: Duration,
    /// Interval between timeout sweeps.
    pub checker_interval: Duration,
    /// Number of reply listener tasks.
    pub concurrent_consumers: usize,
}

impl ReplySettings {
    /// Derive the settings from endpoint options.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for invalid option combinations.
    pub fn from_config(config: &EndpointConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            descriptor: ReplyDescriptor::from_config(config)?,
            request_timeout: config.request_timeout,
            checker_interval: config.request_timeout_checker_interval,
            concurrent_consumers: config.reply_to_concurrent_consumers.get(),
        })
    }
}

struct ParkedReply {
    message: JmsMessage,
    parked_at: Instant,
}

pub(crate) struct Shared {
    pending: PendingReplies,
    parked: DashMap<String, ParkedReply>,
    provisional: AtomicUsize,
    correlation: CorrelationStrategy,
}

impl Shared {
    fn correlation_of(&self, message: &JmsMessage) -> Option<String> {
        match &self.correlation {
            CorrelationStrategy::Property(name) => message.string_property(name),
            CorrelationStrategy::CorrelationId | CorrelationStrategy::MessageId => {
                message.correlation_id.clone()
            }
        }
        .filter(|id| !id.is_empty())
    }

    fn accepts(&self, message: &JmsMessage) -> bool {
        self.correlation_of(message)
            .is_some_and(|id| self.pending.contains(&id))
    }

    fn on_reply(&self, message: JmsMessage) {
        let Some(id) = self.correlation_of(&message) else {
            warn!(message_id = ?message.message_id, "dropping reply without correlation id");
            metrics::inc_orphans();
            return;
        };
        let message = match self.pending.complete(&id, message) {
            Ok(elapsed) => {
                debug!(correlation_id = %id, ?elapsed, "reply matched");
                return;
            }
            Err(message) => message,
        };
        if self.provisional.load(Ordering::Acquire) == 0 {
            warn!(correlation_id = %id, "dropping orphaned reply");
            metrics::inc_orphans();
            return;
        }
        debug!(correlation_id = %id, "parking reply until its request is re-keyed");
        self.parked.insert(
            id.clone(),
            ParkedReply {
                message,
                parked_at: Instant::now(),
            },
        );
        // the re-key may have landed between the lookup and the insert
        if self.pending.contains(&id) {
            self.deliver_parked(&id);
        }
    }

    fn deliver_parked(&self, id: &str) {
        if let Some((_, parked)) = self.parked.remove(id)
            && let Err(message) = self.pending.complete(id, parked.message)
        {
            self.parked.insert(
                id.to_owned(),
                ParkedReply {
                    message,
                    parked_at: Instant::now(),
                },
            );
        }
    }

    fn purge_parked(&self, now: Instant) {
        self.parked.retain(|id, parked| {
            let keep = now.saturating_duration_since(parked.parked_at) < EARLY_REPLY_GRACE;
            if !keep {
                warn!(correlation_id = %id, "dropping orphaned reply");
                metrics::inc_orphans();
            }
            keep
        });
    }

    fn rekey(&self, old: &str, new: String) -> Result<(), JmsError> {
        if self.pending.rekey(old, new.clone())? {
            debug!(provisional = %old, correlation_id = %new, "request re-keyed");
            self.deliver_parked(&new);
        }
        Ok(())
    }

    fn release_provisional(&self) { self.provisional.fetch_sub(1, Ordering::AcqRel); }

    fn abandon(&self, id: &str) {
        if self.pending.cancel(id) {
            debug!(correlation_id = %id, "request abandoned by caller");
        }
    }
}

/// Correlates replies with outstanding requests.
pub struct ReplyManager {
    shared: Arc<Shared>,
    provider: Arc<dyn Provider>,
    ids: Arc<dyn IdGenerator>,
    settings: ReplySettings,
    reply_to: Destination,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    stopped: AtomicBool,
}

impl std::fmt::Debug for ReplyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyManager")
            .field("reply_to", &self.reply_to)
            .field("pending", &self.shared.pending.len())
            .finish_non_exhaustive()
    }
}

impl ReplyManager {
    /// Resolve or create the reply destination and start the listeners and
    /// timeout supervisor.
    ///
    /// # Errors
    ///
    /// Returns [`JmsError`] if the reply destination cannot be resolved or
    /// created.
    pub async fn start(
        provider: Arc<dyn Provider>,
        resolver: &dyn DestinationResolver,
        ids: Arc<dyn IdGenerator>,
        settings: ReplySettings,
    ) -> Result<Self, JmsError> {
        if settings.checker_interval.is_zero() {
            return Err(ConfigError::InvalidCheckerInterval.into());
        }
        let descriptor = &settings.descriptor;
        let reply_to = match &descriptor.destination {
            ReplyDestination::Temporary => provider.create_temporary_queue().await?,
            ReplyDestination::Shared(name) | ReplyDestination::Exclusive(name) => {
                resolver.resolve(name, false)?
            }
        };

        let shared = Arc::new(Shared {
            pending: PendingReplies::default(),
            parked: DashMap::new(),
            provisional: AtomicUsize::new(0),
            correlation: descriptor.correlation.clone(),
        });
        let filter = match descriptor.destination {
            ReplyDestination::Shared(_) => {
                let weak: Weak<Shared> = Arc::downgrade(&shared);
                MessageFilter::Dynamic(Arc::new(move |message: &JmsMessage| {
                    weak.upgrade().is_some_and(|shared| shared.accepts(message))
                }))
            }
            ReplyDestination::Temporary | ReplyDestination::Exclusive(_) => MessageFilter::All,
        };

        let tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();
        let spec = SubscriptionSpec::new(reply_to.clone()).with_filter(filter);
        let recycle = descriptor.cache_level == CacheLevel::None;
        for listener in 0..settings.concurrent_consumers.max(1) {
            tracker.spawn(listen(
                Arc::clone(&shared),
                Arc::clone(&provider),
                spec.clone(),
                recycle,
                shutdown.clone(),
                listener,
            ));
        }
        tracker.spawn(supervise(
            Arc::clone(&shared),
            settings.checker_interval,
            shutdown.clone(),
        ));

        info!(
            reply_to = %reply_to,
            listeners = settings.concurrent_consumers,
            correlation = ?descriptor.correlation,
            "reply manager started"
        );
        Ok(Self {
            shared,
            provider,
            ids,
            settings,
            reply_to,
            tracker,
            shutdown,
            stopped: AtomicBool::new(false),
        })
    }

    /// Destination replies are read from.
    #[must_use]
    pub fn reply_to(&self) -> &Destination { &self.reply_to }

    /// Active settings.
    #[must_use]
    pub fn settings(&self) -> &ReplySettings { &self.settings }

    /// Number of requests awaiting a reply.
    #[must_use]
    pub fn pending_count(&self) -> usize { self.shared.pending.len() }

    /// Whether the manager has been stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool { self.stopped.load(Ordering::Acquire) }

    /// Register a request and return the future its reply resolves.
    ///
    /// The correlation id is the caller's when supplied and not generated by
    /// a previous request, otherwise a fresh `Relay-` token. With message id
    /// correlation the id is provisional until
    /// [`ReplyFuture::update_correlation_id`] supplies the provider message
    /// id. A non-empty caller id is restored on the reply.
    ///
    /// # Errors
    ///
    /// Returns [`JmsError::ReplyManagerStopped`] after [`ReplyManager::stop`]
    /// and [`JmsError::DuplicateCorrelationId`] if the caller's id is already
    /// pending.
    pub fn register(
        &self,
        caller_correlation_id: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<ReplyFuture, JmsError> {
        if self.is_stopped() {
            return Err(JmsError::ReplyManagerStopped);
        }
        let original = caller_correlation_id
            .filter(|id| !id.is_empty())
            .map(str::to_owned);
        let message_id_mode = self.settings.descriptor.correlation == CorrelationStrategy::MessageId;
        let fresh = message_id_mode
            || original
                .as_deref()
                .is_none_or(|id| id.starts_with(GENERATED_CORRELATION_ID_PREFIX));
        let id = match (&original, fresh) {
            (Some(original), false) => original.clone(),
            _ => format!("{GENERATED_CORRELATION_ID_PREFIX}{}", self.ids.next_id()),
        };

        let timeout = timeout.unwrap_or(self.settings.request_timeout);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(
            id.clone(),
            PendingReply::new(tx, original, timeout, Instant::now()),
        )?;
        if message_id_mode {
            self.shared.provisional.fetch_add(1, Ordering::AcqRel);
        }
        debug!(correlation_id = %id, ?timeout, provisional = message_id_mode, "awaiting reply");
        Ok(ReplyFuture::new(
            Arc::clone(&self.shared),
            id,
            message_id_mode,
            rx,
        ))
    }

    /// Re-key `future` once the real correlation id is known.
    ///
    /// # Errors
    ///
    /// See [`ReplyFuture::update_correlation_id`].
    pub fn update_correlation_id(
        &self,
        future: &mut ReplyFuture,
        correlation_id: impl Into<String>,
    ) -> Result<(), JmsError> {
        future.update_correlation_id(correlation_id)
    }

    /// Abandon the request registered under `correlation_id`.
    pub fn cancel(&self, correlation_id: &str) { self.shared.abandon(correlation_id); }

    /// Stop listening, fail every pending request with
    /// [`JmsError::ReplyManagerStopped`] and delete a temporary reply queue.
    /// Later calls do nothing.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        let failed = self.shared.pending.fail_all(|| JmsError::ReplyManagerStopped);
        self.shared.parked.clear();
        if self.settings.descriptor.destination == ReplyDestination::Temporary
            && let Err(e) = self.provider.delete_temporary_destination(&self.reply_to).await
        {
            warn!(reply_to = %self.reply_to, error = %e, "failed to delete temporary reply queue");
        }
        info!(reply_to = %self.reply_to, failed, "reply manager stopped");
    }
}

impl Drop for ReplyManager {
    fn drop(&mut self) { self.shutdown.cancel(); }
}

async fn open(provider: &dyn Provider, spec: &SubscriptionSpec) -> Option<Box<dyn Subscription>> {
    match provider.subscribe(spec.clone()).await {
        Ok(subscription) => Some(subscription),
        Err(e) => {
            error!(reply_to = %spec.destination, error = %e, "cannot subscribe to reply destination");
            None
        }
    }
}

async fn listen(
    shared: Arc<Shared>,
    provider: Arc<dyn Provider>,
    spec: SubscriptionSpec,
    recycle: bool,
    shutdown: CancellationToken,
    listener: usize,
) {
    let Some(mut subscription) = open(provider.as_ref(), &spec).await else {
        return;
    };
    debug!(listener, reply_to = %spec.destination, "reply listener running");
    loop {
        let message = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            message = subscription.receive() => message,
        };
        let Some(message) = message else {
            debug!(listener, "reply destination closed");
            return;
        };
        shared.on_reply(message);

        if recycle {
            subscription.close().await;
            match open(provider.as_ref(), &spec).await {
                Some(next) => subscription = next,
                None => return,
            }
        }
    }
    subscription.close().await;
    debug!(listener, "reply listener stopped");
}

async fn supervise(shared: Arc<Shared>, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let now = Instant::now();
        let expired = shared.pending.expire(now);
        if expired > 0 {
            debug!(expired, "requests timed out");
        }
        shared.purge_parked(now);
    }
}

#[cfg(test)]
mod tests;
