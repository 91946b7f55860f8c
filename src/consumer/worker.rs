//! Worker task driving one subscription.

use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, PoisonError},
};

use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Processor, reply};
use crate::{
    binding::MessageBinding,
    chunk::Reassembler,
    error::JmsError,
    exchange::{Exchange, ExchangePattern},
    id::IdGenerator,
    message::JmsMessage,
    metrics,
    provider::{Provider, Subscription},
};

/// State shared by every worker of a consumer.
pub(super) struct WorkerContext {
    pub(super) provider: Arc<dyn Provider>,
    pub(super) binding: MessageBinding,
    pub(super) processor: Arc<dyn Processor>,
    pub(super) ids: Arc<dyn IdGenerator>,
    pub(super) reassembler: Mutex<Reassembler>,
    pub(super) disable_reply_to: bool,
    pub(super) correlation_property: Option<String>,
}

impl WorkerContext {
    fn reassemble(&self, message: JmsMessage) -> Option<JmsMessage> {
        let mut reassembler = self
            .reassembler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let evicted = reassembler.purge_expired();
        if !evicted.is_empty() {
            warn!(collections = ?evicted, "dropping incomplete chunk collections");
        }
        match reassembler.push(message) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping chunk collection");
                None
            }
        }
    }

    async fn handle(&self, message: JmsMessage) {
        let Some(message) = self.reassemble(message) else {
            return;
        };
        metrics::inc_received();

        let reply_to = message
            .reply_to
            .clone()
            .filter(|_| !self.disable_reply_to);
        let pattern = if reply_to.is_some() {
            ExchangePattern::InOut
        } else {
            ExchangePattern::InOnly
        };
        let mut exchange = Exchange::new(self.ids.next_id(), pattern, self.binding.from_wire(&message));
        debug!(
            exchange = exchange.id(),
            message_id = ?message.message_id,
            ?pattern,
            "dispatching message"
        );

        let outcome = AssertUnwindSafe(self.processor.process(&mut exchange))
            .catch_unwind()
            .await;
        let result = match outcome {
            Ok(result) => result.and_then(|()| exchange.take_error().map_or(Ok(()), Err)),
            Err(panic) => {
                let cause = panic
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("<non-string panic>");
                Err(JmsError::processing(format!("processor panicked: {cause}")))
            }
        };
        if let Err(e) = &result {
            warn!(exchange = exchange.id(), error = %e, "processing failed");
            metrics::inc_processing_errors();
        }

        if let Some(reply_to) = reply_to {
            let reply = reply::build(
                &self.binding,
                &message,
                &exchange,
                result,
                self.correlation_property.as_deref(),
            );
            match self.provider.send(&reply_to, reply).await {
                Ok(id) => {
                    metrics::inc_sent(metrics::Kind::Reply);
                    debug!(reply_to = %reply_to, message_id = %id, "reply sent");
                }
                Err(e) => warn!(reply_to = %reply_to, error = %e, "failed to send reply"),
            }
        }
    }
}

pub(super) struct Worker {
    pub(super) index: usize,
    pub(super) context: Arc<WorkerContext>,
    pub(super) subscription: Box<dyn Subscription>,
    pub(super) shutdown: CancellationToken,
    pub(super) suspended: watch::Receiver<bool>,
}

impl Worker {
    pub(super) async fn run(mut self) {
        debug!(worker = self.index, "worker running");
        loop {
            if *self.suspended.borrow_and_update() {
                let resumed = tokio::select! {
                    biased;
                    () = self.shutdown.cancelled() => false,
                    resumed = self.suspended.wait_for(|suspended| !*suspended).map(|r| r.is_ok()) => resumed,
                };
                if !resumed {
                    break;
                }
                continue;
            }
            let message = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                changed = self.suspended.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                message = self.subscription.receive() => message,
            };
            let Some(message) = message else {
                debug!(worker = self.index, "subscription ended");
                break;
            };
            self.context.handle(message).await;
        }
        self.subscription.close().await;
        debug!(worker = self.index, "worker stopped");
    }
}
