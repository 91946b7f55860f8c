//! Caller side of a pending reply.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
};

use tokio::sync::oneshot;

use super::{Shared, pending::ReplyResult};
use crate::{error::JmsError, message::JmsMessage};

/// Resolves with the correlated reply, a timeout, or a shutdown error.
///
/// Dropping the future before it resolves abandons the request; a reply
/// arriving afterwards is treated as an orphan.
pub struct ReplyFuture {
    shared: Arc<Shared>,
    correlation_id: String,
    provisional: bool,
    rx: oneshot::Receiver<ReplyResult>,
    done: bool,
}

impl ReplyFuture {
    pub(super) fn new(
        shared: Arc<Shared>,
        correlation_id: String,
        provisional: bool,
        rx: oneshot::Receiver<ReplyResult>,
    ) -> Self {
        Self {
            shared,
            correlation_id,
            provisional,
            rx,
            done: false,
        }
    }

    /// Correlation id the reply is matched on.
    #[must_use]
    pub fn correlation_id(&self) -> &str { &self.correlation_id }

    /// Whether the id is a placeholder awaiting the provider message id.
    #[must_use]
    pub fn is_provisional(&self) -> bool { self.provisional }

    /// Re-key the pending entry once the real correlation id is known.
    ///
    /// A reply that raced ahead of the re-key is matched immediately.
    ///
    /// # Errors
    ///
    /// Returns [`JmsError::DuplicateCorrelationId`] if `correlation_id` is
    /// already pending; the request is failed in that case.
    pub fn update_correlation_id(&mut self, correlation_id: impl Into<String>) -> Result<(), JmsError> {
        let new = correlation_id.into();
        let result = self.shared.rekey(&self.correlation_id, new.clone());
        if self.provisional {
            self.provisional = false;
            self.shared.release_provisional();
        }
        self.correlation_id = new;
        result
    }
}

impl Future for ReplyFuture {
    type Output = Result<JmsMessage, JmsError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = ready!(Pin::new(&mut self.rx).poll(cx));
        self.done = true;
        Poll::Ready(result.unwrap_or(Err(JmsError::ReplyManagerStopped)))
    }
}

impl Drop for ReplyFuture {
    fn drop(&mut self) {
        if self.provisional {
            self.shared.release_provisional();
        }
        if !self.done {
            self.shared.abandon(&self.correlation_id);
        }
    }
}
