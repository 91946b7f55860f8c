//! Processors standing in for remote services.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use relaymq::{Exchange, JmsError, Processor, processor_fn};

/// A processor answering every request with `Hello <body>`.
#[must_use]
pub fn greeter() -> Arc<dyn Processor> {
    Arc::new(processor_fn(|exchange| {
        let name = exchange.body().as_text().unwrap_or_default().to_owned();
        exchange.set_body(format!("Hello {name}"));
        Ok(())
    }))
}

/// Echoes each request back and counts how many it handled.
///
/// Bodies equal to `fail` are rejected with a processing error.
#[derive(Debug, Default)]
pub struct CountingResponder {
    handled: AtomicUsize,
}

impl CountingResponder {
    /// Create a responder with a zero count.
    #[must_use]
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    /// Number of exchanges handled so far.
    #[must_use]
    pub fn handled(&self) -> usize { self.handled.load(Ordering::SeqCst) }
}

#[async_trait]
impl Processor for CountingResponder {
    async fn process(&self, exchange: &mut Exchange) -> Result<(), JmsError> {
        self.handled.fetch_add(1, Ordering::SeqCst);
        if exchange.body().as_text() == Some("fail") {
            return Err(JmsError::processing("request rejected"));
        }
        Ok(())
    }
}
