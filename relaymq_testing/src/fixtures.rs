//! Broker and component fixtures.

use std::sync::Arc;

use relaymq::{EmbeddedBroker, JmsComponent, SequentialIdGenerator};
use rstest::fixture;

/// Result type for fallible tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Build a broker named `name` and a component bound to it.
///
/// The component uses a sequential id generator prefixed with `name`, so
/// generated correlation ids are predictable.
#[must_use]
pub fn test_component(name: &str) -> (EmbeddedBroker, JmsComponent) {
    let broker = EmbeddedBroker::new(name);
    let component = JmsComponent::new(Arc::new(broker.clone()))
        .with_id_generator(Arc::new(SequentialIdGenerator::new(name, 1)));
    (broker, component)
}

/// A fresh embedded broker.
#[fixture]
pub fn broker() -> EmbeddedBroker { EmbeddedBroker::new("fixture") }

/// A component bound to [`broker`].
#[fixture]
pub fn component(broker: EmbeddedBroker) -> (EmbeddedBroker, JmsComponent) {
    let component = JmsComponent::new(Arc::new(broker.clone()))
        .with_id_generator(Arc::new(SequentialIdGenerator::new("fixture", 1)));
    (broker, component)
}
