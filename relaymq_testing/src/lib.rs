//! Utilities for exercising `relaymq` producers and consumers in tests.
//!
//! Everything runs against an [`EmbeddedBroker`](relaymq::EmbeddedBroker):
//! fixtures build a broker and a component with deterministic identifiers,
//! responders answer requests the way a remote service would, and the
//! logging and metrics helpers capture what the library reports.
//!
//! ```rust
//! use relaymq_testing::{greeter, test_component};
//!
//! # async fn example() -> relaymq_testing::TestResult {
//! let (broker, component) = test_component("docs");
//! let _service = component.create_consumer("queue:greet", greeter()).await?;
//! # let _ = broker;
//! # Ok(())
//! # }
//! ```

pub mod fixtures;
pub mod logging;
pub mod metrics;
pub mod responder;

pub use fixtures::{TestResult, broker, component, test_component};
pub use logging::{LoggerHandle, logger};
pub use metrics::{Counters, record_metrics};
pub use responder::{CountingResponder, greeter};
