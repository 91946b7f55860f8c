//! Tests for the consumer lifecycle and dispatch.

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use rstest::{fixture, rstest};
use tokio::sync::mpsc;
use tracing_test::traced_test;

use super::*;
use crate::{
    broker::EmbeddedBroker,
    destination::{Destination, DynamicDestinationResolver},
    exchange::ExchangeMessage,
    id::SequentialIdGenerator,
    message::JmsMessage,
};

struct Greeter {
    seen: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Processor for Greeter {
    async fn process(&self, exchange: &mut Exchange) -> Result<(), JmsError> {
        let body = exchange.body().as_text().unwrap_or_default().to_owned();
        let _ = self.seen.send(body.clone());
        match body.as_str() {
            "fail" => Err(JmsError::processing("rejected")),
            "panic" => panic!("processor exploded"),
            _ => {
                exchange.set_output(ExchangeMessage::new(format!("Hello {body}")));
                Ok(())
            }
        }
    }
}

#[fixture]
fn broker() -> EmbeddedBroker { EmbeddedBroker::new("test") }

fn consumer(broker: &EmbeddedBroker, uri: &str) -> (Consumer, mpsc::UnboundedReceiver<String>) {
    let (seen, rx) = mpsc::unbounded_channel();
    let endpoint = Endpoint::parse(uri, EndpointConfig::default()).expect("valid endpoint");
    let consumer = Consumer::new(
        Arc::new(broker.clone()),
        Arc::new(DynamicDestinationResolver),
        Arc::new(SequentialIdGenerator::new("ex", 1)),
        MessageBinding::default(),
        &endpoint,
        Arc::new(Greeter { seen }),
    );
    (consumer, rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> Option<String> {
    tokio::time::timeout(Duration::from_millis(200), rx.recv())
        .await
        .ok()
        .flatten()
}

fn request(body: &str, correlation_id: Option<&str>) -> JmsMessage {
    let mut message = JmsMessage::new(body);
    message.reply_to = Some(Destination::queue("replies"));
    message.correlation_id = correlation_id.map(str::to_owned);
    message
}

#[rstest]
#[tokio::test]
async fn lifecycle_transitions(broker: EmbeddedBroker) {
    let (consumer, _rx) = consumer(&broker, "queue:orders");
    assert_eq!(consumer.state(), ConsumerState::Created);

    consumer.start().await.expect("start");
    assert_eq!(consumer.state(), ConsumerState::Started);
    assert_eq!(broker.consumer_count(&Destination::queue("orders")), 1);

    consumer.suspend().expect("suspend");
    assert_eq!(consumer.state(), ConsumerState::Suspended);
    consumer.start().await.expect("start resumes");
    assert_eq!(consumer.state(), ConsumerState::Started);

    consumer.stop().await;
    assert_eq!(consumer.state(), ConsumerState::Stopped);
    assert_eq!(broker.consumer_count(&Destination::queue("orders")), 0);
    assert!(matches!(
        consumer.suspend(),
        Err(JmsError::InvalidState {
            operation: "suspend",
            state: ConsumerState::Stopped
        })
    ));

    consumer.start().await.expect("restart");
    assert_eq!(consumer.state(), ConsumerState::Started);

    consumer.shutdown().await;
    assert_eq!(consumer.state(), ConsumerState::Shutdown);
    assert!(consumer.start().await.is_err());
}

#[rstest]
#[tokio::test]
async fn reconfiguration_requires_stopped_consumer(broker: EmbeddedBroker) {
    let (consumer, _rx) = consumer(&broker, "queue:orders");
    consumer.set_destination_name("queue:early").expect("created consumers accept changes");
    consumer.start().await.expect("start");

    let error = consumer
        .set_concurrent_consumers(NonZeroUsize::new(3).expect("non-zero"))
        .expect_err("started consumers reject changes");
    assert_eq!(
        error.to_string(),
        "set_concurrent_consumers is not allowed while the consumer is started"
    );
    consumer.stop().await;
    consumer
        .set_concurrent_consumers(NonZeroUsize::new(3).expect("non-zero"))
        .expect("stopped consumers accept changes");
    assert_eq!(consumer.concurrent_consumers().get(), 3);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn restart_applies_new_destination_and_concurrency(broker: EmbeddedBroker) {
    let (consumer, mut rx) = consumer(&broker, "queue:old");
    consumer.start().await.expect("start");
    consumer.stop().await;

    consumer.set_destination_name("queue:new").expect("reconfigure");
    consumer
        .set_concurrent_consumers(NonZeroUsize::new(2).expect("non-zero"))
        .expect("reconfigure");
    consumer.start().await.expect("restart");
    assert_eq!(broker.consumer_count(&Destination::queue("new")), 2);

    broker
        .send(&Destination::queue("old"), JmsMessage::new("stale"))
        .await
        .expect("send");
    broker
        .send(&Destination::queue("new"), JmsMessage::new("fresh"))
        .await
        .expect("send");

    assert_eq!(next(&mut rx).await.as_deref(), Some("fresh"));
    assert_eq!(next(&mut rx).await, None);
    assert_eq!(broker.queue_depth(&Destination::queue("old")), 1);
}

#[rstest]
#[tokio::test]
async fn requests_are_answered_on_reply_to(broker: EmbeddedBroker) {
    let (consumer, _rx) = consumer(&broker, "queue:greet");
    consumer.start().await.expect("start");
    let mut replies = broker
        .subscribe(SubscriptionSpec::new(Destination::queue("replies")))
        .await
        .expect("subscribe");

    broker
        .send(&Destination::queue("greet"), request("World", Some("c-1")))
        .await
        .expect("send");
    let reply = replies.receive().await.expect("reply");
    assert_eq!(reply.body.as_text(), Some("Hello World"));
    assert_eq!(reply.correlation_id.as_deref(), Some("c-1"));

    let id = broker
        .send(&Destination::queue("greet"), request("Again", None))
        .await
        .expect("send");
    let reply = replies.receive().await.expect("reply");
    assert_eq!(reply.correlation_id.as_deref(), Some(id.as_str()));
}

#[rstest]
#[case("fail", "processing failed: rejected")]
#[case("panic", "processing failed: processor panicked: processor exploded")]
#[tokio::test]
async fn failures_are_sent_back_as_error_replies(
    broker: EmbeddedBroker,
    #[case] body: &str,
    #[case] expected: &str,
) {
    let (consumer, _rx) = consumer(&broker, "queue:greet");
    consumer.start().await.expect("start");
    let mut replies = broker
        .subscribe(SubscriptionSpec::new(Destination::queue("replies")))
        .await
        .expect("subscribe");

    broker
        .send(&Destination::queue("greet"), request(body, Some("c-1")))
        .await
        .expect("send");
    let reply = replies.receive().await.expect("error reply");
    assert_eq!(reply.body.as_text(), Some(expected));
    assert_eq!(
        reply
            .property(crate::binding::headers::ERROR_REPLY)
            .and_then(crate::message::PropertyValue::as_bool),
        Some(true)
    );

    // the worker survives and keeps consuming
    broker
        .send(&Destination::queue("greet"), request("ok", Some("c-2")))
        .await
        .expect("send");
    assert_eq!(
        replies.receive().await.expect("reply").body.as_text(),
        Some("Hello ok")
    );
}

#[rstest]
#[tokio::test]
async fn disabled_reply_to_processes_without_answering(broker: EmbeddedBroker) {
    let (seen, mut rx) = mpsc::unbounded_channel();
    let endpoint = Endpoint::parse("queue:greet?disableReplyTo=true", EndpointConfig::default())
        .expect("valid endpoint");
    let consumer = Consumer::new(
        Arc::new(broker.clone()),
        Arc::new(DynamicDestinationResolver),
        Arc::new(SequentialIdGenerator::new("ex", 1)),
        MessageBinding::default(),
        &endpoint,
        Arc::new(Greeter { seen }),
    );
    consumer.start().await.expect("start");

    broker
        .send(&Destination::queue("greet"), request("World", None))
        .await
        .expect("send");
    assert_eq!(next(&mut rx).await.as_deref(), Some("World"));
    assert_eq!(broker.queue_depth(&Destination::queue("replies")), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn suspended_consumers_hold_messages(broker: EmbeddedBroker) {
    let (consumer, mut rx) = consumer(&broker, "queue:orders");
    consumer.start().await.expect("start");
    consumer.suspend().expect("suspend");
    tokio::task::yield_now().await;

    broker
        .send(&Destination::queue("orders"), JmsMessage::new("later"))
        .await
        .expect("send");
    assert_eq!(next(&mut rx).await, None);

    consumer.resume().expect("resume");
    assert_eq!(next(&mut rx).await.as_deref(), Some("later"));
}

#[rstest]
#[tokio::test]
async fn selectors_filter_messages(broker: EmbeddedBroker) {
    let (consumer, mut rx) = consumer(&broker, "queue:orders");
    consumer
        .set_selector(Some("region = 'eu'".parse().expect("selector")))
        .expect("reconfigure");
    consumer.start().await.expect("start");
    let mut us = JmsMessage::new("us");
    us.set_property("region", "us");
    let mut eu = JmsMessage::new("eu");
    eu.set_property("region", "eu");
    let orders = Destination::queue("orders");
    broker.send(&orders, us).await.expect("send");
    broker.send(&orders, eu).await.expect("send");

    assert_eq!(next(&mut rx).await.as_deref(), Some("eu"));
    assert_eq!(broker.queue_depth(&orders), 1);
}

#[test]
fn closures_are_processors() {
    let processor = processor_fn(|exchange: &mut Exchange| {
        exchange.set_body("changed");
        Ok(())
    });
    let mut exchange = Exchange::in_only("original");
    futures::executor::block_on(processor.process(&mut exchange)).expect("process");
    assert_eq!(exchange.body().as_text(), Some("changed"));
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn lifecycle_is_logged_with_destination(broker: EmbeddedBroker) {
    let (consumer, _rx) = consumer(&broker, "queue:audit?concurrentConsumers=2");
    consumer.start().await.expect("start");
    consumer.stop().await;

    assert!(logs_contain("consumer started"));
    assert!(logs_contain("concurrency=2"));
    assert!(logs_contain("consumer stopped"));
}
