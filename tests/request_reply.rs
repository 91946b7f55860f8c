//! End-to-end request/reply over the embedded broker.

use std::time::Duration;

use futures::future::try_join_all;
use relaymq::{
    ConfigError,
    Destination,
    Exchange,
    JmsError,
    Producer,
    binding::headers,
    consumer::processor_fn,
};
use relaymq_testing::{TestResult, greeter, test_component};
use rstest::rstest;
use tokio::time::Instant;

async fn ask(producer: &Producer, name: &str) -> Result<String, JmsError> {
    let mut exchange = Exchange::in_out(name);
    producer.request(&mut exchange, None).await?;
    Ok(exchange
        .output()
        .and_then(|out| out.body.as_text())
        .unwrap_or_default()
        .to_owned())
}

#[tokio::test]
async fn greets_a_to_e_over_an_exclusive_reply_queue() -> TestResult {
    let (broker, component) = test_component("hello");
    let service = component.create_consumer("queue:greet", greeter()).await?;
    let producer =
        component.create_producer("queue:greet?replyTo=replies&replyToType=Exclusive")?;

    let names = ["A", "B", "C", "D", "E"];
    let replies = try_join_all(names.iter().map(|name| ask(&producer, name))).await?;
    assert_eq!(
        replies,
        ["Hello A", "Hello B", "Hello C", "Hello D", "Hello E"]
    );

    let manager = producer.reply_manager().expect("started by the first request");
    assert_eq!(manager.reply_to(), &Destination::queue("replies"));
    assert_eq!(manager.pending_count(), 0);
    assert_eq!(broker.queue_depth(&Destination::queue("replies")), 0);

    producer.stop().await;
    service.shutdown().await;
    Ok(())
}

#[rstest]
#[case::temporary("queue:greet")]
#[case::shared("queue:greet?replyTo=shared.replies")]
#[case::exclusive("queue:greet?replyTo=replies&replyToType=Exclusive")]
#[case::message_id("queue:greet?useMessageIDAsCorrelationID=true")]
#[case::property("queue:greet?correlationProperty=token")]
#[tokio::test]
async fn concurrent_requests_get_their_own_reply(#[case] uri: &str) -> TestResult {
    let (_broker, component) = test_component("concurrent");
    let service = component
        .create_consumer("queue:greet?concurrentConsumers=4&correlationProperty=token", greeter())
        .await?;
    let producer = component.create_producer(uri)?;

    let names: Vec<String> = (0..40).map(|i| format!("caller-{i}")).collect();
    let replies = try_join_all(names.iter().map(|name| ask(&producer, name))).await?;
    for (name, reply) in names.iter().zip(&replies) {
        assert_eq!(reply, &format!("Hello {name}"));
    }
    assert_eq!(producer.reply_manager().map(|m| m.pending_count()), Some(0));

    producer.stop().await;
    service.shutdown().await;
    Ok(())
}

#[rstest]
#[case::temporary("queue:void?requestTimeout=100&requestTimeoutCheckerInterval=40")]
#[case::exclusive(
    "queue:void?requestTimeout=100&requestTimeoutCheckerInterval=40&replyTo=r&replyToType=Exclusive"
)]
#[tokio::test(start_paused = true)]
async fn unanswered_requests_time_out_within_timeout_plus_interval(#[case] uri: &str) -> TestResult {
    let (_broker, component) = test_component("timeout");
    let producer = component.create_producer(uri)?;

    let started = Instant::now();
    let error = ask(&producer, "anyone?").await.expect_err("nobody answers");
    let elapsed = started.elapsed();

    assert!(error.is_timeout(), "unexpected error: {error}");
    assert!(elapsed >= Duration::from_millis(100), "timed out early: {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(140), "timed out late: {elapsed:?}");
    producer.stop().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn timeout_header_and_argument_override_the_endpoint() -> TestResult {
    let (_broker, component) = test_component("override");
    let producer =
        component.create_producer("queue:void?requestTimeout=10000&requestTimeoutCheckerInterval=10")?;

    let started = Instant::now();
    let mut exchange = Exchange::in_out("hi").with_header(headers::REQUEST_TIMEOUT, 50_i64);
    let error = producer
        .request(&mut exchange, None)
        .await
        .expect_err("nobody answers");
    assert!(matches!(error, JmsError::ReplyTimeout { timeout, .. } if timeout == Duration::from_millis(50)));
    assert!(started.elapsed() < Duration::from_millis(100));

    let mut exchange = Exchange::in_out("hi").with_header(headers::REQUEST_TIMEOUT, 50_i64);
    let error = producer
        .request(&mut exchange, Some(Duration::from_millis(20)))
        .await
        .expect_err("nobody answers");
    assert!(matches!(error, JmsError::ReplyTimeout { timeout, .. } if timeout == Duration::from_millis(20)));
    producer.stop().await;
    Ok(())
}

#[tokio::test]
async fn error_replies_surface_as_remote_errors() -> TestResult {
    let (_broker, component) = test_component("remote");
    let service = component
        .create_consumer(
            "queue:strict",
            std::sync::Arc::new(processor_fn(|_| Err(JmsError::processing("no thanks")))),
        )
        .await?;
    let producer = component.create_producer("queue:strict")?;

    let mut exchange = Exchange::in_out("hi");
    producer.process(&mut exchange).await;
    assert!(matches!(
        exchange.error(),
        Some(JmsError::Remote(cause)) if cause == "processing failed: no thanks"
    ));

    producer.stop().await;
    service.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn stopping_the_producer_fails_outstanding_requests() -> TestResult {
    let (_broker, component) = test_component("stop");
    let producer = component.create_producer("queue:void?requestTimeout=60000")?;

    let pending = tokio::spawn({
        let producer = producer.clone();
        async move { ask(&producer, "hi").await }
    });
    while producer.reply_manager().map_or(0, |m| m.pending_count()) == 0 {
        tokio::task::yield_now().await;
    }
    producer.stop().await;

    let error = pending.await?.expect_err("stopped");
    assert!(matches!(error, JmsError::ReplyManagerStopped));
    let error = ask(&producer, "again").await.expect_err("stopped");
    assert!(matches!(error, JmsError::ReplyManagerStopped));
    Ok(())
}

#[tokio::test]
async fn dynamic_destinations_are_resolved_once_per_name() -> TestResult {
    let (broker, component) = test_component("dynamic");
    let producer = component.create_producer("queue:default")?;

    for target in ["queue:audit", "queue:audit", "queue:billing"] {
        let mut exchange = Exchange::in_only("event").with_header(headers::DESTINATION_NAME, target);
        producer.send(&mut exchange).await?;
        assert!(exchange.header(headers::DESTINATION_NAME).is_none());
        assert!(exchange.header(headers::JMS_MESSAGE_ID).is_some());
    }
    producer.send(&mut Exchange::in_only("plain")).await?;

    assert_eq!(producer.resolved_destinations(), 2);
    assert_eq!(broker.queue_depth(&Destination::queue("audit")), 2);
    assert_eq!(broker.queue_depth(&Destination::queue("billing")), 1);
    assert_eq!(broker.queue_depth(&Destination::queue("default")), 1);
    Ok(())
}

#[rstest]
#[case(
    "queue:a?replyToType=Temporary&replyTo=fixed",
    ConfigError::TemporaryWithFixedReplyTo
)]
#[case(
    "queue:a?replyToCacheLevelName=CACHE_NONE",
    ConfigError::CacheNoneWithTemporaryQueue
)]
fn invalid_reply_options_are_rejected(#[case] uri: &str, #[case] expected: ConfigError) {
    let (_broker, component) = test_component("invalid");
    let error = component.create_producer(uri).expect_err("invalid options");
    assert!(matches!(error, JmsError::Configuration(e) if e == expected));
}
