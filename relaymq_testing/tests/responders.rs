//! Integration coverage for the `relaymq_testing` responders.

use relaymq::{Exchange, JmsError};
use relaymq_testing::{CountingResponder, TestResult, greeter, test_component};

#[tokio::test]
async fn greeter_answers_requests() -> TestResult {
    let (_broker, component) = test_component("greeter");
    let service = component.create_consumer("queue:greet", greeter()).await?;
    let producer = component.create_producer("queue:greet")?;

    let mut exchange = Exchange::in_out("Sam");
    producer.request(&mut exchange, None).await?;
    let reply = exchange.output().and_then(|out| out.body.as_text());
    assert_eq!(reply, Some("Hello Sam"));

    producer.stop().await;
    service.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn counting_responder_rejects_failures() -> TestResult {
    let (_broker, component) = test_component("counting");
    let responder = CountingResponder::new();
    let service = component
        .create_consumer("queue:count", responder.clone())
        .await?;
    let producer = component.create_producer("queue:count")?;

    let mut ok = Exchange::in_out("ping");
    producer.request(&mut ok, None).await?;
    let mut failing = Exchange::in_out("fail");
    let error = producer
        .request(&mut failing, None)
        .await
        .expect_err("error reply");
    assert!(matches!(error, JmsError::Remote(cause) if cause.contains("request rejected")));
    assert_eq!(responder.handled(), 2);

    producer.stop().await;
    service.shutdown().await;
    Ok(())
}
