//! Tests for the reply manager.

use std::{sync::Arc, time::Duration};

use rstest::{fixture, rstest};
use tokio::time::Instant;

use super::*;
use crate::{
    broker::EmbeddedBroker,
    destination::DynamicDestinationResolver,
    id::SequentialIdGenerator,
};

#[fixture]
fn broker() -> EmbeddedBroker { EmbeddedBroker::new("test") }

fn config(options: &[(&str, &str)]) -> EndpointConfig {
    options
        .iter()
        .try_fold(EndpointConfig::default(), |config, (name, value)| {
            config.with_option(name, value)
        })
        .expect("valid options")
}

async fn manager(broker: &EmbeddedBroker, options: &[(&str, &str)]) -> ReplyManager {
    let settings = ReplySettings::from_config(&config(options)).expect("valid settings");
    ReplyManager::start(
        Arc::new(broker.clone()),
        &DynamicDestinationResolver,
        Arc::new(SequentialIdGenerator::new("t", 1)),
        settings,
    )
    .await
    .expect("reply manager starts")
}

fn reply(correlation_id: &str, body: &str) -> JmsMessage {
    let mut message = JmsMessage::new(body);
    message.correlation_id = Some(correlation_id.to_owned());
    message
}

#[rstest]
#[case(&[], ReplyDestination::Temporary, CorrelationStrategy::CorrelationId)]
#[case(&[("replyTo", "bar")], ReplyDestination::Shared("bar".into()), CorrelationStrategy::CorrelationId)]
#[case(
    &[("replyTo", "bar"), ("replyToType", "Exclusive"), ("useMessageIDAsCorrelationID", "true")],
    ReplyDestination::Exclusive("bar".into()),
    CorrelationStrategy::MessageId
)]
#[case(
    &[("correlationProperty", "token")],
    ReplyDestination::Temporary,
    CorrelationStrategy::Property("token".into())
)]
fn descriptors_follow_options(
    #[case] options: &[(&str, &str)],
    #[case] destination: ReplyDestination,
    #[case] correlation: CorrelationStrategy,
) {
    let descriptor = ReplyDescriptor::from_config(&config(options)).expect("valid descriptor");
    assert_eq!(descriptor.destination, destination);
    assert_eq!(descriptor.correlation, correlation);
    assert_eq!(descriptor.cache_level, CacheLevel::Consumer);
}

#[test]
fn invalid_combinations_fail_at_setup() {
    let mut config = EndpointConfig::default();
    config.reply_to = Some("bar".into());
    config.reply_to_type = Some(ReplyToType::Temporary);
    assert_eq!(
        ReplySettings::from_config(&config).err(),
        Some(ConfigError::TemporaryWithFixedReplyTo)
    );
}

#[rstest]
#[tokio::test]
async fn replies_complete_the_matching_request(broker: EmbeddedBroker) {
    let manager = manager(&broker, &[]).await;
    assert!(manager.reply_to().is_temporary());

    let future = manager.register(None, None).expect("register");
    let id = future.correlation_id().to_owned();
    assert_eq!(id, "Relay-t-1");
    assert_eq!(manager.pending_count(), 1);

    broker
        .send(manager.reply_to(), reply(&id, "pong"))
        .await
        .expect("send reply");
    let message = future.await.expect("reply");
    assert_eq!(message.body.as_text(), Some("pong"));
    assert_eq!(manager.pending_count(), 0);
}

#[rstest]
#[tokio::test]
async fn caller_correlation_ids_are_used_and_restored(broker: EmbeddedBroker) {
    let manager = manager(&broker, &[]).await;
    let future = manager.register(Some("order-7"), None).expect("register");
    assert_eq!(future.correlation_id(), "order-7");
    assert!(matches!(
        manager.register(Some("order-7"), None),
        Err(JmsError::DuplicateCorrelationId(id)) if id == "order-7"
    ));

    broker
        .send(manager.reply_to(), reply("order-7", "done"))
        .await
        .expect("send reply");
    let message = future.await.expect("reply");
    assert_eq!(message.correlation_id.as_deref(), Some("order-7"));
}

#[rstest]
#[tokio::test]
async fn generated_caller_ids_are_replaced(broker: EmbeddedBroker) {
    let manager = manager(&broker, &[]).await;
    let future = manager
        .register(Some("Relay-previous"), None)
        .expect("register");
    assert_ne!(future.correlation_id(), "Relay-previous");
    assert!(future.correlation_id().starts_with(GENERATED_CORRELATION_ID_PREFIX));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn timeouts_fire_within_timeout_plus_interval(broker: EmbeddedBroker) {
    let manager = manager(
        &broker,
        &[("requestTimeout", "100"), ("requestTimeoutCheckerInterval", "40")],
    )
    .await;
    let started = Instant::now();
    let future = manager.register(None, None).expect("register");
    let id = future.correlation_id().to_owned();

    let error = future.await.expect_err("should time out");
    let elapsed = started.elapsed();
    assert!(error.is_timeout());
    assert!(
        matches!(&error, JmsError::ReplyTimeout { correlation_id, timeout } if *correlation_id == id && *timeout == Duration::from_millis(100))
    );
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed <= Duration::from_millis(140), "took {elapsed:?}");
    assert_eq!(manager.pending_count(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn per_request_timeouts_override_the_default(broker: EmbeddedBroker) {
    let manager = manager(&broker, &[("requestTimeoutCheckerInterval", "10")]).await;
    let started = Instant::now();
    let error = manager
        .register(None, Some(Duration::from_millis(50)))
        .expect("register")
        .await
        .expect_err("should time out");
    assert!(error.is_timeout());
    assert!(started.elapsed() <= Duration::from_millis(60));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn late_replies_are_dropped(broker: EmbeddedBroker) {
    let manager = manager(
        &broker,
        &[("requestTimeout", "20"), ("requestTimeoutCheckerInterval", "10")],
    )
    .await;
    let future = manager.register(None, None).expect("register");
    let id = future.correlation_id().to_owned();
    assert!(future.await.is_err());

    broker
        .send(manager.reply_to(), reply(&id, "too late"))
        .await
        .expect("send reply");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(manager.pending_count(), 0);
    assert_eq!(broker.queue_depth(manager.reply_to()), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn reply_on_the_deadline_tick_completes_once(broker: EmbeddedBroker) {
    let manager = manager(
        &broker,
        &[("requestTimeout", "40"), ("requestTimeoutCheckerInterval", "40")],
    )
    .await;
    let future = manager.register(None, None).expect("register");
    let id = future.correlation_id().to_owned();

    tokio::time::sleep(Duration::from_millis(40)).await;
    broker
        .send(manager.reply_to(), reply(&id, "photo finish"))
        .await
        .expect("send reply");

    match future.await {
        Ok(message) => assert_eq!(message.body.as_text(), Some("photo finish")),
        Err(error) => assert!(error.is_timeout(), "unexpected error {error}"),
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.pending_count(), 0);
    assert_eq!(broker.queue_depth(manager.reply_to()), 0);
}

#[rstest]
#[case::sweep_first(true)]
#[case::reply_first(false)]
#[tokio::test(start_paused = true)]
async fn an_entry_completes_at_most_once(#[case] sweep_first: bool) {
    let pending = PendingReplies::default();
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    let now = Instant::now();
    pending
        .insert("c-1".into(), PendingReply::new(tx, None, Duration::ZERO, now))
        .expect("insert");

    if sweep_first {
        assert_eq!(pending.expire(now), 1);
        assert!(pending.complete("c-1", reply("c-1", "late")).is_err());
        assert!(rx.try_recv().expect("one outcome").is_err());
    } else {
        assert!(pending.complete("c-1", reply("c-1", "on time")).is_ok());
        assert_eq!(pending.expire(now), 0);
        assert!(rx.try_recv().expect("one outcome").is_ok());
    }
    assert_eq!(pending.len(), 0);
}

#[rstest]
#[tokio::test]
async fn stop_fails_pending_requests_and_deletes_temporary_queue(broker: EmbeddedBroker) {
    let manager = manager(&broker, &[]).await;
    let reply_to = manager.reply_to().clone();
    let future = manager.register(None, None).expect("register");

    manager.stop().await;
    assert!(matches!(future.await, Err(JmsError::ReplyManagerStopped)));
    assert!(!broker.has_temporary_queue(&reply_to));
    assert!(matches!(
        manager.register(None, None),
        Err(JmsError::ReplyManagerStopped)
    ));
    manager.stop().await;
}

#[rstest]
#[tokio::test]
async fn dropping_the_future_abandons_the_request(broker: EmbeddedBroker) {
    let manager = manager(&broker, &[]).await;
    let future = manager.register(None, None).expect("register");
    assert_eq!(manager.pending_count(), 1);
    drop(future);
    assert_eq!(manager.pending_count(), 0);

    let future = manager.register(Some("abc"), None).expect("register");
    manager.cancel("abc");
    assert_eq!(manager.pending_count(), 0);
    assert!(matches!(future.await, Err(JmsError::ReplyManagerStopped)));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn early_replies_are_matched_after_rekey(broker: EmbeddedBroker) {
    let manager = manager(&broker, &[("useMessageIDAsCorrelationID", "true")]).await;
    let mut future = manager.register(Some("ignored"), None).expect("register");
    assert!(future.is_provisional());

    broker
        .send(manager.reply_to(), reply("ID:real", "raced"))
        .await
        .expect("send reply");
    tokio::time::sleep(Duration::from_millis(5)).await;

    manager
        .update_correlation_id(&mut future, "ID:real")
        .expect("rekey");
    assert!(!future.is_provisional());
    let message = future.await.expect("parked reply delivered");
    assert_eq!(message.body.as_text(), Some("raced"));
    // the caller id is restored even though the provider id matched
    assert_eq!(message.correlation_id.as_deref(), Some("ignored"));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn parked_replies_expire_after_grace(broker: EmbeddedBroker) {
    let manager = manager(&broker, &[("useMessageIDAsCorrelationID", "true")]).await;
    let mut future = manager.register(None, None).expect("register");
    broker
        .send(manager.reply_to(), reply("ID:other", "stray"))
        .await
        .expect("send reply");
    tokio::time::sleep(EARLY_REPLY_GRACE + Duration::from_secs(2)).await;

    future.update_correlation_id("ID:other").expect("rekey");
    let outcome = tokio::time::timeout(Duration::from_millis(1), &mut future).await;
    assert!(outcome.is_err(), "stray reply must not be resurrected");
}

#[rstest]
#[tokio::test]
async fn shared_queues_only_consume_own_replies(broker: EmbeddedBroker) {
    let manager = manager(&broker, &[("replyTo", "replies")]).await;
    let replies = Destination::queue("replies");
    assert_eq!(manager.reply_to(), &replies);

    let future = manager.register(Some("mine"), None).expect("register");
    broker
        .send(&replies, reply("theirs", "not for us"))
        .await
        .expect("send");
    broker
        .send(&replies, reply("mine", "ours"))
        .await
        .expect("send");

    let message = future.await.expect("reply");
    assert_eq!(message.body.as_text(), Some("ours"));
    assert_eq!(broker.queue_depth(&replies), 1);
}

#[rstest]
#[tokio::test]
async fn property_correlation_reads_the_named_property(broker: EmbeddedBroker) {
    let manager = manager(&broker, &[("correlationProperty", "token")]).await;
    let future = manager.register(None, None).expect("register");
    let mut message = JmsMessage::new("by property");
    message.set_property("token", future.correlation_id());

    broker
        .send(manager.reply_to(), message)
        .await
        .expect("send");
    assert_eq!(
        future.await.expect("reply").body.as_text(),
        Some("by property")
    );
}

#[rstest]
#[tokio::test]
async fn uncached_listeners_resubscribe_between_replies(broker: EmbeddedBroker) {
    let manager = manager(
        &broker,
        &[
            ("replyTo", "replies"),
            ("replyToType", "Exclusive"),
            ("replyToCacheLevelName", "CACHE_NONE"),
        ],
    )
    .await;
    for n in 0..3 {
        let id = format!("c{n}");
        let future = manager.register(Some(&id), None).expect("register");
        broker
            .send(manager.reply_to(), reply(&id, "ok"))
            .await
            .expect("send");
        assert!(future.await.is_ok());
    }
}
