//! Tests for exchange/wire message mapping.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use rstest::rstest;

use super::*;
use crate::{
    key_format::PassthroughKeyFormat,
    message::{Body, ObjectPayload},
};

fn binding(settings: BindingSettings) -> MessageBinding {
    MessageBinding::new(Arc::new(DefaultKeyFormat), settings)
}

#[rstest]
#[case("JMSCorrelationID", true)]
#[case("JMSType", true)]
#[case("JMSXGroupID", false)]
#[case("JMS_IBM_Character_Set", false)]
#[case("JMS", false)]
#[case("JMS1", false)]
#[case("jmsType", false)]
fn classifies_standard_headers(#[case] name: &str, #[case] expected: bool) {
    assert_eq!(is_standard_jms_header(name), expected);
}

#[rstest]
#[case("foo", "foo", true)]
#[case("foo", "*", true)]
#[case("foo.bar", "foo*", true)]
#[case("my.foo.bar", "*foo*", true)]
#[case("my.foo.bar", "my*bar", true)]
#[case("my.foo.baz", "my*bar", false)]
#[case("other", "foo*", false)]
#[case("foo.bar", "foo.*|bar", true)]
#[case("bar", "foo.*|bar", true)]
#[case("barn", "foo.*|bar", false)]
#[case("order42", "order[0-9]+", true)]
#[case("orderX", "order[0-9]+", false)]
#[case("a(b", "a(*", true)]
fn additional_header_patterns(#[case] name: &str, #[case] pattern: &str, #[case] expected: bool) {
    assert_eq!(matches_pattern(name, pattern), expected);
}

#[test]
fn standard_headers_map_to_wire_fields() {
    let mut message = ExchangeMessage::new("hello");
    message.set_header("JMSCorrelationID", "abc");
    message.set_header("JMSReplyTo", "queue:replies");
    message.set_header("JMSType", "greeting");
    message.set_header("JMSPriority", 7);
    message.set_header("JMSDeliveryMode", "NON_PERSISTENT");
    message.set_header("JMSMessageID", "ignored");

    let wire = MessageBinding::default().to_wire(&message).expect("to wire");
    assert_eq!(wire.correlation_id.as_deref(), Some("abc"));
    assert_eq!(wire.reply_to, Some(Destination::queue("replies")));
    assert_eq!(wire.jms_type.as_deref(), Some("greeting"));
    assert_eq!(wire.priority, 7);
    assert_eq!(wire.delivery_mode, DeliveryMode::NonPersistent);
    assert!(wire.message_id.is_none());
    assert!(wire.properties.is_empty());
}

#[test]
fn correlation_header_is_skipped_in_message_id_mode() {
    let mut message = ExchangeMessage::new("hello");
    message.set_header("JMSCorrelationID", "abc");
    let wire = binding(BindingSettings {
        use_message_id_as_correlation_id: true,
        ..BindingSettings::default()
    })
    .to_wire(&message)
    .expect("to wire");
    assert!(wire.correlation_id.is_none());
}

#[test]
fn invalid_priority_is_rejected() {
    let mut message = ExchangeMessage::new("hello");
    message.set_header("JMSPriority", 12);
    assert!(matches!(
        MessageBinding::default().to_wire(&message),
        Err(BindingError::InvalidHeader { .. })
    ));
}

#[test]
fn properties_use_encoded_keys_and_drop_non_primitives() {
    let mut message = ExchangeMessage::new("hello");
    message.set_header("order.id", 42);
    message.set_header("content-type", "text/plain");
    message.set_header("blob", Bytes::from_static(b"raw"));
    message.set_header("RelayJmsRequestTimeout", 100);

    let wire = MessageBinding::default().to_wire(&message).expect("to wire");
    assert_eq!(wire.property("order_DOT_id"), Some(&PropertyValue::Int(42)));
    assert_eq!(
        wire.string_property("content_HYPHEN_type").as_deref(),
        Some("text/plain")
    );
    assert!(wire.property("blob").is_none());
    assert!(wire.property("RelayJmsRequestTimeout").is_none());
}

#[test]
fn allowed_additional_headers_keep_non_primitive_values() {
    let mut message = ExchangeMessage::new("hello");
    message.set_header("blob", Bytes::from_static(b"raw"));
    let wire = binding(BindingSettings {
        allow_additional_headers: vec![HeaderPattern::new("bl*")],
        ..BindingSettings::default()
    })
    .to_wire(&message)
    .expect("to wire");
    assert_eq!(
        wire.property("blob"),
        Some(&PropertyValue::Bytes(Bytes::from_static(b"raw")))
    );
}

#[rstest]
#[case(true)]
#[case(false)]
fn date_headers_are_rendered(#[case] iso: bool) {
    let mut message = ExchangeMessage::new("hello");
    let when = Utc
        .with_ymd_and_hms(2024, 3, 1, 12, 30, 0)
        .single()
        .expect("valid date");
    message.set_header("sentAt", when);
    let wire = binding(BindingSettings {
        format_dates_iso8601: iso,
        ..BindingSettings::default()
    })
    .to_wire(&message)
    .expect("to wire");
    let expected = if iso {
        "2024-03-01T12:30:00.000Z".to_owned()
    } else {
        when.to_rfc2822()
    };
    assert_eq!(wire.string_property("sentAt"), Some(expected));
}

#[test]
fn forced_message_type_converts_bodies() {
    let mut message = ExchangeMessage::new("text body");
    message.set_header("RelayJmsMessageType", "Bytes");
    let wire = MessageBinding::default().to_wire(&message).expect("to wire");
    assert_eq!(wire.body, Body::Bytes(Bytes::from_static(b"text body")));

    let wire = binding(BindingSettings {
        message_type: Some(MessageType::Object),
        ..BindingSettings::default()
    })
    .to_wire(&ExchangeMessage::new("text body"))
    .expect("to wire");
    let Body::Object(payload) = wire.body else {
        panic!("expected object body");
    };
    assert_eq!(payload.decode::<String>().expect("decode"), "text body");
}

#[test]
fn impossible_conversions_fail() {
    let mut map = BTreeMap::new();
    map.insert("k".to_owned(), PropertyValue::Int(1));
    let result = binding(BindingSettings {
        message_type: Some(MessageType::Text),
        ..BindingSettings::default()
    })
    .to_wire(&ExchangeMessage::new(map));
    assert_eq!(
        result,
        Err(BindingError::UnsupportedConversion {
            from: "map",
            to: MessageType::Text,
        })
    );

    let invalid_utf8 = ExchangeMessage::new(Bytes::from_static(&[0xff, 0xfe]));
    assert!(
        binding(BindingSettings {
            message_type: Some(MessageType::Text),
            ..BindingSettings::default()
        })
        .to_wire(&invalid_utf8)
        .is_err()
    );
}

#[test]
fn null_bodies_respect_setting() {
    let empty = ExchangeMessage::default();
    assert!(MessageBinding::default().to_wire(&empty).is_ok());
    assert_eq!(
        binding(BindingSettings {
            allow_null_body: false,
            ..BindingSettings::default()
        })
        .to_wire(&empty),
        Err(BindingError::NullBody)
    );
}

#[test]
fn object_bodies_pass_through() {
    let payload = ObjectPayload::encode(&vec![1_u32, 2, 3]).expect("encode");
    let wire = MessageBinding::default()
        .to_wire(&ExchangeMessage::new(payload.clone()))
        .expect("to wire");
    assert_eq!(wire.body, Body::Object(payload));
}

#[test]
fn inbound_surfaces_standard_headers_and_decoded_properties() {
    let mut wire = JmsMessage::new("reply");
    wire.message_id = Some("ID:1".into());
    wire.correlation_id = Some("abc".into());
    wire.reply_to = Some(Destination::queue("replies"));
    wire.timestamp = Some(1_000);
    wire.set_property("order_DOT_id", 42_i64);
    wire.set_property("JMSXGroupID", "g1");
    wire.set_property("JMSXDeliveryCount", 2_i64);

    let message = MessageBinding::default().from_wire(&wire);
    assert_eq!(
        message.header("JMSMessageID").and_then(HeaderValue::as_str),
        Some("ID:1")
    );
    assert_eq!(
        message.header("JMSCorrelationID").and_then(HeaderValue::as_str),
        Some("abc")
    );
    assert_eq!(
        message.header("JMSReplyTo"),
        Some(&HeaderValue::Destination(Destination::queue("replies")))
    );
    assert_eq!(message.header("JMSPriority").and_then(HeaderValue::as_i64), Some(4));
    assert_eq!(message.header("order.id").and_then(HeaderValue::as_i64), Some(42));
    assert_eq!(message.header("JMSXGroupID").and_then(HeaderValue::as_str), Some("g1"));
    assert!(message.header("JMSXDeliveryCount").is_none());

    let all = binding(BindingSettings {
        include_all_jmsx_properties: true,
        ..BindingSettings::default()
    })
    .from_wire(&wire);
    assert_eq!(all.header("JMSXDeliveryCount").and_then(HeaderValue::as_i64), Some(2));
}

#[test]
fn passthrough_keys_are_not_decoded() {
    let mut wire = JmsMessage::new("x");
    wire.set_property("a_DOT_b", "v");
    let message =
        MessageBinding::new(Arc::new(PassthroughKeyFormat), BindingSettings::default()).from_wire(&wire);
    assert!(message.header("a_DOT_b").is_some());
}
