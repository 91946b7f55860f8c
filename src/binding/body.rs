//! Body conversion to a forced wire message type.

use bytes::Bytes;

use super::BindingError;
use crate::message::{Body, MessageType, ObjectPayload};

fn kind(body: &Body) -> &'static str {
    match body {
        Body::Empty => "empty",
        Body::Text(_) => "text",
        Body::Bytes(_) => "bytes",
        Body::Map(_) => "map",
        Body::Object(_) => "object",
    }
}

/// Convert `body` so that it produces a `target` message.
///
/// Empty bodies stay empty: they produce header-only messages.
pub(super) fn convert(body: &Body, target: MessageType) -> Result<Body, BindingError> {
    let unsupported = || BindingError::UnsupportedConversion {
        from: kind(body),
        to: target,
    };
    match (target, body) {
        (_, Body::Empty) => Ok(Body::Empty),
        (MessageType::Text, Body::Text(_))
        | (MessageType::Bytes, Body::Bytes(_))
        | (MessageType::Map, Body::Map(_))
        | (MessageType::Object, Body::Object(_)) => Ok(body.clone()),
        (MessageType::Text, Body::Bytes(bytes)) => std::str::from_utf8(bytes)
            .map(|text| Body::Text(text.to_owned()))
            .map_err(|_| unsupported()),
        (MessageType::Bytes, Body::Text(text)) => Ok(Body::Bytes(Bytes::from(text.clone()))),
        (MessageType::Bytes, Body::Object(payload)) => Ok(Body::Bytes(payload.bytes().clone())),
        (MessageType::Object, Body::Text(text)) => Ok(Body::Object(ObjectPayload::encode(text)?)),
        (MessageType::Object, Body::Bytes(bytes)) => {
            Ok(Body::Object(ObjectPayload::encode(&bytes.to_vec())?))
        }
        _ => Err(unsupported()),
    }
}
