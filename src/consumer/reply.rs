//! Replies sent by a consumer to the requester's reply-to destination.

use tracing::warn;

use crate::{
    binding::{MessageBinding, headers},
    error::JmsError,
    exchange::Exchange,
    message::JmsMessage,
};

/// Build the reply to `request`.
///
/// A successful exchange replies with its out message, or with the in message
/// when no out message was set. A failure replies with the error text and the
/// `RelayJmsErrorReply` property. The reply carries the request's correlation
/// id, or its message id when the request had none.
pub(super) fn build(
    binding: &MessageBinding,
    request: &JmsMessage,
    exchange: &Exchange,
    result: Result<(), JmsError>,
    correlation_property: Option<&str>,
) -> JmsMessage {
    let mut reply = match result.and_then(|()| {
        binding
            .to_wire(exchange.reply_message())
            .map_err(JmsError::from)
    }) {
        Ok(reply) => reply,
        Err(e) => {
            if matches!(e, JmsError::Binding(_)) {
                warn!(exchange = exchange.id(), error = %e, "cannot bind reply");
            }
            error_reply(&e)
        }
    };
    reply.correlation_id = request
        .correlation_id
        .clone()
        .or_else(|| request.message_id.clone());
    if let Some(name) = correlation_property
        && let Some(value) = request.property(name)
    {
        reply.set_property(name, value.clone());
    }
    reply.reply_to = None;
    reply
}

fn error_reply(error: &JmsError) -> JmsMessage {
    let mut reply = JmsMessage::new(error.to_string());
    reply.set_property(headers::ERROR_REPLY, true);
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        destination::Destination,
        exchange::{ExchangeMessage, ExchangePattern},
        message::PropertyValue,
    };

    fn request() -> JmsMessage {
        let mut request = JmsMessage::new("World");
        request.message_id = Some("ID:req".into());
        request.reply_to = Some(Destination::queue("replies"));
        request
    }

    #[test]
    fn replies_with_out_message_and_message_id_correlation() {
        let request = request();
        let binding = MessageBinding::default();
        let mut exchange = Exchange::new("x", ExchangePattern::InOut, binding.from_wire(&request));
        exchange.set_output(ExchangeMessage::new("Hello World"));

        let reply = build(&binding, &request, &exchange, Ok(()), None);
        assert_eq!(reply.body.as_text(), Some("Hello World"));
        assert_eq!(reply.correlation_id.as_deref(), Some("ID:req"));
        assert!(reply.reply_to.is_none());
    }

    #[test]
    fn echoes_the_in_message_and_correlation_id() {
        let mut request = request();
        request.correlation_id = Some("c-1".into());
        request.set_property("token", "t-1");
        let binding = MessageBinding::default();
        let exchange = Exchange::new("x", ExchangePattern::InOut, binding.from_wire(&request));

        let reply = build(&binding, &request, &exchange, Ok(()), Some("token"));
        assert_eq!(reply.body.as_text(), Some("World"));
        assert_eq!(reply.correlation_id.as_deref(), Some("c-1"));
        assert_eq!(reply.property("token"), Some(&PropertyValue::from("t-1")));
        assert!(reply.reply_to.is_none());
    }

    #[test]
    fn failures_become_error_replies() {
        let request = request();
        let binding = MessageBinding::default();
        let exchange = Exchange::new("x", ExchangePattern::InOut, binding.from_wire(&request));

        let reply = build(
            &binding,
            &request,
            &exchange,
            Err(JmsError::processing("boom")),
            None,
        );
        assert_eq!(reply.property(headers::ERROR_REPLY), Some(&PropertyValue::Bool(true)));
        assert_eq!(reply.body.as_text(), Some("processing failed: boom"));
    }
}
