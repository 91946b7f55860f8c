//! Demo binary for `relaymq`.
//!
//! Starts a greeting consumer on an embedded broker, sends one request per
//! name and prints the replies in request order.

mod cli;

use std::sync::Arc;

use clap::Parser;
use futures::future::try_join_all;
use relaymq::{EmbeddedBroker, Exchange, JmsComponent, JmsError, processor_fn};
use tracing::info;

const SERVICE_QUEUE: &str = "queue:greetings";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let component = JmsComponent::new(Arc::new(EmbeddedBroker::new("relaymq")));

    let greeter = component
        .create_consumer(
            format!("{SERVICE_QUEUE}?concurrentConsumers={}", cli.concurrency.max(1)),
            Arc::new(processor_fn(|exchange| {
                let name = exchange.body().as_text().unwrap_or_default().to_owned();
                exchange.set_body(format!("Hello {name}"));
                Ok(())
            })),
        )
        .await?;

    let uri = match &cli.reply_to {
        Some(reply_to) => format!(
            "{SERVICE_QUEUE}?requestTimeout={}&replyTo={reply_to}&replyToType=Exclusive",
            cli.request_timeout
        ),
        None => format!("{SERVICE_QUEUE}?requestTimeout={}", cli.request_timeout),
    };
    let producer = component.create_producer(uri)?;
    info!(requests = cli.names.len(), "sending greetings");

    let replies = try_join_all(cli.names.iter().map(|name| {
        let producer = producer.clone();
        async move {
            let mut exchange = Exchange::in_out(name.as_str());
            producer.request(&mut exchange, None).await?;
            let reply = exchange
                .output()
                .and_then(|out| out.body.as_text())
                .unwrap_or_default()
                .to_owned();
            Ok::<_, JmsError>(reply)
        }
    }))
    .await;

    producer.stop().await;
    greeter.shutdown().await;
    for reply in replies? {
        println!("{reply}");
    }
    Ok(())
}
