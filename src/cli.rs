//! Command line interface for the `relaymq` demo binary.
//!
//! The binary runs a greeting service and a requester against an embedded
//! broker, so the options only shape that scenario.

use clap::Parser;

/// Command line arguments for the `relaymq` binary.
#[derive(Debug, Parser)]
#[command(
    name = "relaymq",
    version,
    about = "Request/reply demo over an embedded broker"
)]
pub struct Cli {
    /// Names to greet, one request each.
    #[arg(default_values_t = ["A", "B", "C", "D", "E"].map(String::from))]
    pub names: Vec<String>,

    /// Milliseconds to wait for each reply.
    #[arg(short = 't', long, default_value_t = 5_000)]
    pub request_timeout: u64,

    /// Exclusive reply queue name; a temporary queue is used when omitted.
    #[arg(short, long)]
    pub reply_to: Option<String>,

    /// Number of greeting workers.
    #[arg(short, long, default_value_t = 1)]
    pub concurrency: usize,
}
