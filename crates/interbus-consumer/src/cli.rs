//! Command line of the `interbus-consume` binary.

use clap::{Parser, ValueEnum};

use crate::domain::{AsyncDestination, ConsumerConfigBuilder, DispatchMode, InterbusSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Sync,
    Async,
}

/// Consume events from an interbus topic and dispatch them to local handlers
#[derive(Parser, Debug)]
#[command(name = "interbus-consume")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Topic to consume
    pub topic: String,

    /// Start position as `<offset>:<partition>`
    #[arg(long)]
    pub offset: Option<String>,

    /// Poll timeout in seconds (minimum 0.2)
    #[arg(long = "msg-poll-timeout", default_value_t = 1.0)]
    pub msg_poll_timeout: f64,

    /// Stop after the first poll
    #[arg(long)]
    pub once: bool,

    /// Reject messages from this producer (repeatable)
    #[arg(long = "ignore-from")]
    pub ignore_from: Vec<String>,

    /// Always accept messages from this producer (repeatable)
    #[arg(long = "accept-from")]
    pub accept_from: Vec<String>,

    /// Reject messages from every producer not accepted explicitly
    #[arg(long = "ignore-all")]
    pub ignore_all: bool,

    /// Reject messages produced by this service
    #[arg(long = "ignore-own")]
    pub ignore_own: bool,

    /// Poll rate limit as `<max>/<decay seconds>`; `0/0` is unlimited
    #[arg(long, default_value = "0/0")]
    pub throughput: String,

    /// Reject messages older than this timestamp
    #[arg(long = "ignore-until")]
    pub ignore_until: Option<String>,

    /// Dispatch mode
    #[arg(long, value_enum, default_value_t = ModeArg::Async)]
    pub mode: ModeArg,

    /// Connection override for async dispatch
    #[arg(long = "async-connection-destination")]
    pub async_connection_destination: Option<String>,

    /// Queue override for async dispatch
    #[arg(long = "async-queue-destination")]
    pub async_queue_destination: Option<String>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn dispatch_mode(&self) -> DispatchMode {
        match self.mode {
            ModeArg::Sync => DispatchMode::Sync,
            ModeArg::Async => DispatchMode::Async(AsyncDestination {
                connection: self.async_connection_destination.clone(),
                queue: self.async_queue_destination.clone(),
            }),
        }
    }

    /// Builder seeded from these arguments and the process settings.
    pub fn into_builder(self, settings: &InterbusSettings) -> ConsumerConfigBuilder {
        let mode = self.dispatch_mode();
        let mut builder = ConsumerConfigBuilder::new(self.topic, settings.service_id.clone())
            .settings(settings)
            .poll_timeout_secs(self.msg_poll_timeout)
            .once(self.once)
            .ignore_from(self.ignore_from)
            .accept_from(self.accept_from)
            .ignore_all(self.ignore_all)
            .ignore_own(self.ignore_own)
            .throughput(self.throughput)
            .mode(mode);
        if let Some(offset) = self.offset {
            builder = builder.offset(offset);
        }
        if let Some(until) = self.ignore_until {
            builder = builder.ignore_until(until);
        }
        builder
    }
}
