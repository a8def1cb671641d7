//! The consumption loop.
//!
//! ```text
//! Starting -> Polling -> Filtering -> Resolving -> Dispatching -> Acking -> Polling
//!                 \           \            \             \            \
//!                  +-----------+------------+-------------+------------+--> Stopping -> Stopped
//! ```
//!
//! Exactly one message is in flight at a time. The stop flag in [`RunState`]
//! is only read between iterations, so a message that entered the pipeline
//! is always acked, rejected, or failed before the loop exits.

use std::sync::Arc;

use interbus_telemetry::{consumer_span, log_message_event};
use tracing::{debug, error, info, trace, warn, Instrument};

use crate::domain::{
    ConsumerConfig, EventRegistry, FilterDecision, MessageFilter, OffsetSpec, RawMessage,
    Resolution, RunState, RunStats, SkipReason,
};
use crate::error::ConsumerError;
use crate::ports::{
    BlobStore, BrokerContext, CoolDown, EventSink, HitStore, MessageConsumer, WorkerQueue,
};
use crate::service::dispatcher::{DispatchOutcome, EventDispatcher, OriginCache};
use crate::service::rate_limiter::{RateLimiter, Throttled};
use crate::service::resolver::PayloadResolver;

/// Phase the loop is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Polling,
    Filtering,
    Resolving,
    Dispatching,
    Acking,
    Stopping,
    Stopped,
}

/// How one iteration ended without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Nothing arrived within the poll timeout.
    TimedOut,
    /// The rate limiter denied the poll.
    Throttled,
    /// The broker failed; logged and swallowed.
    PollFailed,
    /// Rejected by the filter.
    Rejected(FilterDecision),
    /// Acknowledged without dispatch.
    Undispatched(SkipReason),
    /// Acknowledged after dispatch.
    Dispatched(DispatchOutcome),
}

/// External systems the loop drives.
pub struct Collaborators {
    pub broker: Arc<dyn BrokerContext>,
    pub blob_store: Arc<dyn BlobStore>,
    pub queue: Arc<dyn WorkerQueue>,
    pub sink: Arc<dyn EventSink>,
    pub hit_store: Arc<dyn HitStore>,
    pub registry: Arc<EventRegistry>,
}

pub struct ConsumerLoop {
    config: ConsumerConfig,
    broker: Arc<dyn BrokerContext>,
    filter: MessageFilter,
    resolver: PayloadResolver,
    dispatcher: EventDispatcher,
    sink: Arc<dyn EventSink>,
    limiter: RateLimiter,
    state: Arc<RunState>,
    phase: LoopState,
}

impl ConsumerLoop {
    pub fn new(config: ConsumerConfig, deps: Collaborators, state: Arc<RunState>) -> Self {
        let filter = MessageFilter::from_config(&config);
        let resolver = PayloadResolver::new(
            deps.registry.clone(),
            deps.blob_store,
            config.offload_disk.clone(),
            config.offload_bucket.clone(),
        );
        let dispatcher = EventDispatcher::new(
            deps.registry,
            deps.queue,
            deps.sink.clone(),
            config.mode.clone(),
            OriginCache::new(&config.service_id),
        );
        let limiter = RateLimiter::new(&config.topic, config.throughput, deps.hit_store);

        Self {
            config,
            broker: deps.broker,
            filter,
            resolver,
            dispatcher,
            sink: deps.sink,
            limiter,
            state,
            phase: LoopState::Starting,
        }
    }

    /// Wait for the rate-limit window instead of skipping denied polls.
    #[must_use]
    pub fn with_cool_down(mut self, cool_down: Arc<dyn CoolDown>) -> Self {
        self.limiter = self.limiter.with_cool_down(cool_down);
        self
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<RunState> {
        &self.state
    }

    pub fn phase(&self) -> LoopState {
        self.phase
    }

    /// Consume until a stop is requested.
    ///
    /// Returns the final counters on a graceful stop. Configuration errors
    /// return before the first poll; message failures return immediately and
    /// leave the failing message neither acked nor rejected.
    pub async fn run(&mut self) -> Result<RunStats, ConsumerError> {
        let span = consumer_span!("consume", consumer = %self.config.consumer_id());
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&mut self) -> Result<RunStats, ConsumerError> {
        self.enter(LoopState::Starting);
        if let Err(e) = self.config.validate() {
            error!(error = %e, "Invalid consumer configuration");
            self.enter(LoopState::Stopped);
            return Err(e);
        }

        let topic = self.broker.create_topic(&self.config.topic)?;
        let mut consumer = self.broker.create_consumer(&topic).await?;
        self.apply_offset(consumer.as_mut());

        info!(
            topic = %topic.name,
            mode = self.config.mode.name(),
            throughput = %self.config.throughput,
            poll_timeout_ms = self.config.poll_timeout.as_millis() as u64,
            "Start listening"
        );

        let mut result = Ok(());
        while !self.state.should_stop() {
            let iteration = self.iterate(consumer.as_mut()).await;
            if self.config.once {
                self.state.request_stop();
            }
            if let Err(e) = iteration {
                result = Err(e);
                break;
            }
        }

        self.enter(LoopState::Stopping);
        let stats = self.state.stats();
        self.enter(LoopState::Stopped);

        result?;
        info!(
            consumed = stats.consumed,
            ignored = stats.ignored,
            "Gracefully stopped"
        );
        Ok(stats)
    }

    fn apply_offset(&self, consumer: &mut dyn MessageConsumer) {
        let Some(OffsetSpec { offset, partition }) = self.config.offset else {
            return;
        };
        match consumer.offsets() {
            Some(control) => {
                info!(offset, partition, "Applying offset");
                control.set_partition(partition);
                control.set_offset(offset);
            }
            None => warn!(offset, partition, "Offset ignored, the driver does not support offsets"),
        }
    }

    /// Run one poll and process what it returned.
    pub async fn iterate(
        &mut self,
        consumer: &mut dyn MessageConsumer,
    ) -> Result<IterationOutcome, ConsumerError> {
        self.enter(LoopState::Polling);
        let polled = self
            .limiter
            .attempt(consumer.receive(self.config.poll_timeout))
            .await;

        let message = match polled {
            Throttled::Skipped => {
                // a denied poll waits like an empty one
                tokio::time::sleep(self.config.poll_timeout).await;
                return Ok(IterationOutcome::Throttled);
            }
            Throttled::Ran(Ok(Some(message))) => message,
            Throttled::Ran(Ok(None)) => {
                trace!("Message polling timed out");
                return Ok(IterationOutcome::TimedOut);
            }
            Throttled::Ran(Err(e)) => {
                let e = ConsumerError::TransientPoll(e);
                error!(error = %e, "Message polling failed");
                return Ok(IterationOutcome::PollFailed);
            }
        };

        self.state.record_consumed();
        log_message_event!(
            debug,
            "Received new message",
            message.correlation_id(),
            message.effective_timestamp(),
            producer = message.producer().unwrap_or("-")
        );

        self.enter(LoopState::Filtering);
        let decision = self.filter.evaluate(&message);
        if !decision.is_accept() {
            log_message_event!(
                debug,
                "Message rejected",
                message.correlation_id(),
                message.effective_timestamp(),
                reason = %decision,
                producer = message.producer().unwrap_or("-")
            );
            if decision.counts_as_ignored() {
                self.state.record_ignored();
            }
            consumer.reject(&message).await?;
            return Ok(IterationOutcome::Rejected(decision));
        }

        log_message_event!(
            info,
            "Message accepted",
            message.correlation_id(),
            message.effective_timestamp(),
            reply_to = message.reply_destination().unwrap_or("-")
        );
        trace!(target: "interbus_consumer::body", body = %message.body, "Message body");

        self.sink.message_received(&self.config.topic, &message).await;

        let outcome = match self.process(&message).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    error = %e,
                    headers = ?message.headers,
                    body = %message.body,
                    "Error while processing incoming interbus event"
                );
                return Err(e);
            }
        };

        self.enter(LoopState::Acking);
        consumer.acknowledge(&message).await?;
        Ok(outcome)
    }

    async fn process(&mut self, message: &RawMessage) -> Result<IterationOutcome, ConsumerError> {
        self.enter(LoopState::Resolving);
        let payload = match self.resolver.resolve(message).await? {
            Resolution::Dispatch(payload) => payload,
            Resolution::Skip(reason) => {
                debug!(reason = %reason, "Message accepted without dispatch");
                return Ok(IterationOutcome::Undispatched(reason));
            }
        };

        self.enter(LoopState::Dispatching);
        let target = payload.target.clone();
        let outcome = self.dispatcher.dispatch(payload).await?;
        if let DispatchOutcome::Dispatched { job_id, mode } = &outcome {
            log_message_event!(
                info,
                "Message dispatched",
                message.correlation_id(),
                message.effective_timestamp(),
                event = %target,
                mode = *mode,
                job_id = %job_id
            );
        }
        Ok(IterationOutcome::Dispatched(outcome))
    }

    fn enter(&mut self, phase: LoopState) {
        if self.phase != phase {
            trace!(from = ?self.phase, to = ?phase, "Loop state");
            self.phase = phase;
        }
    }
}
