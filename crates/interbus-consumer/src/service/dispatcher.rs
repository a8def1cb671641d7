//! Building domain events and routing them to sync or async execution.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::domain::{
    canonical_producer_id, BusEvent, DispatchJob, DispatchMode, EventRegistry, InboundEvent,
    ResolvedPayload, TargetKind, UnrecognizedEvent,
};
use crate::error::{ConsumerError, DispatchError};
use crate::ports::{EventSink, WorkerQueue};

/// What happened to a resolved payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched { job_id: Uuid, mode: &'static str },
    /// Produced by this very service; never handled again.
    SkippedOwnOrigin,
}

/// Memoized "is this producer id ours" lookup.
#[derive(Debug)]
pub struct OriginCache {
    self_id: String,
    known: Mutex<HashMap<String, bool>>,
}

impl OriginCache {
    pub fn new(self_id: &str) -> Self {
        Self {
            self_id: canonical_producer_id(self_id),
            known: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_own(&self, producer: &str) -> bool {
        if producer.is_empty() {
            return false;
        }
        let mut known = self.known.lock();
        if let Some(own) = known.get(producer) {
            return *own;
        }
        let own = canonical_producer_id(producer) == self.self_id;
        known.insert(producer.to_string(), own);
        own
    }

    /// Number of memoized producer ids.
    pub fn len(&self) -> usize {
        self.known.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct EventDispatcher {
    registry: Arc<EventRegistry>,
    queue: Arc<dyn WorkerQueue>,
    sink: Arc<dyn EventSink>,
    mode: DispatchMode,
    origins: OriginCache,
}

impl EventDispatcher {
    pub fn new(
        registry: Arc<EventRegistry>,
        queue: Arc<dyn WorkerQueue>,
        sink: Arc<dyn EventSink>,
        mode: DispatchMode,
        origins: OriginCache,
    ) -> Self {
        Self {
            registry,
            queue,
            sink,
            mode,
            origins,
        }
    }

    pub fn mode(&self) -> &DispatchMode {
        &self.mode
    }

    /// Instantiate the target type and fill its correlation slots.
    ///
    /// The result is always flagged as received over the bus.
    pub fn build_event(&self, payload: ResolvedPayload) -> Result<InboundEvent, ConsumerError> {
        let ResolvedPayload {
            target,
            kind,
            fields,
            correlation_id,
            reply_to,
            ..
        } = payload;

        let mut event: Box<dyn BusEvent> = if kind == TargetKind::Unrecognized {
            Box::new(UnrecognizedEvent::from_fields(target.clone(), fields))
        } else {
            let factory = self
                .registry
                .factory(kind, &target)
                .ok_or_else(|| DispatchError::Build {
                    event: target.clone(),
                    reason: format!("no {kind} event registered under this name"),
                })?;
            factory(fields).map_err(|e| ConsumerError::PayloadDecode {
                target: target.clone(),
                reason: e.to_string(),
            })?
        };

        if let Some(id) = correlation_id.as_deref() {
            let stored = event.set_correlation_id(id);
            trace!(event = %target, stored, "Correlation id");
        }
        let stored = event.set_reply_to(reply_to.as_deref());
        trace!(event = %target, stored, "Reply destination");

        Ok(InboundEvent::new(event, target, kind)
            .with_correlation(correlation_id, reply_to)
            .received_over_bus())
    }

    pub async fn dispatch(&self, payload: ResolvedPayload) -> Result<DispatchOutcome, ConsumerError> {
        if let Some(producer) = payload.producer.as_deref() {
            if self.origins.is_own(producer) {
                debug!(producer, event = %payload.target, "Skipping message produced by this service");
                return Ok(DispatchOutcome::SkippedOwnOrigin);
            }
        }

        let inbound = self.build_event(payload)?;
        let key = inbound.key().to_string();
        let correlation_id = inbound.correlation_id().map(str::to_string);
        let job = DispatchJob::new(inbound);
        let job_id = job.id;

        match &self.mode {
            DispatchMode::Sync => self.queue.dispatch_inline(job).await?,
            DispatchMode::Async(destination) => {
                self.queue
                    .enqueue(job.on_destination(destination.clone()))
                    .await?
            }
        }

        self.sink
            .event_dispatched(&key, self.mode.name(), correlation_id.as_deref())
            .await;

        Ok(DispatchOutcome::Dispatched {
            job_id,
            mode: self.mode.name(),
        })
    }
}
