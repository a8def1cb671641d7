//! In-process worker queue.
//!
//! Sync dispatch runs the handler pipeline on the caller's task. Async
//! dispatch pushes the job onto a bounded channel drained by background
//! worker tasks; handler failures there are logged and never reach the loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::domain::{DispatchJob, InboundEvent};
use crate::error::DispatchError;
use crate::ports::{EventHandler, WorkerQueue};

/// Handlers keyed by event registry key, plus handlers for every event.
#[derive(Clone, Default)]
pub struct HandlerPipeline {
    by_event: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    catch_all: Vec<Arc<dyn EventHandler>>,
}

impl HandlerPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event key.
    #[must_use]
    pub fn on(mut self, key: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.by_event.entry(key.into()).or_default().push(handler);
        self
    }

    /// Register a handler for every event.
    #[must_use]
    pub fn on_any(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.catch_all.push(handler);
        self
    }

    /// Run matching handlers in registration order, specific ones first.
    ///
    /// Stops at the first failure. Returns how many handlers ran.
    pub async fn run(&self, event: &InboundEvent) -> Result<usize, DispatchError> {
        let specific = self.by_event.get(event.key()).into_iter().flatten();
        let mut ran = 0;
        for handler in specific.chain(self.catch_all.iter()) {
            handler
                .handle(event)
                .await
                .map_err(|source| DispatchError::Handler {
                    event: event.key().to_string(),
                    source,
                })?;
            debug!(handler = handler.name(), event = event.key(), "Handler completed");
            ran += 1;
        }
        Ok(ran)
    }
}

/// [`WorkerQueue`] running jobs on tokio tasks of this process.
pub struct LocalWorkerQueue {
    pipeline: Arc<HandlerPipeline>,
    sender: mpsc::Sender<DispatchJob>,
    processed: Arc<AtomicU64>,
}

/// Background workers of a [`LocalWorkerQueue`].
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Wait for the workers to drain the queue.
    ///
    /// Workers exit once every [`LocalWorkerQueue`] handle has been dropped.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
            }
        }
    }
}

impl LocalWorkerQueue {
    /// Start `workers` background tasks sharing a channel of `capacity` jobs.
    pub fn start(pipeline: HandlerPipeline, workers: usize, capacity: usize) -> (Self, WorkerPool) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let pipeline = Arc::new(pipeline);
        let processed = Arc::new(AtomicU64::new(0));

        let handles = (0..workers.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    receiver.clone(),
                    pipeline.clone(),
                    processed.clone(),
                ))
            })
            .collect();

        let queue = Self {
            pipeline,
            sender,
            processed,
        };
        (queue, WorkerPool { handles })
    }

    /// Jobs completed by background workers, successful or not.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

async fn run_worker(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<DispatchJob>>>,
    pipeline: Arc<HandlerPipeline>,
    processed: Arc<AtomicU64>,
) {
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            debug!(worker, "Worker queue closed");
            break;
        };

        if let Err(e) = pipeline.run(&job.event).await {
            error!(
                worker,
                job_id = %job.id,
                connection = ?job.destination.connection,
                queue = ?job.destination.queue,
                error = %e,
                "Async event handling failed"
            );
        }
        processed.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl WorkerQueue for LocalWorkerQueue {
    async fn enqueue(&self, job: DispatchJob) -> Result<(), DispatchError> {
        debug!(
            job_id = %job.id,
            event = job.event.key(),
            connection = ?job.destination.connection,
            queue = ?job.destination.queue,
            "Enqueueing job"
        );
        self.sender
            .send(job)
            .await
            .map_err(|_| DispatchError::QueueClosed)
    }

    async fn dispatch_inline(&self, job: DispatchJob) -> Result<(), DispatchError> {
        self.pipeline.run(&job.event).await.map(|_| ())
    }
}

/// Handler that logs every event it sees.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(&self, event: &InboundEvent) -> Result<(), crate::error::HandlerError> {
        info!(
            event = event.key(),
            kind = %event.kind(),
            correlation_id = event.correlation_id().unwrap_or("-"),
            reply_to = event.reply_to().unwrap_or("-"),
            "Event handled"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DynamicEvent, TargetKind};
    use crate::error::HandlerError;
    use parking_lot::Mutex as SyncMutex;
    use serde_json::Map;

    struct Recorder {
        name: &'static str,
        seen: Arc<SyncMutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn handle(&self, event: &InboundEvent) -> Result<(), HandlerError> {
            self.seen.lock().push(format!("{}:{}", self.name, event.key()));
            if self.fail {
                return Err(HandlerError::Failed("nope".into()));
            }
            Ok(())
        }
    }

    fn recorder(name: &'static str, seen: &Arc<SyncMutex<Vec<String>>>, fail: bool) -> Arc<dyn EventHandler> {
        Arc::new(Recorder {
            name,
            seen: seen.clone(),
            fail,
        })
    }

    fn job(key: &str) -> DispatchJob {
        DispatchJob::new(InboundEvent::new(
            Box::new(DynamicEvent::new(key, Map::new())),
            key,
            TargetKind::Generic,
        ))
    }

    #[tokio::test]
    async fn test_inline_runs_specific_then_catch_all() {
        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let pipeline = HandlerPipeline::new()
            .on_any(recorder("all", &seen, false))
            .on("a.Paid", recorder("paid", &seen, false));
        let (queue, _pool) = LocalWorkerQueue::start(pipeline, 1, 8);

        queue.dispatch_inline(job("a.Paid")).await.unwrap();
        queue.dispatch_inline(job("a.Other")).await.unwrap();

        assert_eq!(
            *seen.lock(),
            vec!["paid:a.Paid", "all:a.Paid", "all:a.Other"]
        );
    }

    #[tokio::test]
    async fn test_inline_failure_propagates() {
        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let pipeline = HandlerPipeline::new()
            .on_any(recorder("first", &seen, true))
            .on_any(recorder("second", &seen, false));
        let (queue, _pool) = LocalWorkerQueue::start(pipeline, 1, 8);

        let err = queue.dispatch_inline(job("a.X")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Handler { .. }));
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_enqueued_jobs_run_in_background() {
        let seen = Arc::new(SyncMutex::new(Vec::new()));
        let pipeline = HandlerPipeline::new().on_any(recorder("all", &seen, true));
        let (queue, pool) = LocalWorkerQueue::start(pipeline, 2, 8);

        for i in 0..3 {
            queue.enqueue(job(&format!("a.E{i}"))).await.unwrap();
        }
        let processed = queue.processed.clone();
        drop(queue);
        pool.join().await;

        // failures are logged, not propagated
        assert_eq!(processed.load(Ordering::Relaxed), 3);
        assert_eq!(seen.lock().len(), 3);
    }
}
