//! # interbus-consume
//!
//! Runs one [`ConsumerLoop`] against the transport selected by
//! `INTERBUS_TRANSPORT`, dispatching to the in-process worker queue.
//!
//! ## Startup Sequence
//!
//! 1. Parse arguments, read environment settings
//! 2. Initialize logging at the requested verbosity
//! 3. Build the event registry (from `INTERBUS_REGISTRY_FILE` when set)
//! 4. Start the worker queue, control plane and signal listener
//! 5. Run the loop until stopped, then drain the workers
//!
//! Exit codes: `0` graceful stop, `2` invalid configuration, `1` anything else.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use interbus_consumer::adapters::{
    FsBlobStore, HandlerPipeline, InMemoryBroker, InMemoryHitStore, JsonLinesBroker,
    LocalBusSink, LocalWorkerQueue, LoggingHandler,
};
use interbus_consumer::cli::Args;
use interbus_consumer::control::{control_channel, spawn_signal_listener};
use interbus_consumer::domain::{RegistryDescriptor, TransportKind};
use interbus_consumer::ports::{BrokerContext, SleepCoolDown};
use interbus_consumer::{
    Collaborators, ConsumerError, ConsumerLoop, EventRegistry, InterbusSettings, RunState,
    EXIT_FAILURE, EXIT_SUCCESS,
};
use interbus_telemetry::{init_logging, TelemetryConfig, Verbosity, VerbosityHandle};
use local_bus::LocalEventBus;

/// Jobs the async worker channel holds before `enqueue` waits.
const WORKER_QUEUE_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            error!("Consumer terminated: {e:#}");
            let code = e
                .downcast_ref::<ConsumerError>()
                .map_or(EXIT_FAILURE, ConsumerError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let settings = InterbusSettings::from_env();

    let telemetry =
        TelemetryConfig::from_env().with_verbosity(Verbosity::from_occurrences(args.verbose));
    let verbosity = match init_logging(&telemetry) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Warning: logging unavailable: {e}");
            VerbosityHandle::detached(telemetry.verbosity)
        }
    };

    let config = args.into_builder(&settings).build()?;
    let registry = load_registry(&settings)?;
    info!(
        service_id = %config.service_id,
        registered = registry.len(),
        transport = ?settings.transport,
        "Event registry loaded"
    );

    let broker: Arc<dyn BrokerContext> = match settings.transport {
        TransportKind::Stdin => Arc::new(JsonLinesBroker::stdin()),
        TransportKind::Memory => Arc::new(InMemoryBroker::new()),
    };

    let pipeline = HandlerPipeline::new().on_any(Arc::new(LoggingHandler));
    let (queue, workers) =
        LocalWorkerQueue::start(pipeline, settings.async_workers, WORKER_QUEUE_CAPACITY);

    let state = Arc::new(RunState::new());
    let (control, plane) = control_channel(state.clone(), verbosity);
    let control_task = tokio::spawn(plane.run());
    let signal_task =
        spawn_signal_listener(control).context("Failed to install signal handlers")?;

    let deps = Collaborators {
        broker,
        blob_store: Arc::new(FsBlobStore::new(settings.offload_root.clone())),
        queue: Arc::new(queue),
        sink: Arc::new(LocalBusSink::new(Arc::new(LocalEventBus::new()))),
        hit_store: Arc::new(InMemoryHitStore::new()),
        registry: Arc::new(registry),
    };
    let mut consumer = ConsumerLoop::new(config, deps, state);
    if let Some(period) = settings.throttle_cool_down {
        consumer = consumer.with_cool_down(Arc::new(SleepCoolDown(period)));
    }
    let result = consumer.run().await;

    signal_task.abort();
    control_task.abort();
    // the loop owns the last queue handle; dropping it lets the workers drain and exit
    drop(consumer);
    workers.join().await;

    let stats = result?;
    info!(
        consumed = stats.consumed,
        ignored = stats.ignored,
        "Exiting"
    );
    Ok(())
}

fn load_registry(settings: &InterbusSettings) -> Result<EventRegistry, ConsumerError> {
    let Some(path) = &settings.registry_file else {
        return Ok(EventRegistry::new(settings.generic_namespace.clone()));
    };

    let raw = std::fs::read_to_string(path).map_err(|e| {
        ConsumerError::Configuration(format!("cannot read registry file {}: {e}", path.display()))
    })?;
    let descriptor: RegistryDescriptor = serde_json::from_str(&raw).map_err(|e| {
        ConsumerError::Configuration(format!("invalid registry file {}: {e}", path.display()))
    })?;

    Ok(EventRegistry::from_descriptor(
        settings.generic_namespace.clone(),
        &descriptor,
    ))
}
