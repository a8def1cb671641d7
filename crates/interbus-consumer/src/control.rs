//! Out-of-band control of a running consumer.
//!
//! OS signals are translated into [`ControlSignal`]s and sent over a channel.
//! The [`ControlPlane`] task applies them to the shared [`RunState`] and the
//! verbosity handle. The loop only observes the stop flag between
//! iterations.

use std::sync::Arc;

use interbus_telemetry::VerbosityHandle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::RunState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Finish the current message and stop.
    Stop,
    /// Log uptime and counters.
    StatusReport,
    /// Rotate the log verbosity tier.
    CycleVerbosity,
}

/// Sending half of the control channel.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<ControlSignal>,
}

impl ControlHandle {
    /// Returns `false` once the control plane is gone.
    pub fn send(&self, signal: ControlSignal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

pub struct ControlPlane {
    state: Arc<RunState>,
    verbosity: VerbosityHandle,
    rx: mpsc::UnboundedReceiver<ControlSignal>,
}

/// Create a control plane and a handle feeding it.
pub fn control_channel(
    state: Arc<RunState>,
    verbosity: VerbosityHandle,
) -> (ControlHandle, ControlPlane) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ControlHandle { tx },
        ControlPlane {
            state,
            verbosity,
            rx,
        },
    )
}

impl ControlPlane {
    pub fn apply(&self, signal: ControlSignal) {
        match signal {
            ControlSignal::Stop => {
                info!("Stop requested, finishing current message");
                self.state.request_stop();
            }
            ControlSignal::StatusReport => {
                let stats = self.state.stats();
                info!(
                    "alive since {}, consumed {}, ignored {}",
                    stats.started_at.format("%Y-%m-%d %H:%M:%S"),
                    stats.consumed,
                    stats.ignored
                );
            }
            ControlSignal::CycleVerbosity => {
                if let Err(e) = self.verbosity.cycle() {
                    warn!(error = %e, "Could not change verbosity");
                }
            }
        }
    }

    /// Apply signals until every [`ControlHandle`] is dropped.
    pub async fn run(mut self) {
        while let Some(signal) = self.rx.recv().await {
            debug!(?signal, "Control signal");
            self.apply(signal);
        }
    }
}

#[cfg(target_os = "linux")]
const SIGPWR: i32 = 30;

/// Forward process signals to `handle`.
///
/// SIGINT, SIGTERM and SIGPWR (Linux) stop the consumer, SIGUSR1 cycles the
/// verbosity and SIGUSR2 logs a status line.
#[cfg(unix)]
pub fn spawn_signal_listener(handle: ControlHandle) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigusr2 = signal(SignalKind::user_defined2())?;
    #[cfg(target_os = "linux")]
    let mut sigpwr = signal(SignalKind::from_raw(SIGPWR))?;

    Ok(tokio::spawn(async move {
        loop {
            #[cfg(target_os = "linux")]
            let power = sigpwr.recv();
            #[cfg(not(target_os = "linux"))]
            let power = std::future::pending::<Option<()>>();

            let signal = tokio::select! {
                _ = sigint.recv() => ControlSignal::Stop,
                _ = sigterm.recv() => ControlSignal::Stop,
                _ = power => ControlSignal::Stop,
                _ = sigusr1.recv() => ControlSignal::CycleVerbosity,
                _ = sigusr2.recv() => ControlSignal::StatusReport,
            };
            if !handle.send(signal) {
                break;
            }
        }
    }))
}

/// Forward Ctrl-C to `handle`.
#[cfg(not(unix))]
pub fn spawn_signal_listener(handle: ControlHandle) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !handle.send(ControlSignal::Stop) {
                break;
            }
        }
    }))
}
