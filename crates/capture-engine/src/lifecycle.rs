//! Recording lifecycle: start, wait for a stop request, finalize.
//!
//! A stop can come from SIGINT/SIGTERM (through a [`ShutdownSignal`]) or
//! from a [`StopHandle`] held by any thread. Whichever arrives first wins;
//! later requests are ignored. Finalize is bounded by a hard timeout, and the outcome is
//! published to every waiting [`StopHandle::stop_and_wait`] caller.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use framecast_common::error::{FramecastError, FramecastResult};
use tokio::sync::Notify;

use crate::backend::CaptureBackend;
use crate::session::{CaptureConfig, CaptureSession, RecordingReport, SessionState};
use crate::sink::MuxSink;

/// Slack on top of the sink's own finalize timeout for stopping streams.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// How a recording ended, as seen by a waiting caller.
#[derive(Debug, Clone)]
pub enum StopOutcome {
    /// The artifact was finalized.
    Finalized(RecordingReport),
    /// Finalize failed or timed out; the artifact may be unplayable.
    Failed { path: PathBuf, message: String },
    /// Capture never started.
    NotStarted(String),
}

#[derive(Debug, Default)]
struct Handshake {
    outcome: Mutex<Option<StopOutcome>>,
    done: Condvar,
}

impl Handshake {
    fn publish(&self, outcome: StopOutcome) {
        let mut slot = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self, timeout: Duration) -> Option<StopOutcome> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.outcome.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(outcome) = slot.as_ref() {
                return Some(outcome.clone());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            slot = self
                .done
                .wait_timeout(slot, remaining)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }
}

/// Requests a stop from any thread.
#[derive(Clone)]
pub struct StopHandle {
    requested: Arc<Notify>,
    handshake: Arc<Handshake>,
}

impl StopHandle {
    /// Ask the controller to stop. Safe to call repeatedly.
    pub fn request_stop(&self) {
        self.requested.notify_one();
    }

    /// Request a stop and block until finalize completes or `timeout`
    /// passes. Must not be called from the runtime thread driving the
    /// controller.
    pub fn stop_and_wait(&self, timeout: Duration) -> Option<StopOutcome> {
        self.request_stop();
        self.handshake.wait(timeout)
    }

    /// The published outcome, if the recording has ended.
    pub fn outcome(&self) -> Option<StopOutcome> {
        self.handshake
            .outcome
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Drives one capture session from start to a finalized artifact.
pub struct LifecycleController {
    session: CaptureSession,
    finalize_timeout: Duration,
    requested: Arc<Notify>,
    handshake: Arc<Handshake>,
}

impl LifecycleController {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        start_timeout: Duration,
        finalize_timeout: Duration,
    ) -> Self {
        Self {
            session: CaptureSession::new(backend, start_timeout),
            finalize_timeout,
            requested: Arc::new(Notify::new()),
            handshake: Arc::new(Handshake::default()),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            requested: self.requested.clone(),
            handshake: self.handshake.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Start capturing, wait for `shutdown` or a [`StopHandle`] request,
    /// then stop and finalize.
    ///
    /// A `shutdown` that resolves while streams are still opening does not
    /// abandon the start: once start settles the session is stopped and
    /// finalized right away, or rolled back if start failed.
    pub async fn run<F>(
        &mut self,
        config: CaptureConfig,
        sink: MuxSink,
        shutdown: F,
    ) -> FramecastResult<RecordingReport>
    where
        F: Future<Output = ()>,
    {
        let path = sink.path().to_path_buf();
        tokio::pin!(shutdown);

        let mut stop_early = false;
        let started = {
            let start = self.session.start(config, sink);
            tokio::pin!(start);
            loop {
                tokio::select! {
                    result = &mut start => break result,
                    _ = &mut shutdown, if !stop_early => {
                        tracing::info!("Stop signal received while starting; finalizing once streams are up");
                        stop_early = true;
                    }
                }
            }
        };
        if let Err(e) = started {
            self.handshake.publish(StopOutcome::NotStarted(e.to_string()));
            return Err(e);
        }

        if !stop_early {
            tracing::info!(path = %path.display(), "Recording; waiting for stop signal");
            tokio::select! {
                _ = &mut shutdown => tracing::info!("Stop signal received"),
                _ = self.requested.notified() => tracing::info!("Stop requested"),
            }
        }

        self.stop(path).await
    }

    async fn stop(&mut self, path: PathBuf) -> FramecastResult<RecordingReport> {
        let limit = self.finalize_timeout + STOP_GRACE;
        let result = match tokio::time::timeout(limit, self.session.stop()).await {
            Ok(result) => result,
            Err(_) => Err(FramecastError::FinalizeTimeout {
                path: path.clone(),
                timeout: limit,
            }),
        };

        let outcome = match &result {
            Ok(report) => StopOutcome::Finalized(report.clone()),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Recording did not finalize cleanly");
                StopOutcome::Failed {
                    path,
                    message: e.to_string(),
                }
            }
        };
        self.handshake.publish(outcome);
        result
    }
}

/// Latched process stop request.
///
/// [`ShutdownSignal::install`] registers SIGINT and SIGTERM listeners
/// immediately. From then on those signals never terminate the process;
/// they raise this signal instead, and repeats are logged and ignored.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<ShutdownState>,
}

#[derive(Debug, Default)]
struct ShutdownState {
    raised: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    /// A signal raised only through [`ShutdownSignal::raise`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Take over SIGINT and SIGTERM for the rest of the process lifetime.
    /// Must be called inside a tokio runtime.
    pub fn install() -> FramecastResult<Self> {
        let shutdown = Self::new();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            for (kind, name) in [
                (SignalKind::interrupt(), "SIGINT"),
                (SignalKind::terminate(), "SIGTERM"),
            ] {
                let mut stream = signal(kind)?;
                let raised = shutdown.clone();
                tokio::spawn(async move {
                    while stream.recv().await.is_some() {
                        raised.raise_from(name);
                    }
                });
            }
        }
        #[cfg(windows)]
        {
            let mut stream = tokio::signal::windows::ctrl_c()?;
            let raised = shutdown.clone();
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    raised.raise_from("Ctrl-C");
                }
            });
        }

        Ok(shutdown)
    }

    /// Raise the signal. Returns `true` for the first call only.
    pub fn raise(&self) -> bool {
        let first = !self.inner.raised.swap(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
        first
    }

    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Resolves once the signal is raised, immediately if it already was.
    pub async fn wait(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_raised() {
            return;
        }
        notified.await;
    }

    fn raise_from(&self, name: &str) {
        if self.raise() {
            tracing::info!(signal = name, "Stop signal received");
        } else {
            tracing::warn!(signal = name, "Already stopping; waiting for finalize to complete");
        }
    }
}
