//! Keeping a detection matrix fresh: on the agent thread or in the background.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, warn};

use crate::build::{MatrixReport, MatrixSource};
use crate::error::{MatrixError, MatrixResult};
use crate::shutdown::{self, Registration};

/// Bound on the implicit join when a running worker is dropped.
const DROP_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Common surface of the synchronous and background updaters.
pub trait MatrixUpdater: Send {
    /// Called once per agent update.  The synchronous updater recomputes
    /// here; the background one only reports a dead worker.
    fn update(&mut self) -> MatrixResult<()>;

    /// Latest completed matrix, if any.
    fn snapshot(&self) -> Option<MatrixReport>;

    /// Stop updating and clear the snapshot.  Repeated calls are no-ops.
    fn stop(&mut self, timeout: Option<Duration>) -> MatrixResult<()>;

    fn is_running(&self) -> bool;
}

// ── Synchronous ───────────────────────────────────────────────────────────────

/// Recomputes on the caller's thread every `interval` updates.
pub struct SyncMatrix<S: MatrixSource> {
    source: S,
    interval: u32,
    calls: u32,
    latest: Option<MatrixReport>,
    running: bool,
}

impl<S: MatrixSource> SyncMatrix<S> {
    pub fn new(source: S, interval: u32) -> Self {
        Self { source, interval: interval.max(1), calls: 0, latest: None, running: true }
    }
}

impl<S: MatrixSource> MatrixUpdater for SyncMatrix<S> {
    fn update(&mut self) -> MatrixResult<()> {
        if !self.running {
            return Ok(());
        }
        let due = self.calls % self.interval == 0;
        self.calls = self.calls.wrapping_add(1);
        if !due {
            return Ok(());
        }
        match self.source.compute() {
            Ok(report) => self.latest = report,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(error = %e, "matrix update failed, keeping previous"),
        }
        Ok(())
    }

    fn snapshot(&self) -> Option<MatrixReport> {
        self.latest.clone()
    }

    fn stop(&mut self, _timeout: Option<Duration>) -> MatrixResult<()> {
        self.running = false;
        self.latest = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

// ── Background ────────────────────────────────────────────────────────────────

type Shared = Arc<Mutex<Option<MatrixReport>>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Option<MatrixReport>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Recomputes on a dedicated named thread.
///
/// The worker builds each matrix without holding the lock and only swaps the
/// finished value in, so readers never see a partial matrix.  Transient
/// errors are logged and retried; fatal ones end the worker and surface from
/// the next [`update`](MatrixUpdater::update) or [`stop`](MatrixUpdater::stop).
pub struct MatrixWorker {
    shared: Shared,
    stop_tx: Sender<()>,
    /// Disconnects when the worker thread exits.
    exited: Receiver<()>,
    handle: Option<JoinHandle<MatrixResult<()>>>,
    registration: Option<Registration>,
    stopped: bool,
}

impl MatrixWorker {
    pub fn spawn<S: MatrixSource>(mut source: S, sleep: Duration) -> MatrixResult<Self> {
        let shared: Shared = Arc::new(Mutex::new(None));
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (exit_tx, exited) = bounded::<()>(0);

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("detection-matrix".into())
            .spawn(move || {
                let _exit = exit_tx;
                loop {
                    match source.compute() {
                        Ok(report) => *lock(&worker_shared) = report,
                        Err(e) if e.is_fatal() => {
                            error!(error = %e, "matrix worker terminated");
                            return Err(e);
                        }
                        Err(e) => warn!(error = %e, "matrix computation failed, retrying"),
                    }
                    match stop_rx.recv_timeout(sleep) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("matrix worker exiting");
                Ok(())
            })?;

        let registration = shutdown::register(stop_tx.clone());
        Ok(Self {
            shared,
            stop_tx,
            exited,
            handle: Some(handle),
            registration: Some(registration),
            stopped: false,
        })
    }

    fn join(&mut self) -> MatrixResult<()> {
        match self.handle.take() {
            Some(h) => h
                .join()
                .map_err(|_| MatrixError::WorkerPanicked)?
                .map_err(|e| MatrixError::WorkerFailed(Box::new(e))),
            None => Ok(()),
        }
    }

    /// Block up to `timeout` for the worker thread to exit.
    fn wait_exit(&self, timeout: Option<Duration>) -> bool {
        let res = match timeout {
            Some(t) => self.exited.recv_timeout(t).map_err(|e| e.is_timeout()),
            None => self.exited.recv().map_err(|_| false),
        };
        !matches!(res, Err(true))
    }
}

impl MatrixUpdater for MatrixWorker {
    fn update(&mut self) -> MatrixResult<()> {
        if self.handle.as_ref().is_some_and(JoinHandle::is_finished) {
            self.stopped = true;
            return self.join();
        }
        Ok(())
    }

    fn snapshot(&self) -> Option<MatrixReport> {
        lock(&self.shared).clone()
    }

    fn stop(&mut self, timeout: Option<Duration>) -> MatrixResult<()> {
        if self.stopped && self.handle.is_none() {
            warn!("matrix worker already stopped");
            return Ok(());
        }
        self.stopped = true;
        let _ = self.stop_tx.try_send(());
        if !self.wait_exit(timeout) {
            return Err(MatrixError::StopTimeout(timeout.unwrap_or_default()));
        }
        *lock(&self.shared) = None;
        self.registration = None;
        self.join()
    }

    fn is_running(&self) -> bool {
        !self.stopped && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for MatrixWorker {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        let _ = self.stop_tx.try_send(());
        if self.wait_exit(Some(DROP_JOIN_TIMEOUT)) {
            if let Err(e) = self.join() {
                warn!(error = %e, "matrix worker ended with error");
            }
        } else {
            warn!("matrix worker still running at drop, detaching");
        }
    }
}
