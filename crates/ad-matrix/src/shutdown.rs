//! Process-wide registry of running matrix workers.
//!
//! An interrupt handler calls [`stop_all`] to ask every background worker
//! to exit at its next sleep boundary.  Safe to call any number of times.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use crossbeam_channel::Sender;
use tracing::debug;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

fn registry() -> MutexGuard<'static, HashMap<u64, Sender<()>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<u64, Sender<()>>>> = OnceLock::new();
    REGISTRY
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Handle returned by [`register`]; unregisters on drop.
#[derive(Debug)]
pub struct Registration(u64);

pub(crate) fn register(stop: Sender<()>) -> Registration {
    let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    registry().insert(token, stop);
    Registration(token)
}

impl Drop for Registration {
    fn drop(&mut self) {
        registry().remove(&self.0);
    }
}

/// Signal every registered worker to stop.  Returns how many were signalled.
pub fn stop_all() -> usize {
    let senders: Vec<Sender<()>> = registry().drain().map(|(_, s)| s).collect();
    for s in &senders {
        let _ = s.try_send(());
    }
    if !senders.is_empty() {
        debug!(workers = senders.len(), "stop requested for all matrix workers");
    }
    senders.len()
}

/// Number of workers currently registered.
pub fn active() -> usize {
    registry().len()
}
