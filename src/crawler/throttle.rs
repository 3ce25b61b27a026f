//! Per-host admission control
//!
//! This module holds the registry of host gates shared by every fetch:
//! - One counting semaphore per destination host, created on first use
//! - An activity counter recording running cycles and topic tasks
//! - A reset that only happens while the activity counter is zero
//!
//! Gate creation, the activity counter and the reset all sit behind one
//! mutex, so "nothing is running, clear the gates" is a single atomic step.

use crate::CrawlError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Registry of per-host gates
#[derive(Debug)]
pub struct HostThrottle {
    /// Permits per host
    capacity: usize,

    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    gates: HashMap<String, Arc<Semaphore>>,

    /// Cycles and topic tasks currently registered via `track`
    active: usize,

    /// Incremented on every reset
    generation: u64,
}

impl HostThrottle {
    /// Creates an empty registry whose gates admit `capacity` requests each
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Number of permits every gate is created with
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Nothing under the lock can leave `Inner` half-updated
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the gate for `host`, creating it if this is the first request
    pub fn gate_for(&self, host: &str) -> Arc<Semaphore> {
        let mut inner = self.lock();
        if let Some(gate) = inner.gates.get(host) {
            return Arc::clone(gate);
        }

        tracing::trace!("Creating gate for host {}", host);
        let gate = Arc::new(Semaphore::new(self.capacity));
        inner.gates.insert(host.to_string(), Arc::clone(&gate));
        gate
    }

    /// Waits for a permit on `host`'s gate
    ///
    /// The registry lock is released before waiting. The permit is returned
    /// to the gate when dropped.
    pub async fn acquire(&self, host: &str) -> Result<OwnedSemaphorePermit, CrawlError> {
        self.gate_for(host)
            .acquire_owned()
            .await
            .map_err(|_| CrawlError::GateClosed {
                host: host.to_string(),
            })
    }

    /// Drops every gate
    ///
    /// Callers must know that no fetch currently holds a permit; prefer
    /// `reset_if_idle`.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.gates.clear();
        inner.generation += 1;
    }

    /// Drops every gate if no tracked work is running
    ///
    /// # Returns
    ///
    /// * `true` - The registry was cleared
    /// * `false` - Some cycle or topic task is still registered; nothing changed
    pub fn reset_if_idle(&self) -> bool {
        let mut inner = self.lock();
        if inner.active > 0 {
            return false;
        }

        inner.gates.clear();
        inner.generation += 1;
        true
    }

    /// Registers a unit of work that may hold gate permits
    ///
    /// The registration lasts until the returned guard is dropped.
    pub fn track(self: &Arc<Self>) -> ActivityGuard {
        self.lock().active += 1;
        ActivityGuard {
            throttle: Arc::clone(self),
        }
    }

    /// Number of registered units of work
    pub fn active(&self) -> usize {
        self.lock().active
    }

    /// Number of resets performed so far
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Number of hosts with a gate
    pub fn len(&self) -> usize {
        self.lock().gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().gates.is_empty()
    }

    /// Free permits on `host`'s gate, if the gate exists
    pub fn available_permits(&self, host: &str) -> Option<usize> {
        self.lock().gates.get(host).map(|gate| gate.available_permits())
    }
}

/// Keeps a unit of work registered with a `HostThrottle`
#[derive(Debug)]
pub struct ActivityGuard {
    throttle: Arc<HostThrottle>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        let mut inner = self.throttle.lock();
        inner.active = inner.active.saturating_sub(1);
    }
}
