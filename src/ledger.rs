//! Global admission accounting: one memory budget, one pending-task counter.

use std::sync::Mutex;

use crate::models::ServiceStatus;

/// Shared resource counters gating task admission.
///
/// Both counters live behind a single lock so no caller can ever observe the
/// memory budget and the pending count from different instants. `try_admit`
/// and `release` bracket exactly one task's lifetime; release runs whether the
/// job succeeded or failed.
#[derive(Debug)]
pub struct ResourceLedger {
    inner: Mutex<Counters>,
}

#[derive(Debug)]
struct Counters {
    available_memory: u64,
    pending_tasks: u64,
}

impl ResourceLedger {
    pub fn new(memory_budget: u64) -> Self {
        Self {
            inner: Mutex::new(Counters {
                available_memory: memory_budget,
                pending_tasks: 0,
            }),
        }
    }

    /// Atomic check-and-decrement: admits the task only if the whole `size`
    /// fits in the remaining budget. The budget can therefore never go
    /// negative, even under concurrent admission attempts.
    pub fn try_admit(&self, size: u64) -> bool {
        let mut counters = self.inner.lock().expect("ledger lock poisoned");
        if size > counters.available_memory {
            return false;
        }
        counters.available_memory -= size;
        counters.pending_tasks += 1;
        true
    }

    /// Returns an admitted task's reservation. Must be called exactly once per
    /// successful `try_admit`, with the same size.
    pub fn release(&self, size: u64) {
        let mut counters = self.inner.lock().expect("ledger lock poisoned");
        counters.available_memory = counters.available_memory.saturating_add(size);
        counters.pending_tasks = counters.pending_tasks.saturating_sub(1);
    }

    pub fn snapshot(&self) -> ServiceStatus {
        let counters = self.inner.lock().expect("ledger lock poisoned");
        ServiceStatus {
            available_memory: counters.available_memory,
            pending_tasks: counters.pending_tasks,
        }
    }
}
