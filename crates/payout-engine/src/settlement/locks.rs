use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::WorkerId;

/// One mutex per worker. Advance resolution and payout registration for the same worker
/// run under the same lock; different workers never contend.
///
/// Entries are never evicted: the map holds one empty mutex per worker ever seen, which
/// stays small for a venue's roster. Evicting would also let two callers end up holding
/// different mutexes for the same worker.
#[derive(Debug, Default)]
pub struct WorkerLocks {
    locks: Mutex<HashMap<WorkerId, Arc<Mutex<()>>>>,
}

impl WorkerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for the worker's lock. Callers hold the returned `Arc` and lock it for the
    /// duration of the critical section.
    pub fn handle(&self, worker_id: &WorkerId) -> Arc<Mutex<()>> {
        let mut guard = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard
            .entry(worker_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Acquire a worker lock. A poisoned lock only means another holder panicked; the guarded
/// data is `()`, so the lock is still usable.
pub(crate) fn acquire(handle: &Mutex<()>) -> MutexGuard<'_, ()> {
    handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_worker_shares_a_lock() {
        let locks = WorkerLocks::new();
        let first = locks.handle(&WorkerId::new("w-1"));
        let second = locks.handle(&WorkerId::new("w-1"));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn different_workers_do_not_contend() {
        let locks = WorkerLocks::new();
        let a = locks.handle(&WorkerId::new("w-1"));
        let b = locks.handle(&WorkerId::new("w-2"));
        let _held = acquire(&a);
        assert!(b.try_lock().is_ok());
    }
}
