use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::error;
use uuid::Uuid;

use crate::errortypes::Error;

pub type LockId = Uuid;

#[derive(Default)]
struct Entry {
    /// Holders plus waiters. The entry is removed when the last one
    /// unlocks, so stale ids never grow the map.
    count: usize,
    held: bool,
}

struct Shared {
    entries: Mutex<HashMap<String, Entry>>,
    cond: Condvar,
    /// Lock ids still alive; unlock removes the id, which both makes a
    /// second unlock with the same id a no-op and stops the supervisor.
    active: Mutex<HashSet<LockId>>,
}

/// Named mutex map with background timeout supervision. Serializes work
/// per id without tying the release to a guard lifetime: `lock` may be
/// called on one thread and `unlock` on another, which is what lets a
/// dispatcher acquire and hand the release duty to a worker.
///
/// The supervisor only emits a diagnostic on timeout; release remains
/// the holder's duty.
pub struct MultiTimeoutLock {
    shared: Arc<Shared>,
    timeout: Duration,
}

impl MultiTimeoutLock {
    pub fn new(timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(HashMap::new()),
                cond: Condvar::new(),
                active: Mutex::new(HashSet::new()),
            }),
            timeout,
        }
    }

    /// Acquire the per-id lock, blocking until it is free. Returns the
    /// lock id that must be passed back to `unlock`.
    pub fn lock(&self, id: &str) -> LockId {
        self.lock_with(id, self.timeout)
    }

    /// Same as `lock` with a per-call supervisor timeout.
    pub fn lock_timeout(&self, id: &str, timeout: Duration) -> LockId {
        self.lock_with(id, timeout)
    }

    fn lock_with(&self, id: &str, timeout: Duration) -> LockId {
        let lock_id = Uuid::new_v4();

        let mut entries = self.shared.entries.lock().unwrap();
        entries.entry(id.to_string()).or_default().count += 1;
        while entries.get(id).map(|entry| entry.held).unwrap_or(false) {
            entries = self.shared.cond.wait(entries).unwrap();
        }
        if let Some(entry) = entries.get_mut(id) {
            entry.held = true;
        }
        drop(entries);

        self.shared.active.lock().unwrap().insert(lock_id);

        let shared = Arc::clone(&self.shared);
        let start = Instant::now();
        thread::spawn(move || {
            loop {
                thread::sleep(Duration::from_secs(1));

                if !shared.active.lock().unwrap().contains(&lock_id) {
                    return;
                }

                if start.elapsed() > timeout {
                    let err = Error::Timeout("multilock: Lock timeout".to_string());
                    error!(lock_id = %lock_id, error = %err, "multilock: Lock timed out");
                    return;
                }
            }
        });

        lock_id
    }

    /// Release a held lock. A stale lock id (already unlocked) is a
    /// no-op and never releases another holder.
    pub fn unlock(&self, id: &str, lock_id: LockId) {
        if !self.shared.active.lock().unwrap().remove(&lock_id) {
            return;
        }

        let mut entries = self.shared.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(id) {
            if entry.count <= 1 {
                entries.remove(id);
            } else {
                entry.count -= 1;
                entry.held = false;
            }
        }
        drop(entries);

        self.shared.cond.notify_all();
    }

    /// Non-blocking presence probe: true while any holder or waiter is
    /// registered for the id.
    pub fn locked(&self, id: &str) -> bool {
        self.shared.entries.lock().unwrap().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_lock_unlock_leaves_no_entry() {
        let lock = MultiTimeoutLock::new(Duration::from_secs(60));
        let lock_id = lock.lock("a");
        assert!(lock.locked("a"));
        lock.unlock("a", lock_id);
        assert!(!lock.locked("a"));
    }

    #[test]
    fn test_stale_unlock_is_noop() {
        let lock = MultiTimeoutLock::new(Duration::from_secs(60));
        let first = lock.lock("a");
        lock.unlock("a", first);

        let second = lock.lock("a");
        // Replaying the already-released id must not free the new holder.
        lock.unlock("a", first);
        assert!(lock.locked("a"));
        lock.unlock("a", second);
        assert!(!lock.locked("a"));
    }

    #[test]
    fn test_independent_ids_do_not_block() {
        let lock = MultiTimeoutLock::new(Duration::from_secs(60));
        let a = lock.lock("a");
        let b = lock.lock("b");
        assert!(lock.locked("a"));
        assert!(lock.locked("b"));
        lock.unlock("a", a);
        lock.unlock("b", b);
    }

    #[test]
    fn test_exclusivity_across_threads() {
        let lock = Arc::new(MultiTimeoutLock::new(Duration::from_secs(60)));
        let holders = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            let holders = Arc::clone(&holders);
            handles.push(thread::spawn(move || {
                for _ in 0..25 {
                    let lock_id = lock.lock("shared");
                    let now = holders.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(now, 0, "two holders inside the critical section");
                    thread::yield_now();
                    holders.fetch_sub(1, Ordering::SeqCst);
                    lock.unlock("shared", lock_id);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!lock.locked("shared"));
    }

    #[test]
    fn test_locked_true_while_waiter_queued() {
        let lock = Arc::new(MultiTimeoutLock::new(Duration::from_secs(60)));
        let lock_id = lock.lock("a");

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let id = lock.lock("a");
                lock.unlock("a", id);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(lock.locked("a"));
        lock.unlock("a", lock_id);
        waiter.join().unwrap();
        assert!(!lock.locked("a"));
    }

    proptest! {
        // Kept small: every lock spawns a supervisor thread that lives
        // for its first one-second poll.
        #![proptest_config(ProptestConfig::with_cases(16))]

        // Any sequence of matched lock/unlock pairs, interleaved with
        // stale unlock replays, leaves the map empty.
        #[test]
        fn prop_no_entry_growth_under_churn(ops in proptest::collection::vec(0u8..4, 1..40)) {
            let lock = MultiTimeoutLock::new(Duration::from_secs(60));
            let ids = ["a", "b", "c", "d"];
            let mut stale: Vec<(usize, LockId)> = Vec::new();

            for op in &ops {
                let idx = (*op as usize) % ids.len();
                let lock_id = lock.lock(ids[idx]);
                lock.unlock(ids[idx], lock_id);
                stale.push((idx, lock_id));

                // Replaying stale ids must stay a no-op.
                if let Some((sidx, sid)) = stale.first().copied() {
                    lock.unlock(ids[sidx], sid);
                }
            }

            for id in &ids {
                prop_assert!(!lock.locked(id));
            }
        }
    }
}
