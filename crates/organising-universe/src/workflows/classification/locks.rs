use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::domain::ProjectId;

/// Per-project exclusivity. Work on different projects never contends beyond the brief
/// table lookup. Entries live only while some caller holds or waits on them.
#[derive(Debug, Default)]
pub struct ProjectLocks {
    table: Mutex<HashMap<ProjectId, Arc<Mutex<()>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` while holding the lock for `id`.
    pub fn with_project<T>(&self, id: &ProjectId, work: impl FnOnce() -> T) -> T {
        let slot = {
            // The guarded values are unit, so a poisoned lock carries no broken state.
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.entry(id.clone()).or_default().clone()
        };

        let result = {
            let _held = slot.lock().unwrap_or_else(PoisonError::into_inner);
            work()
        };
        drop(slot);
        self.release(id);
        result
    }

    /// Number of projects with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, id: &ProjectId) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the table's own handle left: nobody is inside or queued for this project.
        if table
            .get(id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            table.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn same_project_work_never_overlaps() {
        let locks = Arc::new(ProjectLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let id = ProjectId::from("p-1");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_seen = max_seen.clone();
                let id = id.clone();
                thread::spawn(move || {
                    locks.with_project(&id, || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("worker finished");
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.tracked(), 0);
    }

    #[test]
    fn different_projects_are_independent() {
        let locks = ProjectLocks::new();
        let a = ProjectId::from("a");
        let b = ProjectId::from("b");
        let value = locks.with_project(&a, || {
            let inner = locks.with_project(&b, || 7);
            assert_eq!(locks.tracked(), 1);
            inner
        });
        assert_eq!(value, 7);
        assert_eq!(locks.tracked(), 0);
    }

    #[test]
    fn reentry_after_release_still_excludes() {
        let locks = ProjectLocks::new();
        let id = ProjectId::from("p-2");
        for round in 0..3 {
            let seen = locks.with_project(&id, || locks.tracked());
            assert_eq!(seen, 1, "round {round}");
        }
        assert_eq!(locks.tracked(), 0);
    }
}
