//! Per-task mutual exclusion.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed lock arena: one async mutex per task id.
///
/// Operations on different tasks never contend. Entries are created on
/// first use and removed when the last guard or waiter for the task goes
/// away, so the arena only holds tasks that are in use.
///
/// # Examples
///
/// ```
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// use concent_arbiter::store::TaskLocks;
///
/// let locks = TaskLocks::new();
/// let a = locks.lock("task-a").await;
/// // A different task is independent.
/// let b = locks.try_lock("task-b");
/// assert!(b.is_some());
/// assert!(locks.try_lock("task-a").is_none());
/// drop(a);
/// drop(b);
/// assert!(locks.is_empty());
/// assert!(locks.try_lock("task-a").is_some());
/// # });
/// ```
#[derive(Debug, Default)]
pub struct TaskLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Exclusive access to one task. Releasing it drops the task's arena entry
/// when nobody else is holding or waiting for it.
#[derive(Debug)]
pub struct TaskGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    task_id: String,
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone of the Arc, so the count is 1 only
        // when the map is the last owner.
        self.locks
            .remove_if(&self.task_id, |_, slot| Arc::strong_count(slot) == 1);
    }
}

impl TaskLocks {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `task_id`.
    pub async fn lock(&self, task_id: &str) -> TaskGuard<'_> {
        let guard = self.slot(task_id).lock_owned().await;
        self.guard(task_id, guard)
    }

    /// Takes `task_id` if nobody holds it.
    pub fn try_lock(&self, task_id: &str) -> Option<TaskGuard<'_>> {
        let guard = self.slot(task_id).try_lock_owned().ok()?;
        Some(self.guard(task_id, guard))
    }

    /// Number of tasks currently held or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns `true` if no task is held or waited on.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn guard(&self, task_id: &str, guard: OwnedMutexGuard<()>) -> TaskGuard<'_> {
        TaskGuard {
            guard: Some(guard),
            locks: &self.locks,
            task_id: task_id.to_string(),
        }
    }

    fn slot(&self, task_id: &str) -> Arc<Mutex<()>> {
        // Clone out so the shard guard is released before awaiting.
        if let Some(slot) = self.locks.get(task_id) {
            return Arc::clone(&slot);
        }
        Arc::clone(&self.locks.entry(task_id.to_string()).or_default())
    }
}
