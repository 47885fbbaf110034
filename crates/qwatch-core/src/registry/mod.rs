use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use qwatch_model::{TaskId, TaskInfo};

use crate::{error::CoreError, monitor::Monitor};

/// Session-scoped directory of running and recently finished tasks.
///
/// Lookups are public; inserts and removals belong to the supervisor loop alone, so cancellation
/// lookups never race with a cleanup done by somebody else.
#[derive(Clone)]
pub struct TaskRegistry {
    next_id: Arc<AtomicU64>,
    tasks: Arc<Mutex<HashMap<TaskId, Monitor>>>,
}

impl TaskRegistry {
    /// Create an empty registry with its own id counter.
    pub fn new() -> Self {
        Self::with_counter(Arc::new(AtomicU64::new(0)))
    }

    /// Create an empty registry minting ids from a shared counter.
    ///
    /// Registries sharing a counter never hand out the same id.
    pub fn with_counter(next_id: Arc<AtomicU64>) -> Self {
        Self {
            next_id,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) fn mint_id(&self) -> TaskId {
        TaskId::from(self.next_id.fetch_add(1, Ordering::Relaxed).to_string())
    }

    pub(crate) fn register(&self, id: TaskId, monitor: Monitor) -> Result<(), CoreError> {
        let mut tasks = self.lock();
        if tasks.contains_key(&id) {
            return Err(CoreError::DuplicateTask(id));
        }
        tasks.insert(id, monitor);
        Ok(())
    }

    pub(crate) fn unregister(&self, id: &TaskId) -> Option<Monitor> {
        self.lock().remove(id)
    }

    pub fn lookup(&self, id: &TaskId) -> Option<Monitor> {
        self.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Registered ids in ascending mint order.
    pub fn ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.lock().keys().cloned().collect();
        ids.sort_by_key(|id| id.as_str().parse::<u64>().unwrap_or(u64::MAX));
        ids
    }

    /// Snapshots of every registered monitor, in mint order.
    pub fn snapshot(&self) -> Vec<TaskInfo> {
        let mut infos: Vec<TaskInfo> = self.lock().values().filter_map(Monitor::info).collect();
        infos.sort_by_key(|info| info.id.as_str().parse::<u64>().unwrap_or(u64::MAX));
        infos
    }

    /// Request cancellation of every live task; returns how many were flagged.
    pub fn request_cancel_all(&self) -> usize {
        let monitors: Vec<Monitor> = self.lock().values().cloned().collect();
        monitors.iter().filter(|m| m.request_cancel()).count()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, Monitor>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_are_monotonic() {
        let registry = TaskRegistry::new();
        let ids: Vec<String> = (0..3).map(|_| registry.mint_id().to_string()).collect();
        assert_eq!(ids, vec!["0", "1", "2"]);
    }

    #[test]
    fn shared_counter_keeps_ids_unique_across_registries() {
        let counter = Arc::new(AtomicU64::new(0));
        let a = TaskRegistry::with_counter(Arc::clone(&counter));
        let b = TaskRegistry::with_counter(counter);

        let ia = a.mint_id();
        let ib = b.mint_id();
        assert_ne!(ia, ib);
    }

    #[test]
    fn register_lookup_unregister() {
        let registry = TaskRegistry::new();
        let id = registry.mint_id();
        let monitor = Monitor::new();

        registry.register(id.clone(), monitor.clone()).unwrap();
        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);

        let found = registry.lookup(&id).expect("monitor should be registered");
        found.request_cancel();
        assert!(monitor.should_cancel(), "lookup must return the same monitor");

        assert!(registry.unregister(&id).is_some());
        assert!(registry.lookup(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let registry = TaskRegistry::new();
        let id = TaskId::from("5");
        registry.register(id.clone(), Monitor::new()).unwrap();

        let err = registry.register(id, Monitor::new()).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateTask(_)));
    }

    #[test]
    fn ids_are_listed_in_mint_order() {
        let registry = TaskRegistry::new();
        for _ in 0..12 {
            let id = registry.mint_id();
            registry.register(id, Monitor::new()).unwrap();
        }
        let ids: Vec<String> = registry.ids().into_iter().map(|i| i.to_string()).collect();
        assert_eq!(ids.first().map(String::as_str), Some("0"));
        assert_eq!(ids.last().map(String::as_str), Some("11"));
    }

    #[test]
    fn cancel_all_skips_finished_tasks() {
        let registry = TaskRegistry::new();
        let live = Monitor::new();
        let done = Monitor::new();
        done.mark_completed().unwrap();

        registry.register(registry.mint_id(), live.clone()).unwrap();
        registry.register(registry.mint_id(), done.clone()).unwrap();

        assert_eq!(registry.request_cancel_all(), 1);
        assert!(live.should_cancel());
        assert!(!done.cancel_requested());
    }
}
