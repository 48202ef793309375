//! In-memory index of live tasks.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{OperationType, OwnerId, TaskId};

use super::task::Task;

#[derive(Default)]
struct RegistryMaps {
    tasks: HashMap<TaskId, Task>,
    owners: HashMap<OwnerId, HashSet<TaskId>>,
}

/// Index of live tasks by id and by owner
///
/// Both maps are updated under one lock, so a task is either present in both or in
/// neither. Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct TaskRegistry {
    maps: Arc<RwLock<RegistryMaps>>,
    next_id: Arc<AtomicU64>,
}

impl TaskRegistry {
    /// Create an empty registry; the first allocated id is 1
    pub fn new() -> Self {
        Self {
            maps: Arc::new(RwLock::new(RegistryMaps::default())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Reserve the next task id (never reused, even after `clear`)
    pub fn allocate_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Add a live task
    pub fn register(&self, task: Task) {
        let mut maps = self.maps.write();
        maps.owners
            .entry(task.owner().clone())
            .or_default()
            .insert(task.id());
        maps.tasks.insert(task.id(), task);
    }

    /// Remove a task; returns whether it was registered
    pub fn unregister(&self, id: TaskId, owner: &OwnerId) -> bool {
        let mut maps = self.maps.write();
        let removed = maps.tasks.remove(&id).is_some();

        if let Some(ids) = maps.owners.get_mut(owner) {
            ids.remove(&id);
            if ids.is_empty() {
                maps.owners.remove(owner);
            }
        }
        removed
    }

    /// Look a task up by id
    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.maps.read().tasks.get(&id).cloned()
    }

    /// Live tasks of one owner, oldest first (empty when the owner has none)
    pub fn tasks_of(&self, owner: &OwnerId) -> Vec<Task> {
        let maps = self.maps.read();
        let mut tasks: Vec<Task> = maps
            .owners
            .get(owner)
            .into_iter()
            .flatten()
            .filter_map(|id| maps.tasks.get(id).cloned())
            .collect();
        tasks.sort_by_key(Task::id);
        tasks
    }

    /// Live tasks of one owner performing `operation`, oldest first
    pub fn type_of(&self, owner: &OwnerId, operation: OperationType) -> Vec<Task> {
        self.tasks_of(owner)
            .into_iter()
            .filter(|task| task.operation() == operation)
            .collect()
    }

    /// Every live task, oldest first
    pub fn all(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.maps.read().tasks.values().cloned().collect();
        tasks.sort_by_key(Task::id);
        tasks
    }

    /// Number of live tasks
    pub fn len(&self) -> usize {
        self.maps.read().tasks.len()
    }

    /// Whether no task is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and return the tasks that were registered
    pub fn clear(&self) -> Vec<Task> {
        let mut maps = self.maps.write();
        maps.owners.clear();
        let mut tasks: Vec<Task> = maps.tasks.drain().map(|(_, task)| task).collect();
        tasks.sort_by_key(Task::id);
        tasks
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
