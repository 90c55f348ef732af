use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::kv::KvStore;
use crate::platform::MergePolicy;
use crate::task::{Task, TaskExtra, TaskView};

/// Well-known key the task-extra snapshot lives under. Kept stable so
/// snapshots written by earlier releases keep loading.
pub const STORE_KEY: &str = "@_RNS3_Tasks_Extra";

/// Per-task metadata cache, lazily hydrated from the persistent store and
/// written back on every mutation.
///
/// One mutex guards the snapshot. It doubles as the one-shot hydration gate
/// (concurrent first calls coalesce on the lock) and as the serializer for all
/// read-modify-write cycles, so concurrent updates for different task ids
/// cannot drop each other's writes.
pub struct TaskExtraStore {
    kv: Arc<dyn KvStore>,
    policy: MergePolicy,
    snapshot: Mutex<Option<HashMap<String, TaskExtra>>>,
}

impl TaskExtraStore {
    pub fn new(kv: Arc<dyn KvStore>, policy: MergePolicy) -> Self {
        Self {
            kv,
            policy,
            snapshot: Mutex::new(None),
        }
    }

    /// Hydrates the in-memory snapshot if it has not been loaded yet.
    /// Idempotent. A missing, unreadable, or unparsable blob silently recovers
    /// to an empty mapping.
    pub async fn ensure_loaded(&self) {
        let mut guard = self.snapshot.lock().await;
        self.hydrate(&mut guard).await;
    }

    async fn hydrate(&self, slot: &mut Option<HashMap<String, TaskExtra>>) {
        if slot.is_some() {
            return;
        }
        let loaded = match self.kv.get(STORE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    debug!(error = %e, "task extra snapshot unparsable, starting empty");
                    HashMap::new()
                }
            },
            Ok(None) => HashMap::new(),
            Err(e) => {
                debug!(error = %e, "task extra snapshot unreadable, starting empty");
                HashMap::new()
            }
        };
        *slot = Some(loaded);
    }

    pub async fn get(&self, id: &str) -> Option<TaskExtra> {
        let mut guard = self.snapshot.lock().await;
        self.hydrate(&mut guard).await;
        guard.as_ref().and_then(|map| map.get(id).cloned())
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.get(id).await.is_some()
    }

    /// Merges `incoming` into the record for `task.id`, writes the full
    /// snapshot through, and returns the merged view. Persistence is
    /// best-effort write-through: failures are logged, never surfaced.
    pub async fn set_and_persist(&self, task: &Task, incoming: TaskExtra, is_new: bool) -> TaskView {
        let mut guard = self.snapshot.lock().await;
        self.hydrate(&mut guard).await;
        let map = guard.get_or_insert_with(HashMap::new);

        let merged = self.policy.merge(map.get(&task.id), incoming, is_new);
        map.insert(task.id.clone(), merged);

        match serde_json::to_string(&*map) {
            Ok(raw) => {
                if let Err(e) = self.kv.set(STORE_KEY, raw).await {
                    warn!(task_id = %task.id, error = %e, "failed to persist task extras");
                }
            }
            Err(e) => warn!(task_id = %task.id, error = %e, "failed to encode task extras"),
        }

        overlay_in(map, task)
    }

    /// Read-path overlay: the task enriched with its stored metadata, or the
    /// task as-is when none exists. Never mutates the store, never persists.
    pub async fn overlay(&self, task: &Task) -> TaskView {
        let mut guard = self.snapshot.lock().await;
        self.hydrate(&mut guard).await;
        match guard.as_ref() {
            Some(map) => overlay_in(map, task),
            None => TaskView::from_task(task),
        }
    }
}

fn overlay_in(map: &HashMap<String, TaskExtra>, task: &Task) -> TaskView {
    match map.get(&task.id) {
        Some(extra) => TaskView::overlay(task, extra),
        None => TaskView::from_task(task),
    }
}
