//! Per-workspace serialization of stage invocations

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

type Registry = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Registry of one async mutex per workspace.
///
/// The guard is held across the read-run-commit cycle of a stage, so two
/// invocations on the same workspace never interleave while different
/// workspaces proceed in parallel. An entry lives only while some invocation
/// holds or waits for it.
#[derive(Default)]
pub struct WorkspaceLocks {
    locks: Registry,
}

/// Exclusive access to one workspace until dropped
pub struct WorkspaceGuard {
    // Field order matters: the mutex is released before the entry is evicted.
    _guard: OwnedMutexGuard<()>,
    _release: Release,
}

/// Removes the registry entry once nobody else refers to it
struct Release {
    registry: Registry,
    workspace_id: String,
}

impl Drop for Release {
    fn drop(&mut self) {
        let mut locks = self.registry.lock();
        if locks
            .get(&self.workspace_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.workspace_id);
        }
    }
}

impl WorkspaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, workspace_id: &str) -> WorkspaceGuard {
        let lock = {
            let mut locks = self.locks.lock();
            locks
                .entry(workspace_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        // Created before the await so a cancelled waiter still cleans up.
        let release = Release {
            registry: self.locks.clone(),
            workspace_id: workspace_id.to_string(),
        };
        let guard = lock.lock_owned().await;
        WorkspaceGuard {
            _guard: guard,
            _release: release,
        }
    }

    /// Number of workspaces with an invocation running or waiting
    pub fn active_count(&self) -> usize {
        self.locks.lock().len()
    }
}
