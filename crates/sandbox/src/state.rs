//! In-memory container-state cache.
//!
//! This cache is advisory only. It is rebuilt from the container runtime's
//! label listing on every reconciler tick and is never treated as
//! authoritative over a fresh query — there is no separate sandbox database.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Starting,
    Running,
    Restarting,
    Stopping,
}

#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub container_id: String,
    /// `host:port` the wire protocol is reachable on.
    pub host_endpoint: String,
    pub state: SandboxState,
    pub last_health_check: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct ContainerCache {
    inner: RwLock<HashMap<String, ContainerInfo>>,
}

impl ContainerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, operative_id: &str) -> Option<ContainerInfo> {
        self.inner.read().get(operative_id).cloned()
    }

    pub fn insert(&self, operative_id: impl Into<String>, info: ContainerInfo) {
        self.inner.write().insert(operative_id.into(), info);
    }

    pub fn remove(&self, operative_id: &str) {
        self.inner.write().remove(operative_id);
    }

    /// Replace the entire cache with a freshly-observed snapshot.
    pub fn replace(&self, snapshot: HashMap<String, ContainerInfo>) {
        *self.inner.write() = snapshot;
    }

    pub fn snapshot(&self) -> HashMap<String, ContainerInfo> {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_roundtrips() {
        let cache = ContainerCache::new();
        cache.insert(
            "op1",
            ContainerInfo {
                container_id: "c1".into(),
                host_endpoint: "127.0.0.1:9000".into(),
                state: SandboxState::Running,
                last_health_check: None,
            },
        );
        let info = cache.get("op1").unwrap();
        assert_eq!(info.container_id, "c1");
    }

    #[test]
    fn replace_drops_stale_entries() {
        let cache = ContainerCache::new();
        cache.insert(
            "stale",
            ContainerInfo {
                container_id: "c0".into(),
                host_endpoint: "x".into(),
                state: SandboxState::Running,
                last_health_check: None,
            },
        );
        cache.replace(HashMap::new());
        assert!(cache.get("stale").is_none());
    }
}
