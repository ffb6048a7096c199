//! JSON-file-backed operative store.
//!
//! Operative count is expected to be small relative to stream volume, so
//! unlike the stream store this persists the whole map to a single file on
//! every mutation rather than one file per id.

use op_domain::error::{Error, Result};
use op_domain::operative::Operative;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;

pub struct OperativeStore {
    path: PathBuf,
    operatives: RwLock<HashMap<String, Operative>>,
}

impl OperativeStore {
    /// Load the store from `path`, or start empty if the file does not
    /// exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let operatives = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(
            count = operatives.len(),
            path = %path.display(),
            "operative store loaded"
        );

        Ok(Self {
            path,
            operatives: RwLock::new(operatives),
        })
    }

    fn persist(&self, operatives: &HashMap<String, Operative>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(operatives)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, raw)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn create(&self, operative: Operative) -> Result<Operative> {
        let mut operatives = self.operatives.write();
        if operatives.contains_key(&operative.id) {
            return Err(Error::Conflict(format!(
                "operative '{}' already exists",
                operative.id
            )));
        }
        operatives.insert(operative.id.clone(), operative.clone());
        self.persist(&operatives)?;
        Ok(operative)
    }

    pub fn get(&self, id: &str) -> Result<Operative> {
        self.operatives
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("operative '{id}'")))
    }

    /// The authoritative set of operative ids, consumed by the sandbox
    /// reconciler to decide which sandboxes should exist.
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.operatives.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn list(&self) -> Vec<Operative> {
        let mut all: Vec<Operative> = self.operatives.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Update the admin and/or self-editable instructions for an operative.
    /// Either field may be left unchanged by passing `None`.
    pub fn update_instructions(
        &self,
        id: &str,
        admin_instructions: Option<String>,
        operative_instructions: Option<String>,
    ) -> Result<Operative> {
        let mut operatives = self.operatives.write();
        let op = operatives
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("operative '{id}'")))?;

        if let Some(admin) = admin_instructions {
            op.admin_instructions = admin;
        }
        if let Some(self_instructions) = operative_instructions {
            op.operative_instructions = self_instructions;
        }
        op.updated_at = chrono::Utc::now();
        let updated = op.clone();
        self.persist(&operatives)?;
        Ok(updated)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let mut operatives = self.operatives.write();
        if operatives.remove(id).is_none() {
            return Err(Error::NotFound(format!("operative '{id}'")));
        }
        self.persist(&operatives)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_store() -> (tempfile::TempDir, OperativeStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("operatives.json");
        let store = OperativeStore::new(path).unwrap();
        (dir, store)
    }

    #[test]
    fn create_and_get_roundtrips() {
        let (_dir, store) = tmp_store();
        let op = Operative::new("op1", "demo", "be helpful", "openai/gpt-4o");
        store.create(op).unwrap();
        let fetched = store.get("op1").unwrap();
        assert_eq!(fetched.name, "demo");
    }

    #[test]
    fn create_duplicate_id_is_conflict() {
        let (_dir, store) = tmp_store();
        store
            .create(Operative::new("op1", "demo", "be helpful", "openai/gpt-4o"))
            .unwrap();
        let err = store
            .create(Operative::new("op1", "demo2", "be helpful", "openai/gpt-4o"))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn update_instructions_partial_update() {
        let (_dir, store) = tmp_store();
        store
            .create(Operative::new("op1", "demo", "admin text", "openai/gpt-4o"))
            .unwrap();
        let updated = store
            .update_instructions("op1", None, Some("self text".into()))
            .unwrap();
        assert_eq!(updated.admin_instructions, "admin text");
        assert_eq!(updated.operative_instructions, "self text");
    }

    #[test]
    fn list_ids_is_sorted() {
        let (_dir, store) = tmp_store();
        store
            .create(Operative::new("b", "b", "x", "openai/gpt-4o"))
            .unwrap();
        store
            .create(Operative::new("a", "a", "x", "openai/gpt-4o"))
            .unwrap();
        assert_eq!(store.list_ids(), vec!["a", "b"]);
    }

    #[test]
    fn delete_removes_operative() {
        let (_dir, store) = tmp_store();
        store
            .create(Operative::new("op1", "demo", "x", "openai/gpt-4o"))
            .unwrap();
        store.delete("op1").unwrap();
        assert!(matches!(store.get("op1").unwrap_err(), Error::NotFound(_)));
    }

    #[test]
    fn reload_from_disk_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("operatives.json");
        {
            let store = OperativeStore::new(&path).unwrap();
            store
                .create(Operative::new("op1", "demo", "x", "openai/gpt-4o"))
                .unwrap();
        }
        let reopened = OperativeStore::new(&path).unwrap();
        assert_eq!(reopened.get("op1").unwrap().name, "demo");
    }
}
