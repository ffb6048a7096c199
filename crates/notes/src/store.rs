//! JSON-file-backed note store, keyed by `operative_id` then `note_id`.
//!
//! Mirrors the operative store's "single file, whole-map persist" pattern;
//! note volume per operative is expected to be small.

use crate::vector::{NullVectorIndex, VectorIndex};
use op_domain::error::{Error, Result};
use op_domain::note::{Note, NoteSummary};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

pub struct NoteStore {
    path: PathBuf,
    /// operative_id -> note_id -> Note.
    notes: RwLock<HashMap<String, HashMap<String, Note>>>,
    vector_index: Arc<dyn VectorIndex>,
}

impl NoteStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_vector_index(path, Arc::new(NullVectorIndex))
    }

    pub fn with_vector_index(path: impl Into<PathBuf>, vector_index: Arc<dyn VectorIndex>) -> Result<Self> {
        let path = path.into();
        let notes = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(
            operatives = notes.len(),
            path = %path.display(),
            "note store loaded"
        );

        Ok(Self {
            path,
            notes: RwLock::new(notes),
            vector_index,
        })
    }

    fn persist(&self, notes: &HashMap<String, HashMap<String, Note>>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(notes)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, raw)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn create(&self, note: Note) -> Result<Note> {
        let mut notes = self.notes.write();
        notes
            .entry(note.operative_id.clone())
            .or_default()
            .insert(note.id.clone(), note.clone());
        self.persist(&notes)?;
        Ok(note)
    }

    pub fn get(&self, operative_id: &str, note_id: &str) -> Result<Note> {
        self.notes
            .read()
            .get(operative_id)
            .and_then(|m| m.get(note_id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("note '{note_id}' for operative '{operative_id}'")))
    }

    pub fn list_notes(&self, operative_id: &str) -> Vec<NoteSummary> {
        let notes = self.notes.read();
        let mut summaries: Vec<NoteSummary> = notes
            .get(operative_id)
            .map(|m| m.values().map(NoteSummary::from).collect())
            .unwrap_or_default();
        summaries.sort_by(|a, b| a.title.cmp(&b.title));
        summaries
    }

    pub fn update(&self, operative_id: &str, note_id: &str, title: Option<String>, content: Option<String>) -> Result<Note> {
        let mut notes = self.notes.write();
        let note = notes
            .get_mut(operative_id)
            .and_then(|m| m.get_mut(note_id))
            .ok_or_else(|| Error::NotFound(format!("note '{note_id}' for operative '{operative_id}'")))?;

        if let Some(title) = title {
            note.title = title;
        }
        if let Some(content) = content {
            note.content = content;
        }
        note.updated_at = chrono::Utc::now();
        let updated = note.clone();
        self.persist(&notes)?;
        Ok(updated)
    }

    pub fn delete(&self, operative_id: &str, note_id: &str) -> Result<()> {
        let mut notes = self.notes.write();
        let removed = notes
            .get_mut(operative_id)
            .and_then(|m| m.remove(note_id))
            .is_some();
        if !removed {
            return Err(Error::NotFound(format!("note '{note_id}' for operative '{operative_id}'")));
        }
        self.persist(&notes)?;
        Ok(())
    }

    /// Case-insensitive substring match against title and content.
    pub fn keyword_search(&self, operative_id: &str, query: &str) -> Vec<NoteSummary> {
        let notes = self.notes.read();
        let mut hits: Vec<NoteSummary> = notes
            .get(operative_id)
            .map(|m| {
                m.values()
                    .filter(|n| n.matches_keyword(query))
                    .map(NoteSummary::from)
                    .collect()
            })
            .unwrap_or_default();
        hits.sort_by(|a, b| a.title.cmp(&b.title));
        hits
    }

    /// Semantic search, delegated to the registered `VectorIndex`. Returns
    /// `Error::Unavailable` when no real implementation is configured.
    pub fn vector_search(&self, operative_id: &str, query: &str) -> Result<Vec<NoteSummary>> {
        let notes = self.notes.read();
        let candidates: Vec<Note> = notes
            .get(operative_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        drop(notes);
        self.vector_index.search(operative_id, query, &candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_store() -> (tempfile::TempDir, NoteStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");
        let store = NoteStore::new(path).unwrap();
        (dir, store)
    }

    #[test]
    fn create_and_get_roundtrips() {
        let (_dir, store) = tmp_store();
        let note = Note::new("op1", "Deploy Runbook", "kubectl apply -f deploy.yaml");
        let id = note.id.clone();
        store.create(note).unwrap();
        let fetched = store.get("op1", &id).unwrap();
        assert_eq!(fetched.title, "Deploy Runbook");
    }

    #[test]
    fn notes_are_scoped_per_operative() {
        let (_dir, store) = tmp_store();
        store.create(Note::new("op1", "a", "x")).unwrap();
        let note_op2 = Note::new("op2", "b", "y");
        let id_op2 = note_op2.id.clone();
        store.create(note_op2).unwrap();

        assert!(store.get("op1", &id_op2).is_err());
        assert_eq!(store.list_notes("op1").len(), 1);
        assert_eq!(store.list_notes("op2").len(), 1);
    }

    #[test]
    fn keyword_search_is_case_insensitive_substring() {
        let (_dir, store) = tmp_store();
        store
            .create(Note::new("op1", "Deploy Runbook", "kubectl apply -f deploy.yaml"))
            .unwrap();
        store.create(Note::new("op1", "Unrelated", "nothing here")).unwrap();

        let hits = store.keyword_search("op1", "RUNBOOK");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Deploy Runbook");
    }

    #[test]
    fn vector_search_defaults_to_unavailable() {
        let (_dir, store) = tmp_store();
        store.create(Note::new("op1", "a", "x")).unwrap();
        let err = store.vector_search("op1", "x").unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[test]
    fn update_partial_fields() {
        let (_dir, store) = tmp_store();
        let note = Note::new("op1", "Title", "Content");
        let id = note.id.clone();
        store.create(note).unwrap();
        let updated = store.update("op1", &id, Some("New Title".into()), None).unwrap();
        assert_eq!(updated.title, "New Title");
        assert_eq!(updated.content, "Content");
    }

    #[test]
    fn delete_removes_note() {
        let (_dir, store) = tmp_store();
        let note = Note::new("op1", "Title", "Content");
        let id = note.id.clone();
        store.create(note).unwrap();
        store.delete("op1", &id).unwrap();
        assert!(store.get("op1", &id).is_err());
    }

    #[test]
    fn delete_unknown_note_is_not_found() {
        let (_dir, store) = tmp_store();
        let err = store.delete("op1", "nonexistent").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
