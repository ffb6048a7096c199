//! Append-only, per-operative event stream with JSONL persistence.
//!
//! Each operative's raw entries live in their own on-disk JSONL file (one
//! line per [`StreamEntry`]) mirrored by an in-memory bounded ring. The ring
//! is indexed by logical sequence number rather than deque position, so
//! evicting the oldest entry never requires reindexing the rest — the same
//! trick an append-only run log elsewhere in this codebase uses.

use op_domain::entry::{ContentType, EntryRole, StreamEntry};
use op_domain::error::{Error, Result};
use op_domain::stream::BoxStream;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

/// Entries kept in memory per operative before the oldest is evicted.
/// Eviction only drops the in-memory copy; the JSONL file on disk is
/// never truncated.
const MAX_RING_LEN: usize = 2000;

/// Capacity of the change-notification broadcast channel. Slow subscribers
/// that fall this far behind silently miss notifications and must resync
/// by re-reading via `get_entries`.
const CHANGE_CHANNEL_CAPACITY: usize = 1024;

struct OperativeStream {
    ring: VecDeque<StreamEntry>,
    /// entry id -> seq. Stable across ring eviction, unlike a deque index.
    index: HashMap<String, u64>,
    /// seq of `ring.front()`, or `next_seq` when the ring is empty.
    base_seq: u64,
    next_seq: u64,
    /// seq of the most recent `compaction_summary` entry, if any.
    compacted_cursor: Option<u64>,
    log_path: PathBuf,
}

impl OperativeStream {
    fn deque_idx(&self, seq: u64) -> Option<usize> {
        if seq < self.base_seq {
            return None;
        }
        let idx = (seq - self.base_seq) as usize;
        (idx < self.ring.len()).then_some(idx)
    }

    /// Load an operative's stream from its JSONL file, or start a fresh one
    /// if no file exists yet.
    fn load(dir: &Path, operative_id: &str) -> Result<Self> {
        let log_path = dir.join(format!("{operative_id}.jsonl"));
        let mut ring = VecDeque::new();
        let mut index = HashMap::new();
        let mut next_seq: u64 = 0;
        let mut compacted_cursor: Option<u64> = None;

        if log_path.exists() {
            let file = std::fs::File::open(&log_path)?;
            let reader = std::io::BufReader::new(file);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let entry: StreamEntry = serde_json::from_str(&line)?;
                next_seq = entry.seq + 1;
                if entry.is_compaction_summary() {
                    compacted_cursor = Some(entry.seq);
                }
                ring.push_back(entry);
                if ring.len() > MAX_RING_LEN {
                    ring.pop_front();
                }
            }
            let base_seq = ring.front().map(|e| e.seq).unwrap_or(next_seq);
            for e in &ring {
                index.insert(e.id.clone(), e.seq);
            }
            return Ok(Self {
                ring,
                index,
                base_seq,
                next_seq,
                compacted_cursor,
                log_path,
            });
        }

        Ok(Self {
            ring,
            index,
            base_seq: 0,
            next_seq: 0,
            compacted_cursor,
            log_path,
        })
    }

    fn persist(&self, entry: &StreamEntry) -> Result<()> {
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        let line = serde_json::to_string(entry)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn push(&mut self, entry: StreamEntry) {
        if entry.is_compaction_summary() {
            self.compacted_cursor = Some(entry.seq);
        }
        self.index.insert(entry.id.clone(), entry.seq);
        self.ring.push_back(entry);
        if self.ring.len() > MAX_RING_LEN {
            self.ring.pop_front();
            self.base_seq += 1;
        }
    }

    fn compacted_view(&self) -> Vec<StreamEntry> {
        let start = self.compacted_cursor.unwrap_or(self.base_seq).max(self.base_seq);
        self.ring
            .iter()
            .filter(|e| e.seq >= start)
            .cloned()
            .collect()
    }
}

/// Stream store: one append-only sequence per operative, plus a shared
/// change-notification channel for `Subscribe`.
pub struct StreamStore {
    dir: PathBuf,
    streams: RwLock<HashMap<String, OperativeStream>>,
    change_tx: broadcast::Sender<String>,
}

impl StreamStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let (change_tx, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            dir: dir.into(),
            streams: RwLock::new(HashMap::new()),
            change_tx,
        }
    }

    fn ensure_loaded(&self, operative_id: &str) -> Result<()> {
        if self.streams.read().contains_key(operative_id) {
            return Ok(());
        }
        let loaded = OperativeStream::load(&self.dir, operative_id)?;
        self.streams
            .write()
            .entry(operative_id.to_string())
            .or_insert(loaded);
        Ok(())
    }

    /// Append a new entry. `seq` is assigned here and any caller-supplied
    /// `seq` on `entry` is overwritten — callers pass entries built with
    /// `seq = 0` as a placeholder.
    pub fn append(&self, operative_id: &str, mut entry: StreamEntry) -> Result<StreamEntry> {
        self.ensure_loaded(operative_id)?;
        let mut streams = self.streams.write();
        let op = streams
            .get_mut(operative_id)
            .expect("just loaded or inserted above");

        entry.operative_id = operative_id.to_string();
        entry.seq = op.next_seq;
        op.persist(&entry)?;
        op.next_seq += 1;
        op.push(entry.clone());
        drop(streams);

        // Best-effort: no subscribers is not an error.
        let _ = self.change_tx.send(operative_id.to_string());
        Ok(entry)
    }

    /// Convenience constructor for a plain text entry (user/assistant/system).
    pub fn append_text(
        &self,
        operative_id: &str,
        role: EntryRole,
        text: impl Into<String>,
        model: Option<String>,
    ) -> Result<StreamEntry> {
        let mut entry = StreamEntry::text(operative_id, 0, role, text);
        entry.model = model;
        self.append(operative_id, entry)
    }

    /// Entries in the compacted view, ascending by `seq`. When `limit > 0`,
    /// only the last `limit` entries of that view are returned.
    pub fn get_entries(&self, operative_id: &str, limit: usize) -> Result<Vec<StreamEntry>> {
        self.ensure_loaded(operative_id)?;
        let streams = self.streams.read();
        let op = streams
            .get(operative_id)
            .ok_or_else(|| Error::NotFound(format!("operative stream '{operative_id}'")))?;
        let mut view = op.compacted_view();
        if limit > 0 && view.len() > limit {
            view = view.split_off(view.len() - limit);
        }
        Ok(view)
    }

    /// Entries strictly after `after_id`, within the current compacted view.
    pub fn get_entries_after(&self, operative_id: &str, after_id: &str) -> Result<Vec<StreamEntry>> {
        self.ensure_loaded(operative_id)?;
        let streams = self.streams.read();
        let op = streams
            .get(operative_id)
            .ok_or_else(|| Error::NotFound(format!("operative stream '{operative_id}'")))?;
        let after_seq = *op
            .index
            .get(after_id)
            .ok_or_else(|| Error::NotFound(format!("entry '{after_id}'")))?;
        let start = op
            .compacted_cursor
            .unwrap_or(op.base_seq)
            .max(op.base_seq)
            .max(after_seq + 1);
        Ok(op.ring.iter().filter(|e| e.seq >= start).cloned().collect())
    }

    /// Append a `compaction_summary` entry, hiding everything before it from
    /// future `get_entries` calls.
    pub fn compact(&self, operative_id: &str, summary: serde_json::Value) -> Result<StreamEntry> {
        self.ensure_loaded(operative_id)?;
        let mut streams = self.streams.write();
        let op = streams
            .get_mut(operative_id)
            .expect("ensure_loaded just populated this key");

        let entry = StreamEntry {
            id: uuid::Uuid::new_v4().to_string(),
            operative_id: operative_id.to_string(),
            seq: op.next_seq,
            role: EntryRole::CompactionSummary,
            content_type: ContentType::Text,
            content: summary,
            model: None,
            timestamp: chrono::Utc::now(),
        };
        op.persist(&entry)?;
        op.next_seq += 1;
        op.push(entry.clone());
        drop(streams);

        let _ = self.change_tx.send(operative_id.to_string());
        Ok(entry)
    }

    /// Look up a single entry by id, if still present in the in-memory ring.
    pub fn get_entry(&self, operative_id: &str, entry_id: &str) -> Result<Option<StreamEntry>> {
        self.ensure_loaded(operative_id)?;
        let streams = self.streams.read();
        let op = streams
            .get(operative_id)
            .ok_or_else(|| Error::NotFound(format!("operative stream '{operative_id}'")))?;
        Ok(op
            .index
            .get(entry_id)
            .and_then(|&seq| op.deque_idx(seq))
            .map(|idx| op.ring[idx].clone()))
    }

    /// A lazy, non-replayable stream of operative-ids whose stream changed.
    /// Lagged subscribers silently skip missed notifications; they must
    /// resync by calling `get_entries` again.
    pub fn subscribe(&self) -> BoxStream<'static, String> {
        let mut rx = self.change_tx.subscribe();
        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(id) => yield id,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn tmp_store() -> (tempfile::TempDir, StreamStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StreamStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn append_assigns_sequential_seq() {
        let (_dir, store) = tmp_store();
        let e1 = store.append_text("op1", EntryRole::User, "hi", None).unwrap();
        let e2 = store
            .append_text("op1", EntryRole::Assistant, "hello", Some("gpt-4o".into()))
            .unwrap();
        assert_eq!(e1.seq, 0);
        assert_eq!(e2.seq, 1);
    }

    #[test]
    fn get_entries_returns_ascending_order() {
        let (_dir, store) = tmp_store();
        store.append_text("op1", EntryRole::User, "a", None).unwrap();
        store.append_text("op1", EntryRole::Assistant, "b", None).unwrap();
        store.append_text("op1", EntryRole::User, "c", None).unwrap();
        let entries = store.get_entries("op1", 0).unwrap();
        let texts: Vec<&str> = entries.iter().map(|e| e.as_text().unwrap()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn get_entries_limit_applies_within_compacted_view() {
        let (_dir, store) = tmp_store();
        for i in 0..5 {
            store
                .append_text("op1", EntryRole::User, format!("msg{i}"), None)
                .unwrap();
        }
        let entries = store.get_entries("op1", 2).unwrap();
        let texts: Vec<&str> = entries.iter().map(|e| e.as_text().unwrap()).collect();
        assert_eq!(texts, vec!["msg3", "msg4"]);
    }

    #[test]
    fn compact_hides_prior_entries() {
        let (_dir, store) = tmp_store();
        store.append_text("op1", EntryRole::User, "old1", None).unwrap();
        store.append_text("op1", EntryRole::Assistant, "old2", None).unwrap();
        store
            .compact("op1", serde_json::json!({"summary": "recap", "first_kept_entry_id": null}))
            .unwrap();
        store.append_text("op1", EntryRole::User, "new", None).unwrap();

        let entries = store.get_entries("op1", 0).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_compaction_summary());
        assert_eq!(entries[1].as_text(), Some("new"));
    }

    #[test]
    fn get_entries_after_excludes_up_to_and_including_marker() {
        let (_dir, store) = tmp_store();
        let e1 = store.append_text("op1", EntryRole::User, "a", None).unwrap();
        store.append_text("op1", EntryRole::Assistant, "b", None).unwrap();
        store.append_text("op1", EntryRole::User, "c", None).unwrap();
        let after = store.get_entries_after("op1", &e1.id).unwrap();
        let texts: Vec<&str> = after.iter().map(|e| e.as_text().unwrap()).collect();
        assert_eq!(texts, vec!["b", "c"]);
    }

    #[test]
    fn reloads_from_disk_including_compaction_cursor() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = StreamStore::new(dir.path());
            store.append_text("op1", EntryRole::User, "old", None).unwrap();
            store
                .compact("op1", serde_json::json!({"summary": "recap"}))
                .unwrap();
            store.append_text("op1", EntryRole::User, "new", None).unwrap();
        }
        let reopened = StreamStore::new(dir.path());
        let entries = reopened.get_entries("op1", 0).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_compaction_summary());
    }

    #[tokio::test]
    async fn subscribe_emits_operative_id_on_append() {
        let (_dir, store) = tmp_store();
        let mut sub = store.subscribe();
        store.append_text("op1", EntryRole::User, "hi", None).unwrap();
        let id = sub.next().await.unwrap();
        assert_eq!(id, "op1");
    }

    #[test]
    fn get_entries_after_unknown_id_is_not_found() {
        let (_dir, store) = tmp_store();
        store.append_text("op1", EntryRole::User, "a", None).unwrap();
        let err = store.get_entries_after("op1", "nonexistent").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
