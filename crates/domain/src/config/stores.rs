use serde::{Deserialize, Serialize};

/// On-disk locations for the three JSON/JSONL-backed stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoresConfig {
    #[serde(default = "d_stream_path")]
    pub stream_store_path: String,
    #[serde(default = "d_operatives_path")]
    pub operatives_store_path: String,
    #[serde(default = "d_notes_path")]
    pub notes_store_path: String,
}

fn d_stream_path() -> String {
    "./data/stream".into()
}
fn d_operatives_path() -> String {
    "./data/operatives.json".into()
}
fn d_notes_path() -> String {
    "./data/notes.json".into()
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            stream_store_path: d_stream_path(),
            operatives_store_path: d_operatives_path(),
            notes_store_path: d_notes_path(),
        }
    }
}
