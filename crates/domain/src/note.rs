use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A per-operative note. Not subject to compaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub operative_id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new(operative_id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operative_id: operative_id.into(),
            title: title.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Case-insensitive substring match against title or content.
    pub fn matches_keyword(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.title.to_lowercase().contains(&q) || self.content.to_lowercase().contains(&q)
    }
}

/// A lightweight search hit returned by keyword/vector search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteSummary {
    pub id: String,
    pub title: String,
}

impl From<&Note> for NoteSummary {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_keyword_is_case_insensitive() {
        let note = Note::new("op1", "Deploy Runbook", "kubectl apply -f deploy.yaml");
        assert!(note.matches_keyword("RUNBOOK"));
        assert!(note.matches_keyword("kubectl"));
        assert!(!note.matches_keyword("terraform"));
    }
}
