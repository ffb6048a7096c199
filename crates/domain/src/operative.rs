use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A long-running agent identity: configuration, stream, sandbox, and notes
/// are all keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operative {
    pub id: String,
    pub name: String,
    /// Immutable to the operative itself; only an admin may change this.
    pub admin_instructions: String,
    /// Self-editable via the `update_instructions` tool.
    pub operative_instructions: String,
    /// Provider-qualified model identifier, e.g. `"openai/gpt-4o"`.
    pub model: String,
    /// Model used for compaction summaries. Falls back to `model` if unset.
    #[serde(default)]
    pub compaction_model: Option<String>,
    /// Fraction of the model's input-token budget at which compaction fires.
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn default_compaction_threshold() -> f32 {
    0.6
}

impl Operative {
    pub fn new(id: impl Into<String>, name: impl Into<String>, admin_instructions: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            admin_instructions: admin_instructions.into(),
            operative_instructions: String::new(),
            model: model.into(),
            compaction_model: None,
            compaction_threshold: default_compaction_threshold(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn effective_compaction_model(&self) -> &str {
        self.compaction_model.as_deref().unwrap_or(&self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_operative_has_default_threshold() {
        let op = Operative::new("op1", "demo", "be helpful", "openai/gpt-4o");
        assert_eq!(op.compaction_threshold, 0.6);
        assert_eq!(op.effective_compaction_model(), "openai/gpt-4o");
    }

    #[test]
    fn compaction_model_override_takes_precedence() {
        let mut op = Operative::new("op1", "demo", "be helpful", "openai/gpt-4o");
        op.compaction_model = Some("openai/gpt-4o-mini".into());
        assert_eq!(op.effective_compaction_model(), "openai/gpt-4o-mini");
    }
}
