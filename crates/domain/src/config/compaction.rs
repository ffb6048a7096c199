use serde::{Deserialize, Serialize};

/// Configuration for the compaction engine (§4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Fraction of `model.max_tokens` at which compaction is requested,
    /// used as an operative's default when it doesn't set its own.
    #[serde(default = "d_threshold")]
    pub default_threshold: f32,
    #[serde(default)]
    pub default_compaction_model: Option<String>,
}

fn d_threshold() -> f32 {
    0.6
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            default_threshold: d_threshold(),
            default_compaction_model: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_is_point_six() {
        assert_eq!(CompactionConfig::default().default_threshold, 0.6);
    }
}
