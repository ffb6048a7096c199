use serde::{Deserialize, Serialize};

/// Configuration for the LLM provider layer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default = "d_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Default model used for compaction when an operative does not
    /// override `compaction_model`.
    #[serde(default)]
    pub default_compaction_model: Option<String>,
}

fn d_timeout_ms() -> u64 {
    20_000
}
fn d_max_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiCompat,
    Google,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Header name to carry the resolved key. Defaults to `Authorization`.
    #[serde(default)]
    pub header: Option<String>,
    /// Prefix prepended to the key when placed in the header (e.g. `"Bearer "`).
    #[serde(default)]
    pub prefix: Option<String>,
    /// Environment variable name to resolve the key from.
    #[serde(default)]
    pub env: Option<String>,
    /// Plaintext key (discouraged; config-validation emits a warning).
    #[serde(default)]
    pub key: Option<String>,
    /// Multiple env var names, rotated round-robin by `AuthRotator`.
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ApiKey,
    QueryParam,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_config_defaults_apply() {
        let json = "{}";
        let cfg: LlmConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.default_timeout_ms, 20_000);
        assert_eq!(cfg.max_retries, 2);
        assert!(cfg.providers.is_empty());
    }

    #[test]
    fn provider_kind_roundtrips() {
        let kind = ProviderKind::OpenaiCompat;
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, "\"openai_compat\"");
    }
}
