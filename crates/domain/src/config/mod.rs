mod compaction;
mod llm;
mod sandbox;
mod stores;

pub use compaction::CompactionConfig;
pub use llm::{AuthConfig, AuthMode, LlmConfig, ProviderConfig, ProviderKind};
pub use sandbox::SandboxConfig;
pub use stores::StoresConfig;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub stores: StoresConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    /// `LOG_LEVEL` / `RUST_LOG` filter directive, e.g. `"info"`.
    #[serde(default = "d_log_level")]
    pub log_level: String,
}

fn d_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load a TOML file (if present) and merge environment overrides on top.
    pub fn load(path: Option<&Path>) -> crate::error::Result<Self> {
        let mut cfg: Config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)?;
                toml::from_str(&raw)
                    .map_err(|e| crate::error::Error::Config(format!("invalid TOML at {}: {e}", p.display())))?
            }
            _ => Config::default(),
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(path) = std::env::var("STREAM_STORE_PATH") {
            self.stores.stream_store_path = path;
        }
        if let Ok(path) = std::env::var("OPERATIVES_STORE_PATH") {
            self.stores.operatives_store_path = path;
        }
        if let Ok(path) = std::env::var("NOTES_STORE_PATH") {
            self.stores.notes_store_path = path;
        }
        if let Ok(host) = std::env::var("SANDBOX_DOCKER_HOST") {
            self.sandbox.docker_host = Some(host);
        }
    }

    /// Validate every field, collecting every problem instead of failing on
    /// the first one. `Error`-severity problems prevent startup; `Warning`
    /// ones are logged and startup continues.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.sandbox.namespace.trim().is_empty() {
            errors.push(ConfigError::error("sandbox.namespace", "must not be empty"));
        }
        if self.sandbox.reconcile_interval_ms == 0 {
            errors.push(ConfigError::error("sandbox.reconcile_interval_ms", "must be > 0"));
        }
        if self.sandbox.health_window_ms == 0 {
            errors.push(ConfigError::error("sandbox.health_window_ms", "must be > 0"));
        }
        if self.sandbox.health_poll_ms == 0 {
            errors.push(ConfigError::error("sandbox.health_poll_ms", "must be > 0"));
        }
        if self.sandbox.health_poll_ms > self.sandbox.health_window_ms {
            errors.push(ConfigError::warning(
                "sandbox.health_poll_ms",
                "exceeds health_window_ms; the health probe will never have a chance to retry",
            ));
        }

        if self.stores.stream_store_path.trim().is_empty() {
            errors.push(ConfigError::error("stores.stream_store_path", "must not be empty"));
        }
        if self.stores.operatives_store_path.trim().is_empty() {
            errors.push(ConfigError::error("stores.operatives_store_path", "must not be empty"));
        }
        if self.stores.notes_store_path.trim().is_empty() {
            errors.push(ConfigError::error("stores.notes_store_path", "must not be empty"));
        }

        if !(0.0..=1.0).contains(&self.compaction.default_threshold) {
            errors.push(ConfigError::error(
                "compaction.default_threshold",
                "must be within [0, 1]",
            ));
        }

        if self.llm.providers.is_empty() {
            errors.push(ConfigError::warning(
                "llm.providers",
                "no providers configured; model calls will fail until at least one is added",
            ));
        }

        let mut seen_ids = HashSet::new();
        for (i, pc) in self.llm.providers.iter().enumerate() {
            let field = format!("llm.providers[{i}]");
            if pc.id.trim().is_empty() {
                errors.push(ConfigError::error(format!("{field}.id"), "must not be empty"));
            } else if !seen_ids.insert(pc.id.clone()) {
                errors.push(ConfigError::error(format!("{field}.id"), format!("duplicate provider id '{}'", pc.id)));
            }

            match pc.auth.mode {
                AuthMode::ApiKey | AuthMode::QueryParam => {
                    if pc.auth.key.is_none() && pc.auth.env.is_none() && pc.auth.keys.is_empty() {
                        errors.push(ConfigError::error(
                            format!("{field}.auth"),
                            "mode requires one of 'key', 'env', or 'keys'",
                        ));
                    }
                    if pc.auth.key.is_some() {
                        errors.push(ConfigError::warning(
                            format!("{field}.auth.key"),
                            "plaintext API key in config; prefer 'env'",
                        ));
                    }
                }
                AuthMode::None => {}
            }

            if let Some(ref url) = pc.base_url {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    errors.push(ConfigError::error(format!("{field}.base_url"), "must start with http:// or https://"));
                }
            }
        }

        errors
    }

    pub fn has_fatal_errors(errors: &[ConfigError]) -> bool {
        errors.iter().any(|e| e.severity == ConfigSeverity::Error)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            llm: LlmConfig {
                providers: vec![ProviderConfig {
                    id: "openai".into(),
                    kind: ProviderKind::OpenaiCompat,
                    base_url: Some("https://api.openai.com/v1".into()),
                    auth: AuthConfig {
                        env: Some("OPENAI_API_KEY".into()),
                        ..Default::default()
                    },
                    default_model: Some("gpt-4o".into()),
                }],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn find_issue<'a>(errors: &'a [ConfigError], field: &str) -> Option<&'a ConfigError> {
        errors.iter().find(|e| e.field == field)
    }

    #[test]
    fn valid_config_has_no_errors() {
        let errors = valid_config().validate();
        assert!(!Config::has_fatal_errors(&errors), "unexpected errors: {errors:?}");
    }

    #[test]
    fn empty_namespace_is_error() {
        let mut cfg = valid_config();
        cfg.sandbox.namespace = "".into();
        let errors = cfg.validate();
        let issue = find_issue(&errors, "sandbox.namespace").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn zero_reconcile_interval_is_error() {
        let mut cfg = valid_config();
        cfg.sandbox.reconcile_interval_ms = 0;
        let errors = cfg.validate();
        assert!(find_issue(&errors, "sandbox.reconcile_interval_ms").is_some());
    }

    #[test]
    fn threshold_out_of_range_is_error() {
        let mut cfg = valid_config();
        cfg.compaction.default_threshold = 1.5;
        let errors = cfg.validate();
        assert!(find_issue(&errors, "compaction.default_threshold").is_some());
    }

    #[test]
    fn no_providers_is_warning_not_error() {
        let mut cfg = valid_config();
        cfg.llm.providers.clear();
        let errors = cfg.validate();
        let issue = find_issue(&errors, "llm.providers").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Warning);
        assert!(!Config::has_fatal_errors(&errors));
    }

    #[test]
    fn duplicate_provider_ids_is_error() {
        let mut cfg = valid_config();
        let dup = cfg.llm.providers[0].clone();
        cfg.llm.providers.push(dup);
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field.ends_with(".id") && e.severity == ConfigSeverity::Error));
    }

    #[test]
    fn missing_auth_source_is_error() {
        let mut cfg = valid_config();
        cfg.llm.providers[0].auth = AuthConfig::default();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field.ends_with(".auth")));
    }

    #[test]
    fn plaintext_key_is_warning() {
        let mut cfg = valid_config();
        cfg.llm.providers[0].auth.key = Some("sk-plain".into());
        let errors = cfg.validate();
        let issue = find_issue(&errors, "llm.providers[0].auth.key").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn bad_base_url_scheme_is_error() {
        let mut cfg = valid_config();
        cfg.llm.providers[0].base_url = Some("ftp://example.com".into());
        let errors = cfg.validate();
        assert!(find_issue(&errors, "llm.providers[0].base_url").is_some());
    }

    #[test]
    fn display_format_matches_tag_field_message() {
        let err = ConfigError::error("x.y", "bad thing");
        assert_eq!(err.to_string(), "[ERROR] x.y: bad thing");
    }

    #[test]
    fn empty_store_path_is_error() {
        let mut cfg = valid_config();
        cfg.stores.stream_store_path = "".into();
        let errors = cfg.validate();
        assert!(find_issue(&errors, "stores.stream_store_path").is_some());
    }
}
