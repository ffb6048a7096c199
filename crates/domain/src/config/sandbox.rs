use serde::{Deserialize, Serialize};

/// Configuration for the sandbox lifecycle manager (§4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Label value written as `operative.managed-by=<namespace>`; also used
    /// to filter the reconciler's container-list calls.
    #[serde(default = "d_namespace")]
    pub namespace: String,
    #[serde(default = "d_reconcile_interval_ms")]
    pub reconcile_interval_ms: u64,
    #[serde(default = "d_health_window_ms")]
    pub health_window_ms: u64,
    #[serde(default = "d_health_poll_ms")]
    pub health_poll_ms: u64,
    /// Docker daemon socket/host. Defaults to the local Unix socket.
    #[serde(default)]
    pub docker_host: Option<String>,
    /// Image reference used to start new sandbox containers.
    #[serde(default = "d_image")]
    pub image: String,
}

fn d_namespace() -> String {
    "operative-engine".into()
}
fn d_reconcile_interval_ms() -> u64 {
    5_000
}
fn d_health_window_ms() -> u64 {
    120_000
}
fn d_health_poll_ms() -> u64 {
    1_000
}
fn d_image() -> String {
    "operative-sandbox:latest".into()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            namespace: d_namespace(),
            reconcile_interval_ms: d_reconcile_interval_ms(),
            health_window_ms: d_health_window_ms(),
            health_poll_ms: d_health_poll_ms(),
            docker_host: None,
            image: d_image(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.reconcile_interval_ms, 5_000);
        assert_eq!(cfg.health_window_ms, 120_000);
        assert_eq!(cfg.health_poll_ms, 1_000);
    }
}
