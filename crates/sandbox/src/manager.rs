//! Sandbox lifecycle manager.
//!
//! Maintains exactly one running container per known operative id by
//! periodically reconciling the operative store's canonical id set against
//! the Docker Engine API, and routes `run_ipython_cell` executions over a
//! newline-delimited JSON channel to whichever container currently serves
//! that operative.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions,
};
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use futures_util::{SinkExt, StreamExt};
use op_domain::config::SandboxConfig;
use op_domain::entry::EntryRole;
use op_domain::error::{Error, Result};
use op_operatives::OperativeStore;
use op_stream::StreamStore;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

use crate::delegate::RunCellDelegate;
use crate::state::{ContainerCache, ContainerInfo, SandboxState};
use crate::wire::{CellOutcome, HostMessage, SandboxMessage};

const MANAGED_BY_LABEL: &str = "operative.managed-by";
const OPERATIVE_ID_LABEL: &str = "operative.id";
const SANDBOX_PORT: u16 = 8765;

pub struct SandboxManager {
    docker: Docker,
    config: SandboxConfig,
    cache: ContainerCache,
    operatives: Arc<OperativeStore>,
    stream: Arc<StreamStore>,
}

impl SandboxManager {
    pub fn new(
        config: SandboxConfig,
        operatives: Arc<OperativeStore>,
        stream: Arc<StreamStore>,
    ) -> Result<Self> {
        let docker = match &config.docker_host {
            Some(host) => Docker::connect_with_http(host, 30, bollard::API_DEFAULT_VERSION)?,
            None => Docker::connect_with_local_defaults()?,
        };
        Ok(Self {
            docker,
            config,
            cache: ContainerCache::new(),
            operatives,
            stream,
        })
    }

    fn label_filter(&self) -> HashMap<String, Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![format!("{MANAGED_BY_LABEL}={}", self.config.namespace)],
        );
        filters
    }

    /// Spawns the reconciliation loop as a long-lived task. The returned
    /// handle's cancellation is the caller's responsibility (e.g. via a
    /// root `CancellationToken` aborting the task on shutdown).
    pub fn spawn_reconciler(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let base_interval = self.config.reconcile_interval_ms;
        tokio::spawn(async move {
            loop {
                if let Err(err) = self.reconcile_once().await {
                    tracing::warn!(error = %err, "sandbox reconciliation tick failed");
                }
                let jitter = rand::random::<u64>() % (base_interval / 4 + 1);
                tokio::time::sleep(Duration::from_millis(base_interval + jitter)).await;
            }
        })
    }

    /// One reconciliation pass: diff the canonical operative id set against
    /// the containers currently reported by the runtime, then start, stop,
    /// or restart as needed.
    pub async fn reconcile_once(&self) -> Result<()> {
        let canonical: std::collections::HashSet<String> =
            self.operatives.list_ids().into_iter().collect();

        let observed = self.list_managed_containers().await?;
        let observed_ids: std::collections::HashSet<String> =
            observed.keys().cloned().collect();

        self.cache.replace(observed.clone());

        for id in canonical.difference(&observed_ids) {
            tracing::info!(operative_id = %id, "starting sandbox container");
            if let Err(err) = self.start_container(id).await {
                tracing::warn!(operative_id = %id, error = %err, "failed to start sandbox container");
            }
        }

        for id in observed_ids.difference(&canonical) {
            tracing::info!(operative_id = %id, "stopping orphaned sandbox container");
            if let Err(err) = self.stop_container(id).await {
                tracing::warn!(operative_id = %id, error = %err, "failed to stop sandbox container");
            }
        }

        for id in canonical.intersection(&observed_ids) {
            let healthy = self.health_check(id).await;
            if !healthy {
                tracing::warn!(operative_id = %id, "sandbox failed health check, restarting");
                self.restart_container(id).await?;
            }
        }

        Ok(())
    }

    async fn list_managed_containers(&self) -> Result<HashMap<String, ContainerInfo>> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters: self.label_filter(),
                ..Default::default()
            }))
            .await?;

        let mut by_operative = HashMap::new();
        for c in containers {
            let Some(labels) = c.labels.as_ref() else { continue };
            let Some(operative_id) = labels.get(OPERATIVE_ID_LABEL) else { continue };
            let Some(container_id) = c.id.clone() else { continue };
            let state = match c.state.as_deref() {
                Some("running") => SandboxState::Running,
                _ => SandboxState::Restarting,
            };
            let host_endpoint = self.host_endpoint(&container_id).await.unwrap_or_default();
            by_operative.insert(
                operative_id.clone(),
                ContainerInfo {
                    container_id,
                    host_endpoint,
                    state,
                    last_health_check: None,
                },
            );
        }
        Ok(by_operative)
    }

    async fn host_endpoint(&self, container_id: &str) -> Result<String> {
        let details = self.docker.inspect_container(container_id, None).await?;
        let port_str = format!("{SANDBOX_PORT}/tcp");
        let host_port = details
            .network_settings
            .as_ref()
            .and_then(|n| n.ports.as_ref())
            .and_then(|p| p.get(&port_str))
            .and_then(|bindings| bindings.as_ref())
            .and_then(|bindings| bindings.first())
            .and_then(|b| b.host_port.clone())
            .ok_or_else(|| Error::Unavailable(format!("no published port for {container_id}")))?;
        Ok(format!("127.0.0.1:{host_port}"))
    }

    async fn start_container(&self, operative_id: &str) -> Result<()> {
        let name = container_name(&self.config.namespace, operative_id);
        let mut labels = HashMap::new();
        labels.insert(OPERATIVE_ID_LABEL.to_string(), operative_id.to_string());
        labels.insert(MANAGED_BY_LABEL.to_string(), self.config.namespace.clone());

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            format!("{SANDBOX_PORT}/tcp"),
            Some(vec![PortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: None,
            }]),
        );

        let config = ContainerConfig {
            image: Some(self.config.image.clone()),
            labels: Some(labels),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                publish_all_ports: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                config,
            )
            .await?;
        self.docker
            .start_container(&name, None::<StartContainerOptions<String>>)
            .await?;

        self.cache.insert(
            operative_id,
            ContainerInfo {
                container_id: name.clone(),
                host_endpoint: String::new(),
                state: SandboxState::Starting,
                last_health_check: None,
            },
        );

        self.stream.append_text(
            operative_id,
            EntryRole::System,
            "sandbox was started",
            None,
        )?;
        self.wait_until_ready(operative_id, &name).await
    }

    async fn wait_until_ready(&self, operative_id: &str, container_name: &str) -> Result<()> {
        let deadline = Duration::from_millis(self.config.health_window_ms);
        let poll = Duration::from_millis(self.config.health_poll_ms);
        let start = tokio::time::Instant::now();

        while start.elapsed() < deadline {
            if let Ok(endpoint) = self.host_endpoint(container_name).await {
                if TcpStream::connect(&endpoint).await.is_ok() {
                    if let Some(mut info) = self.cache.get(operative_id) {
                        info.host_endpoint = endpoint;
                        info.state = SandboxState::Running;
                        info.last_health_check = Some(chrono::Utc::now());
                        self.cache.insert(operative_id, info);
                    }
                    return Ok(());
                }
            }
            tokio::time::sleep(poll).await;
        }

        self.stream.append_text(
            operative_id,
            EntryRole::System,
            "sandbox failed to become healthy within the startup window",
            None,
        )?;
        Err(Error::Unavailable(format!(
            "sandbox for '{operative_id}' did not become ready"
        )))
    }

    async fn health_check(&self, operative_id: &str) -> bool {
        let Some(info) = self.cache.get(operative_id) else {
            return false;
        };
        if info.host_endpoint.is_empty() {
            return false;
        }
        tokio::time::timeout(
            Duration::from_millis(self.config.health_poll_ms),
            TcpStream::connect(&info.host_endpoint),
        )
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false)
    }

    async fn restart_container(&self, operative_id: &str) -> Result<()> {
        self.stream.append_text(
            operative_id,
            EntryRole::System,
            "sandbox is restarting: in-memory interpreter state will be lost and any \
             background processes it started will be terminated",
            None,
        )?;
        self.stop_container(operative_id).await?;
        self.start_container(operative_id).await
    }

    async fn stop_container(&self, operative_id: &str) -> Result<()> {
        let Some(info) = self.cache.get(operative_id) else {
            return Ok(());
        };
        let _ = self
            .docker
            .remove_container(
                &info.container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
        self.cache.remove(operative_id);
        Ok(())
    }

    /// Run one cell of code against the operative's sandbox, forwarding
    /// `PromptModel`/`PromptSelf` callbacks to `delegate` in emission order.
    pub async fn run_cell(
        &self,
        operative_id: &str,
        code: &str,
        delegate: &dyn RunCellDelegate,
    ) -> Result<CellOutcome> {
        let info = self
            .cache
            .get(operative_id)
            .filter(|i| i.state == SandboxState::Running)
            .ok_or_else(|| Error::Unavailable("sandbox not running".to_string()))?;

        let stream = TcpStream::connect(&info.host_endpoint).await?;
        let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(usize::MAX));

        let msg = HostMessage::RunCell { code: code.to_string() };
        let line = serde_json::to_string(&msg)?;
        framed
            .send(line)
            .await
            .map_err(|e| Error::Unavailable(format!("sandbox write failed: {e}")))?;

        loop {
            let line = framed
                .next()
                .await
                .ok_or_else(|| Error::Unavailable("stream ended without result".to_string()))?
                .map_err(|e| Error::Unavailable(format!("sandbox read failed: {e}")))?;

            let msg: SandboxMessage = serde_json::from_str(&line)?;
            match msg {
                SandboxMessage::Output { .. } => {
                    // Incremental output forwarding is not required by the
                    // contract; callers that need it can subscribe to the
                    // stream store separately.
                }
                SandboxMessage::PromptModel { id, prompt } => {
                    let response = match delegate.prompt_model(&prompt).await {
                        Ok(r) => r,
                        Err(e) => e.to_string(),
                    };
                    let reply = HostMessage::PromptModelResponse { id, response };
                    let line = serde_json::to_string(&reply)?;
                    framed
                        .send(line)
                        .await
                        .map_err(|e| Error::Unavailable(format!("sandbox write failed: {e}")))?;
                }
                SandboxMessage::PromptSelf { message } => {
                    delegate.prompt_self(&message).await;
                }
                SandboxMessage::RunCellResult { output, stdout, stderr } => {
                    return Ok(CellOutcome { output, stdout, stderr });
                }
            }
        }
    }
}

fn container_name(namespace: &str, operative_id: &str) -> String {
    format!("{namespace}-{operative_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_name_is_namespaced() {
        assert_eq!(container_name("operative-engine", "op1"), "operative-engine-op1");
    }
}
