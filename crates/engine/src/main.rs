//! `operative-engine`: the process that runs the control loop and sandbox
//! reconciler for every operative. It has no network listener of its own —
//! all state is reached through the JSON-file stores and the Docker API.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use op_control::{ControlContext, Dispatcher, Scheduler};
use op_domain::config::{Config, ConfigSeverity};
use op_notes::NoteStore;
use op_operatives::OperativeStore;
use op_providers::ProviderRegistry;
use op_sandbox::SandboxManager;
use op_stream::StreamStore;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,op_engine=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::var("OPERATIVE_ENGINE_CONFIG").ok().map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("loading configuration")?;

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Error => tracing::error!(%issue, "configuration error"),
            ConfigSeverity::Warning => tracing::warn!(%issue, "configuration warning"),
        }
    }
    if Config::has_fatal_errors(&issues) {
        anyhow::bail!("refusing to start with invalid configuration");
    }

    tracing::info!("operative-engine starting up");

    let stream = Arc::new(StreamStore::new(&config.stores.stream_store_path));
    tracing::info!(path = %config.stores.stream_store_path, "stream store ready");

    let operatives = Arc::new(
        OperativeStore::new(&config.stores.operatives_store_path).context("opening operative store")?,
    );
    tracing::info!(path = %config.stores.operatives_store_path, "operative store ready");

    let notes = Arc::new(NoteStore::new(&config.stores.notes_store_path).context("opening note store")?);
    tracing::info!(path = %config.stores.notes_store_path, "note store ready");

    let providers = Arc::new(ProviderRegistry::from_config(&config.llm));
    tracing::info!(providers = providers.len(), "provider registry ready");

    let sandbox = Arc::new(
        SandboxManager::new(config.sandbox.clone(), operatives.clone(), stream.clone())
            .context("connecting to the sandbox runtime")?,
    );
    tracing::info!("sandbox manager ready");
    let reconciler = sandbox.clone().spawn_reconciler();

    let dispatcher = Arc::new(Dispatcher {
        operatives: operatives.clone(),
        notes: notes.clone(),
        sandbox: sandbox.clone(),
        providers: providers.clone(),
        stream: stream.clone(),
    });

    let ctx = Arc::new(ControlContext {
        operatives,
        stream,
        providers,
        dispatcher,
    });

    let scheduler = Arc::new(Scheduler::new(ctx));
    let scheduler_task = tokio::spawn(scheduler.clone().run());

    tracing::info!("control loop scheduler running");

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, cancelling in-flight work");

    scheduler.cancel_all();
    reconciler.abort();
    scheduler_task.abort();

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
