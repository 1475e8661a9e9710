//! Agent Lifecycle Worker - single-agent host process
//!
//! Builds one agent from configuration, starts it, emits periodic health
//! heartbeats while it runs and stops it gracefully on Ctrl-C.

mod config;

use std::sync::Arc;
use std::time::Duration;

use agent_lifecycle_control::{Agent, AgentBuilder, HealthCheck, HookError, State};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, WorkerConfig};

fn init_tracing(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,agent_lifecycle=debug".into()),
    );

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Build the hosted agent. Its stop hook cancels `background` so the
/// heartbeat winds down as part of a graceful stop.
fn build_agent(
    config: &WorkerConfig,
    background: &CancellationToken,
) -> agent_lifecycle_control::Result<Agent> {
    let background = background.clone();
    let agent_id: Arc<str> = Arc::from(config.agent_id.as_str());
    let (start_id, stop_id) = (Arc::clone(&agent_id), Arc::clone(&agent_id));

    AgentBuilder::new(&config.agent_id, &config.agent_name, &config.agent_version)
        .capabilities(&config.capabilities)
        .on_start(move |_ctx: CancellationToken| {
            let agent_id = Arc::clone(&start_id);
            async move {
                tracing::debug!(agent_id = %agent_id, "Start hook: accepting work");
                Ok::<(), HookError>(())
            }
        })
        .on_stop(move |_ctx: CancellationToken| {
            let agent_id = Arc::clone(&stop_id);
            let background = background.clone();
            async move {
                background.cancel();
                tracing::debug!(agent_id = %agent_id, "Stop hook: background work cancelled");
                Ok::<(), HookError>(())
            }
        })
        .observer(move |from: State, to: State| {
            tracing::info!(agent_id = %agent_id, %from, %to, "Agent state changed");
        })
        .build()
}

fn spawn_heartbeat(agent: Arc<Agent>, period: Duration, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => match agent.check(&token).await {
                    Ok(()) => tracing::debug!(
                        agent_id = %agent.id(),
                        uptime_seconds = agent.uptime().map_or(0, |d| d.as_secs()),
                        "Heartbeat"
                    ),
                    Err(err) => tracing::warn!(
                        agent_id = %agent.id(),
                        error = %err,
                        "Health check failed"
                    ),
                },
            }
        }

        tracing::debug!(agent_id = %agent.id(), "Heartbeat stopped");
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = WorkerConfig::load()?;
    init_tracing(config.log_format);

    tracing::info!(
        agent_id = %config.agent_id,
        name = %config.agent_name,
        version = %config.agent_version,
        capabilities = config.capabilities.len(),
        "Starting agent lifecycle worker"
    );

    let background = CancellationToken::new();
    let agent = Arc::new(build_agent(&config, &background)?);

    agent.start(&CancellationToken::new()).await?;
    let heartbeat = spawn_heartbeat(
        Arc::clone(&agent),
        config.heartbeat_interval(),
        background.clone(),
    );

    println!("{}", serde_json::to_string_pretty(&agent.info())?);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    let shutdown = CancellationToken::new();
    let stopped = tokio::time::timeout(config.shutdown_timeout(), agent.stop(&shutdown)).await;

    // Whatever happened to the stop hook, the heartbeat must not outlive us.
    background.cancel();
    if let Err(err) = heartbeat.await {
        tracing::warn!(error = %err, "Heartbeat task ended abnormally");
    }

    match stopped {
        Ok(result) => result?,
        Err(_) => {
            shutdown.cancel();
            tracing::error!(
                agent_id = %agent.id(),
                timeout_seconds = config.shutdown_timeout_seconds,
                state = %agent.state(),
                "Agent did not stop before the shutdown timeout"
            );
            return Err("shutdown timed out".into());
        }
    }

    tracing::info!(agent_id = %agent.id(), "Worker exited");
    Ok(())
}
