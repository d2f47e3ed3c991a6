//! gantryd — ML job dispatch daemon.
//!
//! Serves the invocation API: trigger messages in, batch submissions out;
//! job state changes in, notifications out.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use gantry_api::{ApiState, InvocationCounters};
use gantry_core::config::GantryConfig;
use gantry_services::{build, Collaborators};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    match GantryConfig::write_default_if_missing() {
        Ok(path) => tracing::info!(path = %path.display(), "config file"),
        Err(e) => tracing::warn!(error = %e, "failed to write default config"),
    }
    let config = GantryConfig::load().context("failed to load config")?;

    let port = std::env::args()
        .nth(1)
        .map(|p| p.parse::<u16>())
        .transpose()
        .context("port argument must be a number")?
        .unwrap_or(config.server.port);

    tracing::info!(
        mode = ?config.backend.mode,
        port,
        notifications = config.notifications.enabled,
        dedup = config.dedup.enabled,
        "gantryd starting"
    );

    // Collaborators and pipelines
    let collaborators =
        Collaborators::from_config(&config).context("failed to build collaborator clients")?;
    let services = build(&config, collaborators);

    let counters = Arc::new(InvocationCounters::default());
    let state = ApiState {
        dispatcher: services.dispatcher,
        monitor: services.monitor,
        memory: services.memory,
        mode: config.backend.mode,
        invocation_timeout: Duration::from_secs(config.server.invocation_timeout_secs),
        started_at: Instant::now(),
        counters: counters.clone(),
    };

    let server_task = tokio::spawn(async move {
        if let Err(e) = gantry_api::serve(state, port).await {
            tracing::error!(error = %e, "API server failed");
        }
    });

    // Stats printer
    let stats_printer = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await;
        loop {
            interval.tick().await;
            tracing::info!(
                triggers = counters.triggers.load(Ordering::Relaxed),
                job_events = counters.job_events.load(Ordering::Relaxed),
                failed = counters.failed.load(Ordering::Relaxed),
                timed_out = counters.timed_out.load(Ordering::Relaxed),
                "invocation stats"
            );
        }
    });

    // ── Wait for exit ────────────────────────────────────────────────────────

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown signal received"),
        r = server_task             => tracing::error!("API server exited: {:?}", r),
        r = stats_printer           => tracing::error!("stats printer exited: {:?}", r),
    }

    Ok(())
}
