//! vowkeep worker entry point.
//!
//! Boots the coordinator, then speaks the host wire protocol: events
//! (intercepted fetches, sync wake-ups, push payloads, client commands)
//! arrive as JSON lines on stdin; fetch replies and worker broadcasts
//! leave as JSON lines on stdout. A periodic ticker drives the sync
//! cadence. Logging goes to stderr so the message channel on stdout
//! stays clean.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use vowkeep_client::{NetworkConfig, OriginClient};
use vowkeep_core::AppConfig;
use vowkeep_core::store::CacheDb;

mod bridge;
mod classify;
mod coordinator;
mod drain;
mod host;
mod lifecycle;
mod push;
mod strategies;
mod sync;

use coordinator::{Coordinator, WorkerEvent};
use host::{WireEvent, WireReply};
use lifecycle::WorkerPhase;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(version = %config.version_suffix, origin = %config.origin, "starting vowkeep worker");

    let db = CacheDb::open(&config.db_path).await?;
    let net = Arc::new(OriginClient::new(NetworkConfig::from_app_config(&config))?);
    let coordinator = Arc::new(Coordinator::new(config, db, net)?);

    coordinator.dispatch(WorkerEvent::Install).await;
    if coordinator.phase().await != WorkerPhase::Installed {
        // A fresh install needs the origin at least once; after that the
        // tiers persisted from an earlier run carry us through.
        let status = coordinator.cache_status().await?;
        if !status.cached {
            anyhow::bail!("install failed and no cached state exists; cannot serve offline");
        }
        tracing::warn!("install failed, reusing tiers from a previous run");
    }
    coordinator.dispatch(WorkerEvent::Activate).await;

    // Single stdout writer; everything outbound funnels through here.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<serde_json::Value>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(value) = out_rx.recv().await {
            let mut line = value.to_string().into_bytes();
            line.push(b'\n');
            if stdout.write_all(&line).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    // Mirror worker→client broadcasts onto the output channel.
    let forwarder = {
        let mut messages = coordinator.bridge().subscribe();
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            while let Ok(message) = messages.recv().await {
                match serde_json::to_value(&message) {
                    Ok(value) => {
                        if out_tx.send(value).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "unserializable worker message"),
                }
            }
        })
    };

    // Periodic sync cadence. The first tick fires immediately, which
    // doubles as the connectivity-regained drain on startup.
    let ticker = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(coordinator.config().periodic_sync_interval());
            interval.tick().await;
            coordinator.dispatch(WorkerEvent::ConnectivityRestored).await;
            loop {
                interval.tick().await;
                coordinator.dispatch(WorkerEvent::PeriodicSync).await;
            }
        })
    };

    // Host events arrive as JSON lines on stdin; EOF retires the worker.
    let origin = coordinator.origin().clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event = match serde_json::from_str::<WireEvent>(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable host event");
                continue;
            }
        };

        match event {
            WireEvent::Fetch { id, request } => {
                let reply = match request.into_request(&origin) {
                    Ok(request) => {
                        match coordinator.dispatch(WorkerEvent::Fetch(request)).await {
                            Some(outcome) => WireReply::from_outcome(id, outcome),
                            None => WireReply::FetchPassthrough { id },
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "unresolvable fetch target");
                        WireReply::FetchPassthrough { id }
                    }
                };
                match serde_json::to_value(&reply) {
                    Ok(value) => {
                        let _ = out_tx.send(value);
                    }
                    Err(e) => tracing::warn!(error = %e, "unserializable fetch reply"),
                }
            }
            WireEvent::Sync { tag } => {
                coordinator.dispatch(WorkerEvent::Sync { tag }).await;
            }
            WireEvent::Push { payload } => {
                coordinator.dispatch(WorkerEvent::Push(payload.to_string().into_bytes())).await;
            }
            WireEvent::ConnectivityRestored => {
                coordinator.dispatch(WorkerEvent::ConnectivityRestored).await;
            }
            WireEvent::NotificationClick { action, url } => {
                coordinator.dispatch(WorkerEvent::NotificationClick { action, url }).await;
            }
            WireEvent::ClientConnected { id, url } => {
                coordinator
                    .dispatch(WorkerEvent::ClientConnected(bridge::ClientWindow { id, url }))
                    .await;
            }
            WireEvent::ClientDisconnected { id } => {
                coordinator.dispatch(WorkerEvent::ClientDisconnected { id }).await;
            }
            WireEvent::Message { command } => {
                coordinator.dispatch(WorkerEvent::Message(command)).await;
            }
        }
    }

    tracing::info!("stdin closed, vowkeep worker shutting down");
    coordinator.retire().await;
    ticker.abort();
    forwarder.abort();
    drop(out_tx);
    writer.await.ok();
    Ok(())
}
