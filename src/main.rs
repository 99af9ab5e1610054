//! litecore-sync — opens a database and runs a one-shot or continuous
//! replication against a remote endpoint.
//!
//! This is the composition root: it loads configuration, wires a
//! [`SqliteStore`]-backed [`CollectionStore`] to a [`Checkpointer`] and a
//! [`Replicator`], and starts the actor.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use litecore::checkpoint::{CheckpointScope, Checkpointer};
use litecore::collection::CollectionStore;
use litecore::config::load_config;
use litecore::replicator::{Replicator, ReplicatorMessage, TungsteniteTransport};
use litecore::storage::SqliteStore;
use std::sync::Arc;

/// Connects to `cfg.remote_url` on every `start()`, using the real
/// `tokio-tungstenite` transport (spec.md §6 "WebSocket transport
/// (consumed)"); the test suite hands the Replicator a
/// [`litecore::replicator::LoopbackTransport`] instead.
struct TungsteniteFactory {
    url: String,
}

#[async_trait::async_trait]
impl litecore::replicator::SocketFactory for TungsteniteFactory {
    async fn connect(
        &self,
    ) -> litecore::error::Result<(
        Box<dyn litecore::replicator::WebSocketTransport>,
        tokio::sync::mpsc::Receiver<litecore::replicator::TransportEvent>,
    )> {
        let (transport, events) = TungsteniteTransport::connect(&self.url).await?;
        Ok((Box::new(transport), events))
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = load_config()?;

    let log_level = if cfg.database.debug { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    tracing::info!(db_path = %cfg.database.db_path, "opening database");
    let backend = SqliteStore::open(&cfg.database.db_path)?;
    let store = CollectionStore::new(backend);

    let local_uuid = uuid::Uuid::new_v4();
    let scope = CheckpointScope { remote_url: cfg.replicator.remote_url.clone(), ..Default::default() };
    let checkpointer = Checkpointer::open(&store, &local_uuid, scope)?;

    if cfg.replicator.remote_url.is_empty() {
        tracing::warn!("LITECORE_REMOTE_URL is not set; nothing to replicate against, exiting");
        return Ok(());
    }

    let factory = Arc::new(TungsteniteFactory { url: cfg.replicator.remote_url.clone() });
    let autosave_delay = std::time::Duration::from_secs(cfg.checkpoint.autosave_delay_secs);
    let replicator =
        Replicator::new(store, checkpointer, "default", cfg.replicator.continuous, factory, autosave_delay);
    let (handle, status) = Replicator::spawn(replicator);

    tracing::info!(remote = %cfg.replicator.remote_url, "starting replicator");
    handle.send(ReplicatorMessage::Start).await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, stopping replicator");
    handle.send(ReplicatorMessage::Stop).await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    handle.stop();
    handle.join().await;

    let final_status = status.lock();
    tracing::info!(level = ?final_status.level, docs_completed = final_status.progress.docs_completed, "replicator stopped");
    Ok(())
}
