//! # courrier-server
//!
//! Relay server for end-to-end protected chat messages and small file
//! attachments. This binary provides:
//! - **Ingest pipeline**: validation, compression + encryption, durable
//!   persistence, relay publication
//! - **Relay consumers** for the attachment and notification queues
//! - **Realtime hub** pushing `"ReceiveMessage"` events to connected
//!   sessions (best-effort, never buffered)
//! - **REST API** (axum) for sending, uploading, downloading and history

mod api;
mod config;
mod consumers;
mod error;
mod history;
mod hub;
mod pipeline;

use std::sync::{Arc, Mutex};

use tracing::info;
use tracing_subscriber::EnvFilter;

use courrier_relay::Broker;
use courrier_shared::constants::{QUEUE_ATTACHMENTS, QUEUE_NOTIFICATIONS};
use courrier_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::consumers::{run_attachment_consumer, run_notification_consumer};
use crate::hub::SessionRegistry;
use crate::pipeline::IngestPipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,courrier_server=debug")),
        )
        .init();

    info!("Starting Courrier server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = Arc::new(Mutex::new(Database::open_at(&config.db_path)?));

    let broker = Arc::new(Broker::new());
    broker.declare(QUEUE_ATTACHMENTS);
    broker.declare(QUEUE_NOTIFICATIONS);

    let hub = SessionRegistry::new();

    let pipeline = IngestPipeline::new(
        Arc::clone(&db),
        Arc::clone(&broker),
        config.master_key,
        config.max_payload_size,
    );

    // -----------------------------------------------------------------------
    // 4. Spawn the relay consumers
    // -----------------------------------------------------------------------
    let attachment_task = tokio::spawn(run_attachment_consumer(
        broker.consume(QUEUE_ATTACHMENTS)?,
        Arc::clone(&db),
        config.master_key,
    ));
    let notification_task = tokio::spawn(run_notification_consumer(
        broker.consume(QUEUE_NOTIFICATIONS)?,
        hub.clone(),
    ));

    let state = AppState {
        pipeline,
        db,
        hub,
        key: config.master_key,
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    // Stop intake; in-flight consumer handlers run to completion.
    broker.shutdown();
    attachment_task.await?;
    notification_task.await?;

    info!("Courrier server stopped");
    Ok(())
}
