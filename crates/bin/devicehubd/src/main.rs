//! # devicehubd — Device Hub daemon
//!
//! Composition root that wires all adapters together and starts the server.
//!
//! ## Responsibilities
//! - Parse configuration (env vars, config file)
//! - Initialize the `SQLite` connection pool and run migrations
//! - Connect the MQTT client
//! - Construct the Adapter Registry, Pairing Coordinator, and HDP Ingest
//! - Build the axum router, injecting the wired ports
//! - Bind to a TCP port and serve
//! - Handle graceful shutdown (`SIGTERM`/`SIGINT`)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates. It is the
//! wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;

use devicehub_adapter_mqtt::MqttAdapter;
use devicehub_adapter_storage_sqlite_sqlx::{Config as StorageConfig, SqliteRepository};
use devicehub_app::adapter_registry::AdapterRegistry;
use devicehub_app::ingest::HdpIngest;
use devicehub_app::pairing_coordinator::PairingCoordinator;

use config::Config;

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("devicehubd: invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.logging.filter.clone()))
        .init();

    let db = StorageConfig {
        database_url: config.database.url.clone(),
    }
    .build()
    .await
    .expect("database should initialize");

    let repo = Arc::new(SqliteRepository::new(db.pool().clone()));

    let (mqtt, eventloop_handle) = MqttAdapter::connect(&config.mqtt_config());

    let registry = Arc::new(AdapterRegistry::new());
    let pairing = PairingCoordinator::new(Arc::clone(&repo), Arc::clone(&mqtt), Arc::clone(&registry));
    let ingest = HdpIngest::new(Arc::clone(&repo), Arc::clone(&mqtt), Arc::clone(&registry), Arc::clone(&pairing));

    ingest.start().await.expect("ingest subscriptions should register");

    let state = devicehub_adapter_http_axum::state::AppState::new(repo, mqtt, registry, pairing);
    let app = devicehub_adapter_http_axum::router::build(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .expect("server should bind");

    tracing::info!(addr = %config.bind_addr(), "devicehubd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server should run without error");

    eventloop_handle.abort();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("devicehubd shutting down");
}
