//! OpsHub notification delivery server.
//!
//! Main entry point that wires all crates together: configuration, database,
//! the delivery runner, the retention sweeper, and the observability HTTP
//! endpoint.

mod http;

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt};

use opshub_core::config::AppConfig;
use opshub_core::error::AppError;
use opshub_database::{DatabasePool, NotificationQueueRepository};
use opshub_notifier::channel::{DeliveryChannel, WebhookChannel};
use opshub_notifier::dispatcher::Dispatcher;
use opshub_notifier::store::QueueStore;
use opshub_notifier::{DeliveryRunner, RetentionSweeper};

#[tokio::main]
async fn main() {
    let env = std::env::var("OPSHUB_ENV").unwrap_or_else(|_| "development".to_string());

    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting OpsHub v{}", env!("CARGO_PKG_VERSION"));

    // Database connection + migrations
    let db = DatabasePool::connect(&config.database).await?;
    db.migrate().await?;

    let queue = Arc::new(NotificationQueueRepository::new(db.pool().clone()));
    let store: Arc<dyn QueueStore> = Arc::clone(&queue) as Arc<dyn QueueStore>;

    // Shutdown channel shared by all background tasks
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Delivery runner + retention sweeper
    let (runner_handle, dispatcher) = if config.notifier.enabled {
        let channel: Arc<dyn DeliveryChannel> = match &config.notifier.webhook_url {
            Some(url) => Arc::new(WebhookChannel::new(url.clone())),
            None => {
                return Err(AppError::configuration(
                    "notifier.webhook_url is required when the notifier is enabled",
                ));
            }
        };

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            channel,
            &config.notifier,
        ));
        let runner = DeliveryRunner::new(
            Arc::clone(&store),
            Arc::clone(&dispatcher),
            config.notifier.clone(),
        );

        let cancel = shutdown_rx.clone();
        let handle = tokio::spawn(async move {
            runner.run(cancel).await;
        });

        tracing::info!("Delivery runner started");
        (Some(handle), Some(dispatcher))
    } else {
        tracing::info!("Notification delivery disabled");
        (None, None)
    };

    let sweeper_handle = if config.notifier.enabled {
        let sweeper = RetentionSweeper::new(Arc::clone(&store), config.notifier.clone());
        let cancel = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            sweeper.run(cancel).await;
        }))
    } else {
        None
    };

    // Observability HTTP endpoint
    let state = http::AppState {
        db: db.clone(),
        queue: Arc::clone(&queue),
    };
    let app = http::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!("OpsHub server listening on {}", addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown...");
        let _ = shutdown_tx.send(true);
    });

    server
        .await
        .map_err(|e| AppError::internal(format!("Server error: {}", e)))?;

    // Let in-flight deliveries finish before closing the pool
    tracing::info!("Waiting for background tasks to complete...");

    if let Some(dispatcher) = dispatcher {
        dispatcher.drain(std::time::Duration::from_secs(30)).await;
    }
    if let Some(handle) = runner_handle {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(10), handle).await;
    }
    if let Some(handle) = sweeper_handle {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(10), handle).await;
    }

    db.close().await;

    tracing::info!("OpsHub server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
