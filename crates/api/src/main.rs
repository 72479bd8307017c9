//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use api::routes::{Books, Users};
use saga::InMemoryBillingService;
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryBookStore, InMemoryUserStore, PostgresBookStore, PostgresUserStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Opens the record stores named by the configuration.
async fn open_stores(config: &Config) -> (Books, Users) {
    let Some(url) = config.database_url.as_deref() else {
        tracing::info!("DATABASE_URL not set, using in-memory stores");
        return (
            Arc::new(InMemoryBookStore::new()),
            Arc::new(InMemoryUserStore::new()),
        );
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .expect("failed to connect to Postgres");
    store::run_migrations(&pool)
        .await
        .expect("failed to run migrations");

    let store_config = config.store_config();
    let books = PostgresBookStore::new(pool.clone(), &store_config)
        .expect("invalid book table configuration");
    let users =
        PostgresUserStore::new(pool, &store_config).expect("invalid user table configuration");
    tracing::info!(
        book_table = %store_config.book_table,
        user_table = %store_config.user_table,
        "using Postgres stores"
    );
    (Arc::new(books), Arc::new(users))
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Open stores and wire the saga
    let (books, users) = open_stores(&config).await;
    let (state, worker, receiver) = api::build_state(
        books,
        users,
        Arc::new(InMemoryBillingService::new()),
        &config,
    );

    // 4. Start the courier worker
    let worker_handle = api::spawn_worker(worker, receiver);

    // 5. Build the application and serve
    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, courier = %config.courier, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // The router held the only queue sender; the worker drains and exits.
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "courier worker panicked");
    }
    tracing::info!("server shut down gracefully");
}
