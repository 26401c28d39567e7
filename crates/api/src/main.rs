//! API server entry point.

use std::sync::Arc;

use api::SharedCheckout;
use api::config::Config;
use checkout::{InMemoryCheckoutProvider, StripeCheckout};
use lifecycle::ExpirySweeper;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tokio_util::sync::CancellationToken;
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

fn checkout_provider(config: &Config) -> SharedCheckout {
    match &config.stripe_secret_key {
        Some(secret) => {
            let stripe = StripeCheckout::new(secret.clone(), config.checkout_config())
                .expect("failed to build Stripe client");
            tracing::info!(api_base = %config.stripe_api_base, "using Stripe checkout");
            Arc::new(stripe)
        }
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set, using in-memory checkout provider");
            Arc::new(InMemoryCheckoutProvider::new())
        }
    }
}

/// Bootstraps, serves and shuts down the application on top of `store`.
async fn run<S: Store + 'static>(
    store: S,
    checkout: SharedCheckout,
    config: Config,
    metrics_handle: PrometheusHandle,
) {
    if let Some(email) = &config.admin_email {
        api::bootstrap::ensure_admin(&store, &config.admin_name, email)
            .await
            .expect("admin bootstrap failed");
    }

    let state = api::create_default_state(store, checkout, config.lifecycle_config());

    // The sweeper starts only once storage is up and stops with the server.
    let shutdown = CancellationToken::new();
    let sweeper = ExpirySweeper::new(
        state.lifecycle.clone(),
        config.sweep_interval,
        shutdown.clone(),
    )
    .spawn();

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "expiry sweeper task failed");
    }

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(config.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!config.log_json).then(tracing_subscriber::fmt::layer))
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the checkout provider
    let checkout = checkout_provider(&config);

    // 4. Connect storage and serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("connected to PostgreSQL");
            run(store, checkout, config, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            run(InMemoryStore::new(), checkout, config, metrics_handle).await;
        }
    }
}
