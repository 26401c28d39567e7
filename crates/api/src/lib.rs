//! HTTP API server for the storefront order workflow.
//!
//! Exposes order creation, reads, updates and cancellation plus the checkout
//! redirect endpoints, with structured logging (tracing) and Prometheus
//! metrics.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::CheckoutBridge;
use lifecycle::{LifecycleConfig, OrderLifecycle};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Checkout provider chosen at startup.
pub type SharedCheckout = Arc<dyn CheckoutBridge>;

/// Orchestrator type served by the API.
pub type Lifecycle<S> = OrderLifecycle<S, SharedCheckout>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub lifecycle: Arc<Lifecycle<S>>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get::<S>).put(routes::orders::update::<S>),
        )
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/payment/success", get(routes::payment::success::<S>))
        .route("/payment/cancel", get(routes::payment::cancel::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires a store and a checkout provider into the application state.
pub fn create_default_state<S: Store + 'static>(
    store: S,
    checkout: SharedCheckout,
    config: LifecycleConfig,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        lifecycle: Arc::new(OrderLifecycle::new(store, checkout, config)),
    })
}
