//! HTTP webhook receiver and worker host for the fulfillment pipeline.
//!
//! Exposes the webhook intake endpoint plus health and Prometheus metrics,
//! and hosts the saga worker pool that drains the job queue, with
//! structured logging (tracing) throughout.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use queue::{InMemoryJobQueue, JobQueue, QueueConfig};
use saga::{
    EventIntake, IdentityIssuer, InMemoryMintingService, InMemoryNotificationService,
    InMemoryWalletService, MintingConfig, MintingCoordinator, SagaOrchestrator, WorkerPool,
};
use store::PipelineStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::webhooks::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, Q>(state: Arc<AppState<S, Q>>, metrics_handle: PrometheusHandle) -> Router
where
    S: PipelineStore + 'static,
    Q: JobQueue + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/webhooks/orders", post(routes::webhooks::receive_order::<S, Q>))
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

/// Wires the full pipeline around a store: queue, in-memory service
/// adapters configured from the environment, orchestrator, and the worker
/// pool that drains the queue.
pub fn create_pipeline<S>(
    store: S,
    config: &Config,
) -> (Arc<AppState<S, InMemoryJobQueue>>, WorkerPool)
where
    S: PipelineStore + Clone + Send + Sync + 'static,
{
    let queue = InMemoryJobQueue::new(QueueConfig {
        max_attempts: config.job_max_attempts,
        stall_timeout: config.job_stall_timeout,
    });

    let notification = InMemoryNotificationService::new();
    notification.set_configured(config.notifications_configured);
    let wallet = InMemoryWalletService::new();
    let minting = InMemoryMintingService::new();
    minting.set_configured(config.minting_configured);

    let coordinator = MintingCoordinator::new(
        store.clone(),
        minting,
        MintingConfig {
            metadata_base_url: config.metadata_base_url.clone(),
            fallback_contract_address: config.fallback_contract_address.clone(),
        },
    );
    let issuer = IdentityIssuer::new(store.clone(), coordinator);
    let orchestrator = Arc::new(SagaOrchestrator::new(
        store.clone(),
        notification,
        wallet,
        issuer,
    ));

    let pool = WorkerPool::spawn(
        store.clone(),
        queue.clone(),
        orchestrator,
        config.worker_concurrency,
    );
    let state = Arc::new(AppState {
        intake: EventIntake::new(store, queue),
    });
    (state, pool)
}
