use crate::cli::ServeArgs;
use crate::infra::{in_memory_service, load_seed, spawn_dispatcher, AppState};
use crate::routes::with_classification_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use organising_universe::config::AppConfig;
use organising_universe::error::AppError;
use organising_universe::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (service, signals) = in_memory_service(config.reconcile);
    load_seed(&service, &signals, args.seed_csv.as_deref())?;

    let dispatcher = Arc::new(spawn_dispatcher(&service, config.reconcile.dispatch_workers));
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        events: dispatcher.clone(),
    };

    let app = with_classification_routes(service.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        dispatch_workers = config.reconcile.dispatch_workers,
        "organising universe service ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.cancel_batches();
    match Arc::try_unwrap(dispatcher) {
        Ok(dispatcher) => dispatcher.shutdown().await,
        Err(_) => warn!("event dispatcher still referenced at shutdown; queued events dropped"),
    }
    info!("organising universe service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
