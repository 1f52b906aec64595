use crate::cli::ServeArgs;
use crate::infra::{build_context, AppState};
use crate::routes::with_operational_routes;
use admission_desk::config::AppConfig;
use admission_desk::error::AppError;
use admission_desk::telemetry;
use admission_desk::workflows::admission::admission_router;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let context = build_context(&config)?;
    info!(
        database = %config.storage.database_path.display(),
        uploads = %config.storage.upload_dir.display(),
        "admission stores opened"
    );

    let app = with_operational_routes(admission_router(context))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "admission desk ready");

    axum::serve(listener, app).await?;
    Ok(())
}
