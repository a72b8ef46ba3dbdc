use crate::cli::ServeArgs;
use crate::infra::{AppState, Services};
use crate::routes::with_marketplace_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use realestate_ai::config::AppConfig;
use realestate_ai::error::AppError;
use realestate_ai::ingestion::schedule_ingestion;
use realestate_ai::telemetry;
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

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let services = Services::build(&config)?;
    start_ingestion_schedule(&config, &services);

    let app = with_marketplace_routes(&services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "realestate ai api ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Runs the feed pipeline in the background when a cron and a source are
/// both configured and scheduling has not been switched off.
fn start_ingestion_schedule(config: &AppConfig, services: &Services) {
    let ingestion = &config.ingestion;
    if ingestion.schedule_disabled {
        info!(status = "disabled", "ingestion.cron");
        return;
    }
    let (Some(cron), Some(_)) = (ingestion.cron.as_deref(), ingestion.source_url.as_deref())
    else {
        return;
    };

    let runtime = services.ingestion.clone();
    let scheduled = schedule_ingestion(cron, move || {
        let runtime = runtime.clone();
        async move { runtime.run_once().await }
    });
    if let Err(err) = scheduled {
        warn!(error = %err, "ingestion.cron not scheduled");
    }
}
