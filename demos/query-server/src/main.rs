use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::{Router, http::header, response::IntoResponse, routing::get};
use qwatch_api::{HttpApi, SessionStoreAdapter};
use qwatch_core::{SessionStore, SupervisorConfig, TaskObserver};
use qwatch_observe::{Journal, LoggerConfig, logger_init};
use qwatch_prometheus::PrometheusObserver;
use tracing::{error, info};

mod builders;
mod engine;

use engine::SimulatedEngine;

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_DURATION_LIMIT_MS: u64 = 60_000;
const DEFAULT_SESSION_IDLE_MS: u64 = 30 * 60 * 1000;
const SESSION_SWEEP_EVERY: Duration = Duration::from_secs(60);

fn main() -> anyhow::Result<()> {
    // 1) Logger, while the process is still single-threaded
    let log_cfg = LoggerConfig::from_env()?;
    logger_init(&log_cfg)?;
    info!(format = %log_cfg.format, level = %log_cfg.level, "logger initialized");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    runtime.block_on(serve())
}

async fn serve() -> anyhow::Result<()> {
    // 2) Engine + action builders
    let limit_ms = env_millis("QWATCH_DURATION_LIMIT_MS", DEFAULT_DURATION_LIMIT_MS)?;
    let engine = Arc::new(SimulatedEngine::new(Duration::from_millis(limit_ms)));
    let router = builders::router(Arc::clone(&engine));
    info!(kinds = ?router.kinds(), limit_ms, "action builders registered");

    // 3) Session store with observers
    let config = SupervisorConfig::from_env()?;
    let metrics = Arc::new(PrometheusObserver::new()?);
    let observers: Vec<Arc<dyn TaskObserver>> = vec![Arc::new(Journal::new()), metrics.clone()];
    let store = SessionStore::builder(config.clone())
        .with_engine(engine)
        .with_observers(observers)
        .build();
    info!(
        poll_interval_ms = config.poll_interval_ms,
        grace_period_ms = config.grace_period_ms,
        "session store ready"
    );
    let idle = Duration::from_millis(env_millis("QWATCH_SESSION_IDLE_MS", DEFAULT_SESSION_IDLE_MS)?);
    anyhow::ensure!(!idle.is_zero(), "QWATCH_SESSION_IDLE_MS must be positive");
    let _expiry = store.spawn_expiry(idle, SESSION_SWEEP_EVERY.min(idle));
    info!(idle_ms = idle.as_millis() as u64, "idle session expiry started");

    // 4) HTTP API + /metrics
    let adapter = Arc::new(SessionStoreAdapter::new(store, Arc::new(router)));
    let metrics_route = Router::new().route(
        "/metrics",
        get(move || {
            let metrics = Arc::clone(&metrics);
            async move {
                match metrics.encode() {
                    Ok(body) => (
                        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                        body,
                    )
                        .into_response(),
                    Err(e) => {
                        error!(error = %e, "failed to encode metrics");
                        axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
                    }
                }
            }
        }),
    );
    let app = HttpApi::new(adapter).router().merge(metrics_route);

    let bind = std::env::var("QWATCH_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(%bind, "query server listening");
    info!("press Ctrl+C to stop");

    // 5) Serve until Ctrl+C
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl+C");
            }
            info!("shutting down...");
        })
        .await?;

    Ok(())
}

fn env_millis(key: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{key}: invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
