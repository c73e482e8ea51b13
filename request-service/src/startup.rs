//! Application startup and lifecycle management.
//!
//! Wires the Postgres adapter, dedup store and notifier into the request
//! manager and the payment due scheduler, and serves health and metrics
//! endpoints. Business operations are invoked through the manager by the
//! hosting surface.

use crate::config::RequestServiceConfig;
use crate::services::{
    get_metrics, init_metrics, Database, DedupStore, InMemoryDedupStore, LogNotifier, Notifier,
    PaymentDueScheduler, RedisDedupStore, ServiceRequestManager, SmtpNotifier,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_cron_scheduler::JobScheduler;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: RequestServiceConfig,
    pub db: Arc<Database>,
    pub manager: Arc<ServiceRequestManager>,
    pub scheduler: Arc<PaymentDueScheduler>,
}

/// State for health check endpoints.
#[derive(Clone)]
struct HealthState {
    db: Arc<Database>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "request-service",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "request-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: RequestServiceConfig) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;
        let db = Arc::new(db);

        let dedup: Arc<dyn DedupStore> = match &config.redis_url {
            Some(url) => Arc::new(
                RedisDedupStore::new(url, config.scheduler.dedup_retention_days).await?,
            ),
            None => {
                tracing::info!("REDIS_URL not set, notification dedup is process-local");
                Arc::new(InMemoryDedupStore::new())
            }
        };

        let notifier: Arc<dyn Notifier> = if config.smtp.enabled {
            match SmtpNotifier::new(&config.smtp) {
                Ok(notifier) => {
                    tracing::info!("SMTP notifier initialized");
                    Arc::new(notifier)
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP notifier: {}. Logging instead.", e);
                    Arc::new(LogNotifier)
                }
            }
        } else {
            tracing::info!("SMTP disabled, notifications will be logged");
            Arc::new(LogNotifier)
        };

        let scheduler = Arc::new(PaymentDueScheduler::new(
            db.clone(),
            db.clone(),
            notifier,
            dedup,
            config.scheduler.clone(),
            config.currency_symbol.clone(),
        ));

        let manager = Arc::new(ServiceRequestManager::new(
            db.clone(),
            scheduler.clone(),
            config.scheduler.timezone,
        ));

        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Request service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state: AppState {
                config,
                db,
                manager,
                scheduler,
            },
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn manager(&self) -> Arc<ServiceRequestManager> {
        self.state.manager.clone()
    }

    /// Register the daily reminder job. The caller owns the returned handle
    /// and shuts it down once the server has stopped.
    pub async fn start_scheduler(&self) -> Result<JobScheduler, AppError> {
        self.state.scheduler.clone().start().await
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let health_state = HealthState {
            db: self.state.db.clone(),
        };

        let http_router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(health_state);

        tracing::info!(
            service = %self.state.config.service_name,
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, http_router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
