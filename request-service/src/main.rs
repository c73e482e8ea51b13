//! Request Service entry point.

use request_service::config::RequestServiceConfig;
use request_service::services::init_metrics;
use request_service::startup::Application;

use service_core::observability::init_tracing;
use tokio::signal;

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = RequestServiceConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting request-service");

    init_metrics();

    // Log configuration (mask sensitive values)
    tracing::info!(
        service_name = %config.service_name,
        http_port = %config.common.port,
        db_max_connections = %config.database.max_connections,
        db_min_connections = %config.database.min_connections,
        dedup_backend = if config.redis_url.is_some() { "redis" } else { "memory" },
        smtp_enabled = config.smtp.enabled,
        reminder_cron = %config.scheduler.cron_expression(),
        reminder_timezone = %config.scheduler.timezone,
        "Configuration loaded"
    );

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build application");
        std::io::Error::other(format!("Application build error: {}", e))
    })?;

    let mut job_scheduler = app.start_scheduler().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to start reminder scheduler");
        std::io::Error::other(format!("Scheduler start error: {}", e))
    })?;

    let outcome = tokio::select! {
        result = app.run_until_stopped() => result,
        _ = shutdown_signal() => {
            tracing::info!("Graceful shutdown initiated");
            Ok(())
        }
    };

    if let Err(e) = job_scheduler.shutdown().await {
        tracing::warn!(error = %e, "Job scheduler did not shut down cleanly");
    }

    if let Err(e) = outcome {
        tracing::error!(error = %e, "Application error");
        return Err(e);
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}
