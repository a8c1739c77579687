//! # Structured Logging Module
//!
//! Environment-aware structured logging for job runs. Console output by default,
//! JSON lines when `JOBS_LOG_FORMAT=json`, with the level derived from the
//! environment name unless `RUST_LOG` overrides it.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let layer = if wants_json() {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // A host application may already own the global subscriber
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("JOBS_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn wants_json() -> bool {
    std::env::var("JOBS_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for job lifecycle operations
pub fn log_job_operation(
    operation: &str,
    job_id: Uuid,
    plugin_id: &str,
    state: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        job_id = %job_id,
        plugin_id = %plugin_id,
        state = %state,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 JOB_OPERATION"
    );
}

/// Log structured data for plugin lifecycle hooks
pub fn log_plugin_operation(
    operation: &str,
    job_id: Uuid,
    plugin_id: &str,
    step_index: Option<usize>,
    status: &str,
) {
    tracing::debug!(
        operation = %operation,
        job_id = %job_id,
        plugin_id = %plugin_id,
        step_index = step_index,
        status = %status,
        "🔌 PLUGIN_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
