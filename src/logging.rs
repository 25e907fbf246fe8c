//! # Tracing Module
//!
//! Environment-aware console logging using the tracing ecosystem. Logs go to stdout,
//! either as human-readable lines (ANSI colours when attached to a TTY) or as JSON when
//! `LOG_FORMAT=json` is set.
//!
//! Log level resolution order: `LOG_LEVEL`, then `RUST_LOG`, then a default derived from
//! `BRIDGE_ENV` (`test`/`development` → debug, `production` → info).

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process
///
/// Safe to call repeatedly and from tests; if another global subscriber is already set,
/// the existing one is kept.
pub fn init_structured_logging() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json = std::env::var("LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let result = if json {
            let layer = fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_filter(EnvFilter::new(&log_level));
            tracing_subscriber::registry().with(layer).try_init()
        } else {
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(EnvFilter::new(&log_level));
            tracing_subscriber::registry().with(layer).try_init()
        };

        if result.is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                log_level = %log_level,
                json_output = json,
                ansi_colors = use_ansi,
                "Structured logging initialized"
            );
        }
    });
}

fn get_environment() -> String {
    std::env::var("BRIDGE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        return level.to_lowercase();
    }

    if let Ok(level) = std::env::var("RUST_LOG") {
        return level.to_lowercase();
    }

    default_level_for(environment).to_string()
}

fn default_level_for(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log a module lifecycle event with consistent fields
///
/// ```rust,ignore
/// log_module!(info, "activated", module_id: "jira-1", attempt: 2);
/// ```
#[macro_export]
macro_rules! log_module {
    ($level:ident, $operation:expr, module_id: $module_id:expr, $($key:ident: $value:expr),* $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            module_id = %$module_id,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "MODULE_{}", $operation
        );
    };
    ($level:ident, $operation:expr, module_id: $module_id:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            module_id = %$module_id,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "MODULE_{}", $operation
        );
    };
}

/// Log a service probe outcome with consistent fields
#[macro_export]
macro_rules! log_probe {
    ($level:ident, $operation:expr, service: $service:expr, $($key:ident: $value:expr),* $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            service = %$service,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "PROBE_{}", $operation
        );
    };
}
