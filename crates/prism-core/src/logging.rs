//! Tracing initialization and the structured logging contract.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |
//!
//! ## Field Name Contract
//!
//! Every crate emits the same field names so log aggregation can query
//! across subsystems:
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `correlation_id` | Propagated across request → task → provider call |
//! | `task_id`, `step`, `priority` | Task identity |
//! | `provider`, `model`, `tier` | Routing target |
//! | `attempt`, `duration_ms`, `queue_depth` | Execution measurements |
//! | `parse_strategy`, `parse_attempts` | Repair pipeline outcome |
//! | `cache_key`, `cache_level`, `idempotency_key` | Cache/guard identity |
//! | `success`, `error`, `error_category` | Outcome |

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   `LOG_FORMAT` - "json" or "text" (default: "text")
///   `LOG_FILE`   - path to log file (optional, enables file logging)
///   `RUST_LOG`   - standard env filter (default: "prism=debug")
///
/// Returns a guard that must be held for the lifetime of the process when
/// file logging is enabled.
pub fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "prism=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("prism.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
        None
    }
}
