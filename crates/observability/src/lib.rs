//! Tracing and logging (shared setup).

/// Initialize process-wide observability (tracing/logging).
///
/// The output format comes from `REMIT_LOG_FORMAT` (`json` or `pretty`,
/// default `json`). Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init_with(tracing::LogFormat::from_env());
}

/// Tracing configuration (filters, formats).
pub mod tracing;

pub use self::tracing::LogFormat;
