//! Storage operation metrics.

use std::time::Instant;

/// Records `storage_operations_total` and `storage_operation_duration_ms`
/// for one store call.
///
/// # Arguments
///
/// * `backend` - Backend name (`"sqlite"`, `"memory"`)
/// * `operation` - Operation name (`"insert_scan"`, `"find_scan_by_exact_hash"`, ...)
/// * `start` - Operation start time
/// * `status` - `"success"` or `"error"`
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Runs `f` and records its metrics under `operation`.
pub fn timed<T>(
    backend: &'static str,
    operation: &'static str,
    f: impl FnOnce() -> crate::Result<T>,
) -> crate::Result<T> {
    let start = Instant::now();
    let result = f();
    let status = if result.is_ok() { "success" } else { "error" };
    record_operation_metrics(backend, operation, start, status);
    if let Err(e) = &result {
        tracing::warn!(backend, operation, error = %e, "Storage operation failed");
    }
    result
}
