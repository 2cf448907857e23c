//! Key encoding utilities.
//!
//! Composite keys are length-prefixed so that `("a:b", "c")` and
//! `("a", "b:c")` never collide.

/// Key for all usage of one metric by one customer.
///
/// Format: `len(customer_id) ':' customer_id ':' metric_key`
#[must_use]
pub fn usage_key(customer_id: &str, metric_key: &str) -> String {
    format!("{}:{customer_id}:{metric_key}", customer_id.len())
}

/// Key for the usage policy of one customer and metric.
#[must_use]
pub fn policy_key(customer_id: &str, metric_key: &str) -> String {
    usage_key(customer_id, metric_key)
}

/// Key under which an idempotent write is remembered.
///
/// Format: `usage_key ':' len(metric_key) ':' idempotency_key`
#[must_use]
pub fn idempotency_key(customer_id: &str, metric_key: &str, idempotency_key: &str) -> String {
    format!(
        "{}:{}:{idempotency_key}",
        usage_key(customer_id, metric_key),
        metric_key.len()
    )
}
