//! Idempotent usage ingestion, aggregation and window limits.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use z_charge_core::{Aggregation, EventId, Plan, UsageEvent, UsagePolicy, UsageWindow};
use z_charge_store::{keys, Store};

use crate::config::MeteringConfig;
use crate::error::Result;

/// Outcome of [`UsageMeter::record_usage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    /// Id of the stored event. For a duplicate, the id of the original.
    pub id: EventId,

    /// Whether the call completed.
    pub success: bool,

    /// Whether the call was suppressed by its idempotency key.
    pub duplicate: bool,
}

/// Result of a usage limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitStatus {
    /// Whether more usage is allowed in the current window.
    pub allowed: bool,

    /// Quantity left in the window, `None` when unlimited.
    pub remaining: Option<i64>,

    /// Summed usage in the current window.
    pub usage: i64,

    /// The policy limit, `None` when unlimited.
    pub limit: Option<i64>,
}

impl LimitStatus {
    fn unlimited() -> Self {
        Self {
            allowed: true,
            remaining: None,
            usage: 0,
            limit: None,
        }
    }
}

/// Remembered idempotency keys, evicted in insertion order.
///
/// Entries are appended with non-decreasing timestamps, so expired entries
/// are always at the front of `expiry` and each write evicts only what has
/// actually expired.
#[derive(Debug, Default)]
struct IdempotencyIndex {
    entries: HashMap<String, (EventId, Instant)>,
    expiry: VecDeque<(String, Instant)>,
}

impl IdempotencyIndex {
    fn evict_expired(&mut self, now: Instant, ttl: Duration) -> usize {
        let mut evicted = 0;
        while self
            .expiry
            .front()
            .is_some_and(|(_, at)| now.duration_since(*at) >= ttl)
        {
            let Some((key, at)) = self.expiry.pop_front() else {
                break;
            };
            if self.entries.get(&key).is_some_and(|(_, seen)| *seen == at) {
                self.entries.remove(&key);
                evicted += 1;
            }
        }
        evicted
    }

    fn get(&self, key: &str) -> Option<EventId> {
        self.entries.get(key).map(|(id, _)| *id)
    }

    fn insert(&mut self, key: String, id: EventId, now: Instant) {
        self.entries.insert(key.clone(), (id, now));
        self.expiry.push_back((key, now));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Usage metering service.
///
/// Owns the idempotency index, so construct one per process (or per
/// tenant) and share it behind an `Arc`. The index lock is held across the
/// store write, which serializes check-then-insert for keyed submissions.
pub struct UsageMeter {
    store: Arc<dyn Store>,
    config: MeteringConfig,
    index: Mutex<IdempotencyIndex>,
}

impl UsageMeter {
    /// Create a meter over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: MeteringConfig) -> Self {
        Self {
            store,
            config,
            index: Mutex::new(IdempotencyIndex::default()),
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Record usage happening now.
    ///
    /// With an `idempotency_key`, a repeat of the same
    /// `(customer, metric, key)` within the TTL stores nothing and returns
    /// `duplicate: true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn record_usage(
        &self,
        customer_id: &str,
        metric_key: &str,
        quantity: i64,
        idempotency_key: Option<&str>,
    ) -> Result<RecordOutcome> {
        let event = UsageEvent::new(customer_id, metric_key, quantity, Utc::now());
        self.record_usage_with(event, idempotency_key).await
    }

    /// Record a prepared event, keeping its timestamp and metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn record_usage_with(
        &self,
        event: UsageEvent,
        idempotency_key: Option<&str>,
    ) -> Result<RecordOutcome> {
        let Some(key) = idempotency_key else {
            self.store.put_usage_event(&event).await?;
            tracing::debug!(
                event_id = %event.id,
                customer_id = %event.customer_id,
                metric = %event.metric_key,
                quantity = %event.quantity,
                "Usage recorded"
            );
            return Ok(RecordOutcome {
                id: event.id,
                success: true,
                duplicate: false,
            });
        };

        let composite = keys::idempotency_key(&event.customer_id, &event.metric_key, key);
        let ttl = self.config.idempotency_ttl;

        let mut index = self.index.lock().await;
        let now = Instant::now();

        let evicted = index.evict_expired(now, ttl);
        if evicted > 0 {
            tracing::debug!(evicted = %evicted, remaining = %index.len(), "Evicted idempotency keys");
        }

        if let Some(original) = index.get(&composite) {
            tracing::debug!(
                event_id = %original,
                customer_id = %event.customer_id,
                metric = %event.metric_key,
                idempotency_key = %key,
                "Duplicate usage suppressed"
            );
            return Ok(RecordOutcome {
                id: original,
                success: true,
                duplicate: true,
            });
        }

        self.store.put_usage_event(&event).await?;
        index.insert(composite, event.id, now);

        tracing::debug!(
            event_id = %event.id,
            customer_id = %event.customer_id,
            metric = %event.metric_key,
            quantity = %event.quantity,
            idempotency_key = %key,
            "Usage recorded"
        );

        Ok(RecordOutcome {
            id: event.id,
            success: true,
            duplicate: false,
        })
    }

    /// Events for a customer and metric within `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn get_usage(
        &self,
        customer_id: &str,
        metric_key: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageEvent>> {
        Ok(self
            .store
            .list_usage_events(customer_id, metric_key, start, end)
            .await?)
    }

    /// Reduce the events within `[start, end]` to one number.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn get_usage_aggregate(
        &self,
        customer_id: &str,
        metric_key: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        aggregation: Aggregation,
    ) -> Result<i64> {
        let events = self.get_usage(customer_id, metric_key, start, end).await?;
        Ok(aggregation.apply(&events))
    }

    /// Install or replace a usage policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn set_usage_policy(&self, policy: &UsagePolicy) -> Result<()> {
        self.store.put_usage_policy(policy).await?;
        tracing::info!(
            customer_id = %policy.customer_id,
            metric = %policy.metric_key,
            limit = %policy.limit,
            window = ?policy.window,
            "Usage policy set"
        );
        Ok(())
    }

    /// Install a policy for every usage limit declared on `plan`.
    ///
    /// Returns the installed policies.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn apply_plan_limits(
        &self,
        plan: &Plan,
        customer_id: &str,
        window: UsageWindow,
    ) -> Result<Vec<UsagePolicy>> {
        let mut installed = Vec::new();
        for (metric, limit) in plan.usage_limits() {
            let policy = UsagePolicy::new(customer_id, metric, limit, window);
            self.set_usage_policy(&policy).await?;
            installed.push(policy);
        }
        Ok(installed)
    }

    /// Check the customer's usage against its policy for the current window.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn check_usage_limit(
        &self,
        customer_id: &str,
        metric_key: &str,
    ) -> Result<LimitStatus> {
        self.check_usage_limit_at(customer_id, metric_key, Utc::now())
            .await
    }

    /// Check usage against the policy for the window containing `now`.
    ///
    /// Without a policy the metric is unlimited.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn check_usage_limit_at(
        &self,
        customer_id: &str,
        metric_key: &str,
        now: DateTime<Utc>,
    ) -> Result<LimitStatus> {
        let Some(policy) = self.store.get_usage_policy(customer_id, metric_key).await? else {
            return Ok(LimitStatus::unlimited());
        };

        let start = policy.window.start_at(now);
        let usage = self
            .get_usage_aggregate(customer_id, metric_key, Some(start), None, Aggregation::Sum)
            .await?;
        let remaining = policy.limit.saturating_sub(usage).max(0);

        tracing::debug!(
            customer_id = %customer_id,
            metric = %metric_key,
            usage = %usage,
            limit = %policy.limit,
            remaining = %remaining,
            "Checked usage limit"
        );

        Ok(LimitStatus {
            allowed: remaining > 0,
            remaining: Some(remaining),
            usage,
            limit: Some(policy.limit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use z_charge_core::{Currency, Price, Strategy};
    use z_charge_store::MemoryStore;

    fn meter() -> (Arc<MemoryStore>, UsageMeter) {
        let store = Arc::new(MemoryStore::new());
        let meter = UsageMeter::new(store.clone(), MeteringConfig::default());
        (store, meter)
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    // =========================================================================
    // Idempotency
    // =========================================================================

    #[tokio::test]
    async fn same_idempotency_key_stores_once() {
        let (store, meter) = meter();

        let first = meter
            .record_usage("cus_1", "api_calls", 5, Some("req_1"))
            .await
            .unwrap();
        let second = meter
            .record_usage("cus_1", "api_calls", 5, Some("req_1"))
            .await
            .unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert!(second.success);
        assert_eq!(second.id, first.id);
        assert_eq!(store.event_count().unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_retries_store_once() {
        let (store, meter) = meter();
        let meter = Arc::new(meter);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let meter = Arc::clone(&meter);
                tokio::spawn(async move {
                    meter
                        .record_usage("cus_1", "api_calls", 1, Some("req_1"))
                        .await
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(store.event_count().unwrap(), 1);
        assert_eq!(outcomes.iter().filter(|o| !o.duplicate).count(), 1);
        assert!(outcomes.iter().all(|o| o.id == outcomes[0].id));
    }

    #[tokio::test]
    async fn no_idempotency_key_stores_every_call() {
        let (store, meter) = meter();

        meter.record_usage("cus_1", "api_calls", 5, None).await.unwrap();
        meter.record_usage("cus_1", "api_calls", 5, None).await.unwrap();

        assert_eq!(store.event_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn idempotency_key_is_scoped_per_metric() {
        let (store, meter) = meter();

        meter
            .record_usage("cus_1", "api_calls", 1, Some("req_1"))
            .await
            .unwrap();
        let other = meter
            .record_usage("cus_1", "storage_gb", 1, Some("req_1"))
            .await
            .unwrap();

        assert!(!other.duplicate);
        assert_eq!(store.event_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn expired_keys_are_accepted_again() {
        let store = Arc::new(MemoryStore::new());
        let config = MeteringConfig::default().with_idempotency_ttl(Duration::ZERO);
        let meter = UsageMeter::new(store.clone(), config);

        meter
            .record_usage("cus_1", "api_calls", 1, Some("req_1"))
            .await
            .unwrap();
        let again = meter
            .record_usage("cus_1", "api_calls", 1, Some("req_1"))
            .await
            .unwrap();

        assert!(!again.duplicate);
        assert_eq!(store.event_count().unwrap(), 2);
    }

    #[test]
    fn eviction_stops_at_first_live_entry() {
        let mut index = IdempotencyIndex::default();
        let start = Instant::now();
        let ttl = Duration::from_secs(10);

        index.insert("a".into(), EventId::generate(), start);
        index.insert("b".into(), EventId::generate(), start + Duration::from_secs(5));

        assert_eq!(index.evict_expired(start + Duration::from_secs(12), ttl), 1);
        assert!(index.get("a").is_none());
        assert!(index.get("b").is_some());
    }

    // =========================================================================
    // Queries
    // =========================================================================

    #[tokio::test]
    async fn usage_range_is_inclusive() {
        let (_, meter) = meter();
        for (ts, qty) in [
            ("2024-01-01T00:00:00Z", 1),
            ("2024-01-02T00:00:00Z", 2),
            ("2024-01-03T00:00:00Z", 4),
        ] {
            let event = UsageEvent::new("cus_1", "api_calls", qty, at(ts));
            meter.record_usage_with(event, None).await.unwrap();
        }

        let events = meter
            .get_usage(
                "cus_1",
                "api_calls",
                Some(at("2024-01-01T00:00:00Z")),
                Some(at("2024-01-02T00:00:00Z")),
            )
            .await
            .unwrap();
        assert_eq!(events.len(), 2);

        let open = meter.get_usage("cus_1", "api_calls", None, None).await.unwrap();
        assert_eq!(open.len(), 3);
    }

    #[tokio::test]
    async fn aggregates() {
        let (_, meter) = meter();
        for qty in [3, 9, 4] {
            meter.record_usage("cus_1", "api_calls", qty, None).await.unwrap();
        }

        for (aggregation, expected) in [
            (Aggregation::Sum, 16),
            (Aggregation::Count, 3),
            (Aggregation::Max, 9),
        ] {
            let value = meter
                .get_usage_aggregate("cus_1", "api_calls", None, None, aggregation)
                .await
                .unwrap();
            assert_eq!(value, expected, "{aggregation:?}");
        }
    }

    #[tokio::test]
    async fn metadata_is_kept() {
        let (_, meter) = meter();
        let event = UsageEvent::new("cus_1", "api_calls", 1, Utc::now())
            .with_metadata(json!({"endpoint": "/v1/chat"}));
        meter.record_usage_with(event, None).await.unwrap();

        let events = meter.get_usage("cus_1", "api_calls", None, None).await.unwrap();
        assert_eq!(events[0].metadata["endpoint"], "/v1/chat");
    }

    // =========================================================================
    // Limits
    // =========================================================================

    #[tokio::test]
    async fn limit_counts_only_the_current_window() {
        let (_, meter) = meter();
        meter
            .set_usage_policy(&UsagePolicy::new("cus_1", "api_calls", 100, UsageWindow::Day))
            .await
            .unwrap();

        for (ts, qty) in [("2024-03-09T23:59:59Z", 50), ("2024-03-10T08:00:00Z", 30)] {
            let event = UsageEvent::new("cus_1", "api_calls", qty, at(ts));
            meter.record_usage_with(event, None).await.unwrap();
        }

        let status = meter
            .check_usage_limit_at("cus_1", "api_calls", at("2024-03-10T12:00:00Z"))
            .await
            .unwrap();
        assert!(status.allowed);
        assert_eq!(status.usage, 30);
        assert_eq!(status.remaining, Some(70));
        assert_eq!(status.limit, Some(100));
    }

    #[tokio::test]
    async fn exhausted_limit_is_not_allowed() {
        let (_, meter) = meter();
        meter
            .set_usage_policy(&UsagePolicy::new("cus_1", "api_calls", 10, UsageWindow::Hour))
            .await
            .unwrap();
        let event = UsageEvent::new("cus_1", "api_calls", 12, at("2024-03-10T08:15:00Z"));
        meter.record_usage_with(event, None).await.unwrap();

        let status = meter
            .check_usage_limit_at("cus_1", "api_calls", at("2024-03-10T08:45:00Z"))
            .await
            .unwrap();
        assert!(!status.allowed);
        assert_eq!(status.remaining, Some(0));
        assert_eq!(status.usage, 12);
    }

    #[tokio::test]
    async fn no_policy_is_unlimited() {
        let (_, meter) = meter();
        let status = meter.check_usage_limit("cus_1", "api_calls").await.unwrap();
        assert!(status.allowed);
        assert_eq!(status.remaining, None);
    }

    #[tokio::test]
    async fn plan_limits_become_policies() {
        let (store, meter) = meter();
        let plan = Plan::new(
            "plan_pro",
            Currency::usd(),
            Strategy::Usage,
            vec![Price::usage("price_calls", Currency::usd(), "api_calls", 1)],
        )
        .with_metadata(json!({"usageLimits": {"api_calls": 1000}}));

        let installed = meter
            .apply_plan_limits(&plan, "cus_1", UsageWindow::Month)
            .await
            .unwrap();
        assert_eq!(installed.len(), 1);

        let policy = store
            .get_usage_policy("cus_1", "api_calls")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(policy.limit, 1000);
        assert_eq!(policy.window, UsageWindow::Month);
    }
}
