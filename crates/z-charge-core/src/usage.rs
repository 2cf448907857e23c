//! Usage types for z-charge.
//!
//! [`UsageRecord`]s are the billing-period input of the pricing
//! evaluators. [`UsageEvent`]s are created by the metering layer when a
//! service reports usage, and [`UsagePolicy`] caps how much of a metric a
//! customer may consume per [`UsageWindow`].

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EventId;
use crate::plan::Plan;

/// A usage measurement attached to a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Record identifier.
    pub id: String,

    /// The customer that consumed the usage.
    pub customer_id: String,

    /// Subscription the usage is billed against.
    pub subscription_id: String,

    /// Metric name (e.g., `api_calls`).
    pub metric: String,

    /// Quantity consumed. May be negative for corrections.
    pub quantity: i64,

    /// When the usage occurred.
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    /// Create a record timestamped now.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        customer_id: impl Into<String>,
        subscription_id: impl Into<String>,
        metric: impl Into<String>,
        quantity: i64,
    ) -> Self {
        Self {
            id: id.into(),
            customer_id: customer_id.into(),
            subscription_id: subscription_id.into(),
            metric: metric.into(),
            quantity,
            timestamp: Utc::now(),
        }
    }

    /// Quantity that counts toward a charge (negative clamps to zero).
    #[must_use]
    pub fn billable_quantity(&self) -> u64 {
        u64::try_from(self.quantity).unwrap_or(0)
    }
}

/// A usage event stored by the metering layer. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Event identifier.
    pub id: EventId,

    /// The customer that consumed the usage.
    pub customer_id: String,

    /// Metric key (e.g., `api_calls`).
    pub metric_key: String,

    /// Quantity consumed.
    pub quantity: i64,

    /// When the usage occurred.
    pub timestamp: DateTime<Utc>,

    /// Additional context supplied by the reporter.
    pub metadata: serde_json::Value,
}

impl UsageEvent {
    /// Create a new event with a fresh id.
    #[must_use]
    pub fn new(
        customer_id: impl Into<String>,
        metric_key: impl Into<String>,
        quantity: i64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::generate(),
            customer_id: customer_id.into(),
            metric_key: metric_key.into(),
            quantity,
            timestamp,
            metadata: serde_json::Value::Null,
        }
    }

    /// Set metadata on the event.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Recurring bucket over which a usage limit applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageWindow {
    /// Calendar hour (UTC).
    Hour,
    /// Calendar day (UTC).
    Day,
    /// Calendar month (UTC).
    Month,
}

impl UsageWindow {
    /// Start of the window containing `now`.
    #[must_use]
    pub fn start_at(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let date = now.date_naive();
        let naive = match self {
            Self::Hour => date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(now.hour())),
            Self::Day => date.and_time(NaiveTime::MIN),
            Self::Month => date.with_day(1).unwrap_or(date).and_time(NaiveTime::MIN),
        };
        Utc.from_utc_datetime(&naive)
    }
}

/// A per-window usage limit for one customer and metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePolicy {
    /// The customer the policy applies to.
    pub customer_id: String,

    /// Metric key the policy applies to.
    pub metric_key: String,

    /// Maximum summed quantity per window.
    pub limit: i64,

    /// The window the limit resets on.
    pub window: UsageWindow,
}

impl UsagePolicy {
    /// Create a policy.
    #[must_use]
    pub fn new(
        customer_id: impl Into<String>,
        metric_key: impl Into<String>,
        limit: i64,
        window: UsageWindow,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            metric_key: metric_key.into(),
            limit,
            window,
        }
    }

    /// Derive a policy from `plan.metadata.usageLimits[metric]`.
    #[must_use]
    pub fn from_plan(
        plan: &Plan,
        customer_id: impl Into<String>,
        metric_key: &str,
        window: UsageWindow,
    ) -> Option<Self> {
        plan.usage_limit(metric_key)
            .map(|limit| Self::new(customer_id, metric_key, limit, window))
    }
}

/// How a set of usage events is reduced to a single number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Total of all quantities.
    #[default]
    Sum,
    /// Number of events.
    Count,
    /// Largest single quantity (0 when there are no events).
    Max,
}

impl Aggregation {
    /// Reduce events to a single value.
    #[must_use]
    pub fn apply(self, events: &[UsageEvent]) -> i64 {
        match self {
            Self::Sum => events
                .iter()
                .fold(0_i64, |acc, e| acc.saturating_add(e.quantity)),
            Self::Count => i64::try_from(events.len()).unwrap_or(i64::MAX),
            Self::Max => events.iter().map(|e| e.quantity).max().unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn negative_records_are_not_billable() {
        let mut record = UsageRecord::new("r1", "cus_1", "sub_1", "api_calls", -5);
        assert_eq!(record.billable_quantity(), 0);
        record.quantity = 7;
        assert_eq!(record.billable_quantity(), 7);
    }

    #[test]
    fn window_starts() {
        let now = at("2024-03-17T14:42:09Z");
        assert_eq!(UsageWindow::Hour.start_at(now), at("2024-03-17T14:00:00Z"));
        assert_eq!(UsageWindow::Day.start_at(now), at("2024-03-17T00:00:00Z"));
        assert_eq!(UsageWindow::Month.start_at(now), at("2024-03-01T00:00:00Z"));
    }

    #[test]
    fn aggregations() {
        let now = Utc::now();
        let events = vec![
            UsageEvent::new("cus_1", "api_calls", 4, now),
            UsageEvent::new("cus_1", "api_calls", 9, now),
            UsageEvent::new("cus_1", "api_calls", 2, now),
        ];
        assert_eq!(Aggregation::default(), Aggregation::Sum);
        assert_eq!(Aggregation::Sum.apply(&events), 15);
        assert_eq!(Aggregation::Count.apply(&events), 3);
        assert_eq!(Aggregation::Max.apply(&events), 9);
        assert_eq!(Aggregation::Max.apply(&[]), 0);
    }

    #[test]
    fn usage_event_roundtrips_through_json() {
        let event = UsageEvent::new("cus_1", "api_calls", 3, Utc::now())
            .with_metadata(serde_json::json!({ "request_id": "req_1" }));
        let json = serde_json::to_string(&event).unwrap();
        let parsed: UsageEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
