//! In-memory storage implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use z_charge_core::{EventId, UsageEvent, UsagePolicy, UsageRecord};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::Store;

#[derive(Default)]
struct Tables {
    events: HashMap<String, Vec<UsageEvent>>,
    event_ids: HashSet<EventId>,
    records: HashMap<String, Vec<UsageRecord>>,
    policies: HashMap<String, UsagePolicy>,
}

/// Process-local storage backed by hash maps.
///
/// Locks are never held across an `.await`.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored usage events.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn event_count(&self) -> Result<usize> {
        Ok(self.read()?.event_ids.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }
}

fn in_range(ts: DateTime<Utc>, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> bool {
    start.map_or(true, |s| ts >= s) && end.map_or(true, |e| ts <= e)
}

#[async_trait]
impl Store for MemoryStore {
    // =========================================================================
    // Usage Event Operations
    // =========================================================================

    async fn put_usage_event(&self, event: &UsageEvent) -> Result<()> {
        let mut tables = self.write()?;

        if !tables.event_ids.insert(event.id) {
            return Err(StoreError::DuplicateEvent {
                event_id: event.id.to_string(),
            });
        }

        let key = keys::usage_key(&event.customer_id, &event.metric_key);
        let events = tables.events.entry(key).or_default();
        // Keep each series sorted by timestamp; appends are the common case.
        let at = events.partition_point(|e| e.timestamp <= event.timestamp);
        events.insert(at, event.clone());

        tracing::trace!(event_id = %event.id, "Stored usage event");
        Ok(())
    }

    async fn list_usage_events(
        &self,
        customer_id: &str,
        metric_key: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageEvent>> {
        let tables = self.read()?;
        let key = keys::usage_key(customer_id, metric_key);

        Ok(tables
            .events
            .get(&key)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| in_range(e.timestamp, start, end))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    // =========================================================================
    // Usage Record Operations
    // =========================================================================

    async fn put_usage_record(&self, record: &UsageRecord) -> Result<()> {
        let mut tables = self.write()?;
        let key = keys::usage_key(&record.customer_id, &record.metric);
        tables.records.entry(key).or_default().push(record.clone());
        Ok(())
    }

    async fn list_usage_records(
        &self,
        customer_id: &str,
        metric: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageRecord>> {
        let tables = self.read()?;
        let key = keys::usage_key(customer_id, metric);

        Ok(tables
            .records
            .get(&key)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| in_range(r.timestamp, since, None))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    // =========================================================================
    // Policy Operations
    // =========================================================================

    async fn put_usage_policy(&self, policy: &UsagePolicy) -> Result<()> {
        let mut tables = self.write()?;
        let key = keys::policy_key(&policy.customer_id, &policy.metric_key);
        tables.policies.insert(key, policy.clone());
        Ok(())
    }

    async fn get_usage_policy(
        &self,
        customer_id: &str,
        metric_key: &str,
    ) -> Result<Option<UsagePolicy>> {
        let tables = self.read()?;
        Ok(tables
            .policies
            .get(&keys::policy_key(customer_id, metric_key))
            .cloned())
    }
}
