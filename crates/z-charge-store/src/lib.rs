//! Storage layer for z-charge usage data.
//!
//! The billing engine never persists anything itself. Metering and usage
//! gating go through the [`Store`] trait, which hosts implement on top of
//! their own database. [`MemoryStore`] is a complete in-process backend
//! used by tests and single-node deployments.
//!
//! # Example
//!
//! ```no_run
//! use z_charge_store::{MemoryStore, Store};
//! use z_charge_core::UsageEvent;
//!
//! # async fn example() -> z_charge_store::Result<()> {
//! let store = MemoryStore::new();
//! let event = UsageEvent::new("cus_1", "api_calls", 3, chrono::Utc::now());
//! store.put_usage_event(&event).await?;
//!
//! let events = store.list_usage_events("cus_1", "api_calls", None, None).await?;
//! assert_eq!(events.len(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use z_charge_core::{UsageEvent, UsagePolicy, UsageRecord};

/// The storage trait defining all persistence the engine relies on.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (SQL, key-value, in-memory for testing).
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Usage Event Operations
    // =========================================================================

    /// Persist a usage event.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateEvent` if an event with the same id
    /// exists, or an error if the backend fails.
    async fn put_usage_event(&self, event: &UsageEvent) -> Result<()>;

    /// List a customer's events for a metric, oldest first.
    ///
    /// `start` and `end` are inclusive; `None` leaves that side open.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn list_usage_events(
        &self,
        customer_id: &str,
        metric_key: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageEvent>>;

    // =========================================================================
    // Usage Record Operations
    // =========================================================================

    /// Persist a usage record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn put_usage_record(&self, record: &UsageRecord) -> Result<()>;

    /// List a customer's records for a metric with `timestamp >= since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn list_usage_records(
        &self,
        customer_id: &str,
        metric: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<UsageRecord>>;

    // =========================================================================
    // Policy Operations
    // =========================================================================

    /// Insert or replace the policy for a customer and metric.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn put_usage_policy(&self, policy: &UsagePolicy) -> Result<()>;

    /// Get the policy for a customer and metric.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get_usage_policy(
        &self,
        customer_id: &str,
        metric_key: &str,
    ) -> Result<Option<UsagePolicy>>;
}
