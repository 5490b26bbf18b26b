//! Usage accounting and per-owner quotas.
//!
//! One [`UsageRecord`] is written per successful extraction. Before any work
//! starts, [`QuotaGate::reserve`] compares the owner's recorded and in-flight
//! extractions with the configured maximum. Persistence is left to [`UsageStore`] implementors;
//! [`InMemoryUsageStore`] keeps records for the lifetime of the process.

use crate::error::OcrError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// One successful extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub filename: String,
    pub page_count: usize,
    pub owner: String,
}

/// Where usage records live.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn record(&self, record: UsageRecord) -> Result<(), OcrError>;

    /// Number of extractions recorded for `owner`.
    async fn count(&self, owner: &str) -> Result<u64, OcrError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    records: Mutex<Vec<UsageRecord>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record, oldest first.
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn record(&self, record: UsageRecord) -> Result<(), OcrError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| OcrError::Internal("usage store lock poisoned".into()))?;
        debug!(
            "Recording usage: owner={} file={} pages={}",
            record.owner, record.filename, record.page_count
        );
        records.push(record);
        Ok(())
    }

    async fn count(&self, owner: &str) -> Result<u64, OcrError> {
        let records = self
            .records
            .lock()
            .map_err(|_| OcrError::Internal("usage store lock poisoned".into()))?;
        Ok(records.iter().filter(|r| r.owner == owner).count() as u64)
    }
}

/// Admits requests against the per-owner quota.
///
/// Recorded usage only grows once a request finishes, so an admitted request
/// holds a [`QuotaReservation`] until then. Requests still in flight count
/// against the limit, and concurrent requests from one owner cannot all slip
/// past the check.
#[derive(Debug, Default)]
pub struct QuotaGate {
    admission: tokio::sync::Mutex<()>,
    pending: Arc<Mutex<HashMap<String, u64>>>,
}

impl QuotaGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject `owner` once recorded plus in-flight extractions reach `limit`,
    /// otherwise hold a slot. `None` disables the check.
    pub async fn reserve(
        &self,
        store: &dyn UsageStore,
        owner: &str,
        limit: Option<u64>,
    ) -> Result<QuotaReservation, OcrError> {
        let Some(limit) = limit else {
            return Ok(QuotaReservation { slot: None });
        };

        let _admission = self.admission.lock().await;
        let recorded = store.count(owner).await?;
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| OcrError::Internal("quota lock poisoned".into()))?;
        let in_flight = pending.get(owner).copied().unwrap_or(0);
        let used = recorded + in_flight;
        if used >= limit {
            warn!(
                "Quota exceeded for '{}': {}/{} ({} in flight)",
                owner, used, limit, in_flight
            );
            return Err(OcrError::QuotaExceeded {
                owner: owner.to_string(),
                used,
                limit,
            });
        }
        *pending.entry(owner.to_string()).or_insert(0) += 1;
        debug!("Quota slot reserved for '{}': {}/{}", owner, used + 1, limit);

        Ok(QuotaReservation {
            slot: Some((owner.to_string(), Arc::clone(&self.pending))),
        })
    }

    /// Requests currently holding a slot for `owner`.
    pub fn in_flight(&self, owner: &str) -> u64 {
        self.pending
            .lock()
            .map(|p| p.get(owner).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

/// A held quota slot, released on drop.
#[derive(Debug)]
pub struct QuotaReservation {
    slot: Option<(String, Arc<Mutex<HashMap<String, u64>>>)>,
}

impl Drop for QuotaReservation {
    fn drop(&mut self) {
        let Some((owner, pending)) = self.slot.take() else {
            return;
        };
        if let Ok(mut pending) = pending.lock() {
            if let Some(n) = pending.get_mut(&owner) {
                *n = n.saturating_sub(1);
                if *n == 0 {
                    pending.remove(&owner);
                }
            }
        };
    }
}
