//! Audit log records and the persistence seam they are written through
//!
//! Each request produces two writes against the same [`RequestId`]: an
//! insert when it arrives and an update once its response has been sent.

use crate::pipeline::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Notify;

/// First write, persisted before the request reaches the handler
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalRecord {
    pub request_id: RequestId,
    pub user_name: Option<UserName>,
    pub endpoint: String,
    pub method: String,
    pub request_timestamp: DateTime<Utc>,
    pub body: Option<String>,
    pub query: String,
}

/// Second write, keyed by the id of the matching [`ArrivalRecord`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub request_id: RequestId,
    pub status_code: u16,
    pub response_timestamp: DateTime<Utc>,
}

/// Lifecycle of a stored entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditState {
    Arrived,
    Completed,
}

/// A stored audit row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub arrival: ArrivalRecord,
    pub status_code: Option<u16>,
    pub response_timestamp: Option<DateTime<Utc>>,
}

impl LogEntry {
    pub fn state(&self) -> AuditState {
        if self.status_code.is_some() {
            AuditState::Completed
        } else {
            AuditState::Arrived
        }
    }
}

/// Persistence collaborator for audit rows.
///
/// Implementations are shared by all in-flight requests and must serialize
/// their own writes. Both operations are keyed by request id and safe to
/// repeat for the same id.
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn insert(&self, record: &ArrivalRecord) -> PipelineResult<()>;

    async fn update(&self, record: &CompletionRecord) -> PipelineResult<()>;
}

#[derive(Default)]
struct InMemoryState {
    entries: HashMap<RequestId, LogEntry>,
    inserts: usize,
    updates: usize,
}

impl InMemoryState {
    fn writes(&self) -> usize {
        self.inserts + self.updates
    }
}

/// Process-local audit store, also used as the test double.
///
/// Holds one row per request and a running count of writes.
#[derive(Default)]
pub struct InMemoryAuditLogStore {
    state: Mutex<InMemoryState>,
    written: Notify,
}

impl InMemoryAuditLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, request_id: &RequestId) -> Option<LogEntry> {
        self.state.lock().entries.get(request_id).cloned()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        let mut entries: Vec<LogEntry> = self.state.lock().entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.arrival.request_timestamp);
        entries
    }

    /// Inserts received so far, repeats included
    pub fn insert_count(&self) -> usize {
        self.state.lock().inserts
    }

    /// Updates received so far, including ones that matched no row
    pub fn update_count(&self) -> usize {
        self.state.lock().updates
    }

    /// Wait until at least `count` writes have been received.
    ///
    /// Returns whether the count was reached before `timeout`.
    pub async fn wait_for_writes(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let written = self.written.notified();
            if self.state.lock().writes() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, written).await.is_err() {
                return self.state.lock().writes() >= count;
            }
        }
    }
}

#[async_trait]
impl AuditLogStore for InMemoryAuditLogStore {
    async fn insert(&self, record: &ArrivalRecord) -> PipelineResult<()> {
        {
            let mut state = self.state.lock();
            state.inserts += 1;
            state
                .entries
                .entry(record.request_id)
                .or_insert_with(|| LogEntry {
                    arrival: record.clone(),
                    status_code: None,
                    response_timestamp: None,
                });
        }
        self.written.notify_waiters();
        Ok(())
    }

    async fn update(&self, record: &CompletionRecord) -> PipelineResult<()> {
        {
            let mut state = self.state.lock();
            state.updates += 1;
            // An update without a matching row touches nothing, like SQL UPDATE
            if let Some(entry) = state.entries.get_mut(&record.request_id) {
                entry.status_code = Some(record.status_code);
                entry.response_timestamp = Some(record.response_timestamp);
            }
        }
        self.written.notify_waiters();
        Ok(())
    }
}
