//! # Indexing Failures
//!
//! Events the index refused are handed to a [`FailureSink`] as
//! [`IndexingFailure`] records. The hub keeps the most recent ones in memory
//! for inspection; a real deployment would forward them downstream.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Indexing,
}

/// A message that could not be written to the index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexingFailure {
    failure_type: FailureType,
    pub failed_message_id: String,
    /// Shard the message was routed to, if routing got that far.
    pub target_index: Option<String>,
    pub context: String,
    pub error_message: String,
    pub timestamp: DateTime<Utc>,
    pub failed_message: serde_json::Value,
}

impl IndexingFailure {
    pub fn new(
        failed_message_id: impl Into<String>,
        target_index: Option<String>,
        context: impl Into<String>,
        error_message: impl Into<String>,
        failed_message: serde_json::Value,
    ) -> Self {
        Self {
            failure_type: FailureType::Indexing,
            failed_message_id: failed_message_id.into(),
            target_index,
            context: context.into(),
            error_message: error_message.into(),
            timestamp: Utc::now(),
            failed_message,
        }
    }

    pub fn failure_type(&self) -> FailureType {
        self.failure_type
    }
}

/// Consumer of failure records.
#[async_trait::async_trait]
pub trait FailureSink: Send + Sync {
    async fn submit(&self, failure: IndexingFailure);
}

/// Bounded in-memory sink; the oldest record is dropped when full.
pub struct MemoryFailureSink {
    records: RwLock<VecDeque<IndexingFailure>>,
    capacity: usize,
}

impl MemoryFailureSink {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Most recent failures, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<IndexingFailure> {
        let records = self.records.read().await;
        records.iter().rev().take(limit).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait::async_trait]
impl FailureSink for MemoryFailureSink {
    async fn submit(&self, failure: IndexingFailure) {
        tracing::warn!(
            message_id = %failure.failed_message_id,
            failure_type = ?failure.failure_type(),
            "Indexing failure ({}): {}",
            failure.context,
            failure.error_message
        );
        let mut records = self.records.write().await;
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(failure);
    }
}
