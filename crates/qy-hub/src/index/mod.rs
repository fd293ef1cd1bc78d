//! # Event Index
//!
//! In-memory, sharded store of stream events. Events are routed to a shard by
//! a CRC32 of their id; each shard answers suggestion queries on its own and
//! the engine merges the partial answers. State is lost on restart.

pub mod shard;

use crate::failures::{FailureSink, IndexingFailure};
use crate::streams::StreamCatalog;
use crate::suggest::engine::IndexShard;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shard::{MemoryShard, ShardStats};
use std::sync::Arc;

/// An event as submitted for indexing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    /// RFC 3339. Defaults to the time of ingestion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// An event as stored in a shard.
#[derive(Debug, Clone)]
pub struct IndexedEvent {
    pub id: String,
    pub stream: String,
    pub timestamp: DateTime<Utc>,
    /// Always a JSON object.
    pub fields: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub failed: usize,
}

pub struct EventIndex {
    shards: Vec<Arc<MemoryShard>>,
    catalog: Arc<StreamCatalog>,
    failures: Arc<dyn FailureSink>,
}

impl EventIndex {
    pub fn new(
        shard_count: usize,
        shard_capacity: usize,
        catalog: Arc<StreamCatalog>,
        failures: Arc<dyn FailureSink>,
    ) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|i| Arc::new(MemoryShard::new(format!("shard-{}", i), shard_capacity)))
            .collect();
        Self {
            shards,
            catalog,
            failures,
        }
    }

    /// The shards as the suggestion engine sees them.
    pub fn query_shards(&self) -> Vec<Arc<dyn IndexShard>> {
        self.shards
            .iter()
            .map(|s| s.clone() as Arc<dyn IndexShard>)
            .collect()
    }

    pub fn shard(&self, id: &str) -> Option<Arc<MemoryShard>> {
        self.shards.iter().find(|s| s.id() == id).cloned()
    }

    pub async fn stats(&self) -> Vec<ShardStats> {
        let mut stats = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            stats.push(shard.stats().await);
        }
        stats
    }

    /// Index a batch. Rejected events are reported to the failure sink and
    /// never abort the rest of the batch.
    pub async fn ingest(&self, events: Vec<IncomingEvent>) -> IngestReport {
        let mut report = IngestReport::default();
        for incoming in events {
            match self.prepare(&incoming).await {
                Ok(event) => {
                    let shard = self.route(&event.id);
                    shard.push(event).await;
                    report.accepted += 1;
                }
                Err((id, reason)) => {
                    let failed_message = serde_json::to_value(&incoming).unwrap_or_default();
                    self.failures
                        .submit(IndexingFailure::new(id, None, "ingest", reason, failed_message))
                        .await;
                    report.failed += 1;
                }
            }
        }
        if report.accepted > 0 || report.failed > 0 {
            tracing::debug!(
                "Ingested {} events ({} rejected)",
                report.accepted,
                report.failed
            );
        }
        report
    }

    fn route(&self, id: &str) -> &Arc<MemoryShard> {
        let slot = crc32fast::hash(id.as_bytes()) as usize % self.shards.len();
        &self.shards[slot]
    }

    async fn prepare(&self, incoming: &IncomingEvent) -> Result<IndexedEvent, (String, String)> {
        let id = incoming
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("evt-{}", uuid::Uuid::new_v4().as_simple()));

        let stream = match incoming.stream.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => return Err((id, "event has no stream".into())),
        };
        if !self.catalog.contains(&stream).await {
            return Err((id, format!("unknown stream '{}'", stream)));
        }

        let timestamp = match incoming.timestamp.as_deref() {
            None => Utc::now(),
            Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                Ok(dt) => dt.with_timezone(&Utc),
                Err(e) => return Err((id, format!("invalid timestamp '{}': {}", raw, e))),
            },
        };

        Ok(IndexedEvent {
            id,
            stream,
            timestamp,
            fields: serde_json::Value::Object(incoming.fields.clone()),
        })
    }
}
