//! # Memory Shard
//!
//! One partition of the in-memory event index: a bounded ring of events that
//! answers field-value aggregations for the suggestion engine.

use super::IndexedEvent;
use crate::suggest::engine::{FieldValueQuery, IndexShard};
use qy_core::{RetrievalError, ValueCount};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Serializable shard info for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ShardStats {
    pub id: String,
    pub available: bool,
    pub events: usize,
    pub capacity: usize,
    pub events_total: u64,
    pub evicted_total: u64,
    pub queries_total: u64,
}

pub struct MemoryShard {
    id: String,
    events: RwLock<VecDeque<IndexedEvent>>,
    capacity: usize,
    available: AtomicBool,
    events_total: AtomicU64,
    evicted_total: AtomicU64,
    queries_total: AtomicU64,
}

impl MemoryShard {
    pub fn new(id: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            id: id.into(),
            events: RwLock::new(VecDeque::new()),
            capacity,
            available: AtomicBool::new(true),
            events_total: AtomicU64::new(0),
            evicted_total: AtomicU64::new(0),
            queries_total: AtomicU64::new(0),
        }
    }

    /// Append an event, evicting the oldest one when the ring is full.
    pub async fn push(&self, event: IndexedEvent) {
        let mut events = self.events.write().await;
        if events.len() >= self.capacity {
            events.pop_front();
            self.evicted_total.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(event);
        self.events_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    pub async fn stats(&self) -> ShardStats {
        ShardStats {
            id: self.id.clone(),
            available: self.is_available(),
            events: self.events.read().await.len(),
            capacity: self.capacity,
            events_total: self.events_total.load(Ordering::Relaxed),
            evicted_total: self.evicted_total.load(Ordering::Relaxed),
            queries_total: self.queries_total.load(Ordering::Relaxed),
        }
    }
}

#[async_trait::async_trait]
impl IndexShard for MemoryShard {
    fn id(&self) -> &str {
        &self.id
    }

    async fn query_field_values(
        &self,
        query: &FieldValueQuery,
    ) -> Result<Vec<ValueCount>, RetrievalError> {
        if !self.is_available() {
            return Err(RetrievalError::Unavailable {
                shard: self.id.clone(),
                reason: "shard is marked unavailable".into(),
            });
        }
        self.queries_total.fetch_add(1, Ordering::Relaxed);

        let events = self.events.read().await;
        let mut counts: HashMap<String, u64> = HashMap::new();

        for event in events
            .iter()
            .filter(|e| query.streams.contains(&e.stream) && query.bounds.contains(e.timestamp))
        {
            // An event counts once per distinct value, even if the field repeats it.
            let mut seen = HashSet::new();
            for value in extract_values(event, &query.field) {
                if query.matches_value(&value) && seen.insert(value.clone()) {
                    *counts.entry(value).or_insert(0) += 1;
                }
            }
        }

        Ok(counts
            .into_iter()
            .map(|(value, count)| ValueCount { value, count })
            .collect())
    }
}

/// String forms of `field` in `event`. Arrays contribute each scalar element.
fn extract_values(event: &IndexedEvent, field: &str) -> Vec<String> {
    // Check top-level event fields
    match field {
        "id" => return vec![event.id.clone()],
        "stream" => return vec![event.stream.clone()],
        "timestamp" => return vec![event.timestamp.to_rfc3339()],
        _ => {}
    }

    let value = event.fields.get(field).or_else(|| {
        // Nested lookup: "http.status" or "fields.http.status" → "/http/status"
        let path = field.strip_prefix("fields.").unwrap_or(field);
        let pointer = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path.replace('.', "/"))
        };
        event.fields.pointer(&pointer)
    });

    match value {
        Some(serde_json::Value::Array(items)) => items.iter().filter_map(scalar_to_string).collect(),
        Some(other) => scalar_to_string(other).into_iter().collect(),
        None => Vec::new(),
    }
}

fn scalar_to_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
