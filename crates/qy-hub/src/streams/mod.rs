//! # Stream Catalog
//!
//! Thread-safe registry of the streams events can be indexed into. It is the
//! source of truth for "all streams" when a caller's readable set is listed.
//! Nothing here is persisted.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: String,
}

/// Request to register a stream.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateStreamRequest {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("invalid stream id '{0}'")]
    InvalidId(String),
    #[error("stream '{0}' already exists")]
    Duplicate(String),
    #[error("stream '{0}' not found")]
    NotFound(String),
}

pub struct StreamCatalog {
    streams: RwLock<BTreeMap<String, StreamInfo>>,
}

impl StreamCatalog {
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a stream. Ids are unique and may not contain whitespace.
    pub async fn create(&self, req: CreateStreamRequest) -> Result<StreamInfo, CatalogError> {
        let id = req.id.trim().to_string();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(CatalogError::InvalidId(req.id));
        }

        let mut streams = self.streams.write().await;
        if streams.contains_key(&id) {
            return Err(CatalogError::Duplicate(id));
        }

        let info = StreamInfo {
            title: req.title.unwrap_or_else(|| id.clone()),
            id: id.clone(),
            description: req.description,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        streams.insert(id, info.clone());
        Ok(info)
    }

    pub async fn remove(&self, id: &str) -> Result<StreamInfo, CatalogError> {
        let mut streams = self.streams.write().await;
        streams
            .remove(id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    pub async fn list(&self) -> Vec<StreamInfo> {
        self.streams.read().await.values().cloned().collect()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.streams.read().await.contains_key(id)
    }

    pub async fn ids(&self) -> BTreeSet<String> {
        self.streams.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.streams.read().await.len()
    }
}

impl Default for StreamCatalog {
    fn default() -> Self {
        Self::new()
    }
}
