//! # Access Control
//!
//! API key management and scope-based authorization. A validated key becomes
//! an [`Identity`] that handlers pass explicitly to the suggestion resolvers.

pub mod permissions;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use wildmatch::WildMatch;

/// Permission scopes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Read,
    Write,
    Admin,
}

/// An API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub label: String,
    /// The actual key value (only shown once at creation).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// SHA-256 hash of the key (stored for comparison).
    pub key_hash: String,
    pub scopes: Vec<Scope>,
    /// Stream read grants, as wildcard patterns (`web-*`, `*`).
    #[serde(default)]
    pub streams: Vec<String>,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub revoked: bool,
}

impl ApiKey {
    pub fn identity(&self) -> Identity {
        Identity {
            key_id: self.id.clone(),
            label: self.label.clone(),
            admin: self.scopes.contains(&Scope::Admin),
            grants: StreamGrants::new(self.streams.clone()),
        }
    }
}

/// Request to create an API key.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKeyRequest {
    pub label: String,
    pub scopes: Vec<Scope>,
    #[serde(default)]
    pub streams: Vec<String>,
}

// =============================================================================
// Identity
// =============================================================================

/// Compiled stream grant patterns.
#[derive(Debug, Clone, Default)]
pub struct StreamGrants {
    compiled: Vec<WildMatch>,
}

impl StreamGrants {
    pub fn new(patterns: Vec<String>) -> Self {
        let compiled = patterns.iter().map(|p| WildMatch::new(p)).collect();
        Self { compiled }
    }

    pub fn matches(&self, stream: &str) -> bool {
        self.compiled.iter().any(|m| m.matches(stream))
    }
}

/// The caller of a request, resolved from its API key.
#[derive(Debug, Clone)]
pub struct Identity {
    pub key_id: String,
    pub label: String,
    pub admin: bool,
    pub grants: StreamGrants,
}

impl Identity {
    pub fn new(key_id: impl Into<String>, grants: Vec<String>) -> Self {
        let key_id = key_id.into();
        Self {
            label: key_id.clone(),
            key_id,
            admin: false,
            grants: StreamGrants::new(grants),
        }
    }

    #[cfg(test)]
    pub fn admin(key_id: impl Into<String>) -> Self {
        Self {
            admin: true,
            ..Self::new(key_id, Vec::new())
        }
    }

    /// Admins read every stream; everyone else needs a matching grant.
    pub fn may_read(&self, stream: &str) -> bool {
        self.admin || self.grants.matches(stream)
    }
}

// =============================================================================
// Auth layer
// =============================================================================

/// The auth layer state.
pub struct AuthLayer {
    pub api_keys: RwLock<Vec<ApiKey>>,
}

impl AuthLayer {
    pub fn new() -> Self {
        Self {
            api_keys: RwLock::new(Vec::new()),
        }
    }

    /// Create a new API key. Returns the key with the raw value (shown once).
    pub async fn create_key(&self, req: CreateApiKeyRequest) -> ApiKey {
        let raw_key = format!("qy_{}", uuid::Uuid::new_v4().as_simple());
        let key_hash = sha256_hex(&raw_key);

        let api_key = ApiKey {
            id: format!("key-{}", uuid::Uuid::new_v4().as_simple()),
            label: req.label,
            key: Some(raw_key),
            key_hash,
            scopes: req.scopes,
            streams: req.streams,
            created_at: chrono::Utc::now().to_rfc3339(),
            last_used_at: None,
            revoked: false,
        };

        let mut keys = self.api_keys.write().await;
        keys.push(ApiKey {
            key: None,
            ..api_key.clone()
        });
        tracing::info!("Created API key '{}' ({})", api_key.label, api_key.id);

        api_key
    }

    /// Revoke an API key.
    pub async fn revoke_key(&self, key_id: &str) -> Result<(), String> {
        let mut keys = self.api_keys.write().await;
        let key = keys
            .iter_mut()
            .find(|k| k.id == key_id)
            .ok_or_else(|| format!("Key '{}' not found", key_id))?;
        key.revoked = true;
        Ok(())
    }

    /// List all API keys (without raw values).
    pub async fn list_keys(&self) -> Vec<ApiKey> {
        let keys = self.api_keys.read().await;
        keys.iter()
            .map(|k| {
                let mut k = k.clone();
                k.key = None;
                k
            })
            .collect()
    }

    /// Validate a bearer token. Returns the API key if valid.
    pub async fn validate_token(&self, token: &str) -> Option<ApiKey> {
        let hash = sha256_hex(token);
        let mut keys = self.api_keys.write().await;
        let key = keys
            .iter_mut()
            .find(|k| constant_time_eq(&k.key_hash, &hash) && !k.revoked)?;
        key.last_used_at = Some(chrono::Utc::now().to_rfc3339());
        let mut result = key.clone();
        result.key = None;
        Some(result)
    }

    pub fn has_scope(&self, key: &ApiKey, required: Scope) -> bool {
        if key.scopes.contains(&Scope::Admin) {
            return true;
        }
        key.scopes.contains(&required)
    }
}

impl Default for AuthLayer {
    fn default() -> Self {
        Self::new()
    }
}

fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    format!("{:x}", digest)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}
