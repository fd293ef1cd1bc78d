//! # Access Scope Resolution
//!
//! Turns the streams a caller asked for into the streams the query may touch.

use crate::auth::Identity;
use qy_core::{EffectiveScope, SuggestError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Answers stream read questions for a caller. Safe for concurrent reads.
#[async_trait::async_trait]
pub trait PermissionOracle: Send + Sync {
    /// May `caller` read `stream`?
    async fn can_read(&self, caller: &Identity, stream: &str) -> bool;

    /// Every stream `caller` may read.
    async fn list_readable(&self, caller: &Identity) -> BTreeSet<String>;
}

/// What happens to requested streams the caller cannot read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnreadableStreams {
    /// Leave them out of the scope without telling the caller.
    #[default]
    Drop,
    /// Fail the request with [`SuggestError::AccessDenied`].
    Reject,
}

pub struct AccessScopeResolver {
    oracle: Arc<dyn PermissionOracle>,
    policy: UnreadableStreams,
}

impl AccessScopeResolver {
    pub fn new(oracle: Arc<dyn PermissionOracle>, policy: UnreadableStreams) -> Self {
        Self { oracle, policy }
    }

    /// Resolve the effective scope. An empty result is valid and means
    /// "no data"; it is never reported as an error.
    pub async fn resolve(
        &self,
        caller: &Identity,
        requested: &BTreeSet<String>,
    ) -> Result<EffectiveScope, SuggestError> {
        if requested.is_empty() {
            return Ok(self.oracle.list_readable(caller).await);
        }

        let mut scope = EffectiveScope::new();
        for stream in requested {
            if self.oracle.can_read(caller, stream).await {
                scope.insert(stream.clone());
            } else if self.policy == UnreadableStreams::Reject {
                return Err(SuggestError::AccessDenied);
            } else {
                tracing::debug!(caller = %caller.key_id, "Dropping unreadable stream from scope");
            }
        }
        Ok(scope)
    }
}
