//! # Stream Permissions
//!
//! The hub's [`PermissionOracle`]: answers read checks from the caller's
//! grants and lists readable streams from the [`StreamCatalog`].

use super::Identity;
use crate::streams::StreamCatalog;
use crate::suggest::scope::PermissionOracle;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct StreamPermissions {
    catalog: Arc<StreamCatalog>,
}

impl StreamPermissions {
    pub fn new(catalog: Arc<StreamCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait::async_trait]
impl PermissionOracle for StreamPermissions {
    /// Only catalogued streams are readable, so a removed stream drops out
    /// of every scope even if its events are still indexed.
    async fn can_read(&self, caller: &Identity, stream: &str) -> bool {
        caller.may_read(stream) && self.catalog.contains(stream).await
    }

    async fn list_readable(&self, caller: &Identity) -> BTreeSet<String> {
        self.catalog
            .ids()
            .await
            .into_iter()
            .filter(|id| caller.may_read(id))
            .collect()
    }
}
