//! Tool catalog cache
//!
//! Uses moka async cache (TTL-based expiry). Concurrent misses share one
//! fetch; failed fetches are not stored.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use super::errors::BridgeError;
use super::types::ToolDescriptor;

/// Shared, immutable catalog snapshot
pub type Catalog = Arc<Vec<ToolDescriptor>>;

const CATALOG_KEY: &str = "catalog";

/// Time-bounded memo of one server's tool catalog
#[derive(Clone)]
pub struct ToolCatalogCache {
    /// `None` when caching is disabled
    catalog: Option<Cache<&'static str, Catalog>>,
}

impl ToolCatalogCache {
    /// A zero `ttl` disables caching.
    pub fn new(ttl: Duration) -> Self {
        let catalog = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(1)
                .time_to_live(ttl)
                .build()
        });
        ToolCatalogCache { catalog }
    }

    pub fn is_enabled(&self) -> bool {
        self.catalog.is_some()
    }

    /// Cached catalog, if one is still fresh
    pub async fn get(&self) -> Option<Catalog> {
        match &self.catalog {
            Some(cache) => cache.get(&CATALOG_KEY).await,
            None => None,
        }
    }

    /// Return the fresh catalog or run `fetch` to produce one.
    pub async fn get_or_fetch<F>(&self, fetch: F) -> Result<Catalog, BridgeError>
    where
        F: Future<Output = Result<Vec<ToolDescriptor>, BridgeError>>,
    {
        let Some(cache) = &self.catalog else {
            return fetch.await.map(Arc::new);
        };

        cache
            .try_get_with(CATALOG_KEY, async move { fetch.await.map(Arc::new) })
            .await
            .map_err(|e| (*e).clone())
    }

    /// Drop the cached catalog
    pub async fn invalidate(&self) {
        if let Some(cache) = &self.catalog {
            cache.invalidate(&CATALOG_KEY).await;
        }
    }
}
