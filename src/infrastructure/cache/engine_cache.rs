//! Memoization of compiled workflows

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::cache::{Cache, CacheExt, EngineCacheKey, ENGINE_CACHE_TTL};
use crate::domain::chains::CompiledWorkflow;
use crate::domain::DomainError;

/// Stores compiled workflows in a byte cache under hourly-bucketed keys
#[derive(Debug, Clone)]
pub struct EngineCache {
    cache: Arc<dyn Cache>,
}

impl EngineCache {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Looks up a compiled workflow built after the DSL was last modified
    ///
    /// Stale or unreadable entries are deleted and reported as a miss.
    pub async fn get(
        &self,
        key: &EngineCacheKey,
        dsl_updated_at: DateTime<Utc>,
    ) -> Result<Option<CompiledWorkflow>, DomainError> {
        self.get_at(key, dsl_updated_at, Utc::now()).await
    }

    pub async fn set(
        &self,
        key: &EngineCacheKey,
        compiled: &CompiledWorkflow,
    ) -> Result<(), DomainError> {
        self.set_at(key, compiled, Utc::now()).await
    }

    /// Drops the entry of the current hour bucket
    pub async fn invalidate(&self, key: &EngineCacheKey) -> Result<bool, DomainError> {
        self.cache.delete(&key.render(Utc::now())).await
    }

    pub(crate) async fn get_at(
        &self,
        key: &EngineCacheKey,
        dsl_updated_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<CompiledWorkflow>, DomainError> {
        let rendered = key.render(now);

        let compiled = match self.cache.get::<CompiledWorkflow>(&rendered).await {
            Ok(Some(compiled)) => compiled,
            Ok(None) => {
                debug!(key = %rendered, "Engine cache miss");
                return Ok(None);
            }
            Err(DomainError::Serialization { message }) => {
                warn!(key = %rendered, error = %message, "Discarding unreadable engine cache entry");
                self.cache.delete(&rendered).await?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if !compiled.is_fresh(dsl_updated_at) {
            debug!(
                key = %rendered,
                built_at = %compiled.build_timestamp,
                updated_at = %dsl_updated_at,
                "Discarding stale engine cache entry"
            );
            self.cache.delete(&rendered).await?;
            return Ok(None);
        }

        debug!(key = %rendered, "Engine cache hit");
        Ok(Some(compiled))
    }

    pub(crate) async fn set_at(
        &self,
        key: &EngineCacheKey,
        compiled: &CompiledWorkflow,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let rendered = key.render(now);
        self.cache.set(&rendered, compiled, ENGINE_CACHE_TTL).await?;

        debug!(key = %rendered, "Stored compiled workflow");
        Ok(())
    }
}
