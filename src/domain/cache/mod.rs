//! Cache domain - byte-oriented cache abstraction and engine cache keys

mod key;
mod repository;

pub use key::{EngineCacheKey, ENGINE_CACHE_TTL, ENGINE_KEY_NAMESPACE};
pub use repository::{Cache, CacheExt};

#[cfg(test)]
pub use repository::mock::MockCache;
