//! Cache infrastructure - Cache implementations and the compiled-engine cache

mod engine_cache;
mod factory;
mod in_memory;
mod redis;

pub use engine_cache::EngineCache;
pub use factory::{CacheConfig, CacheFactory, CacheType};
pub use in_memory::{InMemoryCache, InMemoryCacheConfig};
pub use redis::{RedisCache, RedisCacheConfig};
