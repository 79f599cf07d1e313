//! Engine cache key generation

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Namespace of compiled-engine entries
pub const ENGINE_KEY_NAMESPACE: &str = "workflow:engine";

/// Fixed expiry of compiled-engine entries
pub const ENGINE_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Identity of a compiled workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineCacheKey {
    /// Published version rather than a debug draft
    pub is_release: bool,
    pub flow_id: String,
    pub version: String,
    pub app_alias_id: String,
}

impl EngineCacheKey {
    pub fn new(
        is_release: bool,
        flow_id: impl Into<String>,
        version: impl Into<String>,
        app_alias_id: impl Into<String>,
    ) -> Self {
        Self {
            is_release,
            flow_id: flow_id.into(),
            version: version.into(),
            app_alias_id: app_alias_id.into(),
        }
    }

    /// Cache key for the hour bucket containing `now`
    ///
    /// Format: `workflow:engine:{release|debug}:{flow}:{version}:{alias}:{YYYYMMDDHH}`
    pub fn render(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}",
            ENGINE_KEY_NAMESPACE,
            self.mode(),
            self.flow_id,
            self.version,
            self.app_alias_id,
            now.format("%Y%m%d%H")
        )
    }

    fn mode(&self) -> &'static str {
        if self.is_release {
            "release"
        } else {
            "debug"
        }
    }
}

impl fmt::Display for EngineCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.mode(),
            self.flow_id,
            self.version,
            self.app_alias_id
        )
    }
}
