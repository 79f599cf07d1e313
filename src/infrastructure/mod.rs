//! Infrastructure layer - tokio-backed implementations

pub mod cache;
pub mod logging;
pub mod nodes;
pub mod stream;
pub mod workflow;
