//! Configuration management for screenpool
//!
//! This module provides two pieces of on-disk state:
//! - **settings**: daemon behavior (log level, debounce intervals, fake output names)
//! - **store**: the persisted screen id ↔ connector mapping, written back lazily

pub mod settings;
pub mod store;

// Re-export commonly used types
pub use settings::{PoolSettings, Settings};
pub use store::{ConnectorStore, JsonConnectorStore, MemoryConnectorStore};
