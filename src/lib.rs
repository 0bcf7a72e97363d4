//! Stable screen identities for a changing set of display outputs.
//!
//! `ScreenPool` gives every connected output a small integer id that
//! survives restarts, keeps id 0 on the primary output, hides outputs that
//! only mirror another one, and tells subscribers when the resulting logical
//! screen set changes.

#![forbid(unsafe_code)]

pub mod config;
pub mod constants;
pub mod identity;
pub mod output;
pub mod redundancy;
pub mod screen_pool;
pub mod timer;
pub mod types;
pub mod x11_utils;

pub use config::{ConnectorStore, JsonConnectorStore, MemoryConnectorStore, PoolSettings, Settings};
pub use identity::IdentityTable;
pub use output::{OutputEvent, OutputSource, OutputTracker};
pub use screen_pool::{OutputState, ScreenPool};
pub use types::{Output, OutputHandle, Rect, ScreenEvent, ScreenId};
