//! Application-wide constants
//!
//! File names, timings and sentinel values used across the screen pool,
//! kept in one place so the daemon and the library agree on them.

/// Configuration file locations
pub mod config {
    /// Directory under the user config dir (e.g. ~/.config/screenpool)
    pub const APP_DIR: &str = "screenpool";

    /// Daemon settings file
    pub const SETTINGS_FILENAME: &str = "settings.json";

    /// Persisted id → connector mapping
    pub const CONNECTORS_FILENAME: &str = "screen_connectors.json";
}

/// Debounce and polling intervals
pub mod timing {
    /// Geometry notifications are coalesced for this long before a redundancy sweep
    pub const RECONSIDER_OUTPUTS_MS: u64 = 250;

    /// Minimum spacing between two writes of the connector mapping to disk
    pub const CONFIG_SAVE_COOLDOWN_SECS: u64 = 30;

    /// Upper bound on how long the daemon loop sleeps without checking for shutdown
    pub const EVENT_LOOP_IDLE_MS: u64 = 500;
}

/// Output naming conventions
pub mod outputs {
    /// Name of the placeholder output an X11 server reports when nothing is connected
    pub const X11_FAKE_OUTPUT_NAME: &str = ":0.0";
}

/// Logging defaults
pub mod logging {
    /// Environment variable consulted for the log level
    pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

    /// Level used when nothing else is configured
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}
