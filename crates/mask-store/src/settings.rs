//! Application settings, persisted as one JSON document.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tunables persisted in `settings.json`. Unknown fields are preserved by
/// serde defaults on the reader side; every field has a default so a
/// missing document means "all defaults".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Browser engine binary. `None` means resolve from `PATH`.
    pub engine_executable: Option<PathBuf>,
    /// Page opened when a session starts.
    pub start_page: String,
    /// Enable cursor humanization in launched sessions.
    pub humanize: bool,
    pub start_timeout_secs: u64,
    /// Grace period for orderly shutdown before the engine is killed.
    pub stop_grace_secs: u64,
    pub ping_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub geoip_ttl_secs: u64,
    pub geoip_endpoint: String,
    pub probe_endpoint: String,
    /// Default parallelism for batch operations.
    pub default_concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine_executable: None,
            start_page: "about:blank".to_string(),
            humanize: true,
            start_timeout_secs: 30,
            stop_grace_secs: 10,
            ping_timeout_secs: 5,
            probe_timeout_secs: 15,
            geoip_ttl_secs: 3600,
            geoip_endpoint: "http://ip-api.com/json/".to_string(),
            probe_endpoint: "http://ip-api.com/json/".to_string(),
            default_concurrency: 4,
        }
    }
}
