//! The browser engine abstraction.
//!
//! The orchestrator drives sessions through these traits; the production
//! implementation wraps an external engine process, and tests substitute
//! an in-memory mock.

use async_trait::async_trait;
use mask_fingerprint::Fingerprint;
use mask_store::{ProfileId, ProxyTarget};
use std::path::PathBuf;
use std::time::Duration;

/// Everything an engine needs to bring up one session. Carries the
/// decrypted proxy credentials; exists only for the duration of a launch.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub profile_id: ProfileId,
    /// Per-profile browser data directory.
    pub data_dir: PathBuf,
    pub fingerprint: Fingerprint,
    pub proxy: Option<ProxyTarget>,
    pub start_page: String,
    pub humanize: bool,
}

/// Engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to spawn engine process: {0}")]
    Spawn(std::io::Error),

    #[error("Engine did not report ready within {0:?}")]
    StartTimeout(Duration),

    #[error("Engine exited during startup (code {0:?})")]
    ExitedEarly(Option<i32>),

    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A launcher for browser sessions.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Launch a session and wait until it is ready to serve. Implementations
    /// own their readiness protocol and startup timeout.
    async fn launch(&self, config: LaunchConfig) -> Result<Box<dyn EngineSession>, EngineError>;
}

/// One live browser session.
#[async_trait]
pub trait EngineSession: Send {
    fn pid(&self) -> Option<u32>;

    /// Whether the session is still running.
    async fn is_alive(&mut self) -> bool;

    /// Orderly shutdown: ask the session to exit, wait up to `grace`, then
    /// force-kill.
    async fn shutdown(&mut self, grace: Duration) -> Result<(), EngineError>;
}
