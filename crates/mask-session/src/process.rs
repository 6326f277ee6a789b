//! Engine process supervision.
//!
//! Launch protocol: the launch configuration is written to the child's
//! stdin as one JSON line, so proxy credentials never appear in the
//! command line or on disk. The child prints `READY` on stdout once it is
//! serving; `SHUTDOWN` on stdin requests an orderly exit.

use crate::engine::{BrowserEngine, EngineError, EngineSession, LaunchConfig};
use async_trait::async_trait;
use mask_fingerprint::Fingerprint;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

#[derive(Serialize)]
struct WireProxy {
    server: String,
    username: Option<String>,
    password: Option<String>,
}

/// The stdin handshake document. Transient: serialized straight into the
/// child's pipe.
#[derive(Serialize)]
struct WireConfig<'a> {
    profile_id: String,
    data_dir: &'a PathBuf,
    fingerprint: &'a Fingerprint,
    proxy: Option<WireProxy>,
    start_page: &'a str,
    humanize: bool,
}

impl<'a> WireConfig<'a> {
    fn from_launch(config: &'a LaunchConfig) -> Self {
        Self {
            profile_id: config.profile_id.to_string(),
            data_dir: &config.data_dir,
            fingerprint: &config.fingerprint,
            proxy: config.proxy.as_ref().map(|p| WireProxy {
                server: p.server(),
                username: p.username.clone(),
                password: p.password.clone(),
            }),
            start_page: &config.start_page,
            humanize: config.humanize,
        }
    }
}

/// Launches and supervises external engine processes.
pub struct ProcessEngine {
    executable: PathBuf,
    start_timeout: Duration,
}

impl ProcessEngine {
    pub fn new(executable: PathBuf, start_timeout: Duration) -> Self {
        Self {
            executable,
            start_timeout,
        }
    }
}

#[async_trait]
impl BrowserEngine for ProcessEngine {
    async fn launch(&self, config: LaunchConfig) -> Result<Box<dyn EngineSession>, EngineError> {
        let mut child = Command::new(&self.executable)
            .arg("--data-dir")
            .arg(&config.data_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(EngineError::Spawn)?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            EngineError::Spawn(std::io::Error::other("child stdin unavailable"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            EngineError::Spawn(std::io::Error::other("child stdout unavailable"))
        })?;

        let wire = serde_json::to_string(&WireConfig::from_launch(&config))
            .map_err(|e| EngineError::Spawn(std::io::Error::other(e)))?;
        stdin.write_all(wire.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        let ready = tokio::time::timeout(self.start_timeout, async {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                debug!("engine[{}]: {line}", config.profile_id);
                if line.trim() == "READY" {
                    return Ok(true);
                }
            }
            Ok::<bool, std::io::Error>(false)
        })
        .await;

        match ready {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                // stdout closed without READY: the child is gone.
                let code = child.wait().await.ok().and_then(|s| s.code());
                return Err(EngineError::ExitedEarly(code));
            }
            Ok(Err(e)) => {
                let _ = child.start_kill();
                return Err(EngineError::Io(e));
            }
            Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(EngineError::StartTimeout(self.start_timeout));
            }
        }

        info!(
            "Engine ready for profile {} (pid {:?})",
            config.profile_id,
            child.id()
        );
        Ok(Box::new(ProcessSession {
            child,
            stdin: Some(stdin),
        }))
    }
}

struct ProcessSession {
    child: Child,
    stdin: Option<ChildStdin>,
}

#[async_trait]
impl EngineSession for ProcessSession {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn shutdown(&mut self, grace: Duration) -> Result<(), EngineError> {
        if let Some(mut stdin) = self.stdin.take() {
            // A closed pipe just means the child already exited.
            let _ = stdin.write_all(b"SHUTDOWN\n").await;
            let _ = stdin.flush().await;
            drop(stdin);
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Engine exited with {status}");
                Ok(())
            }
            Ok(Err(e)) => Err(EngineError::Io(e)),
            Err(_) => {
                warn!("Engine ignored shutdown request, killing");
                self.child.kill().await?;
                Ok(())
            }
        }
    }
}
