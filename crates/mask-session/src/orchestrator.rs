//! Session Orchestrator
//!
//! Owns the mapping from profile id to live engine session and drives the
//! profile status machine through it. Start/stop/ping for one profile are
//! serialized behind a per-profile lock; distinct profiles operate in
//! parallel.

use crate::engine::{BrowserEngine, EngineError, EngineSession, LaunchConfig};
use mask_store::sync::KeyedLocks;
use mask_store::{ProfileId, ProfileStatus, Storage, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Orchestrator errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Profile {0} already has a session ({1})")]
    AlreadyRunning(ProfileId, ProfileStatus),

    #[error("Profile {0} has no running session")]
    NotRunning(ProfileId),

    #[error("Session for profile {0} died unexpectedly")]
    SessionDied(ProfileId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Drives browser sessions for profiles.
pub struct SessionOrchestrator {
    store: Arc<Storage>,
    engine: Arc<dyn BrowserEngine>,
    sessions: Mutex<HashMap<ProfileId, Box<dyn EngineSession>>>,
    locks: KeyedLocks<ProfileId>,
}

impl SessionOrchestrator {
    pub fn new(store: Arc<Storage>, engine: Arc<dyn BrowserEngine>) -> Self {
        Self {
            store,
            engine,
            sessions: Mutex::new(HashMap::new()),
            locks: KeyedLocks::new(),
        }
    }

    /// Start a session for `profile_id`.
    ///
    /// Status path: `Stopped/Error → Starting → Running`, or `→ Error` if
    /// the engine fails to come up. The decrypted proxy target lives only
    /// inside this call.
    pub async fn start(&self, profile_id: ProfileId) -> Result<(), SessionError> {
        let _guard = self.locks.acquire(profile_id).await;

        let profile = self.store.get_profile(profile_id).await?;
        if !profile.status.can_start() {
            return Err(SessionError::AlreadyRunning(profile_id, profile.status));
        }

        self.store
            .set_status(profile_id, ProfileStatus::Starting)
            .await?;

        let launch = async {
            let fingerprint = self.store.load_fingerprint(profile_id)?;
            let proxy = match profile.proxy_id {
                Some(proxy_id) => Some(self.store.proxy_target(proxy_id).await?),
                None => None,
            };
            let settings = self.store.settings().await;
            let config = LaunchConfig {
                profile_id,
                data_dir: self.store.profile_data_dir(profile_id),
                fingerprint,
                proxy,
                start_page: settings.start_page,
                humanize: settings.humanize,
            };
            Ok::<_, SessionError>(self.engine.launch(config).await?)
        };

        match launch.await {
            Ok(session) => {
                self.sessions.lock().await.insert(profile_id, session);
                self.store
                    .set_status(profile_id, ProfileStatus::Running)
                    .await?;
                self.store.touch_last_used(profile_id).await?;
                info!("Session started for profile {profile_id}");
                Ok(())
            }
            Err(e) => {
                error!("Session start failed for profile {profile_id}: {e}");
                self.store
                    .set_status(profile_id, ProfileStatus::Error)
                    .await?;
                Err(e)
            }
        }
    }

    /// Stop a session: `Running → Stopping → Stopped`. The engine gets the
    /// configured grace period before it is killed; either way the profile
    /// ends up `Stopped`.
    pub async fn stop(&self, profile_id: ProfileId) -> Result<(), SessionError> {
        let _guard = self.locks.acquire(profile_id).await;

        let Some(mut session) = self.sessions.lock().await.remove(&profile_id) else {
            let profile = self.store.get_profile(profile_id).await?;
            if profile.status.is_active() {
                // Status claims a session we do not hold (engine died and
                // nobody pinged). Settle the record.
                self.store
                    .set_status(profile_id, ProfileStatus::Stopped)
                    .await?;
                return Ok(());
            }
            return Err(SessionError::NotRunning(profile_id));
        };

        self.store
            .set_status(profile_id, ProfileStatus::Stopping)
            .await?;
        let grace = Duration::from_secs(self.store.settings().await.stop_grace_secs);
        if let Err(e) = session.shutdown(grace).await {
            warn!("Engine shutdown for profile {profile_id} reported: {e}");
        }
        self.store
            .set_status(profile_id, ProfileStatus::Stopped)
            .await?;
        info!("Session stopped for profile {profile_id}");
        Ok(())
    }

    /// Health-check a running profile's session. Success refreshes the
    /// last-used timestamp. A session found dead is reaped and the profile
    /// moves to `Error`; a non-running profile is `NotRunning`.
    pub async fn ping(&self, profile_id: ProfileId) -> Result<(), SessionError> {
        let _guard = self.locks.acquire(profile_id).await;

        let mut sessions = self.sessions.lock().await;
        let alive = match sessions.get_mut(&profile_id) {
            Some(session) => session.is_alive().await,
            None => return Err(SessionError::NotRunning(profile_id)),
        };

        if alive {
            drop(sessions);
            self.store.touch_last_used(profile_id).await?;
            Ok(())
        } else {
            sessions.remove(&profile_id);
            drop(sessions);
            warn!("Session for profile {profile_id} died unexpectedly");
            self.store
                .set_status(profile_id, ProfileStatus::Error)
                .await?;
            Err(SessionError::SessionDied(profile_id))
        }
    }

    /// Clear a profile's `Error` status back to `Stopped`. Idempotent for
    /// already-stopped profiles; rejected while a session is live.
    pub async fn reset(&self, profile_id: ProfileId) -> Result<(), SessionError> {
        let _guard = self.locks.acquire(profile_id).await;

        let profile = self.store.get_profile(profile_id).await?;
        match profile.status {
            ProfileStatus::Stopped => Ok(()),
            ProfileStatus::Error => {
                self.store
                    .set_status(profile_id, ProfileStatus::Stopped)
                    .await?;
                Ok(())
            }
            status => Err(SessionError::AlreadyRunning(profile_id, status)),
        }
    }

    /// Profiles with a session currently held by the orchestrator.
    pub async fn active_profiles(&self) -> Vec<ProfileId> {
        self.sessions.lock().await.keys().copied().collect()
    }

    /// Stop every live session. Used on shutdown.
    pub async fn stop_all(&self) {
        for profile_id in self.active_profiles().await {
            if let Err(e) = self.stop(profile_id).await {
                warn!("Failed to stop session for {profile_id}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BrowserEngine;
    use async_trait::async_trait;
    use mask_fingerprint::{GeoLocale, OsVariant};
    use mask_store::NewProfile;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct MockEngine {
        fail_launch: bool,
    }

    struct MockSession {
        alive: Arc<AtomicBool>,
    }

    #[async_trait]
    impl BrowserEngine for MockEngine {
        async fn launch(
            &self,
            _config: LaunchConfig,
        ) -> Result<Box<dyn EngineSession>, EngineError> {
            if self.fail_launch {
                return Err(EngineError::ExitedEarly(Some(1)));
            }
            Ok(Box::new(MockSession {
                alive: Arc::new(AtomicBool::new(true)),
            }))
        }
    }

    #[async_trait]
    impl EngineSession for MockSession {
        fn pid(&self) -> Option<u32> {
            None
        }

        async fn is_alive(&mut self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn shutdown(&mut self, _grace: Duration) -> Result<(), EngineError> {
            self.alive.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn setup(fail_launch: bool) -> (Arc<Storage>, SessionOrchestrator, ProfileId) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Storage::open(dir.path()).unwrap());
        // Keep the tempdir alive for the store's lifetime.
        std::mem::forget(dir);
        let profile = store
            .create_profile(
                NewProfile::named("p", OsVariant::Linux),
                &GeoLocale::unknown(),
            )
            .await
            .unwrap();
        let orchestrator =
            SessionOrchestrator::new(store.clone(), Arc::new(MockEngine { fail_launch }));
        (store, orchestrator, profile.id)
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let (store, orchestrator, id) = setup(false).await;

        orchestrator.start(id).await.unwrap();
        assert_eq!(
            store.get_profile(id).await.unwrap().status,
            ProfileStatus::Running
        );
        assert!(store.get_profile(id).await.unwrap().last_used.is_some());
        orchestrator.ping(id).await.unwrap();

        orchestrator.stop(id).await.unwrap();
        assert_eq!(
            store.get_profile(id).await.unwrap().status,
            ProfileStatus::Stopped
        );
        assert!(orchestrator.active_profiles().await.is_empty());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let (_store, orchestrator, id) = setup(false).await;
        orchestrator.start(id).await.unwrap();
        assert!(matches!(
            orchestrator.start(id).await,
            Err(SessionError::AlreadyRunning(_, ProfileStatus::Running))
        ));
    }

    #[tokio::test]
    async fn test_stop_without_session_rejected() {
        let (_store, orchestrator, id) = setup(false).await;
        assert!(matches!(
            orchestrator.stop(id).await,
            Err(SessionError::NotRunning(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_launch_sets_error_and_reset_recovers() {
        let (store, orchestrator, id) = setup(true).await;

        assert!(orchestrator.start(id).await.is_err());
        assert_eq!(
            store.get_profile(id).await.unwrap().status,
            ProfileStatus::Error
        );

        orchestrator.reset(id).await.unwrap();
        assert_eq!(
            store.get_profile(id).await.unwrap().status,
            ProfileStatus::Stopped
        );
        // Reset is idempotent once stopped.
        orchestrator.reset(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_reaps_dead_session() {
        let (store, orchestrator, id) = setup(false).await;
        orchestrator.start(id).await.unwrap();

        // Kill the session behind the orchestrator's back.
        {
            let mut sessions = orchestrator.sessions.lock().await;
            let session = sessions.get_mut(&id).unwrap();
            session.shutdown(Duration::ZERO).await.unwrap();
        }

        assert!(matches!(
            orchestrator.ping(id).await,
            Err(SessionError::SessionDied(_))
        ));
        assert_eq!(
            store.get_profile(id).await.unwrap().status,
            ProfileStatus::Error
        );
        assert!(orchestrator.active_profiles().await.is_empty());
    }

    #[tokio::test]
    async fn test_ping_not_running() {
        let (_store, orchestrator, id) = setup(false).await;
        assert!(matches!(
            orchestrator.ping(id).await,
            Err(SessionError::NotRunning(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_rejected_while_running() {
        let (_store, orchestrator, id) = setup(false).await;
        orchestrator.start(id).await.unwrap();
        assert!(matches!(
            orchestrator.reset(id).await,
            Err(SessionError::AlreadyRunning(_, _))
        ));
    }
}
