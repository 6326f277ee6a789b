//! Application wiring.
//!
//! Builds the store, network lookups, and orchestrator from one data
//! directory and exposes the operations the CLI drives. This is the only
//! place where decrypted proxy credentials cross component boundaries,
//! and they stay inside the calling function.

use anyhow::{Context, Result};
use mask_fingerprint::GeoLocale;
use mask_net::{GeoIpResolver, ProxyProber};
use mask_session::{
    BatchCoordinator, BatchEvent, BatchOp, ProcessEngine, SessionOrchestrator,
};
use mask_store::{
    NewProfile, ProfileFilter, ProfileId, ProfileRecord, ProxyId, ProxyRecord, Storage,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

const DEFAULT_ENGINE: &str = "maskbox-engine";

pub struct App {
    pub store: Arc<Storage>,
    pub orchestrator: Arc<SessionOrchestrator>,
    resolver: GeoIpResolver,
    prober: ProxyProber,
}

impl App {
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let store = Arc::new(
            Storage::open(data_dir)
                .with_context(|| format!("opening store at {}", data_dir.display()))?,
        );
        let settings = store.settings().await;

        let resolver = GeoIpResolver::new(
            &settings.geoip_endpoint,
            Duration::from_secs(settings.geoip_ttl_secs),
            Duration::from_secs(settings.probe_timeout_secs),
        );
        let prober = ProxyProber::new(
            &settings.probe_endpoint,
            Duration::from_secs(settings.probe_timeout_secs),
        );
        let executable = settings
            .engine_executable
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENGINE));
        let engine = Arc::new(ProcessEngine::new(
            executable,
            Duration::from_secs(settings.start_timeout_secs),
        ));
        let orchestrator = Arc::new(SessionOrchestrator::new(store.clone(), engine));

        Ok(Self {
            store,
            orchestrator,
            resolver,
            prober,
        })
    }

    /// Resolve the locale a profile's fingerprint should claim: the proxy's
    /// exit location when a proxy is attached, the direct connection's
    /// otherwise. Lookup failure degrades to the unknown locale.
    async fn locale_for(&self, proxy_id: Option<ProxyId>) -> Result<GeoLocale> {
        let target = match proxy_id {
            Some(id) => Some(self.store.proxy_target(id).await?),
            None => None,
        };
        let report = self.resolver.resolve_or_unknown(target.as_ref()).await;
        Ok(report.locale)
    }

    /// Create a profile: resolve the exit locale, then generate and persist
    /// the fingerprint with the record.
    pub async fn create_profile(&self, spec: NewProfile) -> Result<ProfileRecord> {
        let locale = self.locale_for(spec.proxy_id).await?;
        if locale.is_unknown() {
            info!("Creating profile without geolocation data");
        }
        Ok(self.store.create_profile(spec, &locale).await?)
    }

    /// Regenerate a stopped profile's fingerprint against its current
    /// proxy's exit locale.
    pub async fn regenerate_fingerprint(&self, id: ProfileId) -> Result<()> {
        let profile = self.store.get_profile(id).await?;
        let locale = self.locale_for(profile.proxy_id).await?;
        self.store.regenerate_fingerprint(id, &locale).await?;
        Ok(())
    }

    /// Probe a proxy and persist the outcome on its record.
    pub async fn check_proxy(&self, id: ProxyId) -> Result<ProxyRecord> {
        let target = self.store.proxy_target(id).await?;
        let report = self.prober.probe(&target).await;
        self.store
            .record_check(id, report.outcome, report.reachable)
            .await?;
        Ok(self.store.get_proxy(id).await?)
    }

    /// Run a batch start/stop, printing outcomes as they complete.
    pub async fn run_batch(
        &self,
        op: BatchOp,
        ids: Vec<ProfileId>,
        concurrency: Option<usize>,
    ) -> Result<()> {
        let concurrency = match concurrency {
            Some(n) => n,
            None => self.store.settings().await.default_concurrency,
        };
        let coordinator = BatchCoordinator::new(self.orchestrator.clone(), concurrency);

        let (tx, mut rx) = mpsc::channel::<BatchEvent>(32);
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event.outcome {
                    Ok(()) => println!("{} {}: ok", event.op, event.profile_id),
                    Err(e) => println!("{} {}: {e}", event.op, event.profile_id),
                }
            }
        });

        let summary = coordinator.run(op, ids, Some(tx)).await;
        let _ = printer.await;
        println!(
            "batch {op}: {} ok, {} failed, {} skipped",
            summary.succeeded, summary.failed, summary.skipped
        );
        Ok(())
    }

    pub async fn list_profiles(&self, filter: &ProfileFilter) -> Vec<ProfileRecord> {
        self.store.list_profiles(filter).await
    }
}
