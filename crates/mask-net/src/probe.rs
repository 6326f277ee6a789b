//! Proxy connectivity probes.

use crate::NetError;
use chrono::Utc;
use mask_store::sync::KeyedLocks;
use mask_store::{CheckOutcome, ProxyId, ProxyTarget};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct ProbeResponse {
    status: String,
    #[serde(rename = "countryCode", default)]
    country_code: Option<String>,
    #[serde(default)]
    query: Option<String>,
}

/// A finished probe: the outcome to persist and whether the proxy answered.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub outcome: CheckOutcome,
    pub reachable: bool,
}

/// Checks whether a proxy can reach the lookup endpoint, and what exit IP
/// and country it presents. Probes for the same proxy are serialized.
pub struct ProxyProber {
    endpoint: String,
    timeout: Duration,
    locks: KeyedLocks<ProxyId>,
}

impl ProxyProber {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            timeout,
            locks: KeyedLocks::new(),
        }
    }

    /// Probe `target`. Never fails: an unreachable proxy yields a report
    /// with `reachable: false` and a timestamped outcome to persist.
    pub async fn probe(&self, target: &ProxyTarget) -> ProbeReport {
        let _guard = self.locks.acquire(target.id).await;
        let started = Instant::now();

        match self.fetch(target).await {
            Ok(response) => {
                let latency = started.elapsed().as_millis() as u64;
                info!(
                    "Proxy {} answered in {latency}ms (exit {})",
                    target.server(),
                    response.query.as_deref().unwrap_or("unknown")
                );
                ProbeReport {
                    outcome: CheckOutcome {
                        at: Utc::now(),
                        latency_ms: Some(latency),
                        exit_ip: response.query,
                        country: response.country_code,
                    },
                    reachable: true,
                }
            }
            Err(e) => {
                warn!("Proxy {} check failed: {e}", target.server());
                ProbeReport {
                    outcome: CheckOutcome {
                        at: Utc::now(),
                        latency_ms: None,
                        exit_ip: None,
                        country: None,
                    },
                    reachable: false,
                }
            }
        }
    }

    async fn fetch(&self, target: &ProxyTarget) -> Result<ProbeResponse, NetError> {
        let upstream = reqwest::Proxy::all(target.connection_url())
            .map_err(|e| NetError::BadProxy(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .proxy(upstream)
            .build()?;
        let response: ProbeResponse = client.get(&self.endpoint).send().await?.json().await?;
        if response.status != "success" {
            return Err(NetError::Rejected(response.status));
        }
        Ok(response)
    }
}
