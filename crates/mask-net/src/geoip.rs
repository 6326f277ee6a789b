//! GeoIP resolution with a per-target TTL cache.

use crate::NetError;
use mask_fingerprint::GeoLocale;
use mask_store::sync::KeyedLocks;
use mask_store::ProxyTarget;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const RETRIES: usize = 2;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// What a lookup learned about an exit point.
#[derive(Debug, Clone)]
pub struct LookupReport {
    pub locale: GeoLocale,
    pub exit_ip: Option<String>,
    pub city: Option<String>,
}

impl LookupReport {
    fn unknown() -> Self {
        Self {
            locale: GeoLocale::unknown(),
            exit_ip: None,
            city: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "countryCode", default)]
    country_code: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    query: Option<String>,
}

fn report_from(response: ApiResponse) -> Result<LookupReport, NetError> {
    if response.status != "success" {
        return Err(NetError::Rejected(
            response.message.unwrap_or_else(|| response.status),
        ));
    }
    let mut locale = GeoLocale::new(
        response.country_code.as_deref().unwrap_or(""),
        response.timezone.as_deref().unwrap_or(""),
    );
    if let (Some(lat), Some(lon)) = (response.lat, response.lon) {
        locale = locale.with_coordinates(lat, lon);
    }
    Ok(LookupReport {
        locale,
        exit_ip: response.query,
        city: response.city,
    })
}

/// Resolves the geolocation of a connection's exit point, directly or
/// through a proxy. Results are cached per target for a TTL; concurrent
/// lookups for the same target coalesce behind a keyed lock so the
/// endpoint sees one request, not a stampede.
pub struct GeoIpResolver {
    endpoint: String,
    ttl: Duration,
    timeout: Duration,
    cache: StdMutex<HashMap<String, (Instant, LookupReport)>>,
    locks: KeyedLocks<String>,
}

impl GeoIpResolver {
    pub fn new(endpoint: &str, ttl: Duration, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            ttl,
            timeout,
            cache: StdMutex::new(HashMap::new()),
            locks: KeyedLocks::new(),
        }
    }

    fn cache_key(proxy: Option<&ProxyTarget>) -> String {
        proxy
            .map(|p| p.id.to_string())
            .unwrap_or_else(|| "direct".to_string())
    }

    fn cached(&self, key: &str) -> Option<LookupReport> {
        let cache = self.cache.lock().expect("geoip cache poisoned");
        cache.get(key).and_then(|(at, report)| {
            (at.elapsed() < self.ttl).then(|| report.clone())
        })
    }

    fn store(&self, key: String, report: LookupReport) {
        let mut cache = self.cache.lock().expect("geoip cache poisoned");
        cache.insert(key, (Instant::now(), report));
    }

    /// Resolve the exit locale for `proxy` (or the direct connection when
    /// `None`). Bounded retries; a fresh cached result short-circuits.
    pub async fn resolve(&self, proxy: Option<&ProxyTarget>) -> Result<LookupReport, NetError> {
        let key = Self::cache_key(proxy);
        let _guard = self.locks.acquire(key.clone()).await;

        if let Some(report) = self.cached(&key) {
            debug!("GeoIP cache hit for {key}");
            return Ok(report);
        }

        let mut last_err = None;
        for attempt in 0..=RETRIES {
            if attempt > 0 {
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
            match self.fetch(proxy).await {
                Ok(report) => {
                    self.store(key, report.clone());
                    return Ok(report);
                }
                Err(e) => {
                    debug!("GeoIP lookup attempt {} failed: {e}", attempt + 1);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.expect("at least one attempt"))
    }

    /// Like `resolve`, but degrades to the unknown locale on failure so
    /// profile creation can proceed without geolocation.
    pub async fn resolve_or_unknown(&self, proxy: Option<&ProxyTarget>) -> LookupReport {
        match self.resolve(proxy).await {
            Ok(report) => report,
            Err(e) => {
                warn!("GeoIP lookup failed, continuing without locale: {e}");
                LookupReport::unknown()
            }
        }
    }

    async fn fetch(&self, proxy: Option<&ProxyTarget>) -> Result<LookupReport, NetError> {
        let mut builder = reqwest::Client::builder().timeout(self.timeout);
        if let Some(target) = proxy {
            let upstream = reqwest::Proxy::all(target.connection_url())
                .map_err(|e| NetError::BadProxy(e.to_string()))?;
            builder = builder.proxy(upstream);
        }
        let client = builder.build()?;
        let response: ApiResponse = client.get(&self.endpoint).send().await?.json().await?;
        report_from(response)
    }
}
