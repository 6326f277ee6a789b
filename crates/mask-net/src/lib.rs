//! Network lookups: GeoIP resolution and proxy connectivity probes.
//!
//! Both talk to an ip-api style endpoint that reports the caller's exit IP
//! and geolocation. Requests routed through a proxy therefore describe the
//! proxy's exit, which is exactly what fingerprint generation and health
//! checks need.

mod geoip;
mod probe;

pub use geoip::{GeoIpResolver, LookupReport};
pub use probe::{ProbeReport, ProxyProber};

/// Network layer errors
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Lookup endpoint rejected the query: {0}")]
    Rejected(String),

    #[error("Invalid proxy configuration: {0}")]
    BadProxy(String),
}
