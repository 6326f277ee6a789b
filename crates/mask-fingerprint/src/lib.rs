//! Browser Fingerprint Synthesis
//!
//! Generates the structured set of spoofed device signals a profile presents
//! to websites: user agent, platform, screen, hardware hints, WebGL
//! vendor/renderer, canvas and font randomization seeds, plus the locale
//! block (timezone, region, language, geolocation) derived from the
//! profile's resolved network identity.
//!
//! A fingerprint is generated once at profile creation, persisted, and
//! reused unchanged for every launch. Locale fields are baked in at
//! generation time so the presented timezone never drifts from the egress
//! IP between sessions.

mod generator;
pub mod locale;

pub use generator::{Fingerprint, FingerprintGenerator, OsVariant, Screen};
pub use locale::GeoLocale;
