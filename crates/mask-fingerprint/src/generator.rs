//! Fingerprint generation.
//!
//! Signals are drawn from per-OS pools of values observed in real browser
//! populations, so a generated fingerprint is internally consistent: a
//! macOS profile gets a Mac platform string, Apple-plausible WebGL strings,
//! and a Mac-typical resolution. The engine version in the user agent is
//! pinned to the version the external engine actually ships, since a
//! mismatched version string is itself a detection signal.

use crate::locale::GeoLocale;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine version baked into generated user agents.
const ENGINE_VERSION: &str = "135.0";

/// Operating system variant a profile presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsVariant {
    Windows,
    MacOs,
    Linux,
}

impl OsVariant {
    pub fn platform(&self) -> &'static str {
        match self {
            OsVariant::Windows => "Win32",
            OsVariant::MacOs => "MacIntel",
            OsVariant::Linux => "Linux x86_64",
        }
    }

    fn ua_os_token(&self) -> &'static str {
        match self {
            OsVariant::Windows => "Windows NT 10.0; Win64; x64",
            OsVariant::MacOs => "Macintosh; Intel Mac OS X 10.15",
            OsVariant::Linux => "X11; Linux x86_64",
        }
    }
}

impl fmt::Display for OsVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsVariant::Windows => write!(f, "windows"),
            OsVariant::MacOs => write!(f, "macos"),
            OsVariant::Linux => write!(f, "linux"),
        }
    }
}

impl std::str::FromStr for OsVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "windows" | "win" => Ok(OsVariant::Windows),
            "macos" | "mac" => Ok(OsVariant::MacOs),
            "linux" => Ok(OsVariant::Linux),
            other => Err(format!("unknown OS variant: {other}")),
        }
    }
}

/// Screen geometry presented by a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screen {
    pub width: u32,
    pub height: u32,
    pub color_depth: u8,
}

/// The persisted, immutable fingerprint of a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub os: OsVariant,
    pub user_agent: String,
    pub platform: String,
    pub screen: Screen,
    pub hardware_concurrency: u8,
    pub device_memory_gb: u8,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    /// Canvas anti-aliasing noise offset
    pub canvas_aa_offset: i32,
    /// Seed for per-profile font metric jitter
    pub font_spacing_seed: u32,
    /// Reported window.history.length
    pub history_length: u8,
    pub timezone: String,
    pub locale_region: String,
    pub locale_language: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Fingerprint {
    /// Accept-Language header value consistent with the locale block.
    pub fn accept_language(&self) -> String {
        if self.locale_language == "en" {
            "en-US,en;q=0.5".to_string()
        } else {
            format!(
                "{lang}-{region},{lang};q=0.8,en;q=0.5",
                lang = self.locale_language,
                region = self.locale_region
            )
        }
    }
}

/// Generates internally consistent fingerprints.
pub struct FingerprintGenerator;

impl FingerprintGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Synthesize a fingerprint for the requested OS, with the locale block
    /// taken from a resolved network identity.
    pub fn generate(&self, os: OsVariant, locale: &GeoLocale) -> Fingerprint {
        let mut rng = rand::thread_rng();

        let screen = *screen_pool(os)
            .choose(&mut rng)
            .expect("screen pool is never empty");
        let (webgl_vendor, webgl_renderer) = webgl_pool(os)
            .choose(&mut rng)
            .expect("webgl pool is never empty");

        Fingerprint {
            os,
            user_agent: format!(
                "Mozilla/5.0 ({}; rv:{ver}) Gecko/20100101 Firefox/{ver}",
                os.ua_os_token(),
                ver = ENGINE_VERSION
            ),
            platform: os.platform().to_string(),
            screen,
            hardware_concurrency: *[4u8, 8, 8, 12, 16].choose(&mut rng).unwrap(),
            device_memory_gb: *[4u8, 8, 8, 16].choose(&mut rng).unwrap(),
            webgl_vendor: webgl_vendor.to_string(),
            webgl_renderer: webgl_renderer.to_string(),
            canvas_aa_offset: rng.gen_range(-50..=50),
            font_spacing_seed: rng.gen_range(0..1_073_741_824),
            history_length: rng.gen_range(1..6),
            timezone: locale.timezone.clone(),
            locale_region: locale.country.clone(),
            locale_language: locale.language.clone(),
            latitude: locale.latitude,
            longitude: locale.longitude,
        }
    }
}

impl Default for FingerprintGenerator {
    fn default() -> Self {
        Self::new()
    }
}

const fn s(width: u32, height: u32) -> Screen {
    Screen {
        width,
        height,
        color_depth: 24,
    }
}

const WINDOWS_SCREENS: &[Screen] = &[
    s(1920, 1080),
    s(2560, 1440),
    s(1366, 768),
    s(1536, 864),
    s(3840, 2160),
];
const MACOS_SCREENS: &[Screen] = &[s(1440, 900), s(2560, 1600), s(2880, 1800), s(1680, 1050)];
const LINUX_SCREENS: &[Screen] = &[s(1920, 1080), s(2560, 1440), s(1680, 1050)];

fn screen_pool(os: OsVariant) -> &'static [Screen] {
    match os {
        OsVariant::Windows => WINDOWS_SCREENS,
        OsVariant::MacOs => MACOS_SCREENS,
        OsVariant::Linux => LINUX_SCREENS,
    }
}

fn webgl_pool(os: OsVariant) -> &'static [(&'static str, &'static str)] {
    match os {
        OsVariant::Windows => &[
            (
                "Google Inc. (NVIDIA)",
                "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 Direct3D11 vs_5_0 ps_5_0, D3D11)",
            ),
            (
                "Google Inc. (Intel)",
                "ANGLE (Intel, Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0, D3D11)",
            ),
            (
                "Google Inc. (AMD)",
                "ANGLE (AMD, AMD Radeon RX 6600 Direct3D11 vs_5_0 ps_5_0, D3D11)",
            ),
        ],
        OsVariant::MacOs => &[
            ("Apple", "Apple M1"),
            ("Apple", "Apple M2"),
            ("Intel Inc.", "Intel(R) Iris(TM) Plus Graphics 655"),
        ],
        OsVariant::Linux => &[
            ("Mesa", "Mesa Intel(R) UHD Graphics 620 (KBL GT2)"),
            ("Mesa", "AMD Radeon RX 6700 XT (radeonsi, navi22, LLVM 15.0.7)"),
            ("NVIDIA Corporation", "NVIDIA GeForce GTX 1660/PCIe/SSE2"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_baked_into_fingerprint() {
        let locale = GeoLocale::new("DE", "Europe/Berlin").with_coordinates(52.52, 13.40);
        let fp = FingerprintGenerator::new().generate(OsVariant::Windows, &locale);

        assert_eq!(fp.timezone, "Europe/Berlin");
        assert_eq!(fp.locale_region, "DE");
        assert_eq!(fp.locale_language, "de");
        assert_eq!(fp.latitude, Some(52.52));
    }

    #[test]
    fn test_os_consistency() {
        let locale = GeoLocale::unknown();
        let generator = FingerprintGenerator::new();

        let mac = generator.generate(OsVariant::MacOs, &locale);
        assert_eq!(mac.platform, "MacIntel");
        assert!(mac.user_agent.contains("Macintosh"));

        let win = generator.generate(OsVariant::Windows, &locale);
        assert_eq!(win.platform, "Win32");
        assert!(win.user_agent.contains("Windows NT"));
    }

    #[test]
    fn test_screen_drawn_from_os_pool() {
        let generator = FingerprintGenerator::new();
        let locale = GeoLocale::unknown();
        for _ in 0..16 {
            let win = generator.generate(OsVariant::Windows, &locale);
            assert!(screen_pool(OsVariant::Windows).contains(&win.screen));
            let mac = generator.generate(OsVariant::MacOs, &locale);
            assert!(screen_pool(OsVariant::MacOs).contains(&mac.screen));
        }
    }

    #[test]
    fn test_engine_version_pinned() {
        let fp =
            FingerprintGenerator::new().generate(OsVariant::Linux, &GeoLocale::unknown());
        assert!(fp.user_agent.ends_with("Firefox/135.0"));
        assert!(fp.user_agent.contains("rv:135.0"));
    }

    #[test]
    fn test_seed_ranges() {
        let fp =
            FingerprintGenerator::new().generate(OsVariant::Windows, &GeoLocale::unknown());
        assert!((-50..=50).contains(&fp.canvas_aa_offset));
        assert!((1..6).contains(&fp.history_length));
    }

    #[test]
    fn test_accept_language() {
        let locale = GeoLocale::new("FR", "Europe/Paris");
        let fp = FingerprintGenerator::new().generate(OsVariant::Linux, &locale);
        assert_eq!(fp.accept_language(), "fr-FR,fr;q=0.8,en;q=0.5");

        let fp_en =
            FingerprintGenerator::new().generate(OsVariant::Linux, &GeoLocale::unknown());
        assert_eq!(fp_en.accept_language(), "en-US,en;q=0.5");
    }

    #[test]
    fn test_serde_roundtrip() {
        let fp =
            FingerprintGenerator::new().generate(OsVariant::MacOs, &GeoLocale::unknown());
        let json = serde_json::to_string(&fp).unwrap();
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(fp, back);
    }
}
