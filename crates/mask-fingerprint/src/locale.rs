//! Locale resolution data: GeoIP result type, country-to-language mapping,
//! and timezone normalization.

use serde::{Deserialize, Serialize};

/// Resolved network locale for a profile's egress IP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocale {
    /// ISO 3166-1 alpha-2 country code, `"XX"` when unresolved
    pub country: String,
    /// IANA timezone name, `"UTC"` when unresolved
    pub timezone: String,
    /// Primary language for the country
    pub language: String,
    /// Geolocation coordinates, when the resolver provided them
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl GeoLocale {
    /// Build a locale from a resolved country and timezone.
    pub fn new(country: &str, timezone: &str) -> Self {
        let country = if country.is_empty() {
            "XX".to_string()
        } else {
            country.to_uppercase()
        };
        let language = language_for_country(&country).to_string();
        Self {
            country,
            timezone: normalize_timezone(timezone).to_string(),
            language,
            latitude: None,
            longitude: None,
        }
    }

    /// The designated fallback when resolution fails: downstream fingerprint
    /// generation proceeds with a neutral locale instead of blocking.
    pub fn unknown() -> Self {
        Self {
            country: "XX".to_string(),
            timezone: "UTC".to_string(),
            language: "en".to_string(),
            latitude: None,
            longitude: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.country == "XX"
    }

    pub fn with_coordinates(mut self, lat: f64, lon: f64) -> Self {
        self.latitude = Some(lat);
        self.longitude = Some(lon);
        self
    }
}

/// Primary browser language for a country code.
pub fn language_for_country(country: &str) -> &'static str {
    match country {
        "RU" => "ru",
        "US" | "GB" => "en",
        "DE" => "de",
        "FR" => "fr",
        "ES" | "AR" | "MX" => "es",
        "IT" => "it",
        "PT" | "BR" => "pt",
        "NL" => "nl",
        "PL" => "pl",
        "UA" => "uk",
        "BY" => "be",
        "KZ" => "kk",
        "CN" => "zh",
        "JP" => "ja",
        "KR" => "ko",
        "IN" => "hi",
        "TR" => "tr",
        "SA" => "ar",
        "IL" => "he",
        "TH" => "th",
        "VN" => "vi",
        _ => "en",
    }
}

/// Map obscure regional timezones to the common metro zone.
///
/// Rare zones are a fingerprinting signal in themselves: almost no real
/// browser reports `America/Indiana/Vevay`.
pub fn normalize_timezone(tz: &str) -> &str {
    match tz {
        "" => "UTC",
        // Russia
        "Europe/Kirov" | "Europe/Saratov" | "Europe/Ulyanovsk" | "Europe/Astrakhan"
        | "Europe/Volgograd" | "Europe/Samara" => "Europe/Moscow",
        "Asia/Barnaul" | "Asia/Tomsk" | "Asia/Novokuznetsk" => "Asia/Novosibirsk",
        "Asia/Chita" => "Asia/Irkutsk",
        // Ukraine
        "Europe/Zaporozhye" | "Europe/Uzhgorod" => "Europe/Kyiv",
        // Kazakhstan
        "Asia/Qostanay" | "Asia/Qyzylorda" | "Asia/Atyrau" | "Asia/Oral" | "Asia/Aqtau"
        | "Asia/Aqtobe" => "Asia/Almaty",
        // United States
        "America/Indiana/Indianapolis" | "America/Indiana/Marengo"
        | "America/Indiana/Petersburg" | "America/Indiana/Vincennes"
        | "America/Indiana/Winamac" | "America/Indiana/Vevay"
        | "America/Kentucky/Louisville" | "America/Kentucky/Monticello"
        | "America/Detroit" => "America/New_York",
        "America/Indiana/Knox" | "America/Indiana/Tell_City" | "America/Menominee"
        | "America/North_Dakota/Center" | "America/North_Dakota/New_Salem"
        | "America/North_Dakota/Beulah" => "America/Chicago",
        "America/Boise" | "America/Shiprock" => "America/Denver",
        // Canada
        "America/Atikokan" | "America/Nipigon" | "America/Thunder_Bay" | "America/Iqaluit" => {
            "America/Toronto"
        }
        "America/Rainy_River" | "America/Rankin_Inlet" => "America/Winnipeg",
        "America/Cambridge_Bay" | "America/Yellowknife" | "America/Inuvik" => "America/Edmonton",
        "America/Dawson_Creek" | "America/Fort_Nelson" | "America/Creston" => "America/Vancouver",
        // Brazil
        "America/Araguaina" | "America/Bahia" | "America/Belem" | "America/Fortaleza"
        | "America/Maceio" | "America/Recife" | "America/Santarem" => "America/Sao_Paulo",
        // Europe micro-states and islands
        "Europe/Busingen" | "Europe/Vaduz" => "Europe/Zurich",
        "Europe/Mariehamn" => "Europe/Helsinki",
        "Europe/Vatican" | "Europe/San_Marino" => "Europe/Rome",
        "Europe/Monaco" | "Europe/Andorra" => "Europe/Paris",
        "Europe/Gibraltar" | "Europe/Jersey" | "Europe/Guernsey" | "Europe/Isle_of_Man" => {
            "Europe/London"
        }
        // Asia
        "Asia/Urumqi" | "Asia/Kashgar" => "Asia/Shanghai",
        "Asia/Hebron" | "Asia/Gaza" => "Asia/Jerusalem",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_fallback() {
        let locale = GeoLocale::unknown();
        assert!(locale.is_unknown());
        assert_eq!(locale.timezone, "UTC");
        assert_eq!(locale.language, "en");
    }

    #[test]
    fn test_country_language_mapping() {
        assert_eq!(GeoLocale::new("DE", "Europe/Berlin").language, "de");
        assert_eq!(GeoLocale::new("BR", "America/Sao_Paulo").language, "pt");
        assert_eq!(GeoLocale::new("ZZ", "UTC").language, "en");
    }

    #[test]
    fn test_country_uppercased() {
        assert_eq!(GeoLocale::new("de", "Europe/Berlin").country, "DE");
    }

    #[test]
    fn test_timezone_normalization() {
        assert_eq!(normalize_timezone("America/Detroit"), "America/New_York");
        assert_eq!(normalize_timezone("Europe/Samara"), "Europe/Moscow");
        assert_eq!(normalize_timezone("Europe/Berlin"), "Europe/Berlin");
        assert_eq!(normalize_timezone(""), "UTC");
    }
}
