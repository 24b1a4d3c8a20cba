//! Authored country profiles
//!
//! Baseline risk and event multipliers for countries with well-known
//! structural conditions. High-volume countries (dense media coverage,
//! routine protest activity) carry a log-scale dampener so their raw
//! counts do not permanently peg the index.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Baseline used for countries without a curated profile
pub const DEFAULT_BASELINE_RISK: f64 = 15.0;

/// Event multiplier used for countries without a curated profile
pub const DEFAULT_EVENT_MULTIPLIER: f64 = 1.0;

static COUNTRY_CODE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{2}$").unwrap()
});

/// ISO 3166-1 alpha-2 shape check
pub fn is_valid_country_code(code: &str) -> bool {
    COUNTRY_CODE_REGEX.is_match(code)
}

/// Static scoring profile for a country
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryProfile {
    /// Authored baseline risk, 0-100
    pub baseline_risk: f64,
    /// Scales event-driven sub-terms
    pub event_multiplier: f64,
    /// Log-scale dampener in [3, 5] for high-volume countries
    pub high_volume_dampener: Option<f64>,
}

impl CountryProfile {
    /// Profile for a country without curated data
    pub fn fallback(_code: &str) -> Self {
        Self {
            baseline_risk: DEFAULT_BASELINE_RISK,
            event_multiplier: DEFAULT_EVENT_MULTIPLIER,
            high_volume_dampener: None,
        }
    }

    /// Curated profile if present, fallback otherwise
    pub fn lookup(code: &str) -> Self {
        curated(code).map(|c| c.profile).unwrap_or_else(|| Self::fallback(code))
    }

    pub fn with_baseline(mut self, baseline_risk: f64) -> Self {
        self.baseline_risk = baseline_risk.clamp(0.0, crate::MAX_SCORE);
        self
    }

    pub fn is_high_volume(&self) -> bool {
        self.high_volume_dampener.is_some()
    }
}

/// A curated country entry
#[derive(Debug, Clone, Copy)]
pub struct CuratedCountry {
    pub code: &'static str,
    pub name: &'static str,
    pub profile: CountryProfile,
}

const fn entry(
    code: &'static str,
    name: &'static str,
    baseline_risk: f64,
    event_multiplier: f64,
    high_volume_dampener: Option<f64>,
) -> CuratedCountry {
    CuratedCountry {
        code,
        name,
        profile: CountryProfile {
            baseline_risk,
            event_multiplier,
            high_volume_dampener,
        },
    }
}

/// Countries with authored baselines
pub static CURATED_COUNTRIES: &[CuratedCountry] = &[
    entry("US", "United States", 5.0, 0.3, Some(4.0)),
    entry("GB", "United Kingdom", 5.0, 0.5, Some(3.0)),
    entry("DE", "Germany", 5.0, 0.5, Some(3.0)),
    entry("FR", "France", 10.0, 0.6, Some(3.5)),
    entry("IN", "India", 20.0, 0.8, Some(5.0)),
    entry("PL", "Poland", 5.0, 0.8, None),
    entry("RU", "Russia", 35.0, 2.0, None),
    entry("CN", "China", 25.0, 2.5, None),
    entry("UA", "Ukraine", 50.0, 0.8, None),
    entry("IR", "Iran", 40.0, 2.0, None),
    entry("IL", "Israel", 45.0, 0.7, None),
    entry("TW", "Taiwan", 30.0, 1.5, None),
    entry("KP", "North Korea", 45.0, 3.0, None),
    entry("SA", "Saudi Arabia", 20.0, 2.0, None),
    entry("TR", "Turkey", 25.0, 1.2, None),
    entry("PK", "Pakistan", 35.0, 1.5, None),
    entry("SY", "Syria", 50.0, 0.7, None),
    entry("YE", "Yemen", 50.0, 0.7, None),
    entry("MM", "Myanmar", 45.0, 1.8, None),
    entry("VE", "Venezuela", 40.0, 1.8, None),
];

/// Find a curated entry by alpha-2 code
pub fn curated(code: &str) -> Option<&'static CuratedCountry> {
    CURATED_COUNTRIES.iter().find(|c| c.code == code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_code_validation() {
        assert!(is_valid_country_code("UA"));
        assert!(!is_valid_country_code("ua"));
        assert!(!is_valid_country_code("UKR"));
        assert!(!is_valid_country_code(""));
    }

    #[test]
    fn test_lookup() {
        let us = CountryProfile::lookup("US");
        assert!(us.is_high_volume());
        assert_eq!(us.baseline_risk, 5.0);

        let unknown = CountryProfile::lookup("ZZ");
        assert_eq!(unknown.baseline_risk, DEFAULT_BASELINE_RISK);
        assert!(!unknown.is_high_volume());
    }

    #[test]
    fn test_dampeners_in_range() {
        for c in CURATED_COUNTRIES {
            if let Some(d) = c.profile.high_volume_dampener {
                assert!((3.0..=5.0).contains(&d), "{} dampener {}", c.code, d);
            }
            assert!(is_valid_country_code(c.code));
        }
    }
}
