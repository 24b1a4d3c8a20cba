//! Country instability domain types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{CountryProfile, Timestamped};

/// Instability level bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Normal,
    Elevated,
    High,
    Critical,
}

impl Level {
    /// Fixed cutoffs: 81 critical, 66 high, 51 elevated, 31 normal
    pub fn from_score(score: f64) -> Self {
        if score >= 81.0 {
            Level::Critical
        } else if score >= 66.0 {
            Level::High
        } else if score >= 51.0 {
            Level::Elevated
        } else if score >= 31.0 {
            Level::Normal
        } else {
            Level::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Low => "low",
            Level::Normal => "normal",
            Level::Elevated => "elevated",
            Level::High => "high",
            Level::Critical => "critical",
        }
    }
}

/// Direction of a score relative to its previous value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    #[default]
    Stable,
}

/// Which CII formula produced a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoringTier {
    /// Full formula on the main context: dampeners, fallbacks and boosts
    #[default]
    Precise,
    /// Simplified batch formula run on an offload unit
    Fast,
}

/// The four CII component sub-scores, each in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentScores {
    pub unrest: f64,
    pub conflict: f64,
    pub security: f64,
    pub information: f64,
}

/// Country Instability Index score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiiScore {
    /// Composite 0-100
    pub value: f64,
    pub level: Level,
    pub components: ComponentScores,
    pub trend: Trend,
    pub tier: ScoringTier,
    pub timestamp: DateTime<Utc>,
}

impl Timestamped for CiiScore {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Learning state of a country after its first data load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LearningState {
    Warmup { since: DateTime<Utc> },
    Active,
}

impl LearningState {
    pub fn is_warmup(&self) -> bool {
        matches!(self, LearningState::Warmup { .. })
    }
}

/// A tracked country
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Country {
    pub code: String,
    pub name: String,
    pub profile: CountryProfile,
    pub current: Option<CiiScore>,
    pub previous: Option<CiiScore>,
    /// First data load; warmup is measured from here
    pub first_seen: DateTime<Utc>,
}

impl Country {
    pub fn new(code: &str, name: &str, profile: CountryProfile, now: DateTime<Utc>) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            profile,
            current: None,
            previous: None,
            first_seen: now,
        }
    }

    pub fn learning_state(&self, now: DateTime<Utc>, warmup: Duration) -> LearningState {
        if now - self.first_seen < warmup {
            LearningState::Warmup {
                since: self.first_seen,
            }
        } else {
            LearningState::Active
        }
    }

    /// Rotate current into previous and install the new score
    pub fn push_score(&mut self, score: CiiScore) {
        self.previous = self.current.take();
        self.current = Some(score);
    }

    pub fn current_value(&self) -> Option<f64> {
        self.current.as_ref().map(|s| s.value)
    }
}

/// Protest and outage counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UnrestData {
    pub protests: u32,
    pub protest_fatalities: u32,
    pub high_severity_protests: u32,
    pub outages: OutageData,
}

/// Infrastructure outage counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutageData {
    pub total: u32,
    pub major: u32,
    pub partial: u32,
}

/// UCDP conflict classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UcdpStatus {
    War,
    Minor,
    None,
}

/// Armed conflict counters with UCDP/HAPI fallbacks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConflictData {
    pub battles: u32,
    pub explosions: u32,
    pub civilian_violence: u32,
    pub fatalities: u32,
    pub civilian_events: u32,
    /// HAPI political-violence events, used when no conflict events are present
    pub hapi_political_violence: Option<u32>,
    pub ucdp: Option<UcdpStatus>,
}

impl ConflictData {
    /// Total conflict events, summed as u64 so large counters cannot wrap
    pub fn event_count(&self) -> u64 {
        u64::from(self.battles) + u64::from(self.explosions) + u64::from(self.civilian_violence)
    }
}

/// Climate stress classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClimateStress {
    Extreme,
    Moderate,
}

/// Military posture counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityData {
    pub military_flights: u32,
    pub military_vessels: u32,
    pub climate_stress: Option<ClimateStress>,
}

/// News volume counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InformationData {
    pub news_count: u32,
    /// Stories per hour
    pub velocity: f64,
    pub has_alert: bool,
    /// News urgency 0-100
    pub urgency: Option<f64>,
}

/// Focal point criticality from cross-source correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocalUrgency {
    Critical,
    Elevated,
    Watch,
}

/// Raw per-country counters supplied by the ingestion layer
///
/// Every field defaults to zero/absent; missing data contributes nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CountryData {
    pub unrest: UnrestData,
    pub conflict: ConflictData,
    pub security: SecurityData,
    pub information: InformationData,
    pub focal_point: Option<FocalUrgency>,
    /// Refugees and asylum seekers leaving the country
    pub displacement_outflow: Option<u64>,
    /// Distance to the nearest active hotspot
    pub hotspot_distance_km: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_learning_state_expires() {
        let t0 = Utc::now();
        let country = Country::new("ZZ", "Testland", CountryProfile::fallback("ZZ"), t0);
        let warmup = Duration::minutes(15);

        assert!(country.learning_state(t0, warmup).is_warmup());
        assert!(country
            .learning_state(t0 + Duration::minutes(14), warmup)
            .is_warmup());
        assert_eq!(
            country.learning_state(t0 + Duration::minutes(15), warmup),
            LearningState::Active
        );
    }

    #[test]
    fn test_country_data_defaults_from_empty_json() {
        let data: CountryData = serde_json::from_str("{}").unwrap();
        assert_eq!(data, CountryData::default());

        let data: CountryData =
            serde_json::from_str(r#"{"unrest":{"protests":4},"information":{"hasAlert":true}}"#)
                .unwrap();
        assert_eq!(data.unrest.protests, 4);
        assert!(data.information.has_alert);
        assert_eq!(data.conflict.battles, 0);
    }

    #[test]
    fn test_event_count_does_not_wrap() {
        let conflict = ConflictData {
            battles: u32::MAX,
            explosions: 1,
            civilian_violence: u32::MAX,
            ..Default::default()
        };
        assert_eq!(conflict.event_count(), 2 * u64::from(u32::MAX) + 1);
    }
}
