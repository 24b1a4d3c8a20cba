//! Feed snapshots
//!
//! A snapshot is everything the engine consumes on one refresh tick:
//! per-country counters, hotspot activity, geo events and military tracks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use watchfire_core::{
    is_valid_country_code, CountryData, GeoEvent, Hotspot, MilitaryBase, MilitaryTrack, Theater,
};
use watchfire_scoring::{validate_coordinates, HotspotActivity};

use crate::EngineError;

/// Raw counters for one country
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryFeed {
    pub code: String,
    pub name: String,
    /// Overrides the curated baseline risk
    #[serde(default)]
    pub baseline_risk: Option<f64>,
    #[serde(default)]
    pub data: CountryData,
}

/// A hotspot and its activity this tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotFeed {
    #[serde(flatten)]
    pub hotspot: Hotspot,
    #[serde(default)]
    pub activity: HotspotActivity,
}

/// One tick of input data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeedSnapshot {
    /// Refresh time; the engine uses the wall clock when absent
    pub captured_at: Option<DateTime<Utc>>,
    pub countries: Vec<CountryFeed>,
    pub hotspots: Vec<HotspotFeed>,
    pub events: Vec<GeoEvent>,
    pub tracks: Vec<MilitaryTrack>,
    /// Theaters to watch; the built-in set is used when empty
    pub theaters: Vec<Theater>,
    pub bases: Vec<MilitaryBase>,
}

impl FeedSnapshot {
    /// Reject snapshots whose entities cannot be keyed or placed
    ///
    /// Individual geo events are not checked here; the convergence detector
    /// drops unusable ones.
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut codes = HashSet::new();
        for country in &self.countries {
            if !is_valid_country_code(&country.code) {
                return Err(EngineError::InvalidSnapshot(format!(
                    "invalid country code '{}'",
                    country.code
                )));
            }
            if !codes.insert(country.code.as_str()) {
                return Err(EngineError::InvalidSnapshot(format!(
                    "duplicate country '{}'",
                    country.code
                )));
            }
        }

        for feed in &self.hotspots {
            let hotspot = &feed.hotspot;
            validate_coordinates(&hotspot.id, hotspot.lat, hotspot.lon)?;
            if let Some(code) = &hotspot.country_code {
                if !is_valid_country_code(code) {
                    return Err(EngineError::InvalidSnapshot(format!(
                        "hotspot {} has invalid country code '{}'",
                        hotspot.id, code
                    )));
                }
            }
        }

        for base in &self.bases {
            validate_coordinates(&base.id, base.lat, base.lon)?;
        }

        Ok(())
    }

    pub fn from_json(content: &str) -> Result<Self, EngineError> {
        serde_json::from_str(content).map_err(|e| EngineError::Feed(e.to_string()))
    }
}

/// Source of snapshots for the run loop
#[async_trait]
pub trait FeedSource: Send {
    /// Next snapshot, or `None` when the feed is exhausted
    async fn next_snapshot(&mut self) -> Result<Option<FeedSnapshot>, EngineError>;
}

/// Replays a fixed list of snapshots
#[derive(Debug, Default)]
pub struct StaticFeed {
    snapshots: VecDeque<FeedSnapshot>,
}

impl StaticFeed {
    pub fn new(snapshots: Vec<FeedSnapshot>) -> Self {
        Self {
            snapshots: snapshots.into(),
        }
    }
}

#[async_trait]
impl FeedSource for StaticFeed {
    async fn next_snapshot(&mut self) -> Result<Option<FeedSnapshot>, EngineError> {
        Ok(self.snapshots.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "countries": [
            { "code": "UA", "name": "Ukraine", "data": { "unrest": { "protests": 4 } } },
            { "code": "FR", "name": "France", "baselineRisk": 12 }
        ],
        "hotspots": [
            {
                "id": "kyiv", "name": "Kyiv", "lat": 50.45, "lon": 30.52,
                "countryCode": "UA", "baselineRisk": 60,
                "activity": { "news": { "matches": 3, "breaking": true } }
            }
        ],
        "events": [
            { "lat": 50.4, "lon": 30.5, "type": "protest", "timestamp": "2026-01-01T00:00:00Z" }
        ]
    }"#;

    #[test]
    fn test_parse_snapshot() {
        let snapshot = FeedSnapshot::from_json(SNAPSHOT).unwrap();
        assert_eq!(snapshot.countries.len(), 2);
        assert_eq!(snapshot.countries[0].data.unrest.protests, 4);
        assert_eq!(snapshot.countries[1].baseline_risk, Some(12.0));
        assert_eq!(snapshot.hotspots[0].hotspot.baseline_risk, 60.0);
        assert!(snapshot.hotspots[0].activity.news.breaking);
        assert_eq!(snapshot.events[0].event_type, "protest");
        assert!(snapshot.theaters.is_empty());
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn test_invalid_codes_rejected() {
        let mut snapshot = FeedSnapshot::from_json(SNAPSHOT).unwrap();
        snapshot.countries[1].code = "fra".into();
        assert!(matches!(
            snapshot.validate(),
            Err(EngineError::InvalidSnapshot(_))
        ));

        let mut snapshot = FeedSnapshot::from_json(SNAPSHOT).unwrap();
        snapshot.countries[1].code = "UA".into();
        assert!(snapshot.validate().is_err());

        let mut snapshot = FeedSnapshot::from_json(SNAPSHOT).unwrap();
        snapshot.hotspots[0].hotspot.lat = 120.0;
        assert!(matches!(snapshot.validate(), Err(EngineError::Scoring(_))));
    }

    #[tokio::test]
    async fn test_static_feed_drains() {
        let mut feed = StaticFeed::new(vec![FeedSnapshot::default(), FeedSnapshot::default()]);
        assert!(feed.next_snapshot().await.unwrap().is_some());
        assert!(feed.next_snapshot().await.unwrap().is_some());
        assert!(feed.next_snapshot().await.unwrap().is_none());
    }
}
