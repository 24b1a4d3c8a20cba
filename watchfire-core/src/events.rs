//! Geo events, convergence clusters and hotspot escalation types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Timestamped;

/// A geo-tagged event supplied fresh on each detection pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoEvent {
    pub lat: f64,
    pub lon: f64,
    /// Domain tag: protest, conflict, military_flight, outage, ...
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
}

impl GeoEvent {
    pub fn new(lat: f64, lon: f64, event_type: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            lat,
            lon,
            event_type: event_type.to_string(),
            timestamp,
        }
    }
}

/// Co-located events spanning several domains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvergenceCluster {
    /// Centroid latitude (mean of members)
    pub lat: f64,
    /// Centroid longitude (mean of members)
    pub lon: f64,
    pub event_count: usize,
    pub type_count: usize,
    pub types: Vec<String>,
    /// Detection threshold in km
    pub radius: f64,
    #[serde(default)]
    pub score: f64,
}

impl ConvergenceCluster {
    /// Stable subject id for signals: centroid rounded to 0.1 degree
    pub fn subject_id(&self) -> String {
        format!("{:.1},{:.1}", self.lat, self.lon)
    }
}

/// An authored point of ongoing interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotspot {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Country whose CII feeds the hotspot's cii component
    #[serde(default)]
    pub country_code: Option<String>,
    /// Static baseline risk, 0-100
    pub baseline_risk: f64,
}

/// Per-component breakdown of an escalation sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EscalationComponents {
    pub news: f64,
    pub cii: f64,
    pub geo: f64,
    pub military: f64,
}

/// One escalation score observation for a hotspot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationSample {
    pub timestamp: DateTime<Utc>,
    /// Combined 0-100 score
    pub combined: f64,
    pub components: EscalationComponents,
}

impl EscalationSample {
    /// Combined score on the 0-5 alert scale
    pub fn alert_score(&self) -> f64 {
        crate::to_alert_scale(self.combined)
    }
}

impl Timestamped for EscalationSample {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Direction of a hotspot's escalation history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTrend {
    Escalating,
    DeEscalating,
    #[default]
    Stable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_event_wire_shape() {
        let ts = Utc::now();
        let event = GeoEvent::new(33.5, 36.3, "protest", ts);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "protest");
        assert_eq!(json["lat"], 33.5);

        let back: GeoEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_cluster_subject_id() {
        let cluster = ConvergenceCluster {
            lat: 48.4567,
            lon: 35.0123,
            event_count: 4,
            type_count: 3,
            types: vec!["a".into(), "b".into(), "c".into()],
            radius: 100.0,
            score: 81.0,
        };
        assert_eq!(cluster.subject_id(), "48.5,35.0");
    }
}
