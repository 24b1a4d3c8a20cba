//! Geo-convergence detector
//!
//! Groups co-located events that span several domains. Clusters are
//! star-shaped: each one is seeded by the first unvisited event in input
//! order and absorbs later unvisited events within the threshold of that
//! seed only. The pass is O(n^2) and normally runs on an offload unit.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use watchfire_core::{
    haversine_km, round_to, ConvergenceCluster, ConvergenceConfig, GeoEvent, Signal, SignalType,
    GEO_CONVERGENCE_THRESHOLD, MAX_SCORE,
};

use crate::{validate_coordinates, ScoringError};

/// Cluster score from distinct type count and member count
pub fn cluster_score(type_count: usize, member_count: usize) -> f64 {
    let types = type_count as f64 * 25.0;
    let members = (member_count.saturating_sub(1) as f64 * 2.0).min(25.0);
    (types + members).min(MAX_SCORE)
}

/// Detect clusters spanning at least three event types
pub fn detect(events: &[GeoEvent], threshold_km: f64) -> Vec<ConvergenceCluster> {
    detect_with_min_types(events, threshold_km, GEO_CONVERGENCE_THRESHOLD)
}

/// Detect clusters spanning at least `min_types` event types
pub fn detect_with_min_types(
    events: &[GeoEvent],
    threshold_km: f64,
    min_types: usize,
) -> Vec<ConvergenceCluster> {
    let mut visited = vec![false; events.len()];
    let mut clusters = Vec::new();

    for (i, seed) in events.iter().enumerate() {
        if visited[i] {
            continue;
        }
        visited[i] = true;

        let mut members = vec![seed];
        for (j, other) in events.iter().enumerate().skip(i + 1) {
            if visited[j] {
                continue;
            }
            if haversine_km(seed.lat, seed.lon, other.lat, other.lon) <= threshold_km {
                visited[j] = true;
                members.push(other);
            }
        }

        // Distinct types in first-appearance order
        let mut types: Vec<String> = Vec::new();
        for member in &members {
            if !types.contains(&member.event_type) {
                types.push(member.event_type.clone());
            }
        }

        if types.len() < min_types {
            continue;
        }

        let n = members.len() as f64;
        let lat = members.iter().map(|e| e.lat).sum::<f64>() / n;
        let lon = members.iter().map(|e| e.lon).sum::<f64>() / n;

        clusters.push(ConvergenceCluster {
            lat,
            lon,
            event_count: members.len(),
            type_count: types.len(),
            score: cluster_score(types.len(), members.len()),
            types,
            radius: threshold_km,
        });
    }

    clusters
}

/// Check one event before it is clustered
pub fn validate_event(event: &GeoEvent) -> Result<(), ScoringError> {
    validate_coordinates(&event.event_type, event.lat, event.lon)?;
    if event.event_type.trim().is_empty() {
        return Err(ScoringError::EmptyEventType {
            lat: event.lat,
            lon: event.lon,
        });
    }
    Ok(())
}

/// Convergence detection with event filtering and signal thresholds
pub struct ConvergenceDetector {
    config: ConvergenceConfig,
}

impl ConvergenceDetector {
    pub fn new(config: ConvergenceConfig) -> Self {
        Self { config }
    }

    pub fn threshold_km(&self) -> f64 {
        self.config.threshold_km
    }

    /// Events inside the window with usable coordinates and types
    pub fn recent_events(&self, events: &[GeoEvent], now: DateTime<Utc>) -> Vec<GeoEvent> {
        let cutoff = now - self.config.event_window();
        let mut dropped = 0usize;

        let kept: Vec<GeoEvent> = events
            .iter()
            .filter(|e| {
                if let Err(err) = validate_event(e) {
                    warn!("Dropping geo event: {}", err);
                    return false;
                }
                if e.timestamp < cutoff {
                    dropped += 1;
                    return false;
                }
                true
            })
            .cloned()
            .collect();

        if dropped > 0 {
            debug!("Skipped {} geo events older than the window", dropped);
        }
        kept
    }

    /// Run detection inline with the configured threshold and type count
    pub fn detect(&self, events: &[GeoEvent]) -> Vec<ConvergenceCluster> {
        detect_with_min_types(events, self.config.threshold_km, self.config.min_types)
    }

    /// Clusters strong enough to publish as `geo_convergence`
    pub fn signal_candidates(
        &self,
        clusters: &[ConvergenceCluster],
        now: DateTime<Utc>,
    ) -> Vec<Signal> {
        clusters
            .iter()
            .filter(|c| c.score >= self.config.signal_min_score)
            .map(|c| {
                Signal::builder(SignalType::GeoConvergence, &c.subject_id())
                    .title(format!(
                        "{} event types converging near {:.2}, {:.2}",
                        c.type_count, c.lat, c.lon
                    ))
                    .description(format!(
                        "{} events within {:.0} km: {}",
                        c.event_count,
                        c.radius,
                        c.types.join(", ")
                    ))
                    .score(round_to(c.score, 1))
                    .confidence((0.5 + c.type_count as f64 * 0.1).min(0.95))
                    .at(now)
                    .build()
            })
            .collect()
    }

    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }
}

impl Default for ConvergenceDetector {
    fn default() -> Self {
        Self::new(ConvergenceConfig::default())
    }
}
