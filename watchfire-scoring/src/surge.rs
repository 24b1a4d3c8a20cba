//! Military surge detector
//!
//! Counts tracks per theater and category, learns a trailing baseline for
//! each `(theater, category)` pair and reports counts that reach a multiple
//! of it. Aircraft flown by non-host operators are reported separately as
//! foreign presence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use watchfire_core::{
    haversine_km, round_to, HistoryStore, MilitaryBase, MilitaryTrack, Signal, SignalType,
    SurgeCategory, SurgeConfig, Theater, Timestamped, TrackKind,
};

/// One observed count for a `(theater, category)` pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountSample {
    pub timestamp: DateTime<Utc>,
    pub count: u32,
}

impl Timestamped for CountSample {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Per-category counts for one theater at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TheaterCounts {
    pub theater_id: String,
    pub counts: BTreeMap<SurgeCategory, u32>,
    /// Non-host operator -> aircraft count
    pub foreign: BTreeMap<String, u32>,
    /// Bases that tracks of each category were associated with
    pub nearby_bases: BTreeMap<SurgeCategory, Vec<String>>,
}

impl TheaterCounts {
    pub fn new(theater_id: &str) -> Self {
        Self {
            theater_id: theater_id.to_string(),
            ..Default::default()
        }
    }

    pub fn count(&self, category: SurgeCategory) -> u32 {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    pub fn with_count(mut self, category: SurgeCategory, count: u32) -> Self {
        self.counts.insert(category, count);
        self
    }
}

/// Nearest base within `radius_km`, with its distance
pub fn nearest_base<'a>(
    lat: f64,
    lon: f64,
    bases: &'a [MilitaryBase],
    radius_km: f64,
) -> Option<(&'a MilitaryBase, f64)> {
    bases
        .iter()
        .map(|b| (b, haversine_km(lat, lon, b.lat, b.lon)))
        .filter(|(_, d)| *d <= radius_km)
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Count the tracks inside a theater by category and foreign operator
pub fn classify_tracks(
    theater: &Theater,
    tracks: &[MilitaryTrack],
    bases: &[MilitaryBase],
    radius_km: f64,
) -> TheaterCounts {
    let mut counts = TheaterCounts::new(&theater.id);

    for track in tracks.iter().filter(|t| theater.contains(t.lat, t.lon)) {
        *counts.counts.entry(track.category).or_insert(0) += 1;

        if let Some((base, _)) = nearest_base(track.lat, track.lon, bases, radius_km) {
            let near = counts.nearby_bases.entry(track.category).or_default();
            if !near.contains(&base.id) {
                near.push(base.id.clone());
            }
        }

        if track.kind == TrackKind::Aircraft {
            if let Some(operator) = &track.operator {
                if !theater.is_host(operator) {
                    *counts.foreign.entry(operator.clone()).or_insert(0) += 1;
                }
            }
        }
    }

    counts
}

/// What a surge result reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SurgeKind {
    /// Category count at or above the surge multiple of its baseline
    Surge,
    /// Aircraft from a non-host operator
    ForeignPresence { operator: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurgeResult {
    pub theater_id: String,
    pub category: Option<SurgeCategory>,
    #[serde(flatten)]
    pub kind: SurgeKind,
    pub current: u32,
    pub baseline: f64,
    pub multiple: f64,
    pub confidence: f64,
    pub nearby_bases: Vec<String>,
    pub detected_at: DateTime<Utc>,
}

impl SurgeResult {
    /// Subject id used for signals and cooldowns
    pub fn subject_id(&self) -> String {
        match (&self.kind, self.category) {
            (SurgeKind::ForeignPresence { operator }, _) => {
                format!("{}:foreign:{}", self.theater_id, operator)
            }
            (SurgeKind::Surge, Some(category)) => {
                format!("{}:{}", self.theater_id, category.as_str())
            }
            (SurgeKind::Surge, None) => self.theater_id.clone(),
        }
    }
}

pub fn surge_confidence(multiple: f64) -> f64 {
    (0.6 + (multiple - 2.0) * 0.1).clamp(0.0, 0.95)
}

pub fn foreign_presence_confidence(count: u32) -> f64 {
    (0.7 + count as f64 * 0.05).min(0.95)
}

fn history_key(theater_id: &str, category: SurgeCategory) -> String {
    format!("{}:{}", theater_id, category.as_str())
}

/// Per-theater surge detection with a learned baseline
pub struct SurgeDetector {
    config: SurgeConfig,
    history: HistoryStore<CountSample>,
    last_purge: Option<DateTime<Utc>>,
}

impl SurgeDetector {
    pub fn new(config: SurgeConfig) -> Self {
        let history = HistoryStore::new(config.retention());
        Self {
            config,
            history,
            last_purge: None,
        }
    }

    /// Trailing baseline for a pair, before the current count is recorded
    pub fn baseline(&self, theater_id: &str, category: SurgeCategory, now: DateTime<Utc>) -> f64 {
        let since = now - self.config.baseline_window();
        let samples = self
            .history
            .samples_since(&history_key(theater_id, category), since);

        let mean = if samples.is_empty() {
            0.0
        } else {
            samples.iter().map(|s| s.count as f64).sum::<f64>() / samples.len() as f64
        };

        if samples.len() < self.config.min_samples {
            mean.max(category.baseline_floor())
        } else {
            mean.max(1.0)
        }
    }

    /// Evaluate current counts, then record them into history
    pub fn evaluate(
        &mut self,
        theater: &Theater,
        counts: &TheaterCounts,
        now: DateTime<Utc>,
    ) -> Vec<SurgeResult> {
        self.maybe_purge(now);

        let mut results = Vec::new();

        for category in SurgeCategory::ALL {
            let current = counts.count(category);
            let baseline = self.baseline(&theater.id, category, now);
            let multiple = current as f64 / baseline;

            if multiple >= self.config.surge_multiple && current >= category.minimum_count() {
                info!(
                    "Surge in {}: {} {} vs baseline {:.1} ({:.2}x)",
                    theater.id,
                    current,
                    category.as_str(),
                    baseline,
                    multiple
                );
                results.push(SurgeResult {
                    theater_id: theater.id.clone(),
                    category: Some(category),
                    kind: SurgeKind::Surge,
                    current,
                    baseline,
                    multiple,
                    confidence: surge_confidence(multiple),
                    nearby_bases: counts.nearby_bases.get(&category).cloned().unwrap_or_default(),
                    detected_at: now,
                });
            }

            self.history.record(
                &history_key(&theater.id, category),
                CountSample {
                    timestamp: now,
                    count: current,
                },
                now,
            );
        }

        for (operator, &count) in &counts.foreign {
            if count < self.config.foreign_presence_min {
                continue;
            }
            debug!("Foreign presence in {}: {} x{}", theater.id, operator, count);
            results.push(SurgeResult {
                theater_id: theater.id.clone(),
                category: None,
                kind: SurgeKind::ForeignPresence {
                    operator: operator.clone(),
                },
                current: count,
                baseline: 0.0,
                multiple: 0.0,
                confidence: foreign_presence_confidence(count),
                nearby_bases: Vec::new(),
                detected_at: now,
            });
        }

        results
    }

    /// Purge history past retention, at most once per purge interval
    pub fn maybe_purge(&mut self, now: DateTime<Utc>) -> usize {
        let due = self
            .last_purge
            .map_or(true, |last| now - last >= self.config.purge_interval());
        if !due {
            return 0;
        }

        self.last_purge = Some(now);
        let removed = self.history.purge(now);
        if removed > 0 {
            debug!("Purged {} surge samples", removed);
        }
        removed
    }

    /// `military_surge` candidates for the emitter
    pub fn signal_candidates(&self, theater: &Theater, results: &[SurgeResult]) -> Vec<Signal> {
        results
            .iter()
            .map(|r| {
                let (title, score) = match &r.kind {
                    SurgeKind::Surge => {
                        let category = r.category.map_or("military", |c| c.as_str());
                        (
                            format!(
                                "{} surge in {}: {} vs baseline {:.1}",
                                category, theater.name, r.current, r.baseline
                            ),
                            round_to(r.multiple, 2),
                        )
                    }
                    SurgeKind::ForeignPresence { operator } => (
                        format!(
                            "{} {} aircraft operating in {}",
                            r.current, operator, theater.name
                        ),
                        r.current as f64,
                    ),
                };

                let description = if r.nearby_bases.is_empty() {
                    format!("{} tracks observed", r.current)
                } else {
                    format!(
                        "{} tracks observed near {}",
                        r.current,
                        r.nearby_bases.join(", ")
                    )
                };

                Signal::builder(SignalType::MilitarySurge, &r.subject_id())
                    .title(title)
                    .description(description)
                    .score(score)
                    .confidence(r.confidence)
                    .at(r.detected_at)
                    .build()
            })
            .collect()
    }

    pub fn history(&self) -> &HistoryStore<CountSample> {
        &self.history
    }

    pub fn config(&self) -> &SurgeConfig {
        &self.config
    }
}

impl Default for SurgeDetector {
    fn default() -> Self {
        Self::new(SurgeConfig::default())
    }
}
