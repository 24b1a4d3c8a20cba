//! Escalation scorer
//!
//! Scores each hotspot from four normalized sub-scores, blends the dynamic
//! composite with the hotspot's static baseline and keeps a bounded 24h
//! history for trend and crossing detection.
//!
//! Thresholds for signal emission live on the 0-5 alert scale, which is the
//! 0-100 combined score divided by 20.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use watchfire_core::{
    capped, clamp_score, linear_slope, round_to, weighted_sum, EscalationComponents,
    EscalationConfig, EscalationSample, EscalationTrend, HistoryStore, Hotspot, Signal,
    SignalType,
};

/// News activity matched to a hotspot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewsActivity {
    /// Stories matching the hotspot's keywords
    pub matches: u32,
    /// Matching stories per hour
    pub velocity: f64,
    pub breaking: bool,
}

/// Geo alerts near a hotspot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeoAlerts {
    /// Distinct alert types present
    pub alert_types: u32,
    /// Pre-scored alert intensity
    pub alert_score: f64,
}

/// Military activity near a hotspot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MilitaryActivity {
    pub flights: u32,
    pub vessels: u32,
}

/// Everything the scorer needs about a hotspot for one cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotspotActivity {
    pub news: NewsActivity,
    pub geo: GeoAlerts,
    pub military: MilitaryActivity,
}

pub fn news_score(news: &NewsActivity) -> f64 {
    let breaking = if news.breaking { 30.0 } else { 0.0 };
    capped(news.matches as f64 * 15.0 + news.velocity * 5.0 + breaking, 100.0)
}

pub fn geo_score(geo: &GeoAlerts) -> f64 {
    capped(geo.alert_types as f64 * 10.0 + geo.alert_score, 100.0)
}

pub fn military_score(military: &MilitaryActivity) -> f64 {
    capped(military.flights as f64 * 10.0 + military.vessels as f64 * 15.0, 100.0)
}

/// Trend and crossing state for a hotspot after its latest sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationAssessment {
    pub hotspot_id: String,
    pub sample: EscalationSample,
    /// Latest combined score on the 0-5 alert scale
    pub alert_score: f64,
    /// Alert score of the sample before it, if any
    pub previous_alert: Option<f64>,
    /// Alert-scale slope per sample
    pub slope: f64,
    pub trend: EscalationTrend,
}

/// Per-hotspot escalation scorer
pub struct EscalationScorer {
    config: EscalationConfig,
    history: HistoryStore<EscalationSample>,
}

impl EscalationScorer {
    pub fn new(config: EscalationConfig) -> Self {
        let history =
            HistoryStore::new(config.history_window()).with_max_samples(config.max_samples);
        Self { config, history }
    }

    /// Build a sample without recording it
    pub fn compute(
        &self,
        hotspot: &Hotspot,
        activity: &HotspotActivity,
        cii: Option<f64>,
        now: DateTime<Utc>,
    ) -> EscalationSample {
        let components = EscalationComponents {
            news: news_score(&activity.news),
            cii: clamp_score(cii.unwrap_or(self.config.default_cii)),
            geo: geo_score(&activity.geo),
            military: military_score(&activity.military),
        };

        let w = &self.config.weights;
        let dynamic = weighted_sum(&[
            (components.news, w.news),
            (components.cii, w.cii),
            (components.geo, w.geo),
            (components.military, w.military),
        ]);

        let baseline_weight = self.config.baseline_weight;
        let combined = clamp_score(
            hotspot.baseline_risk * baseline_weight + dynamic * (1.0 - baseline_weight),
        );

        EscalationSample {
            timestamp: now,
            combined,
            components,
        }
    }

    /// Score a hotspot and append the sample to its history
    pub fn score(
        &mut self,
        hotspot: &Hotspot,
        activity: &HotspotActivity,
        cii: Option<f64>,
        now: DateTime<Utc>,
    ) -> EscalationSample {
        let sample = self.compute(hotspot, activity, cii, now);
        self.history.record(&hotspot.id, sample.clone(), now);
        sample
    }

    /// Slope of the alert-scale history and the trend it implies
    pub fn trend(&self, hotspot_id: &str, now: DateTime<Utc>) -> (f64, EscalationTrend) {
        let values: Vec<f64> = self
            .history
            .samples(hotspot_id, now)
            .iter()
            .map(|s| s.alert_score())
            .collect();

        let slope = linear_slope(&values);
        let trend = if slope > self.config.trend_threshold {
            EscalationTrend::Escalating
        } else if slope < -self.config.trend_threshold {
            EscalationTrend::DeEscalating
        } else {
            EscalationTrend::Stable
        };

        (slope, trend)
    }

    /// Assess the latest sample for a hotspot
    pub fn assess(&self, hotspot_id: &str, now: DateTime<Utc>) -> Option<EscalationAssessment> {
        let samples = self.history.samples(hotspot_id, now);
        let latest = samples.last()?;
        let previous_alert = samples
            .len()
            .checked_sub(2)
            .map(|i| samples[i].alert_score());
        let (slope, trend) = self.trend(hotspot_id, now);

        Some(EscalationAssessment {
            hotspot_id: hotspot_id.to_string(),
            sample: (*latest).clone(),
            alert_score: latest.alert_score(),
            previous_alert,
            slope,
            trend,
        })
    }

    /// Whether an assessment qualifies for a `hotspot_escalation` signal
    pub fn should_signal(&self, assessment: &EscalationAssessment) -> bool {
        let alert = assessment.alert_score;
        if alert < self.config.minimum_emit_score {
            return false;
        }

        let critical = self.config.critical_score;
        let crossed = alert >= critical && assessment.previous_alert.map_or(true, |p| p < critical);
        let rapid = assessment.slope > self.config.rapid_increase;

        crossed || rapid
    }

    /// Candidate signal for the emitter, if thresholds are met
    pub fn signal_candidate(
        &self,
        hotspot: &Hotspot,
        assessment: &EscalationAssessment,
    ) -> Option<Signal> {
        if !self.should_signal(assessment) {
            return None;
        }

        let alert = assessment.alert_score;
        let c = &assessment.sample.components;
        debug!(
            "Hotspot {} qualifies for escalation signal (alert {:.2}, slope {:.2})",
            hotspot.id, alert, assessment.slope
        );

        Some(
            Signal::builder(SignalType::HotspotEscalation, &hotspot.id)
                .title(format!("{} escalation {:.1}/5", hotspot.name, alert))
                .description(format!(
                    "Combined {:.0} (news {:.0}, cii {:.0}, geo {:.0}, military {:.0}); trend {:?}, slope {:+.2}",
                    assessment.sample.combined,
                    c.news,
                    c.cii,
                    c.geo,
                    c.military,
                    assessment.trend,
                    assessment.slope
                ))
                .score(round_to(alert, 2))
                .confidence((0.5 + alert * 0.1).min(0.95))
                .at(assessment.sample.timestamp)
                .build(),
        )
    }

    pub fn history(&self) -> &HistoryStore<EscalationSample> {
        &self.history
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }
}
