//! Alert signals
//!
//! Signals are the only externally visible output of the engine:
//! - Each carries a type from a fixed set and a subject (country, hotspot, cell, theater)
//! - A dedupe key collapses repeated observations of the same condition
//! - A content fingerprint lets consumers recognise re-deliveries
//! - Static context explains why the signal matters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::round_to;

/// Fixed set of signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    PredictionLeadsNews,
    NewsLeadsMarkets,
    SilentDivergence,
    VelocitySpike,
    KeywordSpike,
    Convergence,
    Triangulation,
    FlowDriversDivergence,
    FlowPriceDivergence,
    GeoConvergence,
    ExplainedMarketMove,
    HotspotEscalation,
    SectorCascade,
    MilitarySurge,
}

/// Static explanation attached to every signal of a type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalContext {
    pub why_it_matters: String,
    pub actionable_insight: String,
    pub confidence_note: String,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::PredictionLeadsNews => "prediction_leads_news",
            SignalType::NewsLeadsMarkets => "news_leads_markets",
            SignalType::SilentDivergence => "silent_divergence",
            SignalType::VelocitySpike => "velocity_spike",
            SignalType::KeywordSpike => "keyword_spike",
            SignalType::Convergence => "convergence",
            SignalType::Triangulation => "triangulation",
            SignalType::FlowDriversDivergence => "flow_drivers_divergence",
            SignalType::FlowPriceDivergence => "flow_price_divergence",
            SignalType::GeoConvergence => "geo_convergence",
            SignalType::ExplainedMarketMove => "explained_market_move",
            SignalType::HotspotEscalation => "hotspot_escalation",
            SignalType::SectorCascade => "sector_cascade",
            SignalType::MilitarySurge => "military_surge",
        }
    }

    /// Market-style signals dedupe on type and subject only
    pub fn is_market_style(&self) -> bool {
        matches!(
            self,
            SignalType::PredictionLeadsNews
                | SignalType::NewsLeadsMarkets
                | SignalType::SilentDivergence
                | SignalType::ExplainedMarketMove
                | SignalType::SectorCascade
                | SignalType::FlowDriversDivergence
                | SignalType::FlowPriceDivergence
        )
    }

    pub fn context(&self) -> SignalContext {
        let (why, insight, note) = match self {
            SignalType::PredictionLeadsNews => (
                "Prediction markets moved before any matching coverage appeared.",
                "Look for the information the market is pricing ahead of the press.",
                "Moderate: market moves can be noise or thin liquidity.",
            ),
            SignalType::NewsLeadsMarkets => (
                "Coverage is building but markets have not repriced yet.",
                "Watch for a delayed market reaction over the next sessions.",
                "Moderate: not every story is market-relevant.",
            ),
            SignalType::SilentDivergence => (
                "A market moved sharply with no explanatory news.",
                "Check for unreported developments or insider positioning.",
                "Low to moderate: absence of news is weak evidence.",
            ),
            SignalType::VelocitySpike => (
                "Story volume for a topic is accelerating well above its norm.",
                "Read the newest sources first; the picture is changing quickly.",
                "Moderate: syndication can inflate velocity.",
            ),
            SignalType::KeywordSpike => (
                "A term is appearing far more often than its baseline.",
                "Identify the event behind the term before it trends widely.",
                "Moderate: keyword collisions happen.",
            ),
            SignalType::Convergence => (
                "Independent source types are reporting the same development.",
                "Treat the development as corroborated and assess impact.",
                "High: multiple independent sources agree.",
            ),
            SignalType::Triangulation => (
                "Wire, government and intelligence sources align on one story.",
                "Prioritise this development for briefing.",
                "High: three source classes agree.",
            ),
            SignalType::FlowDriversDivergence => (
                "Commodity flows diverge from the drivers that usually explain them.",
                "Check for supply disruption or stockpiling.",
                "Moderate: flow data is lagged.",
            ),
            SignalType::FlowPriceDivergence => (
                "Prices moved without a matching change in physical flows.",
                "Separate speculative moves from real supply shocks.",
                "Moderate: flow data is lagged.",
            ),
            SignalType::GeoConvergence => (
                "Several kinds of activity are co-located in one area.",
                "Inspect the area on the map; multi-domain activity often precedes escalation.",
                "Moderate: co-location is not causation.",
            ),
            SignalType::ExplainedMarketMove => (
                "A market move lines up with a specific news event.",
                "Use the pairing to calibrate future reactions to similar events.",
                "High: timing and topic both match.",
            ),
            SignalType::HotspotEscalation => (
                "A hotspot's combined news, instability, geo and military activity is escalating.",
                "Review the hotspot's component breakdown to see what is driving it.",
                "Moderate to high: blends several independent feeds.",
            ),
            SignalType::SectorCascade => (
                "Related assets across a sector are moving together.",
                "Look for a common driver behind the sector move.",
                "Moderate: correlated moves can be coincidental.",
            ),
            SignalType::MilitarySurge => (
                "Military transit in a theater is well above its learned baseline.",
                "Check nearby bases and recent exercises; surges often precede operations.",
                "Moderate: exercises and rotations also cause surges.",
            ),
        };

        SignalContext {
            why_it_matters: why.to_string(),
            actionable_insight: insight.to_string(),
            confidence_note: note.to_string(),
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dedupe key: `type:subject` for market-style signals, `type:subject:value` otherwise
pub fn dedupe_key(signal_type: SignalType, subject_id: &str, value: f64) -> String {
    if signal_type.is_market_style() {
        format!("{}:{}", signal_type, subject_id)
    } else {
        format!("{}:{}:{}", signal_type, subject_id, round_to(value, 1))
    }
}

/// An alert produced by a scorer and published by the emitter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Unique signal instance ID
    pub id: Uuid,

    pub signal_type: SignalType,

    /// Entity the signal is about (country code, hotspot id, cell, theater)
    pub subject_id: String,

    pub title: String,

    pub description: String,

    /// Score on the scale native to the signal type
    pub score: f64,

    /// Confidence (0.0 - 1.0)
    pub confidence: f64,

    pub dedupe_key: String,

    /// Content hash for consumers recognising re-deliveries
    pub fingerprint: String,

    pub emitted_at: DateTime<Utc>,

    pub context: SignalContext,
}

impl Signal {
    /// Create a new signal builder
    pub fn builder(signal_type: SignalType, subject_id: &str) -> SignalBuilder {
        SignalBuilder::new(signal_type, subject_id)
    }

    /// `(type, subject)` pair used for cooldowns
    pub fn cooldown_key(&self) -> (SignalType, String) {
        (self.signal_type, self.subject_id.clone())
    }

    fn compute_fingerprint(dedupe_key: &str, title: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(dedupe_key.as_bytes());
        hasher.update(title.as_bytes());
        format!("{:x}", hasher.finalize())[..16].to_string()
    }
}

/// Builder for signals
pub struct SignalBuilder {
    signal_type: SignalType,
    subject_id: String,
    title: String,
    description: String,
    score: f64,
    confidence: f64,
    emitted_at: Option<DateTime<Utc>>,
}

impl SignalBuilder {
    pub fn new(signal_type: SignalType, subject_id: &str) -> Self {
        Self {
            signal_type,
            subject_id: subject_id.to_string(),
            title: String::new(),
            description: String::new(),
            score: 0.0,
            confidence: 0.5,
            emitted_at: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn score(mut self, score: f64) -> Self {
        self.score = crate::sanitize(score);
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = crate::capped(confidence, 1.0);
        self
    }

    pub fn at(mut self, emitted_at: DateTime<Utc>) -> Self {
        self.emitted_at = Some(emitted_at);
        self
    }

    pub fn build(self) -> Signal {
        let dedupe_key = dedupe_key(self.signal_type, &self.subject_id, self.score);
        let fingerprint = Signal::compute_fingerprint(&dedupe_key, &self.title);

        Signal {
            id: Uuid::new_v4(),
            context: self.signal_type.context(),
            signal_type: self.signal_type,
            subject_id: self.subject_id,
            title: self.title,
            description: self.description,
            score: self.score,
            confidence: self.confidence,
            dedupe_key,
            fingerprint,
            emitted_at: self.emitted_at.unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_creation() {
        let signal = Signal::builder(SignalType::HotspotEscalation, "taiwan-strait")
            .title("Taiwan Strait escalating")
            .score(4.63)
            .confidence(0.9)
            .build();

        assert_eq!(signal.subject_id, "taiwan-strait");
        assert_eq!(signal.dedupe_key, "hotspot_escalation:taiwan-strait:4.6");
        assert_eq!(signal.fingerprint.len(), 16);
        assert!(!signal.context.why_it_matters.is_empty());
    }

    #[test]
    fn test_market_style_dedupe_ignores_value() {
        assert_eq!(
            dedupe_key(SignalType::SilentDivergence, "BRENT", 3.14),
            "silent_divergence:BRENT"
        );
        assert_eq!(
            dedupe_key(SignalType::MilitarySurge, "baltic:fighter", 2.25),
            "military_surge:baltic:fighter:2.3"
        );
    }

    #[test]
    fn test_confidence_clamped() {
        let signal = Signal::builder(SignalType::GeoConvergence, "1.0,2.0")
            .confidence(1.7)
            .build();
        assert_eq!(signal.confidence, 1.0);
    }

    #[test]
    fn test_serde_type_names() {
        let json = serde_json::to_string(&SignalType::PredictionLeadsNews).unwrap();
        assert_eq!(json, "\"prediction_leads_news\"");
        assert_eq!(SignalType::GeoConvergence.to_string(), "geo_convergence");
    }
}
