//! Fusion engine
//!
//! Drives the four scorers from feed snapshots:
//! - CII and convergence batches go to offload units when enabled
//! - Escalation and surge run on the main context
//! - Every candidate signal passes through the emitter
//! - Published signals fan out on a broadcast channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use watchfire_core::{
    default_theaters, CiiScore, ConfigError, ConvergenceCluster, EmitterStats, EngineConfig,
    GeoEvent, ScoringTier, Signal, SignalEmitter, Theater,
};
use watchfire_scoring::{
    classify_tracks, ConvergenceDetector, EscalationAssessment, EscalationScorer,
    InstabilityScorer, ScoringError, SurgeDetector, SurgeResult,
};

use crate::{FeedSnapshot, FeedSource, OffloadBridge, OffloadError};

/// Errors from the engine boundary
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Scoring input error: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Offload error: {0}")]
    Offload(#[from] OffloadError),

    #[error("Feed error: {0}")]
    Feed(String),
}

/// Where a workload's results came from this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeSource {
    Offload,
    Inline,
    /// Previous request still in flight; earlier results stand
    Skipped,
}

/// Outcome of one refresh cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshReport {
    pub cycle: u64,
    pub scored_at: DateTime<Utc>,
    pub countries: Vec<CountryReport>,
    pub escalations: Vec<EscalationAssessment>,
    pub clusters: Vec<ConvergenceCluster>,
    pub surges: Vec<SurgeResult>,
    pub signals: Vec<Signal>,
    pub cii_source: ComputeSource,
    pub convergence_source: ComputeSource,
    pub emitter: EmitterStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryReport {
    pub code: String,
    pub name: String,
    pub score: CiiScore,
}

/// The fusion engine
pub struct Engine {
    config: EngineConfig,
    instability: InstabilityScorer,
    escalation: EscalationScorer,
    convergence: ConvergenceDetector,
    surge: SurgeDetector,
    emitter: SignalEmitter,
    bridge: Option<OffloadBridge>,
    theaters: Vec<Theater>,
    signals: broadcast::Sender<Signal>,
    cycles: u64,
}

impl Engine {
    /// Create an engine, starting offload units if configured
    ///
    /// Offload needs a tokio runtime; without one the engine scores inline.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let bridge = if !config.engine.use_offload {
            None
        } else if tokio::runtime::Handle::try_current().is_err() {
            warn!("No tokio runtime, offload disabled");
            None
        } else {
            Some(OffloadBridge::start(
                config.offload.clone(),
                config.instability.clone(),
            )?)
        };

        Self::with_bridge(config, bridge)
    }

    /// Create an engine around an existing bridge (or none)
    pub fn with_bridge(
        config: EngineConfig,
        bridge: Option<OffloadBridge>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let (signals, _) = broadcast::channel(config.engine.signal_channel_capacity.max(1));

        Ok(Self {
            instability: InstabilityScorer::new(config.instability.clone(), ScoringTier::Precise),
            escalation: EscalationScorer::new(config.escalation.clone()),
            convergence: ConvergenceDetector::new(config.convergence.clone()),
            surge: SurgeDetector::new(config.surge.clone()),
            emitter: SignalEmitter::new(config.emitter.clone()),
            bridge,
            theaters: default_theaters(),
            signals,
            cycles: 0,
            config,
        })
    }

    /// Receive every published signal
    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.signals.subscribe()
    }

    pub fn is_offloading(&self) -> bool {
        self.bridge.is_some()
    }

    /// Run one refresh cycle over a snapshot
    pub async fn refresh(
        &mut self,
        snapshot: &FeedSnapshot,
        now: DateTime<Utc>,
    ) -> Result<RefreshReport, EngineError> {
        snapshot.validate()?;

        for feed in &snapshot.countries {
            self.instability
                .register(&feed.code, &feed.name, feed.baseline_risk, now);
        }

        let events = self.convergence.recent_events(&snapshot.events, now);
        let (countries, cii_source, clusters, convergence_source) =
            self.score_batches(snapshot, events, now).await;

        let mut candidates = Vec::new();

        // Escalation, fed by this cycle's CII
        let mut escalations = Vec::with_capacity(snapshot.hotspots.len());
        for feed in &snapshot.hotspots {
            let hotspot = &feed.hotspot;
            let cii = hotspot
                .country_code
                .as_deref()
                .and_then(|code| self.instability.current_score(code));

            self.escalation.score(hotspot, &feed.activity, cii, now);
            if let Some(assessment) = self.escalation.assess(&hotspot.id, now) {
                candidates.extend(self.escalation.signal_candidate(hotspot, &assessment));
                escalations.push(assessment);
            }
        }

        candidates.extend(self.convergence.signal_candidates(&clusters, now));

        // Surge per theater
        let theaters = if snapshot.theaters.is_empty() {
            &self.theaters
        } else {
            &snapshot.theaters
        };
        let radius = self.surge.config().base_radius_km;
        let mut surges = Vec::new();
        for theater in theaters {
            let counts = classify_tracks(theater, &snapshot.tracks, &snapshot.bases, radius);
            let results = self.surge.evaluate(theater, &counts, now);
            candidates.extend(self.surge.signal_candidates(theater, &results));
            surges.extend(results);
        }

        let published = self.emitter.offer_all(candidates, now);
        for signal in &published {
            // No subscribers is not an error
            let _ = self.signals.send(signal.clone());
        }

        self.cycles += 1;
        info!(
            "Cycle {}: {} countries, {} hotspots, {} clusters, {} surges, {} signals",
            self.cycles,
            countries.len(),
            escalations.len(),
            clusters.len(),
            surges.len(),
            published.len()
        );

        Ok(RefreshReport {
            cycle: self.cycles,
            scored_at: now,
            countries,
            escalations,
            clusters,
            surges,
            signals: published,
            cii_source,
            convergence_source,
            emitter: self.emitter.stats(),
        })
    }

    /// CII and convergence, offloaded concurrently when a bridge is present
    async fn score_batches(
        &mut self,
        snapshot: &FeedSnapshot,
        events: Vec<GeoEvent>,
        now: DateTime<Utc>,
    ) -> (
        Vec<CountryReport>,
        ComputeSource,
        Vec<ConvergenceCluster>,
        ComputeSource,
    ) {
        let threshold = self.convergence.threshold_km();
        let min_types = self.convergence.config().min_types;

        let offloaded = match &self.bridge {
            Some(bridge) => {
                let payloads = snapshot
                    .countries
                    .iter()
                    .map(|c| self.instability.payload(&c.code, &c.name, &c.data, now))
                    .collect();
                let (cii, convergence) = futures::future::join(
                    bridge.calculate_cii(payloads),
                    bridge.detect_convergence(events.clone(), threshold, min_types),
                )
                .await;
                Some((cii, convergence))
            }
            None => None,
        };

        let (cii, convergence) = match offloaded {
            Some((cii, convergence)) => (Some(cii), Some(convergence)),
            None => (None, None),
        };

        let cii_source = match cii {
            Some(Ok(scores)) => {
                self.instability.merge_fast(scores, now);
                ComputeSource::Offload
            }
            Some(Err(OffloadError::Busy(_))) => {
                debug!("CII batch still in flight, keeping previous scores");
                ComputeSource::Skipped
            }
            Some(Err(e)) => {
                warn!("CII offload failed ({}), scoring inline", e);
                self.score_inline(snapshot, now);
                ComputeSource::Inline
            }
            None => {
                self.score_inline(snapshot, now);
                ComputeSource::Inline
            }
        };

        let (clusters, convergence_source) = match convergence {
            Some(Ok(clusters)) => (clusters, ComputeSource::Offload),
            Some(Err(OffloadError::Busy(_))) => {
                debug!("Convergence pass still in flight");
                (Vec::new(), ComputeSource::Skipped)
            }
            Some(Err(e)) => {
                warn!("Convergence offload failed ({}), detecting inline", e);
                (self.convergence.detect(&events), ComputeSource::Inline)
            }
            None => (self.convergence.detect(&events), ComputeSource::Inline),
        };

        let countries = snapshot
            .countries
            .iter()
            .filter_map(|feed| {
                let country = self.instability.country(&feed.code)?;
                let score = country.current.clone()?;
                Some(CountryReport {
                    code: feed.code.clone(),
                    name: country.name.clone(),
                    score,
                })
            })
            .collect();

        (countries, cii_source, clusters, convergence_source)
    }

    fn score_inline(&mut self, snapshot: &FeedSnapshot, now: DateTime<Utc>) {
        for feed in &snapshot.countries {
            self.instability.score(&feed.code, &feed.name, &feed.data, now);
        }
    }

    /// Refresh on every tick until the feed runs dry or `max_cycles` is reached
    ///
    /// Invalid snapshots are logged and skipped. Returns the last report.
    pub async fn run(
        &mut self,
        feed: &mut dyn FeedSource,
        max_cycles: Option<u64>,
    ) -> Result<Option<RefreshReport>, EngineError> {
        let mut ticker = interval(Duration::from_millis(
            self.config.engine.tick_interval_ms.max(1),
        ));
        let mut last = None;
        let mut ran = 0u64;

        info!(
            "Engine starting (offload: {}, tick {} ms)",
            self.is_offloading(),
            self.config.engine.tick_interval_ms
        );

        loop {
            ticker.tick().await;

            let Some(snapshot) = feed.next_snapshot().await? else {
                info!("Feed exhausted after {} cycles", ran);
                break;
            };

            let now = snapshot.captured_at.unwrap_or_else(Utc::now);
            match self.refresh(&snapshot, now).await {
                Ok(report) => last = Some(report),
                Err(e) => error!("Skipping snapshot: {}", e),
            }

            ran += 1;
            if max_cycles.is_some_and(|max| ran >= max) {
                info!("Reached {} cycles", ran);
                break;
            }
        }

        Ok(last)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn emitter_stats(&self) -> EmitterStats {
        self.emitter.stats()
    }

    pub fn instability(&self) -> &InstabilityScorer {
        &self.instability
    }

    pub fn escalation(&self) -> &EscalationScorer {
        &self.escalation
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
