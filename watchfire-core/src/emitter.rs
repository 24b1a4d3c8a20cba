//! Signal emitter - thresholded, deduplicated, rate-limited publication
//!
//! The emitter sits above every scorer:
//! - Scorers offer candidate signals
//! - Exact repeats (same dedupe key) are suppressed for the dedupe TTL
//! - A `(type, subject)` pair is suppressed for its type's cooldown
//! - Everything else is published and remembered
//!
//! Expired entries are swept lazily on each offer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::{EmitterConfig, Signal, SignalType};

/// Per-pair emission state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EmissionState {
    Idle,
    Emitted { until: DateTime<Utc> },
}

/// Why a candidate was not published
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    Duplicate,
    CoolingDown { until: DateTime<Utc> },
}

/// Outcome of offering one candidate
#[derive(Debug, Clone)]
pub enum Offer {
    Published(Signal),
    Suppressed(Suppression),
}

/// Publishes signals subject to dedupe and cooldown
#[derive(Debug, Clone)]
pub struct SignalEmitter {
    config: EmitterConfig,

    /// `(type, subject)` -> cooldown expiry
    cooldowns: HashMap<(SignalType, String), DateTime<Utc>>,

    /// dedupe key -> first publication time
    seen_keys: HashMap<String, DateTime<Utc>>,

    /// Recently published signals, newest last
    recent: VecDeque<Signal>,

    published_total: u64,
    suppressed_total: u64,
}

impl SignalEmitter {
    pub fn new(config: EmitterConfig) -> Self {
        Self {
            config,
            cooldowns: HashMap::new(),
            seen_keys: HashMap::new(),
            recent: VecDeque::new(),
            published_total: 0,
            suppressed_total: 0,
        }
    }

    /// Cooldown interval for a signal type
    pub fn cooldown_for(&self, signal_type: SignalType) -> Duration {
        let minutes = match signal_type {
            SignalType::HotspotEscalation => self.config.escalation_cooldown_minutes,
            SignalType::MilitarySurge => self.config.surge_cooldown_minutes,
            _ => self.config.default_cooldown_minutes,
        };
        Duration::minutes(minutes)
    }

    /// Current state of a `(type, subject)` pair
    pub fn state(
        &self,
        signal_type: SignalType,
        subject_id: &str,
        now: DateTime<Utc>,
    ) -> EmissionState {
        match self.cooldowns.get(&(signal_type, subject_id.to_string())) {
            Some(&until) if until > now => EmissionState::Emitted { until },
            _ => EmissionState::Idle,
        }
    }

    /// Offer one candidate signal
    pub fn offer(&mut self, mut signal: Signal, now: DateTime<Utc>) -> Offer {
        self.sweep(now);

        if self.seen_keys.contains_key(&signal.dedupe_key) {
            self.suppressed_total += 1;
            debug!("Suppressed duplicate signal {}", signal.dedupe_key);
            return Offer::Suppressed(Suppression::Duplicate);
        }

        if let EmissionState::Emitted { until } =
            self.state(signal.signal_type, &signal.subject_id, now)
        {
            self.suppressed_total += 1;
            debug!(
                "Suppressed {} for {} (cooling down until {})",
                signal.signal_type, signal.subject_id, until
            );
            return Offer::Suppressed(Suppression::CoolingDown { until });
        }

        signal.emitted_at = now;
        let cooldown = self.cooldown_for(signal.signal_type);
        self.cooldowns.insert(signal.cooldown_key(), now + cooldown);
        self.seen_keys.insert(signal.dedupe_key.clone(), now);

        self.recent.push_back(signal.clone());
        while self.recent.len() > self.config.max_recent {
            self.recent.pop_front();
        }

        self.published_total += 1;
        debug!("Published {} for {}", signal.signal_type, signal.subject_id);
        Offer::Published(signal)
    }

    /// Offer a batch, returning only what was published
    pub fn offer_all(&mut self, signals: Vec<Signal>, now: DateTime<Utc>) -> Vec<Signal> {
        signals
            .into_iter()
            .filter_map(|s| match self.offer(s, now) {
                Offer::Published(signal) => Some(signal),
                Offer::Suppressed(_) => None,
            })
            .collect()
    }

    /// Drop expired cooldowns and dedupe keys
    pub fn sweep(&mut self, now: DateTime<Utc>) {
        let ttl = self.config.dedupe_ttl();
        self.cooldowns.retain(|_, until| *until > now);
        self.seen_keys.retain(|_, at| now - *at < ttl);
    }

    /// Recently published signals, oldest first
    pub fn recent(&self) -> impl Iterator<Item = &Signal> {
        self.recent.iter()
    }

    pub fn stats(&self) -> EmitterStats {
        EmitterStats {
            published_total: self.published_total,
            suppressed_total: self.suppressed_total,
            cooling_down: self.cooldowns.len(),
            recent: self.recent.len(),
        }
    }

    /// Forget all state (for testing)
    pub fn clear(&mut self) {
        self.cooldowns.clear();
        self.seen_keys.clear();
        self.recent.clear();
    }
}

impl Default for SignalEmitter {
    fn default() -> Self {
        Self::new(EmitterConfig::default())
    }
}

/// Emitter statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitterStats {
    pub published_total: u64,
    pub suppressed_total: u64,
    pub cooling_down: usize,
    pub recent: usize,
}
