//! Instability scorer (Country Instability Index)
//!
//! Two tiers share one interface:
//! - `Precise`: full formula on the main context, with log dampening for
//!   high-volume countries, UCDP/HAPI fallbacks and additive boosts
//! - `Fast`: simplified batch formula run on an offload unit
//!
//! Both use the same component weights and baseline blend.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use watchfire_core::{
    blend, capped, clamp_score, log_dampened, trend_from_delta, weighted_sum, CiiScore,
    CiiWorkerScore, ClimateStress, ComponentScores, Country, CountryData, CountryPayload,
    CountryProfile, FocalUrgency, HistoryStore, InstabilityConfig, LearningState, Level,
    ScoringTier, UcdpStatus,
};

/// Unrest component: protests, fatalities, severity, outages
pub fn unrest_score(profile: &CountryProfile, data: &CountryData) -> f64 {
    let unrest = &data.unrest;
    let m = profile.event_multiplier;
    let protests = unrest.protests as f64;

    let adjusted = match profile.high_volume_dampener {
        Some(dampener) => log_dampened(protests, dampener) * m,
        None => protests * m,
    };

    let base = capped(adjusted * 8.0, 50.0);
    let fatalities = capped(unrest.protest_fatalities as f64 * 5.0 * m, 30.0);
    let severity = capped(unrest.high_severity_protests as f64 * 10.0 * m, 20.0);
    let outages = capped(
        unrest.outages.total as f64 * 30.0
            + unrest.outages.major as f64 * 15.0
            + unrest.outages.partial as f64 * 5.0,
        50.0,
    );

    clamp_score(base + fatalities + severity + outages)
}

/// Conflict component: event mix and fatalities, HAPI fallback, UCDP floor
pub fn conflict_score(profile: &CountryProfile, data: &CountryData) -> f64 {
    let conflict = &data.conflict;
    let m = profile.event_multiplier;

    let fatalities = capped((conflict.fatalities as f64).sqrt() * 5.0 * m, 40.0);

    let mut score = if conflict.event_count() > 0 {
        let weighted_events = conflict.battles as f64 * 3.0
            + conflict.explosions as f64 * 4.0
            + conflict.civilian_violence as f64 * 5.0;
        let events = capped(weighted_events * m, 50.0);
        let civilian = capped(conflict.civilian_events as f64 * 3.0, 10.0);
        events + fatalities + civilian
    } else {
        let hapi = conflict.hapi_political_violence.unwrap_or(0) as f64;
        capped(hapi * 3.0 * m, 60.0) + fatalities
    };

    score = match conflict.ucdp {
        Some(UcdpStatus::War) => score.max(70.0),
        Some(UcdpStatus::Minor) => score.max(50.0),
        _ => score,
    };

    clamp_score(score)
}

/// Security component: military flights and vessels
pub fn security_score(data: &CountryData) -> f64 {
    let security = &data.security;
    let flights = capped(security.military_flights as f64 * 3.0, 50.0);
    let vessels = capped(security.military_vessels as f64 * 5.0, 30.0);
    clamp_score(flights + vessels)
}

/// Information component: news volume, velocity, alert flag
pub fn information_score(profile: &CountryProfile, data: &CountryData) -> f64 {
    let info = &data.information;
    let m = profile.event_multiplier;
    let news = info.news_count as f64;

    let adjusted = match profile.high_volume_dampener {
        Some(dampener) => log_dampened(news, dampener) * m,
        None => news * m,
    };

    let base = capped(adjusted * 5.0, 40.0);
    let velocity = capped(info.velocity * 10.0 * m, 40.0);
    let alert = if info.has_alert { 20.0 } else { 0.0 };

    clamp_score(base + velocity + alert)
}

/// All four precise-tier components
pub fn precise_components(profile: &CountryProfile, data: &CountryData) -> ComponentScores {
    ComponentScores {
        unrest: unrest_score(profile, data),
        conflict: conflict_score(profile, data),
        security: security_score(data),
        information: information_score(profile, data),
    }
}

/// Simplified fast-tier components
pub fn fast_components(data: &CountryData) -> ComponentScores {
    let unrest = &data.unrest;
    let conflict = &data.conflict;
    let security = &data.security;
    let info = &data.information;

    ComponentScores {
        unrest: clamp_score(unrest.protests as f64 * 8.0 + unrest.outages.total as f64 * 15.0),
        conflict: clamp_score(
            conflict.event_count() as f64 * 5.0 + (conflict.fatalities as f64).sqrt() * 5.0,
        ),
        security: clamp_score(
            security.military_flights as f64 * 3.0 + security.military_vessels as f64 * 5.0,
        ),
        information: clamp_score(
            info.news_count as f64 * 2.0
                + info.velocity * 10.0
                + if info.has_alert { 20.0 } else { 0.0 },
        ),
    }
}

/// Additive boosts applied after the baseline blend (precise tier only)
pub fn boosts(data: &CountryData, proximity_radius_km: f64) -> f64 {
    let mut boost = 0.0;

    match data.information.urgency {
        Some(u) if u >= 70.0 => boost += 5.0,
        Some(u) if u >= 50.0 => boost += 3.0,
        _ => {}
    }

    match data.focal_point {
        Some(FocalUrgency::Critical) => boost += 8.0,
        Some(FocalUrgency::Elevated) => boost += 4.0,
        _ => {}
    }

    match data.displacement_outflow {
        Some(n) if n >= 1_000_000 => boost += 8.0,
        Some(n) if n >= 100_000 => boost += 4.0,
        _ => {}
    }

    match data.security.climate_stress {
        Some(ClimateStress::Extreme) => boost += 15.0,
        Some(ClimateStress::Moderate) => boost += 8.0,
        None => {}
    }

    if let Some(distance) = data.hotspot_distance_km {
        if proximity_radius_km > 0.0 && distance >= 0.0 && distance < proximity_radius_km {
            boost += 10.0 * (1.0 - distance / proximity_radius_km);
        }
    }

    boost
}

/// Per-country CII scorer
///
/// Owns each country's current/previous pair and the CII history.
pub struct InstabilityScorer {
    config: InstabilityConfig,
    tier: ScoringTier,
    countries: HashMap<String, Country>,
    history: HistoryStore<CiiScore>,
}

impl InstabilityScorer {
    pub fn new(config: InstabilityConfig, tier: ScoringTier) -> Self {
        let history = HistoryStore::new(config.history_window())
            .with_max_samples(config.history_max_samples);
        Self {
            config,
            tier,
            countries: HashMap::new(),
            history,
        }
    }

    pub fn tier(&self) -> ScoringTier {
        self.tier
    }

    /// Track a country, creating it on first load
    ///
    /// A baseline override replaces the curated baseline for this and later cycles.
    pub fn register(
        &mut self,
        code: &str,
        name: &str,
        baseline_override: Option<f64>,
        now: DateTime<Utc>,
    ) -> &Country {
        let country = self.countries.entry(code.to_string()).or_insert_with(|| {
            debug!("Tracking new country {} ({}), entering warmup", code, name);
            Country::new(code, name, CountryProfile::lookup(code), now)
        });

        if let Some(baseline) = baseline_override {
            country.profile = country.profile.with_baseline(baseline);
        }
        country
    }

    /// Score one country from raw data without touching any state
    pub fn compute(
        &self,
        profile: &CountryProfile,
        data: &CountryData,
        previous: Option<f64>,
        state: LearningState,
        now: DateTime<Utc>,
    ) -> CiiScore {
        let components = match self.tier {
            ScoringTier::Precise => precise_components(profile, data),
            ScoringTier::Fast => fast_components(data),
        };

        let w = &self.config.weights;
        let computed = weighted_sum(&[
            (components.unrest, w.unrest),
            (components.conflict, w.conflict),
            (components.security, w.security),
            (components.information, w.information),
        ]);

        let warmup = state.is_warmup();
        let baseline_weight = if warmup {
            self.config.warmup_baseline_weight
        } else {
            self.config.baseline_weight
        };
        let blended = blend(profile.baseline_risk, computed, baseline_weight);

        let value = match self.tier {
            ScoringTier::Precise => {
                clamp_score(blended + boosts(data, self.config.proximity_radius_km))
            }
            ScoringTier::Fast => blended,
        };

        let deadband = if warmup {
            self.config.warmup_trend_deadband
        } else {
            self.config.trend_deadband
        };

        CiiScore {
            value,
            level: Level::from_score(value),
            components,
            trend: trend_from_delta(value, previous, deadband),
            tier: self.tier,
            timestamp: now,
        }
    }

    /// Score a batch entry as an offload unit does
    ///
    /// Units keep no learning state; the payload's warmup flag selects the blend.
    pub fn compute_payload(
        &self,
        payload: &CountryPayload,
        now: DateTime<Utc>,
    ) -> CiiWorkerScore {
        let mut profile = CountryProfile::lookup(&payload.code);
        if let Some(baseline) = payload.baseline_risk {
            profile = profile.with_baseline(baseline);
        }

        let state = if payload.warmup {
            LearningState::Warmup { since: now }
        } else {
            LearningState::Active
        };
        let score = self.compute(&profile, &payload.data, payload.previous_score, state, now);

        CiiWorkerScore {
            code: payload.code.clone(),
            name: payload.name.clone(),
            score: score.value,
            level: score.level,
            components: score.components,
        }
    }

    /// Score a country and record the result
    pub fn score(
        &mut self,
        code: &str,
        name: &str,
        data: &CountryData,
        now: DateTime<Utc>,
    ) -> CiiScore {
        self.register(code, name, None, now);

        let (profile, previous, state) = {
            let country = &self.countries[code];
            (
                country.profile,
                country.current_value(),
                country.learning_state(now, self.config.warmup()),
            )
        };

        let score = self.compute(&profile, data, previous, state, now);
        self.install(code, score.clone(), now);
        score
    }

    /// Merge scores returned by an offload unit
    ///
    /// Trend is derived here against the country's own previous score, using
    /// the warmup-aware deadband the unit does not know about.
    pub fn merge_fast(
        &mut self,
        results: Vec<CiiWorkerScore>,
        now: DateTime<Utc>,
    ) -> Vec<CiiScore> {
        let mut merged = Vec::with_capacity(results.len());

        for result in results {
            self.register(&result.code, &result.name, None, now);

            let (previous, state) = {
                let country = &self.countries[&result.code];
                (
                    country.current_value(),
                    country.learning_state(now, self.config.warmup()),
                )
            };

            let deadband = if state.is_warmup() {
                self.config.warmup_trend_deadband
            } else {
                self.config.trend_deadband
            };

            let value = clamp_score(result.score);
            let score = CiiScore {
                value,
                level: Level::from_score(value),
                components: result.components,
                trend: trend_from_delta(value, previous, deadband),
                tier: ScoringTier::Fast,
                timestamp: now,
            };

            self.install(&result.code, score.clone(), now);
            merged.push(score);
        }

        merged
    }

    fn install(&mut self, code: &str, score: CiiScore, now: DateTime<Utc>) {
        if let Some(country) = self.countries.get_mut(code) {
            country.push_score(score.clone());
        }
        self.history.record(code, score, now);
    }

    /// Build an offload payload from the country's current state
    ///
    /// Untracked countries are sent as warming up, matching a first load.
    pub fn payload(
        &self,
        code: &str,
        name: &str,
        data: &CountryData,
        now: DateTime<Utc>,
    ) -> CountryPayload {
        let country = self.countries.get(code);
        CountryPayload {
            code: code.to_string(),
            name: name.to_string(),
            data: data.clone(),
            previous_score: country.and_then(|c| c.current_value()),
            baseline_risk: country.map(|c| c.profile.baseline_risk),
            warmup: country.map_or(true, |c| {
                c.learning_state(now, self.config.warmup()).is_warmup()
            }),
        }
    }

    pub fn country(&self, code: &str) -> Option<&Country> {
        self.countries.get(code)
    }

    pub fn countries(&self) -> impl Iterator<Item = &Country> {
        self.countries.values()
    }

    pub fn current_score(&self, code: &str) -> Option<f64> {
        self.countries.get(code).and_then(|c| c.current_value())
    }

    pub fn history(&self) -> &HistoryStore<CiiScore> {
        &self.history
    }

    pub fn config(&self) -> &InstabilityConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use watchfire_core::{ConflictData, InformationData, SecurityData, Trend, UnrestData};

    fn scorer() -> InstabilityScorer {
        InstabilityScorer::new(InstabilityConfig::default(), ScoringTier::Precise)
    }

    fn protests(n: u32) -> CountryData {
        CountryData {
            unrest: UnrestData {
                protests: n,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn maxed() -> CountryData {
        CountryData {
            unrest: UnrestData {
                protests: 10_000,
                protest_fatalities: 10_000,
                high_severity_protests: 10_000,
                outages: watchfire_core::OutageData {
                    total: 100,
                    major: 100,
                    partial: 100,
                },
            },
            conflict: ConflictData {
                battles: 10_000,
                explosions: 10_000,
                civilian_violence: 10_000,
                fatalities: 1_000_000,
                civilian_events: 10_000,
                hapi_political_violence: Some(10_000),
                ucdp: Some(UcdpStatus::War),
            },
            security: SecurityData {
                military_flights: 10_000,
                military_vessels: 10_000,
                climate_stress: Some(ClimateStress::Extreme),
            },
            information: InformationData {
                news_count: 10_000,
                velocity: 10_000.0,
                has_alert: true,
                urgency: Some(100.0),
            },
            focal_point: Some(FocalUrgency::Critical),
            displacement_outflow: Some(5_000_000),
            hotspot_distance_km: Some(0.0),
        }
    }

    #[test]
    fn test_golden_protest_regression() {
        // unrest = min(50, 10*8) = 50; computed = 50*0.25 = 12.5
        // active blend = 20*0.4 + 12.5*0.6 = 15.5
        let scorer = scorer();
        let profile = CountryProfile::fallback("ZZ").with_baseline(20.0);
        let now = Utc::now();

        let score = scorer.compute(&profile, &protests(10), None, LearningState::Active, now);

        assert_eq!(score.components.unrest, 50.0);
        assert_eq!(score.components.conflict, 0.0);
        assert_eq!(score.components.security, 0.0);
        assert_eq!(score.components.information, 0.0);
        assert!((score.value - 15.5).abs() < 1e-9);
        assert_eq!(score.level, Level::Low);
        assert_eq!(score.tier, ScoringTier::Precise);
    }

    #[test]
    fn test_warmup_leans_on_baseline() {
        // warmup blend = 20*0.6 + 12.5*0.4 = 17.0
        let scorer = scorer();
        let profile = CountryProfile::fallback("ZZ").with_baseline(20.0);
        let now = Utc::now();

        let score = scorer.compute(
            &profile,
            &protests(10),
            None,
            LearningState::Warmup { since: now },
            now,
        );
        assert!((score.value - 17.0).abs() < 1e-9);
    }

    #[test]
    fn test_scores_and_components_respect_caps() {
        for tier in [ScoringTier::Precise, ScoringTier::Fast] {
            let scorer = InstabilityScorer::new(InstabilityConfig::default(), tier);
            for code in ["US", "UA", "ZZ"] {
                let profile = CountryProfile::lookup(code).with_baseline(100.0);
                let state = LearningState::Active;
                let score = scorer.compute(&profile, &maxed(), Some(0.0), state, Utc::now());

                assert!((0.0..=100.0).contains(&score.value));
                let c = score.components;
                for v in [c.unrest, c.conflict, c.security, c.information] {
                    assert!((0.0..=100.0).contains(&v));
                }
            }
        }
    }

    #[test]
    fn test_sub_term_caps() {
        let profile = CountryProfile::fallback("ZZ");
        assert_eq!(unrest_score(&profile, &protests(1_000)), 50.0);

        let mut data = CountryData::default();
        data.security.military_flights = 1_000;
        assert_eq!(security_score(&data), 50.0);
        data.security.military_vessels = 1_000;
        assert_eq!(security_score(&data), 80.0);

        let mut data = CountryData::default();
        data.information.news_count = 1_000;
        assert_eq!(information_score(&profile, &data), 40.0);
        data.information.has_alert = true;
        assert_eq!(information_score(&profile, &data), 60.0);

        let mut data = CountryData::default();
        data.conflict.civilian_events = 1_000;
        data.conflict.battles = 1;
        // battles 1*3 = 3, civilian capped at 10
        assert_eq!(conflict_score(&profile, &data), 13.0);
    }

    #[test]
    fn test_high_volume_country_is_dampened() {
        let noisy = CountryProfile::lookup("US");
        let plain = CountryProfile::fallback("ZZ");

        // log2(11) * 4 * 0.3 * 8 ~= 33.2 versus min(50, 80)
        let noisy_unrest = unrest_score(&noisy, &protests(10));
        assert!((noisy_unrest - 33.2).abs() < 0.1);
        assert_eq!(unrest_score(&plain, &protests(10)), 50.0);

        // Still grows with volume, just sub-linearly
        assert!(unrest_score(&noisy, &protests(1)) < noisy_unrest);

        let mut news = CountryData::default();
        news.information.news_count = 20;
        assert!(information_score(&noisy, &news) < information_score(&plain, &news));
    }

    #[test]
    fn test_conflict_fallbacks() {
        let profile = CountryProfile::fallback("ZZ");

        let mut data = CountryData::default();
        data.conflict.hapi_political_violence = Some(5);
        assert_eq!(conflict_score(&profile, &data), 15.0);

        data.conflict.ucdp = Some(UcdpStatus::War);
        assert_eq!(conflict_score(&profile, &data), 70.0);

        data.conflict.ucdp = Some(UcdpStatus::Minor);
        assert_eq!(conflict_score(&profile, &data), 50.0);
    }

    #[test]
    fn test_missing_data_yields_baseline_blend() {
        let scorer = scorer();
        let profile = CountryProfile::fallback("ZZ").with_baseline(50.0);
        let score = scorer.compute(
            &profile,
            &CountryData::default(),
            None,
            LearningState::Active,
            Utc::now(),
        );
        assert!((score.value - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_boosts() {
        let mut data = CountryData::default();
        assert_eq!(boosts(&data, 200.0), 0.0);

        data.information.urgency = Some(55.0);
        data.focal_point = Some(FocalUrgency::Elevated);
        data.displacement_outflow = Some(150_000);
        data.security.climate_stress = Some(ClimateStress::Moderate);
        data.hotspot_distance_km = Some(100.0);
        // 3 + 4 + 4 + 8 + 5
        assert!((boosts(&data, 200.0) - 24.0).abs() < 1e-9);

        data.hotspot_distance_km = Some(250.0);
        assert!((boosts(&data, 200.0) - 19.0).abs() < 1e-9);
    }

    #[test]
    fn test_compute_is_idempotent() {
        let scorer = scorer();
        let profile = CountryProfile::lookup("IR");
        let data = maxed();
        let now = Utc::now();

        let a = scorer.compute(&profile, &data, Some(40.0), LearningState::Active, now);
        let b = scorer.compute(&profile, &data, Some(40.0), LearningState::Active, now);
        assert_eq!(a, b);
    }

    #[test]
    fn test_trend_deadband() {
        let scorer = scorer();
        let profile = CountryProfile::fallback("ZZ").with_baseline(20.0);
        let now = Utc::now();

        let data = protests(10);
        let active = LearningState::Active;

        let stable = scorer.compute(&profile, &data, Some(12.0), active, now);
        assert_eq!(stable.trend, Trend::Stable);

        let rising = scorer.compute(&profile, &data, Some(10.0), active, now);
        assert_eq!(rising.trend, Trend::Rising);

        let falling = scorer.compute(&profile, &data, Some(30.0), active, now);
        assert_eq!(falling.trend, Trend::Falling);
    }

    #[test]
    fn test_score_rotates_previous_and_writes_history() {
        let mut scorer = scorer();
        let t0 = Utc::now();

        scorer.score("UA", "Ukraine", &protests(2), t0);
        let later = t0 + Duration::minutes(30);
        let second = scorer.score("UA", "Ukraine", &protests(40), later);

        let country = scorer.country("UA").unwrap();
        assert_eq!(country.current.as_ref().unwrap().value, second.value);
        assert!(country.previous.is_some());
        assert_eq!(scorer.history().samples("UA", later).len(), 2);
        assert!(!country.learning_state(later, scorer.config().warmup()).is_warmup());
    }

    #[test]
    fn test_fast_tier_differs_from_precise() {
        let precise = scorer();
        let fast = InstabilityScorer::new(InstabilityConfig::default(), ScoringTier::Fast);
        let profile = CountryProfile::lookup("US");
        let mut data = protests(30);
        data.security.climate_stress = Some(ClimateStress::Extreme);
        let now = Utc::now();

        let p = precise.compute(&profile, &data, None, LearningState::Active, now);
        let f = fast.compute(&profile, &data, None, LearningState::Active, now);
        assert_eq!(f.tier, ScoringTier::Fast);
        assert_ne!(p.value, f.value);
    }

    #[test]
    fn test_merge_fast_derives_trend_locally() {
        let mut scorer = scorer();
        let t0 = Utc::now() - Duration::hours(1);
        scorer.register("SY", "Syria", None, t0);
        scorer.score("SY", "Syria", &CountryData::default(), t0);

        let now = Utc::now();
        let merged = scorer.merge_fast(
            vec![CiiWorkerScore {
                code: "SY".into(),
                name: "Syria".into(),
                score: 90.0,
                level: Level::Critical,
                components: ComponentScores::default(),
            }],
            now,
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].trend, Trend::Rising);
        assert_eq!(merged[0].tier, ScoringTier::Fast);
        assert_eq!(scorer.current_score("SY"), Some(90.0));
    }

    #[test]
    fn test_payload_carries_previous_score() {
        let mut scorer = scorer();
        let now = Utc::now();
        let score = scorer.score("IL", "Israel", &protests(3), now);

        let payload = scorer.payload("IL", "Israel", &protests(4), now);
        assert_eq!(payload.previous_score, Some(score.value));
        assert_eq!(payload.baseline_risk, Some(45.0));
        assert!(payload.warmup);

        let later = scorer.payload("IL", "Israel", &protests(4), now + Duration::minutes(20));
        assert!(!later.warmup);

        let fresh = scorer.payload("QQ", "Nowhere", &CountryData::default(), now);
        assert_eq!(fresh.previous_score, None);
        assert!(fresh.warmup);
    }

    #[test]
    fn test_fast_payload_honors_warmup_blend() {
        let fast = InstabilityScorer::new(InstabilityConfig::default(), ScoringTier::Fast);
        let mut payload = CountryPayload {
            code: "ZZ".into(),
            name: "Testland".into(),
            data: protests(10),
            previous_score: None,
            baseline_risk: Some(50.0),
            warmup: true,
        };
        let now = Utc::now();

        // fast unrest = 80, computed = 20; warmup 50*0.6 + 20*0.4 = 38
        let warm = fast.compute_payload(&payload, now);
        assert!((warm.score - 38.0).abs() < 1e-9);

        // active 50*0.4 + 20*0.6 = 32
        payload.warmup = false;
        let active = fast.compute_payload(&payload, now);
        assert!((active.score - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_conflict_counters_near_u32_max() {
        let profile = CountryProfile::fallback("ZZ");
        let mut data = CountryData::default();
        data.conflict.battles = u32::MAX;
        data.conflict.explosions = 1;

        assert_eq!(conflict_score(&profile, &data), 50.0);
        let fast = fast_components(&data);
        assert_eq!(fast.conflict, 100.0);
    }
}
