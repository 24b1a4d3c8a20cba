//! Watchfire Core - domain model for geopolitical event fusion
//!
//! This crate provides the foundational primitives:
//! - Normalization of raw counters into bounded component scores
//! - Rolling, time-windowed history per entity
//! - Country, hotspot, geo-event and military domain types
//! - Alert signals with deduplication and cooldown
//! - Offload frames exchanged with isolated computation units
//! - Engine configuration loaded from TOML

pub mod config;
pub mod emitter;
pub mod error;
pub mod events;
pub mod history;
pub mod military;
pub mod normalize;
pub mod profiles;
pub mod protocol;
pub mod signals;
pub mod types;

pub use config::*;
pub use emitter::*;
pub use error::*;
pub use events::*;
pub use history::*;
pub use military::*;
pub use normalize::*;
pub use profiles::*;
pub use protocol::*;
pub use signals::*;
pub use types::*;

/// Upper bound of every composite score
pub const MAX_SCORE: f64 = 100.0;

/// Upper bound of the escalation alert scale
pub const MAX_ALERT_SCORE: f64 = 5.0;

/// Divisor mapping a 0-100 composite onto the 0-5 alert scale
pub const ALERT_SCALE_DIVISOR: f64 = MAX_SCORE / MAX_ALERT_SCORE;

/// Minimum distinct event types for a convergence cluster
pub const GEO_CONVERGENCE_THRESHOLD: usize = 3;

/// Mean Earth radius used for great-circle distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Tolerance used when checking that weight sets sum to one
pub const WEIGHT_TOLERANCE: f64 = 1e-9;
