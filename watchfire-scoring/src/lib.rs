//! Watchfire Scoring
//!
//! The four cooperating scorers:
//! - **Instability**: per-country CII from unrest, conflict, security and information
//! - **Escalation**: per-hotspot blend of news, CII, geo alerts and military activity
//! - **Convergence**: star-shaped clustering of co-located cross-domain events
//! - **Surge**: military transit counts against a learned per-theater baseline
//!
//! Every scorer owns its entity state and history; nothing here is global.

pub mod convergence;
pub mod error;
pub mod escalation;
pub mod instability;
pub mod surge;

pub use convergence::*;
pub use error::*;
pub use escalation::*;
pub use instability::*;
pub use surge::*;
