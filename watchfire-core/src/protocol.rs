//! Offload frames
//!
//! Messages exchanged between the main context and isolated computation
//! units. Frames travel as JSON text so nothing but owned data crosses the
//! boundary; a frame that fails to decode is dropped by the receiver.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    ComponentScores, ConvergenceCluster, CountryData, GeoEvent, Level, GEO_CONVERGENCE_THRESHOLD,
};

/// Workloads that run on offload units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    /// Per-country CII batch recompute
    Cii,
    /// O(n^2) geo-convergence pass
    Convergence,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Cii => "cii",
            WorkloadKind::Convergence => "convergence",
        }
    }
}

impl std::fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One country in a CII batch request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryPayload {
    pub code: String,
    pub name: String,
    pub data: CountryData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_score: Option<f64>,
    /// Baseline override; the unit falls back to the curated profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_risk: Option<f64>,
    /// Country is still learning; score with the warmup blend
    #[serde(default)]
    pub warmup: bool,
}

/// One country in a CII batch response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiiWorkerScore {
    pub code: String,
    pub name: String,
    pub score: f64,
    pub level: Level,
    pub components: ComponentScores,
}

/// Main context -> offload unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerRequest {
    Calculate {
        id: Uuid,
        countries: Vec<CountryPayload>,
    },
    #[serde(rename_all = "camelCase")]
    Detect {
        id: Uuid,
        events: Vec<GeoEvent>,
        threshold_km: f64,
        #[serde(default = "default_min_types")]
        min_types: usize,
    },
}

fn default_min_types() -> usize {
    GEO_CONVERGENCE_THRESHOLD
}

impl WorkerRequest {
    pub fn id(&self) -> Uuid {
        match self {
            WorkerRequest::Calculate { id, .. } | WorkerRequest::Detect { id, .. } => *id,
        }
    }

    pub fn workload(&self) -> WorkloadKind {
        match self {
            WorkerRequest::Calculate { .. } => WorkloadKind::Cii,
            WorkerRequest::Detect { .. } => WorkloadKind::Convergence,
        }
    }
}

/// Offload unit -> main context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerResponse {
    Ready,
    CiiResult {
        id: Uuid,
        scores: Vec<CiiWorkerScore>,
    },
    ConvergenceResult {
        id: Uuid,
        clusters: Vec<ConvergenceCluster>,
    },
}

impl WorkerResponse {
    /// Correlation id, absent for `ready`
    pub fn id(&self) -> Option<Uuid> {
        match self {
            WorkerResponse::Ready => None,
            WorkerResponse::CiiResult { id, .. } | WorkerResponse::ConvergenceResult { id, .. } => {
                Some(*id)
            }
        }
    }

    pub fn workload(&self) -> Option<WorkloadKind> {
        match self {
            WorkerResponse::Ready => None,
            WorkerResponse::CiiResult { .. } => Some(WorkloadKind::Cii),
            WorkerResponse::ConvergenceResult { .. } => Some(WorkloadKind::Convergence),
        }
    }
}

/// Encode a frame as JSON text
pub fn encode_frame<T: Serialize>(message: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Decode a JSON frame
pub fn decode_frame<'a, T: Deserialize<'a>>(frame: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(frame)
}
