//! Offload units
//!
//! Each unit is a dedicated OS thread that owns nothing but its own scorer
//! and talks to the main context through JSON text frames. It announces
//! itself with a `ready` frame, then answers requests until its request
//! channel closes.

use chrono::Utc;
use serde::Serialize;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use watchfire_core::{
    decode_frame, encode_frame, InstabilityConfig, ScoringTier, WorkerRequest, WorkerResponse,
    WorkloadKind,
};
use watchfire_scoring::{detect_with_min_types, InstabilityScorer};

/// Main-context ends of a unit's channels
pub struct UnitChannels {
    pub requests: mpsc::UnboundedSender<String>,
    pub responses: mpsc::UnboundedReceiver<String>,
}

/// Spawn a unit for one workload on its own thread
pub fn spawn_unit(kind: WorkloadKind, config: InstabilityConfig) -> std::io::Result<UnitChannels> {
    let (request_tx, request_rx) = mpsc::unbounded_channel::<String>();
    let (response_tx, response_rx) = mpsc::unbounded_channel::<String>();

    thread::Builder::new()
        .name(format!("watchfire-{}", kind))
        .spawn(move || run_unit(kind, config, request_rx, response_tx))?;

    Ok(UnitChannels {
        requests: request_tx,
        responses: response_rx,
    })
}

fn run_unit(
    kind: WorkloadKind,
    config: InstabilityConfig,
    mut requests: mpsc::UnboundedReceiver<String>,
    responses: mpsc::UnboundedSender<String>,
) {
    let scorer = InstabilityScorer::new(config, ScoringTier::Fast);

    if !send(&responses, &WorkerResponse::Ready) {
        return;
    }
    debug!("{} unit ready", kind);

    while let Some(frame) = requests.blocking_recv() {
        let Some(response) = handle_frame(kind, &scorer, &frame) else {
            continue;
        };
        if !send(&responses, &response) {
            break;
        }
    }

    debug!("{} unit stopped", kind);
}

/// Returns false once the unit cannot answer any further
fn send<T: Serialize>(responses: &mpsc::UnboundedSender<String>, response: &T) -> bool {
    match encode_frame(response) {
        Ok(frame) => responses.send(frame).is_ok(),
        Err(e) => {
            error!("Failed to encode response, stopping unit: {}", e);
            false
        }
    }
}

/// Answer one request frame
///
/// Malformed frames and requests for another workload get no answer.
pub fn handle_frame(
    kind: WorkloadKind,
    scorer: &InstabilityScorer,
    frame: &str,
) -> Option<WorkerResponse> {
    let request: WorkerRequest = match decode_frame(frame) {
        Ok(request) => request,
        Err(e) => {
            warn!("{} unit dropped malformed request: {}", kind, e);
            return None;
        }
    };

    if request.workload() != kind {
        warn!(
            "{} unit ignoring {} request {}",
            kind,
            request.workload(),
            request.id()
        );
        return None;
    }

    let response = match request {
        WorkerRequest::Calculate { id, countries } => {
            let now = Utc::now();
            WorkerResponse::CiiResult {
                id,
                scores: countries
                    .iter()
                    .map(|c| scorer.compute_payload(c, now))
                    .collect(),
            }
        }
        WorkerRequest::Detect {
            id,
            events,
            threshold_km,
            min_types,
        } => WorkerResponse::ConvergenceResult {
            id,
            clusters: detect_with_min_types(&events, threshold_km, min_types),
        },
    };

    Some(response)
}
