//! Compute offload bridge
//!
//! Dispatches CII and convergence batches to offload units and matches
//! their replies by correlation id:
//! - One router task per unit decodes frames and resolves pending requests
//! - Unknown, stale or malformed frames are logged and dropped
//! - At most one request per workload is in flight
//! - Every round trip has a timeout and a bounded retry count

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use watchfire_core::{
    decode_frame, encode_frame, CiiWorkerScore, ConvergenceCluster, CountryPayload, GeoEvent,
    InstabilityConfig, OffloadConfig, WorkerRequest, WorkerResponse, WorkloadKind,
};

use crate::worker::{spawn_unit, UnitChannels};

/// Errors from offload round trips
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OffloadError {
    #[error("A {0} request is already in flight")]
    Busy(WorkloadKind),

    #[error("Timeout after {0} ms")]
    Timeout(u64),

    #[error("{0} unit did not report ready")]
    NotReady(WorkloadKind),

    #[error("{0} unit is closed")]
    UnitClosed(WorkloadKind),

    #[error("Request superseded by a newer one")]
    Superseded,

    #[error("Unexpected response from {0} unit")]
    UnexpectedResponse(WorkloadKind),

    #[error("Failed to encode request: {0}")]
    Encode(String),

    #[error("Failed to spawn {0} unit: {1}")]
    Spawn(WorkloadKind, String),
}

struct UnitLink {
    requests: mpsc::UnboundedSender<String>,
    ready: watch::Receiver<bool>,
}

struct Pending {
    kind: WorkloadKind,
    reply: oneshot::Sender<WorkerResponse>,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    id: Uuid,
    dispatched_at: Instant,
}

type PendingTable = Arc<DashMap<Uuid, Pending>>;

/// Typed request/response channel to the offload units
pub struct OffloadBridge {
    config: OffloadConfig,
    links: HashMap<WorkloadKind, UnitLink>,
    pending: PendingTable,
    in_flight: Arc<Mutex<HashMap<WorkloadKind, InFlight>>>,
}

impl OffloadBridge {
    /// Spawn both units and connect to them
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: OffloadConfig,
        instability: InstabilityConfig,
    ) -> Result<Self, OffloadError> {
        let cii = spawn_unit(WorkloadKind::Cii, instability.clone())
            .map_err(|e| OffloadError::Spawn(WorkloadKind::Cii, e.to_string()))?;
        let convergence = spawn_unit(WorkloadKind::Convergence, instability)
            .map_err(|e| OffloadError::Spawn(WorkloadKind::Convergence, e.to_string()))?;

        info!("Started offload units (timeout {} ms)", config.timeout_ms);
        Ok(Self::connect(config, cii, convergence))
    }

    /// Connect to already-running units
    pub fn connect(config: OffloadConfig, cii: UnitChannels, convergence: UnitChannels) -> Self {
        let pending: PendingTable = Arc::new(DashMap::new());
        let mut links = HashMap::new();

        for (kind, channels) in [
            (WorkloadKind::Cii, cii),
            (WorkloadKind::Convergence, convergence),
        ] {
            let (ready_tx, ready_rx) = watch::channel(false);
            tokio::spawn(route(kind, channels.responses, ready_tx, pending.clone()));
            links.insert(
                kind,
                UnitLink {
                    requests: channels.requests,
                    ready: ready_rx,
                },
            );
        }

        Self {
            config,
            links,
            pending,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    /// Wait until a unit has announced itself
    pub async fn ready(&self, kind: WorkloadKind) -> Result<(), OffloadError> {
        let link = self.links.get(&kind).ok_or(OffloadError::UnitClosed(kind))?;
        let mut ready = link.ready.clone();
        let limit = Duration::from_millis(self.config.ready_timeout_ms);

        // The watch guard must drop before `ready` does
        let result = match tokio::time::timeout(limit, ready.wait_for(|r| *r)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(OffloadError::UnitClosed(kind)),
            Err(_) => Err(OffloadError::NotReady(kind)),
        };
        result
    }

    /// Whether a request for this workload is outstanding
    pub fn is_busy(&self, kind: WorkloadKind) -> bool {
        self.in_flight.lock().contains_key(&kind)
    }

    /// Requests awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Score a country batch on the CII unit
    pub async fn calculate_cii(
        &self,
        countries: Vec<CountryPayload>,
    ) -> Result<Vec<CiiWorkerScore>, OffloadError> {
        let response = self
            .round_trip(WorkloadKind::Cii, |id| WorkerRequest::Calculate {
                id,
                countries: countries.clone(),
            })
            .await?;

        match response {
            WorkerResponse::CiiResult { scores, .. } => Ok(scores),
            _ => Err(OffloadError::UnexpectedResponse(WorkloadKind::Cii)),
        }
    }

    /// Run a convergence pass on the convergence unit
    pub async fn detect_convergence(
        &self,
        events: Vec<GeoEvent>,
        threshold_km: f64,
        min_types: usize,
    ) -> Result<Vec<ConvergenceCluster>, OffloadError> {
        let response = self
            .round_trip(WorkloadKind::Convergence, |id| WorkerRequest::Detect {
                id,
                events: events.clone(),
                threshold_km,
                min_types,
            })
            .await?;

        match response {
            WorkerResponse::ConvergenceResult { clusters, .. } => Ok(clusters),
            _ => Err(OffloadError::UnexpectedResponse(WorkloadKind::Convergence)),
        }
    }

    /// Dispatch with retries on timeout
    async fn round_trip<F>(
        &self,
        kind: WorkloadKind,
        build: F,
    ) -> Result<WorkerResponse, OffloadError>
    where
        F: Fn(Uuid) -> WorkerRequest,
    {
        let mut attempt = 0;
        loop {
            match self.dispatch_once(kind, &build).await {
                Err(OffloadError::Timeout(ms)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "{} request timed out after {} ms, retrying ({}/{})",
                        kind, ms, attempt, self.config.max_retries
                    );
                }
                result => return result,
            }
        }
    }

    async fn dispatch_once<F>(
        &self,
        kind: WorkloadKind,
        build: &F,
    ) -> Result<WorkerResponse, OffloadError>
    where
        F: Fn(Uuid) -> WorkerRequest,
    {
        self.ready(kind).await?;
        let link = self.links.get(&kind).ok_or(OffloadError::UnitClosed(kind))?;

        let id = Uuid::new_v4();
        self.claim(kind, id)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(
            id,
            Pending {
                kind,
                reply: reply_tx,
            },
        );

        let result = self.exchange(kind, link, &build(id), reply_rx).await;

        self.pending.remove(&id);
        self.release(kind, id);
        result
    }

    async fn exchange(
        &self,
        kind: WorkloadKind,
        link: &UnitLink,
        request: &WorkerRequest,
        reply: oneshot::Receiver<WorkerResponse>,
    ) -> Result<WorkerResponse, OffloadError> {
        let frame = encode_frame(request).map_err(|e| OffloadError::Encode(e.to_string()))?;
        link.requests
            .send(frame)
            .map_err(|_| OffloadError::UnitClosed(kind))?;
        debug!("Dispatched {} request {}", kind, request.id());

        match tokio::time::timeout(self.timeout(), reply).await {
            Ok(Ok(response)) => Ok(response),
            // Reply sender dropped: the unit went away or a newer request took the slot
            Ok(Err(_)) if !*link.ready.borrow() => Err(OffloadError::UnitClosed(kind)),
            Ok(Err(_)) => Err(OffloadError::Superseded),
            Err(_) => Err(OffloadError::Timeout(self.config.timeout_ms)),
        }
    }

    /// Take the workload's in-flight slot, superseding a stale holder
    fn claim(&self, kind: WorkloadKind, id: Uuid) -> Result<(), OffloadError> {
        let mut slots = self.in_flight.lock();

        if let Some(current) = slots.get(&kind) {
            if current.dispatched_at.elapsed() < self.timeout() {
                return Err(OffloadError::Busy(kind));
            }
            warn!("Superseding stale {} request {}", kind, current.id);
            self.pending.remove(&current.id);
        }

        slots.insert(
            kind,
            InFlight {
                id,
                dispatched_at: Instant::now(),
            },
        );
        Ok(())
    }

    fn release(&self, kind: WorkloadKind, id: Uuid) {
        let mut slots = self.in_flight.lock();
        if slots.get(&kind).is_some_and(|f| f.id == id) {
            slots.remove(&kind);
        }
    }
}

/// Decode a unit's frames and resolve the matching pending request
async fn route(
    kind: WorkloadKind,
    mut responses: mpsc::UnboundedReceiver<String>,
    ready: watch::Sender<bool>,
    pending: PendingTable,
) {
    while let Some(frame) = responses.recv().await {
        let response: WorkerResponse = match decode_frame(&frame) {
            Ok(response) => response,
            Err(e) => {
                warn!("Dropping malformed {} frame: {}", kind, e);
                continue;
            }
        };

        let Some(id) = response.id() else {
            debug!("{} unit reported ready", kind);
            let _ = ready.send(true);
            continue;
        };

        if response.workload() != Some(kind) {
            warn!("Dropping mismatched response {} on {} channel", id, kind);
            continue;
        }

        match pending.remove_if(&id, |_, p| p.kind == kind) {
            Some((_, p)) => {
                let _ = p.reply.send(response);
            }
            None => debug!("Ignoring stale {} response {}", kind, id),
        }
    }

    // Flag the unit down before failing its waiters
    let _ = ready.send(false);
    pending.retain(|_, p| p.kind != kind);
    warn!("{} unit channel closed", kind);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use watchfire_core::{CountryData, ScoringTier};
    use watchfire_scoring::InstabilityScorer;

    /// A unit that answers after `skip` requests, optionally with noise first
    fn fake_unit(
        kind: WorkloadKind,
        skip: usize,
        noise: bool,
        seen: Arc<AtomicUsize>,
    ) -> UnitChannels {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<String>();
        let (response_tx, response_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            response_tx
                .send(encode_frame(&WorkerResponse::Ready).unwrap())
                .unwrap();

            while let Some(frame) = request_rx.recv().await {
                let n = seen.fetch_add(1, Ordering::SeqCst);
                if n < skip {
                    continue;
                }
                let request: WorkerRequest = decode_frame(&frame).unwrap();

                if noise {
                    let stale = WorkerResponse::CiiResult {
                        id: Uuid::new_v4(),
                        scores: Vec::new(),
                    };
                    let _ = response_tx.send(encode_frame(&stale).unwrap());
                    let _ = response_tx.send("{\"type\":\"cii-result\"".to_string());
                }

                let response = match (kind, request) {
                    (WorkloadKind::Cii, WorkerRequest::Calculate { id, countries }) => {
                        WorkerResponse::CiiResult {
                            id,
                            scores: countries
                                .into_iter()
                                .map(|c| CiiWorkerScore {
                                    code: c.code,
                                    name: c.name,
                                    score: 42.0,
                                    level: watchfire_core::Level::Normal,
                                    components: Default::default(),
                                })
                                .collect(),
                        }
                    }
                    (_, request) => WorkerResponse::ConvergenceResult {
                        id: request.id(),
                        clusters: Vec::new(),
                    },
                };
                let _ = response_tx.send(encode_frame(&response).unwrap());
            }
        });

        UnitChannels {
            requests: request_tx,
            responses: response_rx,
        }
    }

    fn bridge(
        config: OffloadConfig,
        skip: usize,
        noise: bool,
    ) -> (OffloadBridge, Arc<AtomicUsize>) {
        let seen = Arc::new(AtomicUsize::new(0));
        let cii = fake_unit(WorkloadKind::Cii, skip, noise, seen.clone());
        let quiet = Arc::new(AtomicUsize::new(0));
        let convergence = fake_unit(WorkloadKind::Convergence, 0, false, quiet);
        (OffloadBridge::connect(config, cii, convergence), seen)
    }

    fn payload(code: &str) -> CountryPayload {
        CountryPayload {
            code: code.to_string(),
            name: code.to_string(),
            data: CountryData::default(),
            previous_score: None,
            baseline_risk: None,
            warmup: false,
        }
    }

    fn quick(timeout_ms: u64, max_retries: u32) -> OffloadConfig {
        OffloadConfig {
            timeout_ms,
            max_retries,
            ready_timeout_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn test_real_units_round_trip() {
        let bridge =
            OffloadBridge::start(OffloadConfig::default(), InstabilityConfig::default()).unwrap();

        let mut data = CountryData::default();
        data.unrest.protests = 5;
        let batch = vec![CountryPayload {
            data: data.clone(),
            ..payload("DE")
        }];

        let scores = bridge.calculate_cii(batch.clone()).await.unwrap();
        assert_eq!(scores.len(), 1);

        let fast = InstabilityScorer::new(InstabilityConfig::default(), ScoringTier::Fast);
        let local = fast.compute_payload(&batch[0], chrono::Utc::now());
        assert_eq!(scores[0].score, local.score);

        let now = chrono::Utc::now();
        let clusters = bridge
            .detect_convergence(
                vec![
                    GeoEvent::new(10.0, 10.0, "protest", now),
                    GeoEvent::new(10.1, 10.0, "conflict", now),
                    GeoEvent::new(10.0, 10.1, "outage", now),
                ],
                100.0,
                3,
            )
            .await
            .unwrap();
        assert_eq!(clusters.len(), 1);
        assert!(!bridge.is_busy(WorkloadKind::Cii));
    }

    #[tokio::test]
    async fn test_stale_and_malformed_frames_ignored() {
        let (bridge, _) = bridge(quick(2_000, 0), 0, true);

        let scores = bridge.calculate_cii(vec![payload("UA")]).await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].code, "UA");
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unit_exit_fails_waiters_promptly() {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<String>();
        let (response_tx, response_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            response_tx
                .send(encode_frame(&WorkerResponse::Ready).unwrap())
                .unwrap();
            // Take one request, then exit without answering
            let _ = request_rx.recv().await;
        });

        let cii = UnitChannels {
            requests: request_tx,
            responses: response_rx,
        };
        let quiet = Arc::new(AtomicUsize::new(0));
        let convergence = fake_unit(WorkloadKind::Convergence, 0, false, quiet);
        let bridge = OffloadBridge::connect(quick(5_000, 1), cii, convergence);

        let started = Instant::now();
        let result = bridge.calculate_cii(vec![payload("UA")]).await;
        assert_eq!(result, Err(OffloadError::UnitClosed(WorkloadKind::Cii)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(bridge.pending_count(), 0);
        assert!(!bridge.is_busy(WorkloadKind::Cii));
    }

    #[tokio::test]
    async fn test_second_request_is_busy() {
        let (bridge, _) = bridge(quick(200, 0), usize::MAX, false);
        bridge.ready(WorkloadKind::Cii).await.unwrap();

        let (first, second) = tokio::join!(
            bridge.calculate_cii(vec![payload("UA")]),
            bridge.calculate_cii(vec![payload("PL")]),
        );

        assert_eq!(first, Err(OffloadError::Timeout(200)));
        assert_eq!(second, Err(OffloadError::Busy(WorkloadKind::Cii)));

        // Other workloads are independent
        assert!(bridge.detect_convergence(Vec::new(), 100.0, 3).await.is_ok());
    }

    #[tokio::test]
    async fn test_timeout_retries_then_releases() {
        let (bridge, seen) = bridge(quick(50, 1), usize::MAX, false);

        let result = bridge.calculate_cii(vec![payload("UA")]).await;
        assert_eq!(result, Err(OffloadError::Timeout(50)));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(!bridge.is_busy(WorkloadKind::Cii));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_request_is_superseded() {
        let (bridge, _) = bridge(quick(100, 0), 1, false);
        bridge.ready(WorkloadKind::Cii).await.unwrap();

        // Caller gives up before the bridge does, leaving the slot claimed
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            bridge.calculate_cii(vec![payload("UA")]),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(bridge.is_busy(WorkloadKind::Cii));

        assert_eq!(
            bridge.calculate_cii(vec![payload("UA")]).await,
            Err(OffloadError::Busy(WorkloadKind::Cii))
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        let scores = bridge.calculate_cii(vec![payload("UA")]).await.unwrap();
        assert_eq!(scores[0].score, 42.0);
        assert_eq!(bridge.pending_count(), 0);
        assert!(!bridge.is_busy(WorkloadKind::Cii));
    }
}
