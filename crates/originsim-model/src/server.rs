//! Origin server state and the stochastic service model.

use crate::config::Config;
use crate::distrib::{self, DistribError};
use crate::events::{EventSink, RequestEvent, RttSample, SnapshotEvent};
use crate::rng::SimRng;
use crossbeam_channel::Sender;
use originsim_engine::SimContext;
use parking_lot::{Mutex, MutexGuard};
use rand_distr::LogNormal;
use std::sync::Arc;

/// Immutable per-server parameters fixed at initialisation.
#[derive(Debug, Clone, Copy)]
pub struct ServerParams {
    /// Capacity in Mbps.
    pub mbps: f64,
    /// Baseline one-way delay in milliseconds.
    pub owd_ms: f64,
    /// Concurrent streams the capacity sustains: `⌊mbps / bitrate⌋`.
    pub max_connections: u32,
}

/// Mutable server state, only touched under the server's lock.
#[derive(Debug, Clone, Copy)]
pub struct ServerState {
    pub connections: u32,
    pub owd_ms: f64,
    /// Virtual time until which the current delay spike lasts.
    pub spike_until: f64,
}

/// Result of one admission + service attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestOutcome {
    Served { duration: f64 },
    Rejected,
}

/// One origin server. Identity is a dense 1-based id; 0 is reserved for
/// "no server" in drop records.
pub struct Server {
    pub id: u32,
    pub params: ServerParams,
    state: Mutex<ServerState>,
    /// Log-normal transfer time around the capacity-determined mean.
    transfer_dist: LogNormal<f64>,
    rtt_tx: Sender<RttSample>,
}

impl Server {
    pub fn new(
        id: u32,
        params: ServerParams,
        segment_size_bytes: f64,
        sigma_server: f64,
        rtt_tx: Sender<RttSample>,
    ) -> Result<Self, DistribError> {
        let tx_mean = segment_size_bytes * 8.0 / (params.mbps * 1_000_000.0);
        let transfer_dist = distrib::log_normal(tx_mean.ln(), sigma_server)?;
        Ok(Self {
            id,
            state: Mutex::new(ServerState {
                connections: 0,
                owd_ms: params.owd_ms,
                spike_until: 0.0,
            }),
            params,
            transfer_dist,
            rtt_tx,
        })
    }

    /// Lock the mutable state. Callers must release before any scheduler
    /// wait.
    pub fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock()
    }

    pub fn is_overloaded(&self) -> bool {
        let state = self.state.lock();
        state.connections >= self.params.max_connections
    }

    pub fn connections(&self) -> u32 {
        self.state.lock().connections
    }

    /// Capture `(t, id, connections, owd)` atomically.
    pub fn snapshot(&self, t: f64) -> SnapshotEvent {
        let state = self.state.lock();
        SnapshotEvent {
            t,
            server_id: self.id,
            connections: state.connections,
            owd_ms: state.owd_ms,
        }
    }

    /// Admit and serve one segment request.
    ///
    /// Rejects immediately when the connection limit is reached. Otherwise
    /// holds a connection for the sampled service time plus the carried
    /// redirect penalty, emits the Request event, and offers the observed
    /// duration to the latency feedback stream (dropped if the stream is
    /// full or unused).
    pub async fn handle_request(
        &self,
        ctx: &SimContext,
        start: f64,
        penalty_ms: f64,
        session_id: u64,
        sink: &dyn EventSink,
        rng: &SimRng,
    ) -> RequestOutcome {
        let service = {
            let mut state = self.state.lock();
            if state.connections >= self.params.max_connections {
                return RequestOutcome::Rejected;
            }
            state.connections += 1;
            rng.sample(&self.transfer_dist) + 2.0 * state.owd_ms / 1000.0
        };
        let duration = service + penalty_ms / 1000.0;

        ctx.wait(duration).await;

        {
            let mut state = self.state.lock();
            state.connections -= 1;
        }

        sink.add_request(RequestEvent {
            server_id: self.id,
            session_id,
            start_s: start,
            end_s: start + duration,
            duration,
        });
        let _ = self.rtt_tx.try_send(RttSample {
            server_id: self.id,
            rtt: duration,
            when: start,
        });

        RequestOutcome::Served { duration }
    }
}

/// Build the cluster: capacity is drawn log-normally so the configured
/// mean acts as the central value under the configured CV, baseline OWD is
/// gamma-distributed, and the connection limit follows from the bitrate.
///
/// The log-space σ of the capacity draw is the raw CV (while the μ shift
/// uses `ln(1+cv²)`), matching the traces this simulator is compared
/// against.
pub fn init_servers(
    cfg: &Config,
    rng: &SimRng,
    rtt_tx: &Sender<RttSample>,
) -> Result<Vec<Arc<Server>>, DistribError> {
    let cluster = &cfg.cluster;
    let sigma_ln_sq = (1.0 + cluster.cap_cv * cluster.cap_cv).ln();
    let cap_dist = distrib::log_normal(
        cluster.cap_mean_mbps.ln() - 0.5 * sigma_ln_sq,
        cluster.cap_cv,
    )?;
    let owd_dist = distrib::gamma_mean_cv(cluster.owd_mean, cluster.owd_cv)?;

    let mut servers = Vec::with_capacity(cluster.servers as usize);
    for i in 0..cluster.servers {
        let mbps = rng.sample(&cap_dist);
        let owd = rng.sample(&owd_dist);
        let params = ServerParams {
            mbps,
            owd_ms: owd,
            max_connections: (mbps / cluster.bitrate).floor() as u32,
        };
        servers.push(Arc::new(Server::new(
            i + 1,
            params,
            cluster.segment_size_bytes,
            cluster.sigma_server,
            rtt_tx.clone(),
        )?));
    }
    Ok(servers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ArrivalEvent, DropEvent, RedirectEvent};
    use originsim_engine::Scheduler;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingSink {
        requests: Mutex<Vec<RequestEvent>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl EventSink for RecordingSink {
        fn add_arrival(&self, _ev: ArrivalEvent) {}
        fn add_request(&self, ev: RequestEvent) {
            self.requests.lock().push(ev);
        }
        fn add_drop(&self, _ev: DropEvent) {}
        fn add_redirect(&self, _ev: RedirectEvent) {}
        fn add_snapshot(&self, _ev: SnapshotEvent) {}
        fn add_pick(&self, _server_index: usize) {}
    }

    fn test_server(max_connections: u32, owd_ms: f64) -> (Arc<Server>, crossbeam_channel::Receiver<RttSample>) {
        let (tx, rx) = crossbeam_channel::bounded(16);
        let params = ServerParams {
            mbps: 8.0,
            owd_ms,
            max_connections,
        };
        // sigma 0 makes the transfer time deterministic: 3 MB over 8 Mbps = 3 s.
        let server = Server::new(1, params, 3_000_000.0, 0.0, tx).unwrap();
        (Arc::new(server), rx)
    }

    #[test]
    fn test_served_request_counts_connections() {
        let (server, _rx) = test_server(2, 0.0);
        let sim = Scheduler::new();
        let ctx = sim.context();
        let sink = Arc::new(RecordingSink::new());
        let rng = Arc::new(SimRng::new(1));
        let outcome = Rc::new(RefCell::new(None));

        let (s, sk, rg, out) = (
            Arc::clone(&server),
            Arc::clone(&sink),
            Arc::clone(&rng),
            Rc::clone(&outcome),
        );
        sim.spawn(async move {
            let o = s.handle_request(&ctx, 0.0, 0.0, 7, sk.as_ref(), &rg).await;
            *out.borrow_mut() = Some(o);
        });
        sim.run_until(100.0);

        match *outcome.borrow() {
            Some(RequestOutcome::Served { duration }) => {
                assert!((duration - 3.0).abs() < 1e-9, "duration {duration}")
            }
            ref other => panic!("expected Served, got {other:?}"),
        }
        assert_eq!(server.connections(), 0);
        let requests = sink.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].server_id, 1);
        assert_eq!(requests[0].session_id, 7);
        assert!((requests[0].duration - 3.0).abs() < 1e-9);
        assert!((requests[0].end_s - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_at_connection_limit() {
        let (server, _rx) = test_server(1, 0.0);
        let sim = Scheduler::new();
        let sink = Arc::new(RecordingSink::new());
        let rng = Arc::new(SimRng::new(1));
        let outcomes = Rc::new(RefCell::new(Vec::new()));

        for session in 0..3u64 {
            let ctx = sim.context();
            let (s, sk, rg, out) = (
                Arc::clone(&server),
                Arc::clone(&sink),
                Arc::clone(&rng),
                Rc::clone(&outcomes),
            );
            sim.spawn(async move {
                let o = s.handle_request(&ctx, 0.0, 0.0, session, sk.as_ref(), &rg).await;
                out.borrow_mut().push(o);
            });
        }
        sim.run_until(100.0);

        let outcomes = outcomes.borrow();
        let served = outcomes
            .iter()
            .filter(|o| matches!(o, RequestOutcome::Served { .. }))
            .count();
        assert_eq!(served, 1);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(server.connections(), 0);
    }

    #[test]
    fn test_duration_includes_round_trip_delay() {
        let (server, _rx) = test_server(4, 250.0);
        let sim = Scheduler::new();
        let ctx = sim.context();
        let sink = Arc::new(RecordingSink::new());
        let rng = Arc::new(SimRng::new(1));

        let (s, sk, rg) = (Arc::clone(&server), Arc::clone(&sink), Arc::clone(&rng));
        sim.spawn(async move {
            s.handle_request(&ctx, 0.0, 0.0, 1, sk.as_ref(), &rg).await;
        });
        sim.run_until(100.0);

        let requests = sink.requests.lock();
        // 3 s transfer + 2 * 250 ms of one-way delay
        assert!((requests[0].duration - 3.5).abs() < 1e-9);
        assert!(requests[0].duration >= 2.0 * 250.0 / 1000.0);
    }

    #[test]
    fn test_penalty_added_to_duration() {
        let (server, _rx) = test_server(4, 0.0);
        let sim = Scheduler::new();
        let ctx = sim.context();
        let sink = Arc::new(RecordingSink::new());
        let rng = Arc::new(SimRng::new(1));

        let (s, sk, rg) = (Arc::clone(&server), Arc::clone(&sink), Arc::clone(&rng));
        sim.spawn(async move {
            s.handle_request(&ctx, 0.0, 100.0, 1, sk.as_ref(), &rg).await;
        });
        sim.run_until(100.0);

        assert!((sink.requests.lock()[0].duration - 3.1).abs() < 1e-9);
    }

    #[test]
    fn test_rtt_sample_published() {
        let (server, rx) = test_server(4, 0.0);
        let sim = Scheduler::new();
        let ctx = sim.context();
        let sink = Arc::new(RecordingSink::new());
        let rng = Arc::new(SimRng::new(1));

        let (s, sk, rg) = (Arc::clone(&server), Arc::clone(&sink), Arc::clone(&rng));
        sim.spawn(async move {
            s.handle_request(&ctx, 5.0, 0.0, 1, sk.as_ref(), &rg).await;
        });
        sim.run_until(100.0);

        let sample = rx.try_recv().unwrap();
        assert_eq!(sample.server_id, 1);
        assert!((sample.rtt - 3.0).abs() < 1e-9);
        assert_eq!(sample.when, 5.0);
    }

    #[test]
    fn test_rtt_overflow_dropped_silently() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let params = ServerParams {
            mbps: 8.0,
            owd_ms: 0.0,
            max_connections: 8,
        };
        let server = Arc::new(Server::new(1, params, 3_000_000.0, 0.0, tx).unwrap());
        let sim = Scheduler::new();
        let sink = Arc::new(RecordingSink::new());
        let rng = Arc::new(SimRng::new(1));

        for session in 0..4u64 {
            let ctx = sim.context();
            let (s, sk, rg) = (Arc::clone(&server), Arc::clone(&sink), Arc::clone(&rng));
            sim.spawn(async move {
                s.handle_request(&ctx, 0.0, 0.0, session, sk.as_ref(), &rg).await;
            });
        }
        sim.run_until(100.0);

        // All four served, but the feedback buffer kept only one sample.
        assert_eq!(sink.requests.lock().len(), 4);
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_is_overloaded() {
        let (server, _rx) = test_server(2, 0.0);
        assert!(!server.is_overloaded());
        server.lock().connections = 2;
        assert!(server.is_overloaded());
    }

    #[test]
    fn test_init_servers_shape() {
        let cfg = Config::from_str(
            "cluster:\n  servers: 10\n  bitrate: 4\n  cap_mean_mbps: 500\n",
        )
        .unwrap();
        let rng = SimRng::new(42);
        let (tx, _rx) = crossbeam_channel::bounded(16);
        let servers = init_servers(&cfg, &rng, &tx).unwrap();

        assert_eq!(servers.len(), 10);
        for (i, server) in servers.iter().enumerate() {
            assert_eq!(server.id, i as u32 + 1);
            assert!(server.params.mbps > 0.0);
            assert!(server.params.owd_ms > 0.0);
            assert_eq!(
                server.params.max_connections,
                (server.params.mbps / 4.0).floor() as u32,
            );
        }
    }

    #[test]
    fn test_init_servers_deterministic() {
        let cfg = Config::from_str("cluster:\n  servers: 5\n").unwrap();
        let (tx, _rx) = crossbeam_channel::bounded(16);
        let a = init_servers(&cfg, &SimRng::new(42), &tx).unwrap();
        let b = init_servers(&cfg, &SimRng::new(42), &tx).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.params.mbps, y.params.mbps);
            assert_eq!(x.params.owd_ms, y.params.owd_ms);
        }
    }
}
