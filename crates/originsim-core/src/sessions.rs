//! Session generation and the per-session life cycle.
//!
//! The generator produces Poisson arrivals at the controller's current
//! rate, picks an initial server and spawns one process per session. A
//! session walks its fragments through a retry/redirect state machine:
//! rejections on the current server burn local retries first, then a
//! switch; running out of switches, or the balancer declining entirely,
//! terminates the session with a drop record.

use crate::simulator::RateController;
use originsim_balancers::Balancer;
use originsim_engine::SimContext;
use originsim_model::distrib;
use originsim_model::{
    ArrivalEvent, Config, DropEvent, DropReason, EventSink, RedirectEvent, RequestOutcome, Server,
    SimRng,
};
use std::sync::Arc;

/// Floor on the sampled inter-arrival gap, seconds.
const MIN_INTERARRIVAL: f64 = 1e-6;

/// The arrival process. Runs until the scheduler abandons it at the
/// horizon.
pub async fn generate_sessions(
    ctx: SimContext,
    cfg: Arc<Config>,
    rate: Arc<RateController>,
    balancer: Arc<dyn Balancer>,
    sink: Arc<dyn EventSink>,
    rng: Arc<SimRng>,
) {
    loop {
        let mut gap = rng.exp() / rate.get();
        if gap < MIN_INTERARRIVAL {
            gap = MIN_INTERARRIVAL;
        }
        ctx.wait(gap).await;
        let now = ctx.now();

        let session_id = rng.uniform_1_to(cfg.traffic.users_amount);
        sink.add_arrival(ArrivalEvent { t: now, session_id });

        let Some(server) = balancer.pick(session_id) else {
            sink.add_drop(DropEvent {
                server_id: 0,
                session_id,
                t: now,
                reason: DropReason::NoServer,
            });
            continue;
        };
        sink.add_pick(server.id as usize - 1);

        ctx.spawn(run_session(
            ctx.clone(),
            Arc::clone(&cfg),
            Arc::clone(&balancer),
            server,
            session_id,
            now,
            Arc::clone(&sink),
            Arc::clone(&rng),
        ));
    }
}

/// One session: fetch every fragment, pacing by segment duration.
#[allow(clippy::too_many_arguments)]
async fn run_session(
    ctx: SimContext,
    cfg: Arc<Config>,
    balancer: Arc<dyn Balancer>,
    mut server: Arc<Server>,
    session_id: u64,
    arrival: f64,
    sink: Arc<dyn EventSink>,
    rng: Arc<SimRng>,
) {
    let fragments = distrib::random_fragments(&rng);
    let mut switches = 0u32;
    let mut penalty_ms = 0.0;

    for _ in 0..fragments {
        let mut retries = 0u32;
        loop {
            let start = ctx.now();
            let outcome = server
                .handle_request(&ctx, start, penalty_ms, session_id, sink.as_ref(), &rng)
                .await;
            // The redirect penalty is charged exactly once.
            if penalty_ms > 0.0 {
                penalty_ms = 0.0;
            }
            if matches!(outcome, RequestOutcome::Served { .. }) {
                break;
            }

            retries += 1;
            if retries <= cfg.cluster.max_retries {
                continue;
            }

            if switches >= cfg.cluster.max_switches {
                sink.add_drop(DropEvent {
                    server_id: server.id,
                    session_id,
                    t: start,
                    reason: DropReason::MaxSwitches,
                });
                return;
            }

            let Some(next) = balancer.pick(session_id) else {
                sink.add_drop(DropEvent {
                    server_id: 0,
                    session_id,
                    t: arrival,
                    reason: DropReason::NoServer,
                });
                return;
            };
            sink.add_redirect(RedirectEvent {
                session_id,
                from_id: server.id,
                to_id: next.id,
                t: start,
            });
            server = next;
            switches += 1;
            penalty_ms += cfg.cluster.redirect_penalty_ms;
            retries = 0;
        }

        ctx.wait(cfg.cluster.segment_duration).await;
    }
}
