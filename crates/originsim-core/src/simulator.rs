//! Wires the cooperative processes together and runs them to the horizon.

use crate::{jitter, sessions, snapshots, spikes};
use originsim_balancers::Balancer;
use originsim_engine::Scheduler;
use originsim_model::distrib::{self, DistribError};
use originsim_model::{Config, EventSink, Server, SimRng};
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared scalar arrival rate. The session generator reads it on every
/// arrival decision; only the spike driver writes.
pub struct RateController {
    base: f64,
    current: RwLock<f64>,
}

impl RateController {
    pub fn new(base: f64) -> Self {
        Self {
            base,
            current: RwLock::new(base),
        }
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn get(&self) -> f64 {
        *self.current.read()
    }

    pub fn set(&self, rate: f64) {
        *self.current.write() = rate;
    }
}

/// Run one simulation to `cfg.simulation.time_seconds`.
///
/// Spawns the snapshot collector, the spike driver, the session generator
/// and one jitter driver per server, then drives the scheduler. Events land
/// in `sink`; in-flight sessions at the horizon are abandoned.
pub fn run(
    cfg: Arc<Config>,
    servers: Vec<Arc<Server>>,
    balancer: Arc<dyn Balancer>,
    rng: Arc<SimRng>,
    sink: Arc<dyn EventSink>,
) -> Result<(), DistribError> {
    let owd_dist = distrib::gamma_mean_cv(cfg.cluster.owd_mean, cfg.cluster.owd_cv)?;
    let horizon = cfg.simulation.time_seconds;
    let sim = Scheduler::new();
    let rate = Arc::new(RateController::new(cfg.traffic.base_rps));

    sim.spawn(snapshots::collect_snapshots(
        sim.context(),
        Arc::clone(&cfg),
        servers.clone(),
        Arc::clone(&sink),
    ));
    sim.spawn(spikes::drive_spikes(
        sim.context(),
        Arc::clone(&cfg),
        Arc::clone(&rate),
    ));
    sim.spawn(sessions::generate_sessions(
        sim.context(),
        Arc::clone(&cfg),
        Arc::clone(&rate),
        balancer,
        Arc::clone(&sink),
        Arc::clone(&rng),
    ));
    for server in &servers {
        sim.spawn(jitter::drive_jitter(
            sim.context(),
            Arc::clone(&cfg),
            Arc::clone(server),
            owd_dist,
            Arc::clone(&rng),
        ));
    }

    tracing::info!(
        horizon,
        servers = servers.len(),
        strategy = %cfg.balancer.strategy,
        "running simulation",
    );
    sim.run_until(horizon);
    tracing::info!("simulation reached horizon");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_controller_read_write() {
        let rate = RateController::new(200.0);
        assert_eq!(rate.get(), 200.0);
        assert_eq!(rate.base(), 200.0);
        rate.set(1000.0);
        assert_eq!(rate.get(), 1000.0);
        rate.set(200.0);
        assert_eq!(rate.get(), 200.0);
    }
}
