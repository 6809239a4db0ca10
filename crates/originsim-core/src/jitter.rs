//! Per-server one-way-delay jitter driver.

use originsim_engine::SimContext;
use originsim_model::{Config, Server, SimRng};
use rand_distr::Gamma;
use std::sync::Arc;

/// Every jitter tick, either extend a running delay spike, start a new one
/// with the configured probability, or resample OWD from its gamma
/// baseline. Stops once the horizon is reached.
pub async fn drive_jitter(
    ctx: SimContext,
    cfg: Arc<Config>,
    server: Arc<Server>,
    owd_dist: Gamma<f64>,
    rng: Arc<SimRng>,
) {
    let base = server.params.owd_ms;
    let horizon = cfg.simulation.time_seconds;

    while ctx.now() < horizon {
        ctx.wait(cfg.jitter.tick).await;
        let now = ctx.now();

        let mut state = server.lock();
        if now < state.spike_until {
            state.owd_ms = base + cfg.jitter.spike_extra;
            continue;
        }
        if rng.f64() < cfg.jitter.spike_prob {
            state.spike_until = now + cfg.jitter.spike_duration;
            state.owd_ms = base + cfg.jitter.spike_extra;
            continue;
        }
        state.owd_ms = rng.sample(&owd_dist);
    }
}
