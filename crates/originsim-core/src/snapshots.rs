//! Periodic server state sampling.

use originsim_engine::SimContext;
use originsim_model::{Config, EventSink, Server};
use std::sync::Arc;

/// Every simulation step, capture each server's connections and OWD under
/// its lock and publish them as snapshot events. Stops at the horizon.
pub async fn collect_snapshots(
    ctx: SimContext,
    cfg: Arc<Config>,
    servers: Vec<Arc<Server>>,
    sink: Arc<dyn EventSink>,
) {
    let step = cfg.simulation.step_seconds;
    let mut t = 0.0;
    while t < cfg.simulation.time_seconds {
        ctx.wait(step).await;
        let now = ctx.now();
        for server in &servers {
            sink.add_snapshot(server.snapshot(now));
        }
        t += step;
    }
}
