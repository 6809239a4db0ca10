//! Traffic spike driver.

use crate::simulator::RateController;
use originsim_engine::SimContext;
use originsim_model::Config;
use std::sync::Arc;

/// Walk the ordered spike schedule: wait for each spike's start, raise the
/// rate by its factor, hold for its duration, restore the base rate.
pub async fn drive_spikes(ctx: SimContext, cfg: Arc<Config>, rate: Arc<RateController>) {
    for spike in &cfg.spikes {
        let wait = spike.at - ctx.now();
        if wait > 0.0 {
            ctx.wait(wait).await;
        }
        rate.set(rate.base() * spike.factor);
        tracing::debug!(at = spike.at, factor = spike.factor, "spike started");
        ctx.wait(spike.duration).await;
        rate.set(rate.base());
        tracing::debug!(at = spike.at, "spike ended");
    }
}
