//! Weighted least-connections strategy.
//!
//! Scores each server by `connections / mbps` and takes the minimum, so a
//! beefier server absorbs proportionally more streams. Declines when even
//! the best candidate is at its connection limit.

use crate::traits::Balancer;
use originsim_model::Server;
use std::sync::Arc;

pub struct WeightedLeastConnections {
    servers: Vec<Arc<Server>>,
}

impl WeightedLeastConnections {
    pub fn new(servers: Vec<Arc<Server>>) -> Self {
        Self { servers }
    }
}

impl Balancer for WeightedLeastConnections {
    fn pick(&self, _session_id: u64) -> Option<Arc<Server>> {
        let mut best: Option<(&Arc<Server>, f64)> = None;
        for server in &self.servers {
            let load = server.connections() as f64 / server.params.mbps;
            // Strict comparison keeps the lowest id on ties.
            if best.map_or(true, |(_, b)| load < b) {
                best = Some((server, load));
            }
        }
        let (server, _) = best?;
        if server.is_overloaded() {
            return None;
        }
        Some(Arc::clone(server))
    }

    fn servers(&self) -> &[Arc<Server>] {
        &self.servers
    }
}
