//! Uniform random strategy.
//!
//! Picks any server with equal probability, loaded or not, and never
//! declines. Useful as a chain tail: whatever it returns, the session will
//! retry or redirect from there.

use crate::traits::Balancer;
use originsim_model::{Server, SimRng};
use std::sync::Arc;

pub struct Random {
    servers: Vec<Arc<Server>>,
    rng: Arc<SimRng>,
}

impl Random {
    pub fn new(servers: Vec<Arc<Server>>, rng: Arc<SimRng>) -> Self {
        Self { servers, rng }
    }
}

impl Balancer for Random {
    fn pick(&self, _session_id: u64) -> Option<Arc<Server>> {
        if self.servers.is_empty() {
            return None;
        }
        let i = self.rng.index(self.servers.len());
        Some(Arc::clone(&self.servers[i]))
    }

    fn servers(&self) -> &[Arc<Server>] {
        &self.servers
    }
}
