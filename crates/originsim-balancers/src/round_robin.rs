//! Round-robin strategy.
//!
//! Rotates through the cluster with an atomic cursor. Ignores server load
//! entirely and never declines.

use crate::traits::Balancer;
use originsim_model::Server;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct RoundRobin {
    servers: Vec<Arc<Server>>,
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new(servers: Vec<Arc<Server>>) -> Self {
        Self {
            servers,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Balancer for RoundRobin {
    fn pick(&self, _session_id: u64) -> Option<Arc<Server>> {
        if self.servers.is_empty() {
            return None;
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.servers.len();
        Some(Arc::clone(&self.servers[i]))
    }

    fn servers(&self) -> &[Arc<Server>] {
        &self.servers
    }
}
