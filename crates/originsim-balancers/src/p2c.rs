//! Power-of-two-choices strategy.
//!
//! Samples two distinct servers uniformly and takes the less connected one.
//! Classic result: close to least-connections quality at O(1) cost.

use crate::traits::Balancer;
use originsim_model::{Server, SimRng};
use std::sync::Arc;

pub struct PowerOfTwoChoices {
    servers: Vec<Arc<Server>>,
    rng: Arc<SimRng>,
}

impl PowerOfTwoChoices {
    pub fn new(servers: Vec<Arc<Server>>, rng: Arc<SimRng>) -> Self {
        Self { servers, rng }
    }
}

impl Balancer for PowerOfTwoChoices {
    fn pick(&self, _session_id: u64) -> Option<Arc<Server>> {
        let n = self.servers.len();
        match n {
            0 => return None,
            1 => return Some(Arc::clone(&self.servers[0])),
            _ => {}
        }

        let i1 = self.rng.index(n);
        let mut i2 = self.rng.index(n - 1);
        if i2 >= i1 {
            i2 += 1;
        }
        let (s1, s2) = (&self.servers[i1], &self.servers[i2]);
        if s1.connections() <= s2.connections() {
            Some(Arc::clone(s1))
        } else {
            Some(Arc::clone(s2))
        }
    }

    fn servers(&self) -> &[Arc<Server>] {
        &self.servers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::make_servers;

    #[test]
    fn test_picks_less_connected_of_pair() {
        let servers = make_servers(2, 10);
        servers[0].lock().connections = 9;
        let p2c = PowerOfTwoChoices::new(servers, Arc::new(SimRng::new(42)));
        // With two servers both are always sampled.
        for session in 0..100 {
            assert_eq!(p2c.pick(session).unwrap().id, 2);
        }
    }

    #[test]
    fn test_balance_over_million_picks() {
        // Empty cluster load: picks must stay within 3% of uniform.
        let n = 10;
        let servers = make_servers(n, 1000);
        let p2c = PowerOfTwoChoices::new(servers, Arc::new(SimRng::new(42)));

        const ITER: u64 = 1_000_000;
        let mut counts = vec![0u64; n as usize];
        for session in 0..ITER {
            counts[p2c.pick(session).unwrap().id as usize - 1] += 1;
        }
        let mean = ITER as f64 / n as f64;
        let max_dev = counts
            .iter()
            .map(|&c| (c as f64 - mean).abs() / mean)
            .fold(0.0, f64::max);
        assert!(max_dev <= 0.03, "imbalance {:.1}%", max_dev * 100.0);
    }

    #[test]
    fn test_single_server_cluster() {
        let p2c = PowerOfTwoChoices::new(make_servers(1, 10), Arc::new(SimRng::new(1)));
        assert_eq!(p2c.pick(0).unwrap().id, 1);
    }

    #[test]
    fn test_empty_cluster_declines() {
        let p2c = PowerOfTwoChoices::new(Vec::new(), Arc::new(SimRng::new(1)));
        assert!(p2c.pick(0).is_none());
    }
}
