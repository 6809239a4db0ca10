//! Peak-EWMA strategy.
//!
//! Keeps a per-server latency score that jumps to outliers immediately and
//! decays geometrically: `S ← α·max(S, rtt) + (1−α)·S`. Completed-request
//! samples arrive through a bounded feedback channel filled by the servers;
//! pending samples are folded in at the top of each pick, under the
//! balancer's own lock, so request handling never waits on bookkeeping.
//!
//! Picks the minimum of `S_i · (connections_i + 1)` and never declines.

use crate::traits::Balancer;
use crossbeam_channel::Receiver;
use originsim_model::{RttSample, Server};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct PeakEwma {
    servers: Vec<Arc<Server>>,
    alpha: f64,
    scores: Mutex<Vec<f64>>,
    feedback: Receiver<RttSample>,
}

impl PeakEwma {
    pub fn new(servers: Vec<Arc<Server>>, alpha: f64, feedback: Receiver<RttSample>) -> Self {
        let scores = Mutex::new(vec![0.0; servers.len()]);
        Self {
            servers,
            alpha,
            scores,
            feedback,
        }
    }

    fn apply_pending_samples(&self, scores: &mut [f64]) {
        while let Ok(sample) = self.feedback.try_recv() {
            let Some(idx) = (sample.server_id as usize).checked_sub(1) else {
                continue;
            };
            if idx >= scores.len() {
                continue;
            }
            let prev = scores[idx];
            let peak = prev.max(sample.rtt);
            scores[idx] = self.alpha * peak + (1.0 - self.alpha) * prev;
        }
    }
}

impl Balancer for PeakEwma {
    fn pick(&self, _session_id: u64) -> Option<Arc<Server>> {
        let mut scores = self.scores.lock();
        self.apply_pending_samples(&mut scores);

        let mut best: Option<(usize, f64)> = None;
        for (i, server) in self.servers.iter().enumerate() {
            let score = scores[i] * (server.connections() + 1) as f64;
            // Strict comparison keeps the lowest id on ties.
            if best.map_or(true, |(_, b)| score < b) {
                best = Some((i, score));
            }
        }
        best.map(|(i, _)| Arc::clone(&self.servers[i]))
    }

    fn servers(&self) -> &[Arc<Server>] {
        &self.servers
    }
}
