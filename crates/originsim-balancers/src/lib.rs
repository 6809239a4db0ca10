//! Load-balancing strategies for originsim.
//!
//! Each strategy implements [`Balancer`]; declining (`None`) is a normal
//! outcome, and the [`Chain`] combinator turns a `"a+b+c"` strategy string
//! into ordered fallback:
//!
//! | Strategy | Name | Declines when |
//! |----------|------|---------------|
//! | [`RoundRobin`] | `rr` | never |
//! | [`Random`] | `random` | never |
//! | [`WeightedLeastConnections`] | `wlc` | best candidate is full |
//! | [`PowerOfTwoChoices`] | `p2c` | never |
//! | [`ConsistentHash`] | `ch` | ring target is full |
//! | [`PeakEwma`] | `peak_ewma` | never |

pub mod ch;
pub mod p2c;
pub mod peak_ewma;
pub mod random;
pub mod round_robin;
pub mod traits;
pub mod wlc;

pub use ch::ConsistentHash;
pub use p2c::PowerOfTwoChoices;
pub use peak_ewma::PeakEwma;
pub use random::Random;
pub use round_robin::RoundRobin;
pub use traits::Balancer;
pub use wlc::WeightedLeastConnections;

use crossbeam_channel::Receiver;
use originsim_model::{Config, RttSample, Server, SimRng};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BalancerError {
    #[error("unsupported balancer strategy: {0:?}")]
    UnknownStrategy(String),
    #[error("balancer strategy string is empty")]
    EmptyStrategy,
}

/// Ordered fallback over two strategies: if `head` declines, ask `next`.
pub struct Chain {
    head: Box<dyn Balancer>,
    next: Box<dyn Balancer>,
}

impl Chain {
    pub fn new(head: Box<dyn Balancer>, next: Box<dyn Balancer>) -> Self {
        Self { head, next }
    }
}

impl Balancer for Chain {
    fn pick(&self, session_id: u64) -> Option<Arc<Server>> {
        self.head
            .pick(session_id)
            .or_else(|| self.next.pick(session_id))
    }

    fn servers(&self) -> &[Arc<Server>] {
        self.head.servers()
    }
}

/// All registered strategy names.
pub fn available_strategies() -> Vec<&'static str> {
    vec!["rr", "random", "wlc", "p2c", "ch", "peak_ewma"]
}

fn strategy_by_name(
    name: &str,
    cfg: &Config,
    servers: &[Arc<Server>],
    rng: &Arc<SimRng>,
    rtt_rx: &Receiver<RttSample>,
) -> Result<Box<dyn Balancer>, BalancerError> {
    let servers = servers.to_vec();
    match name {
        "rr" => Ok(Box::new(RoundRobin::new(servers))),
        "random" => Ok(Box::new(Random::new(servers, Arc::clone(rng)))),
        "wlc" => Ok(Box::new(WeightedLeastConnections::new(servers))),
        "p2c" => Ok(Box::new(PowerOfTwoChoices::new(servers, Arc::clone(rng)))),
        "ch" => Ok(Box::new(ConsistentHash::new(
            servers,
            cfg.balancer.ch_replicas,
        ))),
        "peak_ewma" => Ok(Box::new(PeakEwma::new(
            servers,
            cfg.balancer.ewma_alpha,
            rtt_rx.clone(),
        ))),
        other => Err(BalancerError::UnknownStrategy(other.to_string())),
    }
}

/// Build the balancer named by `cfg.balancer.strategy`, linking `"a+b+c"`
/// components into a fallback chain that tries them left to right.
pub fn build_chain(
    cfg: &Config,
    servers: &[Arc<Server>],
    rng: &Arc<SimRng>,
    rtt_rx: &Receiver<RttSample>,
) -> Result<Box<dyn Balancer>, BalancerError> {
    let mut tail: Option<Box<dyn Balancer>> = None;
    for name in cfg.balancer.strategy.split('+').rev() {
        let name = name.trim();
        if name.is_empty() {
            return Err(BalancerError::EmptyStrategy);
        }
        let head = strategy_by_name(name, cfg, servers, rng, rtt_rx)?;
        tail = Some(match tail {
            Some(next) => Box::new(Chain::new(head, next)),
            None => head,
        });
    }
    tail.ok_or(BalancerError::EmptyStrategy)
}
