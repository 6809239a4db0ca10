//! The balancing strategy contract.

use originsim_model::Server;
use std::sync::Arc;

/// A server-selection strategy.
///
/// `pick` returning `None` means the strategy declines the session — a
/// control-flow outcome, not an error. Callers may fall back to another
/// strategy (see [`crate::Chain`]) or record a no-server drop.
pub trait Balancer: Send + Sync {
    /// Select a server for the given session, or decline.
    fn pick(&self, session_id: u64) -> Option<Arc<Server>>;

    /// The stable server vector this strategy selects from.
    fn servers(&self) -> &[Arc<Server>];
}
