//! Domain model for originsim: configuration, seeded randomness, the
//! stochastic service model and per-origin server state, plus the event
//! records every component reports through.

pub mod config;
pub mod distrib;
pub mod events;
pub mod rng;
pub mod server;

pub use config::{Config, ConfigError};
pub use events::{
    ArrivalEvent, DropEvent, DropReason, EventSink, RedirectEvent, RequestEvent, RttSample,
    SnapshotEvent,
};
pub use rng::SimRng;
pub use server::{RequestOutcome, Server, ServerParams};
