//! originsim — discrete-event simulation of load balancing across
//! video-streaming origin servers.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐   rate    ┌───────────────┐   pick    ┌───────────┐
//! │   Spike   │──────────▶│    Session    │──────────▶│ Balancer  │
//! │  driver   │           │   generator   │           │   chain   │
//! └───────────┘           └───────┬───────┘           └─────┬─────┘
//!                                 │ spawn                   │
//!                         ┌───────▼───────┐          ┌──────▼──────┐
//!   jitter drivers ──────▶│   Sessions    │─────────▶│   Servers   │
//!   snapshot collector    └───────┬───────┘  serve   └──────┬──────┘
//!                                 │ events                  │ RTT
//!                         ┌───────▼──────────────────────┐  │
//!                         │   Statistics sink (bounded   │◀─┘
//!                         │   channels → writer thread)  │
//!                         └──────────────────────────────┘
//! ```
//!
//! Everything above the sink runs cooperatively on one scheduler thread;
//! the CSV writer is the only other thread in a run.

pub mod export;
pub mod jitter;
pub mod sessions;
pub mod simulator;
pub mod snapshots;
pub mod spikes;
pub mod stats;

pub use export::{write_servers_csv, ExportError};
pub use simulator::{run, RateController};
pub use stats::{MemorySink, StatsSink};
