//! Event records and the sink interface they flow through.
//!
//! Records are plain values with no back-references into the simulation;
//! whatever consumes them (CSV bank, in-memory buffers, test doubles) only
//! needs the [`EventSink`] trait.

/// A session arrival.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrivalEvent {
    pub t: f64,
    pub session_id: u64,
}

/// One served request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestEvent {
    pub server_id: u32,
    pub session_id: u64,
    pub start_s: f64,
    pub end_s: f64,
    pub duration: f64,
}

/// Why a session was terminally dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Every balancer in the chain declined.
    NoServer,
    /// The per-session switch budget ran out.
    MaxSwitches,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::NoServer => "no_server",
            DropReason::MaxSwitches => "max_switches",
        }
    }
}

/// A terminal session drop. `server_id` 0 means no server was involved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropEvent {
    pub server_id: u32,
    pub session_id: u64,
    pub t: f64,
    pub reason: DropReason,
}

/// A mid-session server change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RedirectEvent {
    pub session_id: u64,
    pub from_id: u32,
    pub to_id: u32,
    pub t: f64,
}

/// Periodic sample of one server's live state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotEvent {
    pub t: f64,
    pub server_id: u32,
    pub connections: u32,
    pub owd_ms: f64,
}

/// Completed-request latency sample for Peak-EWMA feedback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttSample {
    pub server_id: u32,
    pub rtt: f64,
    pub when: f64,
}

/// Bound on the latency feedback stream. Publishing never blocks: a sample
/// that does not fit is dropped.
pub const FEEDBACK_CAPACITY: usize = 1 << 14;

/// Where simulation components report their events.
///
/// `add_pick` counts balancer decisions per server index; it carries no
/// record of its own.
pub trait EventSink: Send + Sync {
    fn add_arrival(&self, ev: ArrivalEvent);
    fn add_request(&self, ev: RequestEvent);
    fn add_drop(&self, ev: DropEvent);
    fn add_redirect(&self, ev: RedirectEvent);
    fn add_snapshot(&self, ev: SnapshotEvent);
    fn add_pick(&self, server_index: usize);
}
