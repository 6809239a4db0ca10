//! Statistics sinks.
//!
//! [`StatsSink`] is the canonical pipeline: five bounded channels fan
//! events from the simulation into a single writer thread, which is the
//! only true concurrency in a run. Publishing blocks when a buffer is full,
//! so simulation progress back-pressures on the sink rather than losing
//! records. [`MemorySink`] keeps everything in vectors for tests and
//! programmatic runs.

use crate::export::{self, CsvBank, EventChannels, ExportError};
use crossbeam_channel::{bounded, Sender};
use originsim_model::{
    ArrivalEvent, DropEvent, EventSink, RedirectEvent, RequestEvent, SnapshotEvent,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Capacity of each event stream. Generous enough that the writer keeps up
/// under normal load; a full buffer stalls the producer instead of dropping.
pub const STREAM_CAPACITY: usize = 1 << 14;

/// In-memory event buffers guarded by mutexes.
#[derive(Default)]
pub struct MemorySink {
    pub arrivals: Mutex<Vec<ArrivalEvent>>,
    pub requests: Mutex<Vec<RequestEvent>>,
    pub drops: Mutex<Vec<DropEvent>>,
    pub redirects: Mutex<Vec<RedirectEvent>>,
    pub snapshots: Mutex<Vec<SnapshotEvent>>,
    picks: Vec<AtomicU64>,
}

impl MemorySink {
    pub fn new(server_count: usize) -> Self {
        Self {
            picks: (0..server_count).map(|_| AtomicU64::new(0)).collect(),
            ..Default::default()
        }
    }

    pub fn pick_counts(&self) -> Vec<u64> {
        self.picks.iter().map(|p| p.load(Ordering::Relaxed)).collect()
    }
}

impl EventSink for MemorySink {
    fn add_arrival(&self, ev: ArrivalEvent) {
        self.arrivals.lock().push(ev);
    }

    fn add_request(&self, ev: RequestEvent) {
        self.requests.lock().push(ev);
    }

    fn add_drop(&self, ev: DropEvent) {
        self.drops.lock().push(ev);
    }

    fn add_redirect(&self, ev: RedirectEvent) {
        self.redirects.lock().push(ev);
    }

    fn add_snapshot(&self, ev: SnapshotEvent) {
        self.snapshots.lock().push(ev);
    }

    fn add_pick(&self, server_index: usize) {
        if let Some(p) = self.picks.get(server_index) {
            p.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Concurrent statistics pipeline backed by the CSV writer thread.
pub struct StatsSink {
    arrivals: Sender<ArrivalEvent>,
    requests: Sender<RequestEvent>,
    drops: Sender<DropEvent>,
    redirects: Sender<RedirectEvent>,
    snapshots: Sender<SnapshotEvent>,
    done: Sender<()>,
    picks: Arc<Vec<AtomicU64>>,
    writer: Mutex<Option<JoinHandle<Result<(), ExportError>>>>,
}

impl StatsSink {
    /// Create the CSV bank under `out_dir` and start the writer thread.
    /// File creation happens here, so an unusable output directory fails
    /// before the simulation starts.
    pub fn new(server_count: usize, out_dir: &Path) -> Result<Self, ExportError> {
        let bank = CsvBank::create(out_dir)?;

        let (arrivals_tx, arrivals_rx) = bounded(STREAM_CAPACITY);
        let (requests_tx, requests_rx) = bounded(STREAM_CAPACITY);
        let (drops_tx, drops_rx) = bounded(STREAM_CAPACITY);
        let (redirects_tx, redirects_rx) = bounded(STREAM_CAPACITY);
        let (snapshots_tx, snapshots_rx) = bounded(STREAM_CAPACITY);
        let (done_tx, done_rx) = bounded(1);

        let picks: Arc<Vec<AtomicU64>> =
            Arc::new((0..server_count).map(|_| AtomicU64::new(0)).collect());

        let channels = EventChannels {
            arrivals: arrivals_rx,
            requests: requests_rx,
            drops: drops_rx,
            redirects: redirects_rx,
            snapshots: snapshots_rx,
            done: done_rx,
        };
        let writer_picks = Arc::clone(&picks);
        let writer_dir = out_dir.to_path_buf();
        let writer = std::thread::Builder::new()
            .name("stats-writer".to_string())
            .spawn(move || export::run_writer(bank, channels, writer_picks, writer_dir))?;

        Ok(Self {
            arrivals: arrivals_tx,
            requests: requests_tx,
            drops: drops_tx,
            redirects: redirects_tx,
            snapshots: snapshots_tx,
            done: done_tx,
            picks,
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Per-server pick counts observed so far.
    pub fn pick_counts(&self) -> Vec<u64> {
        self.picks.iter().map(|p| p.load(Ordering::Relaxed)).collect()
    }

    /// Signal completion and wait for the writer to drain every stream and
    /// write the summary files. Producers must not publish afterwards.
    pub fn close(&self) -> Result<(), ExportError> {
        let _ = self.done.send(());
        let handle = self.writer.lock().take();
        match handle {
            Some(handle) => handle.join().map_err(|_| ExportError::WriterPanicked)?,
            None => Ok(()),
        }
    }
}

impl EventSink for StatsSink {
    fn add_arrival(&self, ev: ArrivalEvent) {
        let _ = self.arrivals.send(ev);
    }

    fn add_request(&self, ev: RequestEvent) {
        let _ = self.requests.send(ev);
    }

    fn add_drop(&self, ev: DropEvent) {
        let _ = self.drops.send(ev);
    }

    fn add_redirect(&self, ev: RedirectEvent) {
        let _ = self.redirects.send(ev);
    }

    fn add_snapshot(&self, ev: SnapshotEvent) {
        let _ = self.snapshots.send(ev);
    }

    fn add_pick(&self, server_index: usize) {
        if let Some(p) = self.picks.get(server_index) {
            p.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use originsim_model::DropReason;
    use tempfile::tempdir;

    fn read(dir: &Path, name: &str) -> String {
        std::fs::read_to_string(dir.join(name)).unwrap()
    }

    #[test]
    fn test_memory_sink_records_everything() {
        let sink = MemorySink::new(3);
        sink.add_arrival(ArrivalEvent { t: 1.0, session_id: 5 });
        sink.add_pick(2);
        sink.add_pick(2);
        sink.add_drop(DropEvent {
            server_id: 0,
            session_id: 5,
            t: 1.0,
            reason: DropReason::NoServer,
        });
        assert_eq!(sink.arrivals.lock().len(), 1);
        assert_eq!(sink.drops.lock().len(), 1);
        assert_eq!(sink.pick_counts(), vec![0, 0, 2]);
    }

    #[test]
    fn test_sink_writes_all_streams() {
        let dir = tempdir().unwrap();
        let sink = StatsSink::new(2, dir.path()).unwrap();

        sink.add_arrival(ArrivalEvent { t: 0.5, session_id: 11 });
        sink.add_request(RequestEvent {
            server_id: 1,
            session_id: 11,
            start_s: 0.5,
            end_s: 1.25,
            duration: 0.75,
        });
        sink.add_redirect(RedirectEvent {
            session_id: 11,
            from_id: 1,
            to_id: 2,
            t: 1.25,
        });
        sink.add_drop(DropEvent {
            server_id: 2,
            session_id: 11,
            t: 2.0,
            reason: DropReason::MaxSwitches,
        });
        sink.add_snapshot(SnapshotEvent {
            t: 1.0,
            server_id: 2,
            connections: 3,
            owd_ms: 99.5,
        });
        sink.add_pick(0);
        sink.close().unwrap();

        assert_eq!(
            read(dir.path(), "arrivals.csv"),
            "time_s,session_id\n0.50000,11\n"
        );
        assert_eq!(
            read(dir.path(), "requests.csv"),
            "server_id,session_id,start_s,end_s,duration\n1,11,0.50000,1.25000,0.75000\n"
        );
        assert_eq!(
            read(dir.path(), "redirects.csv"),
            "session_id,from_id,to_id,time_s\n11,1,2,1.25000\n"
        );
        assert_eq!(
            read(dir.path(), "drops.csv"),
            "server_id,session_id,time_s,reason\n2,11,2.00000,max_switches\n"
        );
        assert_eq!(
            read(dir.path(), "snapshots.csv"),
            "time_s,server_id,connections,owd_ms\n1.00000,2,3,99.50000\n"
        );
    }

    #[test]
    fn test_summary_counts() {
        let dir = tempdir().unwrap();
        let sink = StatsSink::new(2, dir.path()).unwrap();

        for _ in 0..3 {
            sink.add_pick(0);
            sink.add_request(RequestEvent {
                server_id: 1,
                session_id: 1,
                start_s: 0.0,
                end_s: 1.0,
                duration: 1.0,
            });
        }
        sink.add_pick(1);
        sink.add_drop(DropEvent {
            server_id: 2,
            session_id: 4,
            t: 1.0,
            reason: DropReason::MaxSwitches,
        });
        sink.add_drop(DropEvent {
            server_id: 0,
            session_id: 9,
            t: 2.0,
            reason: DropReason::NoServer,
        });
        sink.add_drop(DropEvent {
            server_id: 0,
            session_id: 10,
            t: 3.0,
            reason: DropReason::NoServer,
        });
        sink.close().unwrap();

        assert_eq!(
            read(dir.path(), "summary.csv"),
            "id,picked,served,dropped\n1,3,3,0\n2,1,0,1\n"
        );
        assert_eq!(
            read(dir.path(), "summary_drops_no_server.csv"),
            "dropped_no_server\n2\n"
        );
    }

    #[test]
    fn test_close_drains_residual_events() {
        let dir = tempdir().unwrap();
        let sink = StatsSink::new(1, dir.path()).unwrap();
        // Burst-publish then close immediately; nothing may be lost.
        for i in 0..5000u64 {
            sink.add_arrival(ArrivalEvent {
                t: i as f64,
                session_id: i,
            });
        }
        sink.close().unwrap();
        let lines = read(dir.path(), "arrivals.csv").lines().count();
        assert_eq!(lines, 5001);
    }

    #[test]
    fn test_double_close_is_harmless() {
        let dir = tempdir().unwrap();
        let sink = StatsSink::new(1, dir.path()).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
    }
}
