//! CSV bank and the statistics writer loop.
//!
//! Column order and float precision are contractual: analysis notebooks
//! parse these files positionally. All floats carry 5 decimals except the
//! per-server parameters in `servers.csv`, which carry 1.

use crossbeam_channel::{never, tick, Receiver};
use originsim_model::{
    ArrivalEvent, DropEvent, RedirectEvent, RequestEvent, Server, SnapshotEvent,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// How often the writer flushes its buffered files mid-run.
const FLUSH_PERIOD: Duration = Duration::from_millis(800);

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("csv output failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("statistics writer thread panicked")]
    WriterPanicked,
}

struct CsvFile {
    out: BufWriter<File>,
}

impl CsvFile {
    fn create(dir: &Path, name: &str, header: &str) -> Result<Self, ExportError> {
        let file = File::create(dir.join(name))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "{header}")?;
        Ok(Self { out })
    }
}

/// The five per-event output files, created before the simulation starts so
/// unwritable output directories fail the run immediately.
pub(crate) struct CsvBank {
    arrivals: CsvFile,
    requests: CsvFile,
    drops: CsvFile,
    redirects: CsvFile,
    snapshots: CsvFile,
}

impl CsvBank {
    pub(crate) fn create(dir: &Path) -> Result<Self, ExportError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            arrivals: CsvFile::create(dir, "arrivals.csv", "time_s,session_id")?,
            requests: CsvFile::create(
                dir,
                "requests.csv",
                "server_id,session_id,start_s,end_s,duration",
            )?,
            drops: CsvFile::create(dir, "drops.csv", "server_id,session_id,time_s,reason")?,
            redirects: CsvFile::create(dir, "redirects.csv", "session_id,from_id,to_id,time_s")?,
            snapshots: CsvFile::create(
                dir,
                "snapshots.csv",
                "time_s,server_id,connections,owd_ms",
            )?,
        })
    }
}

/// Receiving side of the statistics sink, owned by the writer thread.
pub(crate) struct EventChannels {
    pub arrivals: Receiver<ArrivalEvent>,
    pub requests: Receiver<RequestEvent>,
    pub drops: Receiver<DropEvent>,
    pub redirects: Receiver<RedirectEvent>,
    pub snapshots: Receiver<SnapshotEvent>,
    pub done: Receiver<()>,
}

struct WriterState {
    bank: CsvBank,
    served: Vec<u64>,
    dropped: Vec<u64>,
    dropped_no_server: u64,
    /// First I/O failure; the writer keeps draining so producers never
    /// block on a dead sink, and reports the error on close.
    first_error: Option<ExportError>,
}

impl WriterState {
    fn new(bank: CsvBank, server_count: usize) -> Self {
        Self {
            bank,
            served: vec![0; server_count],
            dropped: vec![0; server_count],
            dropped_no_server: 0,
            first_error: None,
        }
    }

    fn note(&mut self, result: std::io::Result<()>) {
        if self.first_error.is_none() {
            if let Err(e) = result {
                self.first_error = Some(ExportError::Io(e));
            }
        }
    }

    fn on_arrival(&mut self, ev: &ArrivalEvent) {
        let res = writeln!(self.bank.arrivals.out, "{:.5},{}", ev.t, ev.session_id);
        self.note(res);
    }

    fn on_request(&mut self, ev: &RequestEvent) {
        let res = writeln!(
            self.bank.requests.out,
            "{},{},{:.5},{:.5},{:.5}",
            ev.server_id, ev.session_id, ev.start_s, ev.end_s, ev.duration,
        );
        self.note(res);
        if let Some(count) = self.served.get_mut(ev.server_id as usize - 1) {
            *count += 1;
        }
    }

    fn on_drop(&mut self, ev: &DropEvent) {
        if ev.server_id == 0 {
            self.dropped_no_server += 1;
        } else if let Some(count) = self.dropped.get_mut(ev.server_id as usize - 1) {
            *count += 1;
        }
        let res = writeln!(
            self.bank.drops.out,
            "{},{},{:.5},{}",
            ev.server_id,
            ev.session_id,
            ev.t,
            ev.reason.as_str(),
        );
        self.note(res);
    }

    fn on_redirect(&mut self, ev: &RedirectEvent) {
        let res = writeln!(
            self.bank.redirects.out,
            "{},{},{},{:.5}",
            ev.session_id, ev.from_id, ev.to_id, ev.t,
        );
        self.note(res);
    }

    fn on_snapshot(&mut self, ev: &SnapshotEvent) {
        let res = writeln!(
            self.bank.snapshots.out,
            "{:.5},{},{},{:.5}",
            ev.t, ev.server_id, ev.connections, ev.owd_ms,
        );
        self.note(res);
    }

    fn flush_all(&mut self) {
        let results = [
            self.bank.arrivals.out.flush(),
            self.bank.requests.out.flush(),
            self.bank.drops.out.flush(),
            self.bank.redirects.out.flush(),
            self.bank.snapshots.out.flush(),
        ];
        for res in results {
            self.note(res);
        }
    }
}

/// Writer-thread entry point: drain all streams until the producer side
/// signals completion, flushing periodically; then drain the residue,
/// write the summaries and return the first error, if any.
pub(crate) fn run_writer(
    bank: CsvBank,
    mut channels: EventChannels,
    picks: Arc<Vec<AtomicU64>>,
    out_dir: PathBuf,
) -> Result<(), ExportError> {
    let mut state = WriterState::new(bank, picks.len());
    let flush = tick(FLUSH_PERIOD);

    loop {
        crossbeam_channel::select! {
            recv(channels.arrivals) -> ev => match ev {
                Ok(ev) => state.on_arrival(&ev),
                Err(_) => channels.arrivals = never(),
            },
            recv(channels.requests) -> ev => match ev {
                Ok(ev) => state.on_request(&ev),
                Err(_) => channels.requests = never(),
            },
            recv(channels.drops) -> ev => match ev {
                Ok(ev) => state.on_drop(&ev),
                Err(_) => channels.drops = never(),
            },
            recv(channels.redirects) -> ev => match ev {
                Ok(ev) => state.on_redirect(&ev),
                Err(_) => channels.redirects = never(),
            },
            recv(channels.snapshots) -> ev => match ev {
                Ok(ev) => state.on_snapshot(&ev),
                Err(_) => channels.snapshots = never(),
            },
            recv(flush) -> _ => state.flush_all(),
            recv(channels.done) -> _ => break,
        }
    }

    // Residual entries queued before the close signal.
    while let Ok(ev) = channels.arrivals.try_recv() {
        state.on_arrival(&ev);
    }
    while let Ok(ev) = channels.requests.try_recv() {
        state.on_request(&ev);
    }
    while let Ok(ev) = channels.drops.try_recv() {
        state.on_drop(&ev);
    }
    while let Ok(ev) = channels.redirects.try_recv() {
        state.on_redirect(&ev);
    }
    while let Ok(ev) = channels.snapshots.try_recv() {
        state.on_snapshot(&ev);
    }

    state.flush_all();
    let summary = write_summary(
        &out_dir,
        &picks,
        &state.served,
        &state.dropped,
        state.dropped_no_server,
    );
    tracing::debug!(
        served = state.served.iter().sum::<u64>(),
        dropped_no_server = state.dropped_no_server,
        "statistics writer finished",
    );

    match state.first_error {
        Some(err) => Err(err),
        None => summary,
    }
}

/// Per-server totals plus the count of drops no server was found for.
fn write_summary(
    dir: &Path,
    picks: &[AtomicU64],
    served: &[u64],
    dropped: &[u64],
    dropped_no_server: u64,
) -> Result<(), ExportError> {
    let mut out = BufWriter::new(File::create(dir.join("summary.csv"))?);
    writeln!(out, "id,picked,served,dropped")?;
    for i in 0..served.len() {
        writeln!(
            out,
            "{},{},{},{}",
            i + 1,
            picks[i].load(Ordering::Relaxed),
            served[i],
            dropped[i],
        )?;
    }
    out.flush()?;

    let mut out = BufWriter::new(File::create(dir.join("summary_drops_no_server.csv"))?);
    writeln!(out, "dropped_no_server")?;
    writeln!(out, "{dropped_no_server}")?;
    out.flush()?;
    Ok(())
}

/// One row per server with its drawn parameters; written before the run.
pub fn write_servers_csv(servers: &[Arc<Server>], dir: &Path) -> Result<(), ExportError> {
    std::fs::create_dir_all(dir)?;
    let mut out = BufWriter::new(File::create(dir.join("servers.csv"))?);
    writeln!(out, "id,mbps,owd_ms,max_conn")?;
    for server in servers {
        writeln!(
            out,
            "{},{:.1},{:.1},{}",
            server.id, server.params.mbps, server.params.owd_ms, server.params.max_connections,
        )?;
    }
    out.flush()?;
    Ok(())
}
