//! The event loop: a min-heap of wake-ups and a mini-executor over
//! suspended processes.

use std::cell::RefCell;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

type ProcessFuture = Pin<Box<dyn Future<Output = ()>>>;

/// A scheduled wake-up for one process.
#[derive(Debug, Clone, Copy)]
struct Wakeup {
    time: f64,
    sequence: u64,
    task: u64,
}

impl PartialEq for Wakeup {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.sequence == other.sequence
    }
}

impl Eq for Wakeup {}

impl PartialOrd for Wakeup {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Wakeup {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; we want min-heap. Wake-ups at the same
        // virtual time drain in spawn/registration (sequence) order.
        other
            .time
            .total_cmp(&self.time)
            .then(other.sequence.cmp(&self.sequence))
    }
}

struct Inner {
    /// Current virtual time in seconds.
    now: f64,
    /// Monotonic tie-breaker for wake-ups at equal times.
    sequence: u64,
    /// Next process id.
    next_task: u64,
    /// Process currently being polled.
    current: Option<u64>,
    queue: BinaryHeap<Wakeup>,
    tasks: HashMap<u64, ProcessFuture>,
}

impl Inner {
    fn next_sequence(&mut self) -> u64 {
        let s = self.sequence;
        self.sequence += 1;
        s
    }
}

/// The simulation event loop.
///
/// Processes are spawned through a [`SimContext`] and advance only when the
/// scheduler pops their next wake-up. [`run_until`](Scheduler::run_until)
/// drives the loop up to a horizon; whatever is still suspended afterwards
/// is dropped.
pub struct Scheduler {
    inner: Rc<RefCell<Inner>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                now: 0.0,
                sequence: 0,
                next_task: 0,
                current: None,
                queue: BinaryHeap::new(),
                tasks: HashMap::new(),
            })),
        }
    }

    /// Handle for spawning processes and suspending inside them.
    pub fn context(&self) -> SimContext {
        SimContext {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Current virtual time in seconds.
    pub fn now(&self) -> f64 {
        self.inner.borrow().now
    }

    /// Spawn a root process at the current virtual time.
    pub fn spawn(&self, process: impl Future<Output = ()> + 'static) {
        self.context().spawn(process);
    }

    /// Number of processes that have not yet run to completion.
    pub fn pending_processes(&self) -> usize {
        self.inner.borrow().tasks.len()
    }

    /// Advance the virtual clock wake-up by wake-up until the queue drains
    /// or the next wake-up lies beyond `horizon`. The clock ends at
    /// `horizon` and all still-suspended processes are abandoned.
    pub fn run_until(&self, horizon: f64) {
        loop {
            let wake = {
                let mut inner = self.inner.borrow_mut();
                let due = inner.queue.peek().map_or(false, |w| w.time <= horizon);
                if due {
                    inner.queue.pop()
                } else {
                    None
                }
            };
            let Some(wake) = wake else { break };
            {
                let mut inner = self.inner.borrow_mut();
                debug_assert!(
                    wake.time >= inner.now,
                    "clock moving backwards: now={} wakeup={}",
                    inner.now,
                    wake.time,
                );
                inner.now = wake.time;
            }
            self.poll_task(wake.task);
        }

        let abandoned = {
            let mut inner = self.inner.borrow_mut();
            if horizon > inner.now {
                inner.now = horizon;
            }
            inner.queue.clear();
            std::mem::take(&mut inner.tasks)
        };
        // Futures may run destructors; drop them outside the borrow.
        drop(abandoned);
    }

    fn poll_task(&self, id: u64) {
        let task = self.inner.borrow_mut().tasks.remove(&id);
        let Some(mut task) = task else {
            // Already completed; a stale wake-up is harmless.
            return;
        };
        self.inner.borrow_mut().current = Some(id);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let poll = task.as_mut().poll(&mut cx);
        {
            let mut inner = self.inner.borrow_mut();
            inner.current = None;
            if poll.is_pending() {
                inner.tasks.insert(id, task);
                return;
            }
        }
        drop(task);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle passed into simulation processes.
#[derive(Clone)]
pub struct SimContext {
    inner: Rc<RefCell<Inner>>,
}

impl SimContext {
    /// Current virtual time in seconds.
    pub fn now(&self) -> f64 {
        self.inner.borrow().now
    }

    /// Suspend the calling process for `duration` seconds of virtual time.
    ///
    /// Negative durations are treated as zero; a zero wait still yields,
    /// letting other processes scheduled at the same time run first.
    pub fn wait(&self, duration: f64) -> Wait {
        Wait {
            inner: Rc::clone(&self.inner),
            duration,
            deadline: None,
        }
    }

    /// Spawn a new process. It starts at the current virtual time, after
    /// the events already queued for this instant.
    pub fn spawn(&self, process: impl Future<Output = ()> + 'static) {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_task;
        inner.next_task += 1;
        inner.tasks.insert(id, Box::pin(process));
        let wake = Wakeup {
            time: inner.now,
            sequence: inner.next_sequence(),
            task: id,
        };
        inner.queue.push(wake);
    }
}

/// Future returned by [`SimContext::wait`].
pub struct Wait {
    inner: Rc<RefCell<Inner>>,
    duration: f64,
    deadline: Option<f64>,
}

impl Future for Wait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let mut inner = this.inner.borrow_mut();
        match this.deadline {
            None => {
                let task = inner
                    .current
                    .expect("wait() must be awaited inside a simulation process");
                let deadline = inner.now + this.duration.max(0.0);
                let wake = Wakeup {
                    time: deadline,
                    sequence: inner.next_sequence(),
                    task,
                };
                inner.queue.push(wake);
                this.deadline = Some(deadline);
                Poll::Pending
            }
            Some(deadline) if inner.now >= deadline => Poll::Ready(()),
            Some(_) => Poll::Pending,
        }
    }
}

/// Processes are resumed only by their own wake-ups, so the waker never
/// needs to do anything.
fn noop_waker() -> Waker {
    const VTABLE: RawWakerVTable = RawWakerVTable::new(|_| RAW, |_| {}, |_| {}, |_| {});
    const RAW: RawWaker = RawWaker::new(std::ptr::null(), &VTABLE);
    // Safety: the vtable functions are all no-ops over a null pointer.
    unsafe { Waker::from_raw(RAW) }
}
