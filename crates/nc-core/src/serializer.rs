//! Single-threaded FIFO task stream.
//!
//! Tasks run to completion, one at a time, in submission order, on a
//! dedicated named thread. Once shutdown begins, tasks still in the queue are
//! dropped instead of run.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Task {
    name: &'static str,
    job: Job,
}

/// Counters for the task stream.
#[derive(Debug, Default)]
pub struct SerializerStats {
    /// Tasks accepted into the queue
    pub submitted: AtomicU64,
    /// Tasks run to completion
    pub executed: AtomicU64,
    /// Tasks dropped without running (shutdown)
    pub discarded: AtomicU64,
}

impl SerializerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> SerializerStatsSnapshot {
        SerializerStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    /// Tasks submitted but neither run nor discarded yet.
    pub fn pending(&self) -> u64 {
        self.snapshot().pending()
    }

    fn inc_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of serializer statistics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializerStatsSnapshot {
    pub submitted: u64,
    pub executed: u64,
    pub discarded: u64,
}

impl SerializerStatsSnapshot {
    pub fn pending(&self) -> u64 {
        self.submitted
            .saturating_sub(self.executed)
            .saturating_sub(self.discarded)
    }
}

/// Serial executor backed by one dedicated thread.
pub struct Serializer {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    stopping: Arc<AtomicBool>,
    stats: Arc<SerializerStats>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    warn_depth: u64,
}

impl Serializer {
    /// Spawn the worker thread. A backlog deeper than `warn_depth` is logged
    /// on every submission.
    pub fn new(name: &str, warn_depth: u64) -> io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<Task>();
        let stopping = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(SerializerStats::new());

        let worker = thread::Builder::new().name(name.to_string()).spawn({
            let stopping = Arc::clone(&stopping);
            let stats = Arc::clone(&stats);
            move || run(rx, stopping, stats)
        })?;

        Ok(Self {
            name: name.to_string(),
            tx: Mutex::new(Some(tx)),
            stopping,
            stats,
            worker_id: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
            warn_depth,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `job`. Returns false, dropping the job, once shutdown has begun.
    pub fn submit(&self, name: &'static str, job: impl FnOnce() + Send + 'static) -> bool {
        if self.stopping.load(Ordering::SeqCst) {
            debug!("{}: refusing {} after shutdown", self.name, name);
            return false;
        }
        let task = Task {
            name,
            job: Box::new(job),
        };

        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            debug!("{}: refusing {} after shutdown", self.name, name);
            return false;
        };
        self.stats.inc_submitted();
        if let Err(mpsc::error::SendError(task)) = tx.send(task) {
            // Worker is gone; account for the task as discarded.
            self.stats.inc_discarded();
            warn!("{}: worker exited, dropping {}", self.name, task.name);
            return false;
        }
        drop(guard);

        let pending = self.stats.pending();
        if pending > self.warn_depth {
            warn!("{}: {} tasks pending", self.name, pending);
        }
        true
    }

    /// True when called from the worker thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    pub fn stats(&self) -> SerializerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_shut_down(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Stop accepting tasks, discard whatever is still queued and wait for
    /// the worker to exit. The task currently running, if any, completes
    /// first. Idempotent.
    ///
    /// Called from a task, this cannot wait for its own thread; the worker
    /// exits after the calling task returns.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        // Closing the channel lets the worker drain and exit.
        self.tx.lock().take();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if self.is_current() {
                return;
            }
            if worker.join().is_err() {
                warn!("{}: worker panicked", self.name);
            }
        }
    }
}

impl Drop for Serializer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Serializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Serializer")
            .field("name", &self.name)
            .field("stats", &self.stats.snapshot())
            .field("stopping", &self.is_shut_down())
            .finish()
    }
}

fn run(mut rx: mpsc::UnboundedReceiver<Task>, stopping: Arc<AtomicBool>, stats: Arc<SerializerStats>) {
    while let Some(task) = rx.blocking_recv() {
        if stopping.load(Ordering::SeqCst) {
            debug!("discarding {}", task.name);
            drop(task.job);
            stats.inc_discarded();
            continue;
        }
        debug!("running {}", task.name);
        (task.job)();
        stats.inc_executed();
    }
}
