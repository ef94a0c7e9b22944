use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use crate::storage::{Bulk, Sink};
use crate::worker_pool::SinkWorkerPool;

use super::format_bulk;

/// Writes each bulk to a single shared [`Write`] stream (stdout in
/// production, an in-memory buffer in tests), guarded by a mutex so
/// concurrent workers never interleave partial lines.
pub struct ConsoleSink {
    out: Arc<Mutex<dyn Write + Send>>,
    pool: SinkWorkerPool,
}

impl ConsoleSink {
    pub fn new(out: impl Write + Send + 'static, worker_count: usize) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
            pool: SinkWorkerPool::with_workers(worker_count),
        }
    }

    /// Stops the worker pool and returns per-thread (commands, blocks)
    /// totals, for tests that verify the cross-worker statistics invariant:
    /// the sum across workers must equal the storage's own totals.
    pub fn stop(self) -> Vec<(u64, u64)> {
        self.pool.stop_workers().into_values().collect()
    }
}

impl Sink for ConsoleSink {
    fn output(&self, bulk: Arc<Bulk>) {
        let out = Arc::clone(&self.out);
        let commands = bulk.commands.len() as u64;
        self.pool.submit(move |stats| {
            let line = format_bulk(&bulk);
            let mut out = out.lock().expect("console stream lock poisoned");
            if let Err(err) = out.write_all(line.as_bytes()) {
                tracing::error!(error = %err, "console sink write failed");
                return;
            }
            stats.blocks.fetch_add(1, Ordering::Relaxed);
            stats.commands.fetch_add(commands, Ordering::Relaxed);
        });
    }
}
