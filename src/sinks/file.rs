use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::storage::{Bulk, Sink};
use crate::worker_pool::SinkWorkerPool;

use super::format_bulk;

fn make_filename(timestamp_micros: u128, counter: u16) -> String {
    format!("bulk{timestamp_micros}_{counter}.log")
}

/// Writes each bulk to its own file under `dir`, named
/// `bulk<timestamp_micros>_<counter>.log`.
///
/// `counter` is a 16-bit wrapping sequence: past 65536 files, two bulks can
/// collide on the same filename if their timestamps also collide. This is
/// a known, accepted limitation (see DESIGN.md), not a bug to fix here.
///
/// `max_cmds_in_files`, when set, makes the sink fail every write once the
/// cumulative command count it has processed crosses the threshold — a
/// diagnostic knob for exercising the write-failure path.
pub struct FileSink {
    dir: PathBuf,
    counter: AtomicU16,
    max_cmds_in_files: Option<u64>,
    cmds_written: AtomicU64,
    filenames: Arc<Mutex<Vec<String>>>,
    pool: SinkWorkerPool,
}

impl FileSink {
    pub fn new(dir: PathBuf, worker_count: usize, max_cmds_in_files: Option<u64>) -> Self {
        Self {
            dir,
            counter: AtomicU16::new(0),
            max_cmds_in_files,
            cmds_written: AtomicU64::new(0),
            filenames: Arc::new(Mutex::new(Vec::new())),
            pool: SinkWorkerPool::with_workers(worker_count),
        }
    }

    /// Every filename actually written so far, in completion order. Used
    /// to check filenames stay pairwise distinct.
    pub fn filenames(&self) -> Vec<String> {
        self.filenames.lock().expect("filenames lock poisoned").clone()
    }

    pub fn stop(self) -> Vec<(u64, u64)> {
        self.pool.stop_workers().into_values().collect()
    }

    fn write_bulk(path: &PathBuf, bulk: &Bulk) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(format_bulk(bulk).as_bytes())?;
        file.sync_all()
    }
}

impl Sink for FileSink {
    fn output(&self, bulk: Arc<Bulk>) {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let filename = make_filename(bulk.timestamp_micros, counter);
        let path = self.dir.join(&filename);
        let commands = bulk.commands.len() as u64;

        let already_written = self.cmds_written.fetch_add(commands, Ordering::Relaxed);
        let should_fail = self
            .max_cmds_in_files
            .is_some_and(|max| already_written >= max);

        let filenames = Arc::clone(&self.filenames);

        self.pool.submit(move |stats| {
            let result = if should_fail {
                Err(io::Error::other("max_cmds_in_files threshold exceeded"))
            } else {
                Self::write_bulk(&path, &bulk)
            };

            match result {
                Ok(()) => {
                    stats.blocks.fetch_add(1, Ordering::Relaxed);
                    stats.commands.fetch_add(commands, Ordering::Relaxed);
                    filenames
                        .lock()
                        .expect("filenames lock poisoned")
                        .push(filename);
                }
                Err(err) => {
                    tracing::error!(error = %err, filename = %filename, "file sink write failed");
                }
            }
        });
    }
}
