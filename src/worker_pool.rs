use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle, ThreadId};

/// Per-worker counters. Only the owning worker thread ever mutates these
/// (see [`SinkWorkerPool::add_worker`]), so incrementing them needs no
/// lock beyond the shared lookup that finds the entry.
#[derive(Debug, Default)]
pub struct Statistics {
    pub commands: AtomicU64,
    pub blocks: AtomicU64,
}

impl Statistics {
    fn snapshot(&self) -> (u64, u64) {
        (
            self.commands.load(Ordering::Relaxed),
            self.blocks.load(Ordering::Relaxed),
        )
    }
}

type Task = Box<dyn FnOnce(&Statistics) + Send>;

/// The queue and the stop flag share one mutex: a worker parked in
/// `wait` must see any `stopping = true` set after it last checked, and
/// that only holds if the check and the `notify_all` are serialized
/// through the same lock the condvar waits on.
struct QueueState {
    tasks: VecDeque<Task>,
    stopping: bool,
}

struct Shared {
    queue: Mutex<QueueState>,
    not_empty: Condvar,
}

/// A pool of OS threads draining a shared FIFO task queue.
///
/// Workers keep pulling tasks until the queue is empty *and* a stop has
/// been requested: a stop never discards queued work, it only stops new
/// work from accumulating once the backlog is drained.
///
/// Adding a worker takes the statistics map's exclusive lock; running a
/// task only takes a shared lock to look up its own entry, then mutates
/// that entry's atomics without further locking, since no other thread
/// touches it.
pub struct SinkWorkerPool {
    shared: Arc<Shared>,
    statistics: Arc<RwLock<HashMap<ThreadId, Arc<Statistics>>>>,
    workers: Vec<JoinHandle<()>>,
}

impl SinkWorkerPool {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState {
                    tasks: VecDeque::new(),
                    stopping: false,
                }),
                not_empty: Condvar::new(),
            }),
            statistics: Arc::new(RwLock::new(HashMap::new())),
            workers: Vec::new(),
        }
    }

    pub fn with_workers(count: usize) -> Self {
        let mut pool = Self::new();
        for _ in 0..count {
            pool.add_worker();
        }
        pool
    }

    /// Spawns one more worker thread draining the shared queue.
    pub fn add_worker(&mut self) {
        let shared = Arc::clone(&self.shared);
        let statistics = Arc::clone(&self.statistics);

        let handle = thread::spawn(move || {
            let stats = Arc::new(Statistics::default());
            {
                let mut map = statistics.write().expect("statistics lock poisoned");
                map.insert(thread::current().id(), Arc::clone(&stats));
            }

            loop {
                let mut queue = shared.queue.lock().expect("queue lock poisoned");
                loop {
                    if let Some(task) = queue.tasks.pop_front() {
                        drop(queue);
                        task(&stats);
                        break;
                    }
                    if queue.stopping {
                        return;
                    }
                    queue = shared
                        .not_empty
                        .wait(queue)
                        .expect("queue condvar poisoned");
                }
            }
        });
        self.workers.push(handle);
    }

    /// Queues a unit of work. Tasks run in FIFO order across all workers
    /// combined, never reordered or dropped.
    pub fn submit(&self, task: impl FnOnce(&Statistics) + Send + 'static) {
        self.shared
            .queue
            .lock()
            .expect("queue lock poisoned")
            .tasks
            .push_back(Box::new(task));
        self.shared.not_empty.notify_one();
    }

    /// Signals workers to stop once the queue is drained, joins them, and
    /// returns a snapshot of every worker's final statistics.
    pub fn stop_workers(mut self) -> HashMap<ThreadId, (u64, u64)> {
        {
            let mut queue = self.shared.queue.lock().expect("queue lock poisoned");
            queue.stopping = true;
        }
        self.shared.not_empty.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }

        self.statistics
            .read()
            .expect("statistics lock poisoned")
            .iter()
            .map(|(id, stats)| (*id, stats.snapshot()))
            .collect()
    }
}

impl Default for SinkWorkerPool {
    fn default() -> Self {
        Self::new()
    }
}
