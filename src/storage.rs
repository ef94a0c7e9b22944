use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A completed, ordered group of commands. Immutable once built, shared
/// read-only among every sink that receives it.
#[derive(Debug, PartialEq, Eq)]
pub struct Bulk {
    pub commands: Vec<String>,
    pub timestamp_micros: u128,
}

/// Anything that can consume a completed [`Bulk`]. Sinks know nothing of
/// storages — only storages hold references to sinks.
pub trait Sink: Send + Sync {
    fn output(&self, bulk: Arc<Bulk>);
}

fn now_micros() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_micros()
}

/// Accumulates commands into a bulk and flushes it to subscribers.
///
/// Two behaviors switched by `dynamic`: in fixed-size mode a bulk flushes
/// itself once it reaches `block_size` commands; in dynamic mode it only
/// flushes on an explicit [`Storage::block_end`].
pub struct Storage {
    block_size: usize,
    dynamic: bool,
    buffer: Vec<String>,
    timestamp: Option<u128>,
    subscribers: Vec<Arc<dyn Sink>>,
    commands: u64,
    blocks: u64,
}

impl Storage {
    /// `block_size` is ignored while the storage starts in dynamic mode
    /// (per-connection block storage always starts this way, with
    /// `block_size == 0`).
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            dynamic: false,
            buffer: Vec::new(),
            timestamp: None,
            subscribers: Vec::new(),
            commands: 0,
            blocks: 0,
        }
    }

    /// Per-connection block storage: no fixed size, starts idle (not yet
    /// in dynamic mode — `block_start` flips that on the first `{`).
    pub fn new_block() -> Self {
        Self::new(0)
    }

    /// Subscribers are append-only after construction; delivery order is
    /// insertion order.
    pub fn subscribe(&mut self, sink: Arc<dyn Sink>) {
        self.subscribers.push(sink);
    }

    /// Total commands/blocks this storage has ever flushed, for testing
    /// the cross-sink statistics invariant.
    pub fn stats(&self) -> (u64, u64) {
        (self.commands, self.blocks)
    }

    pub fn push(&mut self, command: String) {
        if self.buffer.is_empty() {
            self.timestamp = Some(now_micros());
        }
        self.buffer.push(command);
        if !self.dynamic && self.block_size > 0 && self.buffer.len() == self.block_size {
            self.flush();
        }
    }

    pub fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let commands = std::mem::take(&mut self.buffer);
        let timestamp_micros = self.timestamp.take().expect("buffer implies timestamp");
        self.blocks += 1;
        self.commands += commands.len() as u64;

        let bulk = Arc::new(Bulk {
            commands,
            timestamp_micros,
        });
        for sink in &self.subscribers {
            sink.output(Arc::clone(&bulk));
        }
    }

    /// Flushes whatever fixed-size bulk was pending, then switches to
    /// dynamic mode so the next flush only happens on `block_end`.
    pub fn block_start(&mut self) {
        self.flush();
        self.dynamic = true;
    }

    pub fn block_end(&mut self) {
        self.flush();
        self.dynamic = false;
    }
}
