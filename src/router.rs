use std::sync::{Arc, Mutex};

use crate::storage::Storage;

/// Forwards a connection's [`crate::command_processor::Event::Push`]
/// lines to whichever storage is currently active, and routes
/// block-bracket events to the per-connection block storage only.
///
/// The global storage is shared across every connection, so it sits
/// behind a mutex; the block storage is exclusively owned by one
/// connection and needs no lock.
pub struct Router {
    is_block_open: bool,
    global: Arc<Mutex<Storage>>,
    block: Storage,
}

impl Router {
    pub fn new(global: Arc<Mutex<Storage>>, block: Storage) -> Self {
        Self {
            is_block_open: false,
            global,
            block,
        }
    }

    pub fn push(&mut self, command: String) {
        if self.is_block_open {
            self.block.push(command);
        } else {
            self.global.lock().expect("global storage lock poisoned").push(command);
        }
    }

    pub fn block_start(&mut self) {
        self.is_block_open = true;
        self.block.block_start();
    }

    pub fn block_end(&mut self) {
        self.is_block_open = false;
        self.block.block_end();
    }

    pub fn is_block_open(&self) -> bool {
        self.is_block_open
    }

    /// Flushes the shared global storage. Called once, by whichever
    /// connection is the last to disconnect. Any block left open on this
    /// connection is discarded, never flushed.
    pub fn flush_global(&self) {
        self.global.lock().expect("global storage lock poisoned").flush();
    }
}
