use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::command_processor::{CommandProcessor, Event};
use crate::router::Router;
use crate::storage::{Sink, Storage};

const READ_CHUNK: usize = 4096;

/// Tracks how many connections are currently open, so the last one to
/// disconnect can flush the shared global storage.
#[derive(Clone, Default)]
pub struct SessionCount(Arc<AtomicUsize>);

impl SessionCount {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns `true` iff this was the last open connection.
    fn leave(&self) -> bool {
        self.0.fetch_sub(1, Ordering::SeqCst) == 1
    }
}

/// Drives a single accepted TCP connection: reads chunks, feeds the
/// command processor, and routes the resulting events. Closing the
/// connection — whether by peer EOF or a read error — always tears down
/// the same way.
///
/// `sinks` are subscribed to this connection's own block storage exactly
/// as they are subscribed to the shared global storage, so a dynamic
/// block's bulk reaches the same outputs as a fixed-size one.
pub async fn handle(
    mut stream: TcpStream,
    global: Arc<Mutex<Storage>>,
    sinks: Arc<[Arc<dyn Sink>]>,
    sessions: SessionCount,
) {
    sessions.enter();

    let mut block_storage = Storage::new_block();
    for sink in sinks.iter() {
        block_storage.subscribe(Arc::clone(sink));
    }

    let mut processor = CommandProcessor::new();
    let mut router = Router::new(global, block_storage);
    let mut buf = [0u8; READ_CHUNK];

    loop {
        let read = match stream.read(&mut buf).await {
            Ok(0) => {
                dispatch(&mut router, processor.process(&[], true));
                break;
            }
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(error = %err, "connection read failed");
                dispatch(&mut router, processor.process(&[], true));
                break;
            }
        };
        dispatch(&mut router, processor.process(&buf[..read], false));
    }

    if sessions.leave() {
        router.flush_global();
    }
}

fn dispatch(router: &mut Router, events: Vec<Event>) {
    for event in events {
        match event {
            Event::Push(command) => router.push(command),
            Event::BlockStart => router.block_start(),
            Event::BlockEnd => router.block_end(),
            // The global storage's own flush-on-last-disconnect rule
            // handles end-of-stream; a per-connection Flush event from an
            // open block is never emitted (see command_processor.rs).
            Event::Flush => {}
        }
    }
}
