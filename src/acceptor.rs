use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::connection::{self, SessionCount};
use crate::storage::{Sink, Storage};

/// Owns the shared global storage and the fan-out sink list, accepts
/// connections, and spawns a connection driver for each one.
///
/// Shutdown asks the accept loop to stop and lets in-flight connections
/// finish on their own — it never forcibly closes a socket mid-read.
pub struct Acceptor {
    listener: TcpListener,
    global: Arc<Mutex<Storage>>,
    sinks: Arc<[Arc<dyn Sink>]>,
}

impl Acceptor {
    pub async fn bind(
        port: u16,
        block_size: usize,
        sinks: Vec<Arc<dyn Sink>>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;

        let mut global = Storage::new(block_size);
        for sink in &sinks {
            global.subscribe(Arc::clone(sink));
        }

        Ok(Self {
            listener,
            global: Arc::new(Mutex::new(global)),
            sinks: Arc::from(sinks),
        })
    }

    pub fn local_port(&self) -> std::io::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Accepts connections until `cancel` fires. Every accepted connection
    /// runs as its own spawned task and is tracked by a `JoinSet` so
    /// shutdown can wait for all of them to finish.
    pub async fn run(self, cancel: CancellationToken) {
        let sessions = SessionCount::new();
        let mut connections = tokio::task::JoinSet::new();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            tracing::info!(%addr, "accepted connection");
                            connections.spawn(connection::handle(
                                stream,
                                Arc::clone(&self.global),
                                Arc::clone(&self.sinks),
                                sessions.clone(),
                            ));
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "accept failed");
                        }
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }

        while connections.join_next().await.is_some() {}
    }
}
