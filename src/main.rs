mod acceptor;
mod command_processor;
mod config;
mod connection;
mod router;
mod sinks;
mod storage;
mod worker_pool;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use acceptor::Acceptor;
use sinks::console::ConsoleSink;
use sinks::file::FileSink;
use storage::Sink;

// A single console worker keeps stdout output in flush order: every bulk
// goes through the same FIFO queue and the same thread, so one storage's
// flushes can never race each other for the `out` mutex. The file sink has
// no such constraint — each bulk lands in its own file — so it can use
// more than one worker.
const CONSOLE_WORKERS: usize = 1;
const FILE_WORKERS: usize = 2;

#[tokio::main]
async fn main() {
    // The console sink writes formatted bulks straight to stdout, so
    // structured logs must go to stderr to avoid interleaving with it.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_args().unwrap_or_else(|e| config::fatal(&e));

    let console_sink = Arc::new(ConsoleSink::new(std::io::stdout(), CONSOLE_WORKERS));
    let file_sink = Arc::new(FileSink::new(
        std::env::current_dir().expect("failed to read current directory"),
        FILE_WORKERS,
        config.max_cmds_in_files,
    ));

    let sinks: Vec<Arc<dyn Sink>> = vec![console_sink.clone(), file_sink.clone()];
    let acceptor = Acceptor::bind(config.port, config.bulk_size, sinks)
        .await
        .unwrap_or_else(|e| {
            eprintln!("failed to bind port {}: {e}", config.port);
            std::process::exit(1);
        });

    tracing::info!(port = config.port, bulk_size = config.bulk_size, "bulk_server listening");

    let cancel = CancellationToken::new();
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        shutdown_cancel.cancel();
    });

    acceptor.run(cancel).await;

    let console_sink =
        Arc::try_unwrap(console_sink).unwrap_or_else(|_| panic!("console sink still shared"));
    let file_sink = Arc::try_unwrap(file_sink).unwrap_or_else(|_| panic!("file sink still shared"));
    console_sink.stop();
    file_sink.stop();
}
