mod cli;
mod emitter;
mod server;


use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wordcast_core::{FileTextSource, TextSource};

use crate::server::AppState;

#[tokio::main]
async fn main() {
    // Initialize tracing with RUST_LOG support
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    info!(
        host = %cli.host,
        port = cli.port,
        word_ms = cli.word_ms,
        text = ?cli.text_path,
        "wordcast starting"
    );

    // Check the text source up front; requests still read it fresh each time
    let source = FileTextSource::new(cli.text_path.clone());
    match source.load().await {
        Ok(document) => info!(tokens = document.tokens().len(), "text source ready"),
        Err(e) => warn!("text source not readable yet: {}", e),
    }

    let shutdown = CancellationToken::new();
    let state = AppState::new(Arc::new(source), cli.word_interval(), shutdown.clone());

    // Bind TCP listener
    let bind_addr = cli.bind_addr();
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("wordcast: error: failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };
    info!("wordcast listening on http://{}", bind_addr);
    info!("open: http://localhost:{}/", cli.port);

    // Signal shutdown on Ctrl-C
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        signal_shutdown.cancel();
    });

    if let Err(e) = server::run_server(listener, state).await {
        eprintln!("wordcast: error: server error: {}", e);
        std::process::exit(1);
    }

    info!("wordcast shut down");
}
