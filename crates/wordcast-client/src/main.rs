mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wordcast_client::{EventListener, ParityHarness, SessionState, StreamClient};

use crate::cli::{Cli, Command};

/// Prints events to stdout and errors to stderr
struct PrintListener;

impl EventListener for PrintListener {
    fn on_event(&self, name: &str, data: &str) {
        println!("[{}] {}", name, data);
    }

    fn on_error(&self, message: &str) {
        eprintln!("wordtail: error: {}", message);
    }
}

async fn listen(url: &str) -> anyhow::Result<SessionState> {
    let client = StreamClient::new();
    let mut state = client.start(url, Arc::new(PrintListener));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            client.stop();
        }
        result = state.wait_for(SessionState::is_terminal) => {
            result.context("stream session dropped its state")?;
        }
    }

    let final_state = *state.borrow();
    Ok(final_state)
}

async fn parity(base_url: &str, timeout: Duration) -> anyhow::Result<()> {
    let report = ParityHarness::new(base_url)
        .with_timeout(timeout)
        .run()
        .await
        .with_context(|| format!("parity check against {} failed", base_url))?;

    println!(
        "parity ok: {} words in {:.2?}",
        report.received.len(),
        report.elapsed
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only the event transcript
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Listen { url } => listen(&url).await.map(|state| state != SessionState::Failed),
        Command::Parity {
            base_url,
            timeout_secs,
        } => parity(&base_url, Duration::from_secs(timeout_secs))
            .await
            .map(|()| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("wordtail: error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
