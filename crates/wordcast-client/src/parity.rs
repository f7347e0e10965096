//! Parity harness
//!
//! Proves the event stream reconstructs the full text: fetch `/text`,
//! tokenize it, stream `/sse` through a [`StreamClient`], and compare the
//! `word` payloads against the expected tokens.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info};

use wordcast_core::{EventName, tokenize};

use crate::client::{EventListener, StreamClient};
use crate::error::{ParityError, error_chain};

/// Default bound on how long a run may take
pub const DEFAULT_PARITY_TIMEOUT: Duration = Duration::from_secs(20);

/// Error text that only shows up when a connection is torn down on purpose
const TEARDOWN_MARKERS: [&str; 4] = ["cancel", "closed", "eof", "abort"];

/// Whether an error message describes ordinary connection teardown
pub fn is_teardown_error(message: &str) -> bool {
    let message = message.to_lowercase();
    TEARDOWN_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Outcome of a successful parity run
#[derive(Debug, Clone)]
pub struct ParityReport {
    pub expected: Vec<String>,
    pub received: Vec<String>,
    /// Errors seen and tolerated as teardown noise
    pub teardown_errors: Vec<String>,
    pub elapsed: Duration,
}

/// Listener calls, forwarded to the harness task
#[derive(Debug)]
enum Signal {
    Event { name: String, data: String },
    Error(String),
}

struct ChannelListener {
    tx: mpsc::UnboundedSender<Signal>,
}

impl EventListener for ChannelListener {
    fn on_event(&self, name: &str, data: &str) {
        let _ = self.tx.send(Signal::Event {
            name: name.to_string(),
            data: data.to_string(),
        });
    }

    fn on_error(&self, message: &str) {
        let _ = self.tx.send(Signal::Error(message.to_string()));
    }
}

/// Compare two token sequences, returning the first index where they differ
fn first_difference(expected: &[String], received: &[String]) -> Option<usize> {
    expected
        .iter()
        .zip(received)
        .position(|(a, b)| a != b)
        .or_else(|| (expected.len() != received.len()).then(|| expected.len().min(received.len())))
}

/// End-to-end check of `/sse` against `/text`
pub struct ParityHarness {
    http: reqwest::Client,
    text_url: String,
    stream_url: String,
    timeout: Duration,
}

impl ParityHarness {
    /// Create a harness for the server at `base_url` (e.g. `http://127.0.0.1:8787`)
    pub fn new(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            http: reqwest::Client::new(),
            text_url: format!("{}/text", base),
            stream_url: format!("{}/sse", base),
            timeout: DEFAULT_PARITY_TIMEOUT,
        }
    }

    /// Override the bound on a run's duration
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn text_url(&self) -> &str {
        &self.text_url
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    /// Fetch the full text and derive the expected token sequence
    pub async fn fetch_expected(&self) -> Result<Vec<String>, ParityError> {
        let fetch_error = |e: reqwest::Error| ParityError::Fetch {
            url: self.text_url.clone(),
            message: error_chain(&e),
        };

        let response = self
            .http
            .get(&self.text_url)
            .send()
            .await
            .map_err(fetch_error)?;
        let status = response.status();
        let body = response.text().await.map_err(fetch_error)?;

        if !status.is_success() {
            return Err(ParityError::Status {
                url: self.text_url.clone(),
                status,
                body,
            });
        }

        let expected = tokenize(&body);
        if expected.is_empty() {
            return Err(ParityError::EmptyText {
                url: self.text_url.clone(),
            });
        }
        Ok(expected)
    }

    /// Run the check once
    ///
    /// # Errors
    ///
    /// Fails if the full text cannot be fetched, if no `done` arrives within
    /// the timeout, if the stream reports a non-teardown error, or if the
    /// streamed words differ from the full text in any way.
    pub async fn run(&self) -> Result<ParityReport, ParityError> {
        let started = Instant::now();
        let expected = self.fetch_expected().await?;
        debug!(words = expected.len(), url = %self.stream_url, "parity run starting");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = StreamClient::with_http_client(self.http.clone());
        client.start(&self.stream_url, Arc::new(ChannelListener { tx }));

        let mut received = Vec::new();
        let mut errors = Vec::new();
        let waited = tokio::time::timeout(self.timeout, async {
            while let Some(signal) = rx.recv().await {
                match signal {
                    Signal::Event { name, data } => match EventName::parse(&name) {
                        EventName::Word => received.push(data),
                        EventName::Done => break,
                        EventName::Other(_) => {}
                    },
                    Signal::Error(message) => {
                        errors.push(message);
                        break;
                    }
                }
            }
        })
        .await;
        client.stop();

        if waited.is_err() {
            return Err(ParityError::Timeout {
                timeout: self.timeout,
                received: received.len(),
                expected: expected.len(),
            });
        }

        let (teardown_errors, unexpected): (Vec<_>, Vec<_>) =
            errors.into_iter().partition(|e| is_teardown_error(e));
        if !unexpected.is_empty() {
            return Err(ParityError::UnexpectedErrors(unexpected));
        }

        if let Some(index) = first_difference(&expected, &received) {
            return Err(ParityError::Mismatch {
                expected: expected.len(),
                received: received.len(),
                first_difference: Some(index),
            });
        }

        let elapsed = started.elapsed();
        info!(words = received.len(), ?elapsed, "parity check passed");
        Ok(ParityReport {
            expected,
            received,
            teardown_errors,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<String> {
        tokenize(text)
    }

    #[test]
    fn test_teardown_errors_recognised() {
        assert!(is_teardown_error("request was Cancelled"));
        assert!(is_teardown_error("connection closed before message completed"));
        assert!(is_teardown_error("unexpected EOF"));
        assert!(is_teardown_error("Aborted"));
        assert!(!is_teardown_error("connection refused"));
        assert!(!is_teardown_error("unexpected response status 500"));
    }

    #[test]
    fn test_first_difference_equal() {
        assert_eq!(first_difference(&words("a b c"), &words("a b c")), None);
    }

    #[test]
    fn test_first_difference_content() {
        assert_eq!(first_difference(&words("a b c"), &words("a x c")), Some(1));
    }

    #[test]
    fn test_first_difference_length() {
        assert_eq!(first_difference(&words("a b c"), &words("a b")), Some(2));
        assert_eq!(first_difference(&words("a"), &words("a b")), Some(1));
        assert_eq!(first_difference(&[], &words("a")), Some(0));
    }

    #[test]
    fn test_urls_from_base() {
        let harness = ParityHarness::new("http://127.0.0.1:8787/");
        assert_eq!(harness.text_url(), "http://127.0.0.1:8787/text");
        assert_eq!(harness.stream_url(), "http://127.0.0.1:8787/sse");
    }

    #[tokio::test]
    async fn test_unreachable_text_endpoint() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let harness = ParityHarness::new(&format!("http://{}", addr));
        match harness.run().await {
            Err(ParityError::Fetch { url, .. }) => assert!(url.ends_with("/text")),
            other => panic!("expected fetch error, got {:?}", other),
        }
    }
}
