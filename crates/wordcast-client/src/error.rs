//! Error types for the streaming client and the parity harness

use std::time::Duration;

use reqwest::StatusCode;
use wordcast_core::ProtocolError;

/// Transport failures that end a stream session
///
/// The rendered message (see [`error_chain`]) is what listeners receive in
/// `on_error`.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("connection failed")]
    Connect(#[source] reqwest::Error),

    #[error("unexpected response status {status}")]
    Status { status: StatusCode },

    #[error("stream read failed")]
    Read(#[source] reqwest::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("stream ended before done")]
    UnexpectedEof,
}

/// Failures reported by the parity harness
#[derive(Debug, thiserror::Error)]
pub enum ParityError {
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("{url} returned status {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("full text from {url} has no tokens")]
    EmptyText { url: String },

    #[error("no done event within {timeout:?} (received {received} of {expected} words)")]
    Timeout {
        timeout: Duration,
        received: usize,
        expected: usize,
    },

    #[error("unexpected stream errors: {0:?}")]
    UnexpectedErrors(Vec<String>),

    #[error(
        "streamed words do not match full text: expected {expected} words, received {received}, first difference at {first_difference:?}"
    )]
    Mismatch {
        expected: usize,
        received: usize,
        first_difference: Option<usize>,
    },
}

/// Render an error and its sources as one line
///
/// reqwest keeps the interesting part ("connection refused") in the source
/// chain, so listeners get the whole chain rather than the top message.
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}
