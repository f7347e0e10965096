//! Streaming client
//!
//! Connects to a wordcast `/sse` endpoint, parses frames as they arrive and
//! hands each event to an [`EventListener`]. One client runs at most one
//! session; starting a new one stops the old one first.
//!
//! Cancellation is cooperative: [`StreamClient::stop`] trips the session's
//! [`CancellationToken`] and returns immediately. Every delivery passes
//! through a delivery gate shared by all sessions of the client and re-checks
//! the token while holding it, so a callback already running when `stop` is
//! called may finish, but nothing is delivered after it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wordcast_core::{Event, EventParser};

use crate::error::{StreamError, error_chain};

/// Receiver of a session's events and errors
///
/// Calls for one session are serialized and arrive in wire order. After
/// `on_error`, or after the `done` event, nothing else is delivered.
pub trait EventListener: Send + Sync {
    /// A parsed frame: its event name and data payload
    fn on_event(&self, name: &str, data: &str);

    /// A transport failure; the session is over
    fn on_error(&self, message: &str);
}

/// An [`EventListener`] built from two closures
pub struct FnListener<E, R> {
    on_event: E,
    on_error: R,
}

impl<E, R> FnListener<E, R>
where
    E: Fn(&str, &str) + Send + Sync,
    R: Fn(&str) + Send + Sync,
{
    pub fn new(on_event: E, on_error: R) -> Self {
        Self { on_event, on_error }
    }
}

impl<E, R> EventListener for FnListener<E, R>
where
    E: Fn(&str, &str) + Send + Sync,
    R: Fn(&str) + Send + Sync,
{
    fn on_event(&self, name: &str, data: &str) {
        (self.on_event)(name, data)
    }

    fn on_error(&self, message: &str) {
        (self.on_error)(message)
    }
}

/// Lifecycle of a client session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session has been started
    Disconnected,
    /// Request sent, waiting for response headers
    Connecting,
    /// Response accepted, frames are being delivered
    Streaming,
    /// `done` received
    Completed,
    /// `stop` called, or the session was replaced
    Stopped,
    /// Connect, status, read or framing error
    Failed,
}

impl SessionState {
    /// Whether the session has ended
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Stopped | SessionState::Failed
        )
    }
}

/// Move to `next` unless the session already ended
///
/// Terminal states are sticky: whichever of stop, completion or failure gets
/// there first wins.
fn transition(state: &watch::Sender<SessionState>, next: SessionState) -> bool {
    state.send_if_modified(|current| {
        if current.is_terminal() || *current == next {
            return false;
        }
        *current = next;
        true
    })
}

/// The client's handle on its running session
struct ActiveSession {
    cancel: CancellationToken,
    state: Arc<watch::Sender<SessionState>>,
}

impl ActiveSession {
    fn stop(&self) {
        self.cancel.cancel();
        if transition(&self.state, SessionState::Stopped) {
            debug!("stream session stopped");
        }
    }
}

/// Client for the wordcast event stream
///
/// Owns its HTTP client; independent instances never share sessions.
/// `start` spawns onto the current Tokio runtime and must be called from
/// within one.
pub struct StreamClient {
    http: reqwest::Client,
    delivery_gate: Arc<Mutex<()>>,
    active: Mutex<Option<ActiveSession>>,
}

impl Default for StreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamClient {
    pub fn new() -> Self {
        Self::with_http_client(reqwest::Client::new())
    }

    /// Create a client that issues requests through `http`
    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self {
            http,
            delivery_gate: Arc::new(Mutex::new(())),
            active: Mutex::new(None),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start streaming from `url`, delivering to `listener`
    ///
    /// Stops any session this client is already running, then connects in
    /// the background. Returns a receiver that tracks the new session's
    /// [`SessionState`].
    pub fn start(
        &self,
        url: &str,
        listener: Arc<dyn EventListener>,
    ) -> watch::Receiver<SessionState> {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let state_tx = Arc::new(state_tx);

        let session = Session {
            http: self.http.clone(),
            url: url.to_string(),
            listener,
            cancel: cancel.clone(),
            state: state_tx.clone(),
            gate: self.delivery_gate.clone(),
        };

        // Swap under one lock so concurrent starts each stop the session they
        // displace; registering before spawning lets a stop() from the first
        // callback find the new one.
        let previous = self.lock_active().replace(ActiveSession {
            cancel,
            state: state_tx,
        });
        if let Some(previous) = previous {
            previous.stop();
        }

        debug!(url = %session.url, "starting stream session");
        tokio::spawn(session.run());
        state_rx
    }

    /// Stop the current session, if any
    ///
    /// Idempotent and non-blocking; safe to call from inside a listener
    /// callback. Cancellation is never reported through `on_error`.
    pub fn stop(&self) {
        if let Some(active) = self.lock_active().as_ref() {
            active.stop();
        }
    }

    /// State of the most recently started session
    pub fn state(&self) -> SessionState {
        match self.lock_active().as_ref() {
            Some(active) => *active.state.borrow(),
            None => SessionState::Disconnected,
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.stop();
    }
}

/// How a session's read loop ended without error
enum Outcome {
    Completed,
    Cancelled,
}

/// One session: a single request and its delivery loop
struct Session {
    http: reqwest::Client,
    url: String,
    listener: Arc<dyn EventListener>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<SessionState>>,
    gate: Arc<Mutex<()>>,
}

impl Session {
    async fn run(self) {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(Outcome::Cancelled),
            result = self.read_stream() => result,
        };

        match result {
            Ok(Outcome::Completed) => {
                transition(&self.state, SessionState::Completed);
                info!(url = %self.url, "stream completed");
            }
            Ok(Outcome::Cancelled) => {
                transition(&self.state, SessionState::Stopped);
            }
            Err(e) => {
                let message = error_chain(&e);
                if self.deliver_error(&message) {
                    warn!(url = %self.url, "stream failed: {}", message);
                    transition(&self.state, SessionState::Failed);
                } else {
                    transition(&self.state, SessionState::Stopped);
                }
            }
        }
    }

    async fn read_stream(&self) -> Result<Outcome, StreamError> {
        let response = self
            .http
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(StreamError::Connect)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status { status });
        }

        transition(&self.state, SessionState::Streaming);
        debug!(url = %self.url, "stream connected");

        let mut body = response.bytes_stream();
        let mut parser = EventParser::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(StreamError::Read)?;
            for event in parser.feed(&chunk)? {
                if !self.deliver_event(&event) {
                    return Ok(Outcome::Cancelled);
                }
                if event.is_done() {
                    return Ok(Outcome::Completed);
                }
            }
        }

        Err(StreamError::UnexpectedEof)
    }

    fn enter_gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver one event unless the session was cancelled
    fn deliver_event(&self, event: &Event) -> bool {
        let _gate = self.enter_gate();
        if self.cancel.is_cancelled() {
            return false;
        }
        self.listener.on_event(event.name.as_str(), &event.data);
        true
    }

    /// Deliver the session's one error unless the session was cancelled
    fn deliver_error(&self, message: &str) -> bool {
        let _gate = self.enter_gate();
        if self.cancel.is_cancelled() {
            return false;
        }
        self.listener.on_error(message);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!SessionState::Disconnected.is_terminal());
        assert!(!SessionState::Connecting.is_terminal());
        assert!(!SessionState::Streaming.is_terminal());
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Stopped.is_terminal());
        assert!(SessionState::Failed.is_terminal());
    }

    #[test]
    fn test_transition_forward() {
        let (tx, rx) = watch::channel(SessionState::Connecting);
        assert!(transition(&tx, SessionState::Streaming));
        assert_eq!(*rx.borrow(), SessionState::Streaming);
        assert!(transition(&tx, SessionState::Completed));
        assert_eq!(*rx.borrow(), SessionState::Completed);
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let (tx, rx) = watch::channel(SessionState::Streaming);
        assert!(transition(&tx, SessionState::Stopped));
        assert!(!transition(&tx, SessionState::Failed));
        assert!(!transition(&tx, SessionState::Completed));
        assert_eq!(*rx.borrow(), SessionState::Stopped);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let client = StreamClient::new();
        client.stop();
        client.stop();
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_fn_listener_forwards_calls() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let (ev, er) = (events.clone(), errors.clone());
        let listener = FnListener::new(
            move |name: &str, data: &str| ev.lock().unwrap().push(format!("{name}:{data}")),
            move |message: &str| er.lock().unwrap().push(message.to_string()),
        );

        listener.on_event("word", "hi");
        listener.on_error("boom");
        assert_eq!(*events.lock().unwrap(), vec!["word:hi"]);
        assert_eq!(*errors.lock().unwrap(), vec!["boom"]);
    }
}
