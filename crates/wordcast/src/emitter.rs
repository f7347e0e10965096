//! Paced stream emitter
//!
//! Implements the per-connection Idle/Streaming/Completed/Aborted state
//! machine. Each `/sse` connection owns one [`StreamSession`] and one pacing
//! loop; nothing is shared between connections.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use wordcast_core::{CONNECTED_COMMENT, Event};

/// Default delay between successive `word` frames
pub const DEFAULT_WORD_INTERVAL: Duration = Duration::from_millis(50);

/// Capacity of the per-connection frame channel feeding the response body
pub const FRAME_CHANNEL_CAPACITY: usize = 16;

/// Lifecycle of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterState {
    /// Session created, nothing written yet
    Idle,
    /// Pacing timer running
    Streaming,
    /// `done` written and connection closed
    Completed,
    /// Client went away or a write failed
    Aborted,
}

/// What a single tick decided to write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Write this `word` frame and keep going
    Emit(Event),
    /// Write the `done` frame and close
    Finish(Event),
}

/// Server-side state for one connection
#[derive(Debug)]
pub struct StreamSession {
    tokens: Vec<String>,
    cursor: usize,
    state: EmitterState,
}

impl StreamSession {
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens,
            cursor: 0,
            state: EmitterState::Idle,
        }
    }

    pub fn state(&self) -> EmitterState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state, EmitterState::Idle | EmitterState::Streaming)
    }

    /// Advance by one tick
    ///
    /// Returns `None` once the session is terminal; a finished or aborted
    /// session never produces another frame.
    pub fn tick(&mut self) -> Option<Tick> {
        match self.state {
            EmitterState::Completed | EmitterState::Aborted => return None,
            EmitterState::Idle => self.state = EmitterState::Streaming,
            EmitterState::Streaming => {}
        }

        if self.cursor == self.tokens.len() {
            self.state = EmitterState::Completed;
            return Some(Tick::Finish(Event::done()));
        }

        let token = std::mem::take(&mut self.tokens[self.cursor]);
        self.cursor += 1;
        Some(Tick::Emit(Event::word(token)))
    }

    /// Mark the session aborted; no further ticks produce frames
    pub fn abort(&mut self) {
        if self.is_live() {
            self.state = EmitterState::Aborted;
        }
    }
}

/// Why a frame could not be written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Blocked {
    /// Server shutdown fired while waiting for room in the channel
    Shutdown,
    /// The response body was dropped
    Closed,
}

/// Write one frame, giving up if shutdown fires first
///
/// A client that stops reading fills the channel; the send then parks until
/// the shutdown token releases it.
async fn send_frame(
    tx: &mpsc::Sender<Bytes>,
    frame: Bytes,
    cancel: &CancellationToken,
) -> Result<(), Blocked> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Blocked::Shutdown),
        result = tx.send(frame) => result.map_err(|_| Blocked::Closed),
    }
}

/// Drive one session until it completes or the client goes away
///
/// Writes a `: connected` comment, then one frame per tick into `tx`, whose
/// receiving half is the HTTP response body. A closed channel means the body
/// was dropped (client disconnect), and `cancel` fires on server shutdown;
/// either aborts the loop, including while a write waits on a full channel.
/// Dropping `tx` on return closes the connection.
pub async fn run_session(
    mut session: StreamSession,
    tx: mpsc::Sender<Bytes>,
    interval: Duration,
    cancel: CancellationToken,
) -> EmitterState {
    let total = session.tokens.len();
    debug!(tokens = total, interval_ms = interval.as_millis() as u64, "stream session starting");

    let connected = Bytes::from_static(CONNECTED_COMMENT.as_bytes());
    if let Err(blocked) = send_frame(&tx, connected, &cancel).await {
        session.abort();
        info!(?blocked, "stream aborted before first frame");
        return session.state();
    }

    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                session.abort();
                info!(sent = session.cursor(), total, "stream aborted by shutdown");
                break;
            }

            _ = tx.closed() => {
                session.abort();
                info!(sent = session.cursor(), total, "client disconnected");
                break;
            }

            _ = ticker.tick() => {
                let Some(tick) = session.tick() else { break };
                let (event, last) = match tick {
                    Tick::Emit(event) => (event, false),
                    Tick::Finish(event) => (event, true),
                };

                let frame = Bytes::from(event.encode());
                if let Err(blocked) = send_frame(&tx, frame, &cancel).await {
                    session.abort();
                    info!(sent = session.cursor(), total, ?blocked, "stream aborted mid-write");
                    break;
                }

                if last {
                    info!(sent = total, "stream completed");
                    break;
                }
            }
        }
    }

    session.state()
}
