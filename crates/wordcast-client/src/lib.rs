//! wordcast-client: Streaming client and parity harness for wordcast
//!
//! ## Modules
//!
//! - [`client`] - Session state machine, listener capability and cancellation
//! - [`parity`] - End-to-end check of `/sse` against `/text`
//! - [`error`] - Transport and harness errors

pub mod client;
pub mod error;
pub mod parity;

pub use client::{EventListener, FnListener, SessionState, StreamClient};
pub use error::{ParityError, StreamError};
pub use parity::{DEFAULT_PARITY_TIMEOUT, ParityHarness, ParityReport, is_teardown_error};
