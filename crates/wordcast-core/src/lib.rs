//! wordcast-core: Shared protocol and text types for wordcast
//!
//! This crate provides the event-stream wire format, the incremental frame
//! parser, and the text source used by the wordcast server and its clients.
//!
//! ## Modules
//!
//! - [`protocol`] - Event names, frame encoding and the incremental parser
//! - [`source`] - Text documents, tokenization and text sources

pub mod protocol;
pub mod source;

pub use protocol::{
    CONNECTED_COMMENT, DEFAULT_EVENT, DONE_EVENT, DONE_MARKER, Event, EventName, EventParser,
    MAX_LINE_LENGTH, ProtocolError, WORD_EVENT,
};
pub use source::{
    FileTextSource, SourceError, StaticTextSource, TextDocument, TextSource, tokenize,
};
