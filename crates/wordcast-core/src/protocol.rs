//! Event-stream wire protocol for wordcast
//!
//! Each frame on the wire is a block of `field: value` lines closed by a
//! blank line:
//! - `event: <name>` names the event (`word` or `done`)
//! - `data: <payload>` carries the token text or the completion marker
//! - lines starting with `:` are comments and carry nothing
//!
//! The server writes frames with [`Event::encode`]; clients read them back
//! with the incremental [`EventParser`].

use std::fmt;

/// Event name for a single streamed token
pub const WORD_EVENT: &str = "word";

/// Event name for the terminal frame of a stream
pub const DONE_EVENT: &str = "done";

/// Payload carried by the terminal `done` frame
pub const DONE_MARKER: &str = "[DONE]";

/// Name given to frames that carry data but no `event:` line
pub const DEFAULT_EVENT: &str = "message";

/// Comment frame written once when a stream opens
pub const CONNECTED_COMMENT: &str = ": connected\n\n";

/// Longest single line the parser will buffer (1 MiB)
pub const MAX_LINE_LENGTH: usize = 1_048_576;

/// Event names understood by the protocol
///
/// Names other than `word` and `done` are kept as [`EventName::Other`] so
/// that newer servers can add events without breaking older clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    /// One token of the source text
    Word,
    /// End of stream; no frames follow
    Done,
    /// Any name this version of the protocol does not know
    Other(String),
}

impl EventName {
    /// Map a wire name to an `EventName`
    pub fn parse(name: &str) -> Self {
        match name {
            WORD_EVENT => EventName::Word,
            DONE_EVENT => EventName::Done,
            other => EventName::Other(other.to_string()),
        }
    }

    /// The name as it appears on the wire
    pub fn as_str(&self) -> &str {
        match self {
            EventName::Word => WORD_EVENT,
            EventName::Done => DONE_EVENT,
            EventName::Other(name) => name,
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while reading frames off the wire
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A single line grew past the parser's buffer limit
    #[error("malformed stream: line of {len} bytes exceeds maximum {max}")]
    LineTooLong { len: usize, max: usize },
}

/// A single protocol event: a name and its data payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: EventName,
    pub data: String,
}

impl Event {
    pub fn new(name: EventName, data: impl Into<String>) -> Self {
        Event {
            name,
            data: data.into(),
        }
    }

    /// A `word` event carrying one token
    pub fn word(token: impl Into<String>) -> Self {
        Event::new(EventName::Word, token)
    }

    /// The terminal `done` event
    pub fn done() -> Self {
        Event::new(EventName::Done, DONE_MARKER)
    }

    pub fn is_done(&self) -> bool {
        self.name == EventName::Done
    }

    /// Encode this event as one wire frame
    ///
    /// Multi-line payloads are split across several `data:` lines, which the
    /// parser joins back together with `\n`.
    pub fn encode(&self) -> String {
        let mut frame = String::with_capacity(self.data.len() + 32);
        frame.push_str("event: ");
        frame.push_str(self.name.as_str());
        frame.push('\n');
        for line in self.data.split('\n') {
            frame.push_str("data: ");
            frame.push_str(line);
            frame.push('\n');
        }
        frame.push('\n');
        frame
    }
}

/// Incremental frame parser
///
/// Bytes are fed in whatever chunks the transport delivers; complete events
/// come out in arrival order. Partial lines and partial frames are held until
/// the rest arrives. Unknown fields and comment lines are skipped, and a
/// partial frame left over when the stream ends is never emitted.
#[derive(Debug, Default)]
pub struct EventParser {
    line: Vec<u8>,
    name: Option<String>,
    data: Option<String>,
    skip_lf: bool,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and collect every event it completes
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::LineTooLong`] if a line exceeds
    /// [`MAX_LINE_LENGTH`]. The parser should be discarded afterwards.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Event>, ProtocolError> {
        let mut events = Vec::new();
        let mut bytes = chunk;

        // A `\r` ended the previous chunk; swallow the `\n` of a split CRLF
        if self.skip_lf && !bytes.is_empty() {
            if bytes[0] == b'\n' {
                bytes = &bytes[1..];
            }
            self.skip_lf = false;
        }

        let mut start = 0;
        let mut i = 0;
        while i < bytes.len() {
            let byte = bytes[i];
            if byte != b'\n' && byte != b'\r' {
                i += 1;
                continue;
            }

            self.line.extend_from_slice(&bytes[start..i]);
            self.check_line_length()?;
            let line = std::mem::take(&mut self.line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }

            if byte == b'\r' {
                if i + 1 < bytes.len() {
                    if bytes[i + 1] == b'\n' {
                        i += 1;
                    }
                } else {
                    self.skip_lf = true;
                }
            }
            i += 1;
            start = i;
        }

        self.line.extend_from_slice(&bytes[start..]);
        self.check_line_length()?;
        Ok(events)
    }

    fn check_line_length(&self) -> Result<(), ProtocolError> {
        if self.line.len() > MAX_LINE_LENGTH {
            return Err(ProtocolError::LineTooLong {
                len: self.line.len(),
                max: MAX_LINE_LENGTH,
            });
        }
        Ok(())
    }

    fn process_line(&mut self, line: &[u8]) -> Option<Event> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line[0] == b':' {
            return None;
        }

        let line = String::from_utf8_lossy(line);
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_ref(), ""),
        };

        match field {
            "event" => self.name = Some(value.to_string()),
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            // id, retry and anything newer carry nothing we act on
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<Event> {
        let name = self.name.take();
        let data = self.data.take();
        if name.is_none() && data.is_none() {
            return None;
        }
        let name = name.as_deref().unwrap_or(DEFAULT_EVENT);
        Some(Event::new(EventName::parse(name), data.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &[u8]) -> Vec<Event> {
        EventParser::new().feed(input).unwrap()
    }

    #[test]
    fn test_event_name_parse() {
        assert_eq!(EventName::parse("word"), EventName::Word);
        assert_eq!(EventName::parse("done"), EventName::Done);
        assert_eq!(
            EventName::parse("ping"),
            EventName::Other("ping".to_string())
        );
    }

    #[test]
    fn test_event_name_as_str() {
        assert_eq!(EventName::Word.as_str(), "word");
        assert_eq!(EventName::Done.as_str(), "done");
        assert_eq!(EventName::Other("ping".to_string()).as_str(), "ping");
        assert_eq!(EventName::Done.to_string(), "done");
    }

    #[test]
    fn test_golden_word_frame() {
        assert_eq!(Event::word("hello").encode(), "event: word\ndata: hello\n\n");
    }

    #[test]
    fn test_golden_done_frame() {
        assert_eq!(Event::done().encode(), "event: done\ndata: [DONE]\n\n");
    }

    #[test]
    fn test_encode_multiline_payload() {
        let event = Event::new(EventName::Other("note".to_string()), "a\nb");
        assert_eq!(event.encode(), "event: note\ndata: a\ndata: b\n\n");
    }

    #[test]
    fn test_done_convenience_constructor() {
        let event = Event::done();
        assert!(event.is_done());
        assert_eq!(event.data, DONE_MARKER);
        assert!(!Event::word("x").is_done());
    }

    #[test]
    fn test_parse_stream_in_order() {
        let mut wire = String::from(CONNECTED_COMMENT);
        for word in ["hello", "world"] {
            wire.push_str(&Event::word(word).encode());
        }
        wire.push_str(&Event::done().encode());

        let events = parse_all(wire.as_bytes());
        assert_eq!(
            events,
            vec![Event::word("hello"), Event::word("world"), Event::done()]
        );
    }

    #[test]
    fn test_parse_byte_at_a_time() {
        let wire = "event: word\r\ndata: split\r\n\r\nevent: done\rdata: [DONE]\r\r";
        let mut parser = EventParser::new();
        let mut events = Vec::new();
        for byte in wire.as_bytes() {
            events.extend(parser.feed(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(events, vec![Event::word("split"), Event::done()]);
    }

    #[test]
    fn test_parse_crlf_split_across_chunks() {
        let mut parser = EventParser::new();
        assert!(parser.feed(b"event: word\r").unwrap().is_empty());
        assert!(parser.feed(b"\ndata: a\r").unwrap().is_empty());
        let events = parser.feed(b"\n\r\n").unwrap();
        assert_eq!(events, vec![Event::word("a")]);
    }

    #[test]
    fn test_parse_multibyte_token_split_across_chunks() {
        let wire = Event::word("héllo").encode();
        let bytes = wire.as_bytes();
        let split = wire.find('é').unwrap() + 1;
        let mut parser = EventParser::new();
        assert!(parser.feed(&bytes[..split]).unwrap().is_empty());
        assert_eq!(parser.feed(&bytes[split..]).unwrap(), vec![Event::word("héllo")]);
    }

    #[test]
    fn test_parse_unknown_event_kept() {
        let events = parse_all(b"event: ping\ndata: 1\n\n");
        assert_eq!(
            events,
            vec![Event::new(EventName::Other("ping".to_string()), "1")]
        );
    }

    #[test]
    fn test_parse_data_without_event_is_message() {
        let events = parse_all(b"data: hi\n\n");
        assert_eq!(
            events,
            vec![Event::new(EventName::Other(DEFAULT_EVENT.to_string()), "hi")]
        );
    }

    #[test]
    fn test_parse_event_without_data_has_empty_payload() {
        let events = parse_all(b"event: word\n\n");
        assert_eq!(events, vec![Event::word("")]);
    }

    #[test]
    fn test_parse_joins_data_lines() {
        let events = parse_all(b"event: note\ndata: a\ndata: b\n\n");
        assert_eq!(events[0].data, "a\nb");
    }

    #[test]
    fn test_parse_ignores_comments_ids_and_blank_runs() {
        let events = parse_all(b": hi\n\n\n\nid: 7\nretry: 10\nevent: word\ndata: x\n\n");
        assert_eq!(events, vec![Event::word("x")]);
    }

    #[test]
    fn test_parse_strips_only_one_space() {
        let events = parse_all(b"event:word\ndata:  padded\n\n");
        assert_eq!(events, vec![Event::word(" padded")]);
    }

    #[test]
    fn test_parse_field_without_colon() {
        let events = parse_all(b"data\n\n");
        assert_eq!(
            events,
            vec![Event::new(EventName::Other(DEFAULT_EVENT.to_string()), "")]
        );
    }

    #[test]
    fn test_partial_frame_not_emitted() {
        let mut parser = EventParser::new();
        let events = parser.feed(b"event: word\ndata: tail").unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_line_too_long() {
        let mut parser = EventParser::new();
        let chunk = vec![b'a'; MAX_LINE_LENGTH + 1];
        assert_eq!(
            parser.feed(&chunk),
            Err(ProtocolError::LineTooLong {
                len: MAX_LINE_LENGTH + 1,
                max: MAX_LINE_LENGTH
            })
        );
    }

    #[test]
    fn test_line_at_limit_accepted() {
        let mut parser = EventParser::new();
        let chunk = vec![b'a'; MAX_LINE_LENGTH];
        assert!(parser.feed(&chunk).unwrap().is_empty());
    }
}
