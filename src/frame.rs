//! Wire codec for the text-framed pub/sub protocol.
//!
//! One frame per WebSocket text message:
//!
//! ```text
//! <COMMAND>\n
//! <key>:<value>\n
//! ...
//! \n
//! <body>\0
//! ```
//!
//! Commands:
//! - `CONNECT` (client → server): headers `version`, `identity`
//! - `CONNECTED` / `ERROR` (server → client): control replies
//! - `SEND` (client → server): headers `type`, `content-type`; JSON body
//! - `SUBSCRIBE` / `UNSUBSCRIBE` (client → server): header `destination`
//! - `MESSAGE` (server → client): domain payload broadcast
//!
//! The codec is pure: no I/O, no state. There is no escaping on the wire,
//! so the encoder rejects header keys containing `:` or line breaks, header
//! values containing line breaks, and any NUL byte anywhere — silently
//! corrupting a frame would be worse than failing the send.

// Rust guideline compliant 2026-02

/// Frame terminator on the wire (single NUL byte).
const TERMINATOR: char = '\0';

/// Commands a frame may carry. Anything else on the wire decodes to
/// [`FrameError::UnknownCommand`] and is dropped by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCommand {
    /// Client handshake request.
    Connect,
    /// Server handshake acknowledgment.
    Connected,
    /// Client domain message.
    Send,
    /// Client subscription request.
    Subscribe,
    /// Client subscription cancellation.
    Unsubscribe,
    /// Server broadcast carrying a domain payload.
    Message,
    /// Server error reply; fatal for the current socket.
    Error,
}

impl FrameCommand {
    /// Wire spelling of the command.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Message => "MESSAGE",
            Self::Error => "ERROR",
        }
    }

    /// Parse a wire command line. Commands are case-sensitive uppercase.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONNECT" => Some(Self::Connect),
            "CONNECTED" => Some(Self::Connected),
            "SEND" => Some(Self::Send),
            "SUBSCRIBE" => Some(Self::Subscribe),
            "UNSUBSCRIBE" => Some(Self::Unsubscribe),
            "MESSAGE" => Some(Self::Message),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrameCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protocol frame: command, ordered headers, optional body.
///
/// Headers keep caller-supplied order on encode; duplicate keys are legal
/// on the wire and resolve last-wins on lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The frame command.
    pub command: FrameCommand,
    /// Ordered `key:value` headers.
    pub headers: Vec<(String, String)>,
    /// UTF-8 body; empty or a JSON document.
    pub body: String,
}

impl Frame {
    /// Create a frame with no headers and an empty body.
    #[must_use]
    pub fn new(command: FrameCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header, preserving insertion order.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Look up a header value by key. Duplicate keys: last occurrence wins.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Codec failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The input was empty or whitespace-only.
    Empty,
    /// The command line is not part of the protocol vocabulary.
    UnknownCommand(String),
    /// A header key contains `:`, a line break, or NUL.
    InvalidHeaderKey(String),
    /// A header value contains a line break or NUL.
    InvalidHeaderValue(String),
    /// The body contains the NUL terminator.
    BodyContainsTerminator,
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty frame"),
            Self::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            Self::InvalidHeaderKey(key) => write!(f, "invalid header key: {key:?}"),
            Self::InvalidHeaderValue(key) => {
                write!(f, "invalid header value for key: {key:?}")
            }
            Self::BodyContainsTerminator => write!(f, "body contains NUL terminator"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Encode a frame into its wire text form.
///
/// # Errors
///
/// Returns an error if any header or the body would break the unescaped
/// line-based grammar (see module docs). Nothing is written on error.
pub fn encode(frame: &Frame) -> Result<String, FrameError> {
    for (key, value) in &frame.headers {
        if key.contains([':', '\n', '\r', TERMINATOR]) {
            return Err(FrameError::InvalidHeaderKey(key.clone()));
        }
        if value.contains(['\n', '\r', TERMINATOR]) {
            return Err(FrameError::InvalidHeaderValue(key.clone()));
        }
    }
    if frame.body.contains(TERMINATOR) {
        return Err(FrameError::BodyContainsTerminator);
    }

    let mut out = String::with_capacity(
        frame.command.as_str().len() + frame.body.len() + frame.headers.len() * 16 + 4,
    );
    out.push_str(frame.command.as_str());
    out.push('\n');
    for (key, value) in &frame.headers {
        out.push_str(key);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&frame.body);
    out.push(TERMINATOR);
    Ok(out)
}

/// Decode a wire text form back into a frame.
///
/// Header lines split at the first `:`, with both sides trimmed. A frame
/// with no blank-line separator decodes with an empty body and every
/// remaining line treated as a header — malformed but deliberately
/// non-fatal, so one bad broadcast can never take the connection down.
///
/// # Errors
///
/// Returns [`FrameError::Empty`] for empty input and
/// [`FrameError::UnknownCommand`] for commands outside the vocabulary.
pub fn decode(raw: &str) -> Result<Frame, FrameError> {
    // One trailing terminator is part of the wire form; strip it.
    let raw = raw.strip_suffix(TERMINATOR).unwrap_or(raw);
    if raw.trim().is_empty() {
        return Err(FrameError::Empty);
    }

    // Locate the header/body separator. Both bare-LF and CRLF forms occur
    // in the wild, depending on which server build produced the frame.
    let (head, body) = if let Some(idx) = raw.find("\r\n\r\n") {
        (&raw[..idx], &raw[idx + 4..])
    } else if let Some(idx) = raw.find("\n\n") {
        (&raw[..idx], &raw[idx + 2..])
    } else {
        (raw, "")
    };

    let mut lines = head.lines();
    let command_line = lines.next().unwrap_or("").trim();
    let command = FrameCommand::parse(command_line)
        .ok_or_else(|| FrameError::UnknownCommand(command_line.to_string()))?;

    let mut headers = Vec::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(':').unwrap_or((line, ""));
        headers.push((key.trim().to_string(), value.trim().to_string()));
    }

    Ok(Frame {
        command,
        headers,
        body: body.to_string(),
    })
}
