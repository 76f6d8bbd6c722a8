//! Line-oriented framing of the event stream
//!
//! A frame is an `event: <name>` banner line followed by a `data: <json>`
//! line and terminated by a blank line. Anything else is a protocol anomaly:
//! it is logged and the parser skips ahead to the next blank line.

use tracing::{trace, warn};

/// Banner name the server uses for keep-alive frames
pub const ALIVE_EVENT: &str = "alive";

/// A complete `event:`/`data:` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: String,
    pub data: String,
}

impl Frame {
    pub fn is_alive(&self) -> bool {
        self.event == ALIVE_EVENT
    }
}

/// Framing state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Between frames, expecting a banner line
    Waiting,
    /// Banner seen, expecting a data line
    Banner,
    /// Data seen, expecting the terminating blank line
    Data,
    /// After an anomaly, skipping until the next blank line
    Resync,
}

/// Turns stream lines into [`Frame`]s
#[derive(Debug)]
pub struct FrameParser {
    state: FrameState,
    event: String,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: FrameState::Waiting,
            event: String::new(),
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Feed one line (without its terminator)
    ///
    /// Returns a frame as soon as its data line has been read.
    pub fn push_line(&mut self, line: &str) -> Option<Frame> {
        if line.starts_with(':') {
            trace!(comment = line, "Ignoring stream comment");
            return None;
        }

        if line.is_empty() {
            match self.state {
                FrameState::Data | FrameState::Resync => {}
                FrameState::Waiting | FrameState::Banner => {
                    warn!(state = ?self.state, "Frame ended without a data line");
                }
            }
            self.state = FrameState::Waiting;
            return None;
        }

        match self.state {
            FrameState::Waiting => match field(line, "event") {
                Some(name) => {
                    self.event = name.to_string();
                    self.state = FrameState::Banner;
                }
                None => self.resync(line, "banner"),
            },
            FrameState::Banner => match field(line, "data") {
                Some(data) if !data.is_empty() => {
                    self.state = FrameState::Data;
                    return Some(Frame {
                        event: std::mem::take(&mut self.event),
                        data: data.to_string(),
                    });
                }
                Some(_) => {
                    warn!(event = %self.event, "Empty data line");
                    self.state = FrameState::Data;
                }
                None => self.resync(line, "data"),
            },
            FrameState::Data => self.resync(line, "blank"),
            FrameState::Resync => {
                trace!(line, "Skipping line while resynchronizing");
            }
        }
        None
    }

    fn resync(&mut self, line: &str, expected: &str) {
        warn!(line, expected, "Unexpected line in event stream");
        self.state = FrameState::Resync;
    }
}

/// Value of a `name: value` field line
fn field<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Reassembles lines across arbitrary chunk boundaries
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes
    ///
    /// Both `\n` and `\r\n` terminators are accepted.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Remaining unterminated text, if any
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}
