//! Unsolicited event messages.
//!
//! The daemon prefixes every event with a priority tag such as `<3>`. That
//! leading `<` is the only thing distinguishing an event datagram from a
//! command reply on the shared socket.

/// First byte of every unsolicited event datagram.
pub const EVENT_MARKER: u8 = b'<';

/// Whether a datagram is an unsolicited event rather than a reply.
pub fn is_event(datagram: &[u8]) -> bool {
    datagram.first() == Some(&EVENT_MARKER)
}

/// Daemon debug level carried in the `<N>` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Excessive,
    MsgDump,
    Debug,
    Info,
    Warning,
    Error,
}

impl Priority {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Self::Excessive),
            1 => Some(Self::MsgDump),
            2 => Some(Self::Debug),
            3 => Some(Self::Info),
            4 => Some(Self::Warning),
            5 => Some(Self::Error),
            _ => None,
        }
    }
}

/// An unsolicited message received while attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    raw: Vec<u8>,
    priority: Option<Priority>,
    body_start: usize,
}

impl Event {
    /// Split the `<N>` prefix off a raw datagram.
    ///
    /// Datagrams without a well-formed prefix keep their full contents as
    /// the body and carry no priority.
    pub fn parse(raw: Vec<u8>) -> Self {
        let (priority, body_start) = match split_prefix(&raw) {
            Some((level, start)) => (Priority::from_level(level), start),
            None => (None, 0),
        };
        Self {
            raw,
            priority,
            body_start,
        }
    }

    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    /// The message without its priority prefix.
    pub fn body(&self) -> &[u8] {
        &self.raw[self.body_start..]
    }

    /// The datagram exactly as received (after truncation).
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.raw
    }
}

/// Returns the numeric level and the offset just past `>`.
fn split_prefix(raw: &[u8]) -> Option<(u8, usize)> {
    if !is_event(raw) {
        return None;
    }
    let close = raw.iter().position(|&b| b == b'>')?;
    let digits = &raw[1..close];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let level = std::str::from_utf8(digits).ok()?.parse().ok()?;
    Some((level, close + 1))
}
