//! Outbound signalling words and the parser's lookahead queue

use crate::bandplan::Bandplan;
use std::collections::VecDeque;

/// Sentinel command marking a queue reset (lost sync or bad CRC upstream)
pub const QUEUE_RESET_CMD: u16 = 0xFFE;

/// Queue capacity: a three-word message, up to two interleaved idles, and
/// one slot for a reset marker
pub const OSW_QUEUE_SIZE: usize = 6;

/// One decoded outbound signalling word
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Osw {
    /// 16-bit address field
    pub addr: u16,

    /// Group (true) or individual (false) flag
    pub grp: bool,

    /// 10-bit command field
    pub cmd: u16,

    /// Upstream timestamp, fractional seconds
    pub ts: f64,

    /// The command is a valid receive channel under the current bandplan
    pub ch_rx: bool,

    /// The command is a valid transmit channel under the current bandplan
    pub ch_tx: bool,

    /// Receive frequency in MHz, 0.0 when not a channel
    pub f_rx: f64,

    /// Transmit frequency in MHz, 0.0 when not a channel
    pub f_tx: f64,
}

impl Osw {
    /// Decode a raw word, deriving the channel and frequency fields from
    /// the bandplan.
    #[must_use]
    pub fn decode(addr: u16, grp: bool, cmd: u16, ts: f64, bandplan: &Bandplan) -> Self {
        let ch_rx = bandplan.is_channel(cmd, false);
        let ch_tx = bandplan.is_channel(cmd, true);
        Self {
            addr,
            grp,
            cmd,
            ts,
            ch_rx,
            ch_tx,
            f_rx: if ch_rx { bandplan.freq_mhz(cmd, false) } else { 0.0 },
            f_tx: if ch_tx { bandplan.freq_mhz(cmd, true) } else { 0.0 },
        }
    }

    /// Build a queue-reset marker
    #[must_use]
    pub const fn reset_marker(ts: f64) -> Self {
        Self {
            addr: 0xFFFF,
            grp: true,
            cmd: QUEUE_RESET_CMD,
            ts,
            ch_rx: false,
            ch_tx: false,
            f_rx: 0.0,
            f_tx: 0.0,
        }
    }

    /// Whether this word is a queue-reset marker
    #[must_use]
    pub const fn is_reset(&self) -> bool {
        self.cmd == QUEUE_RESET_CMD
    }
}

/// Bounded FIFO of recent decoded words
///
/// Capacity [`OSW_QUEUE_SIZE`]; pushing onto a full queue discards the
/// oldest word. Putback of words popped during a failed multi-word match
/// goes through [`OswQueue::push_front`].
#[derive(Debug, Default)]
pub struct OswQueue {
    inner: VecDeque<Osw>,
}

impl OswQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: VecDeque::with_capacity(OSW_QUEUE_SIZE),
        }
    }

    /// Append a word, discarding the oldest on overflow
    pub fn push_back(&mut self, osw: Osw) {
        if self.inner.len() >= OSW_QUEUE_SIZE {
            self.inner.pop_front();
        }
        self.inner.push_back(osw);
    }

    /// Pop the oldest word
    pub fn pop_front(&mut self) -> Option<Osw> {
        self.inner.pop_front()
    }

    /// Put a word back at the head
    pub fn push_front(&mut self, osw: Osw) {
        self.inner.push_front(osw);
    }

    /// Drop every queued word
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Number of queued words
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Whether the queue holds its full capacity
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.inner.len() >= OSW_QUEUE_SIZE
    }

    /// Peek the head without removing it
    #[must_use]
    pub fn front(&self) -> Option<&Osw> {
        self.inner.front()
    }
}
