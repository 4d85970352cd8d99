//! Feeder: FIFO of ad-hoc lines awaiting transmission.
//!
//! Interactive lines (console input, macros, event hooks) queue here and are
//! interleaved with the sender's program stream one line per acknowledgement.
//! The feeder never writes to the serial port itself; the controller pulls
//! lines with [`Feeder::next`], translates inline expressions, and performs
//! the write.

use grblhub_core::{Context, FeederStatus};
use std::collections::VecDeque;

/// One queued line with its expression-substitution context.
#[derive(Debug, Clone, PartialEq)]
pub struct FeederLine {
    pub line: String,
    pub context: Context,
}

/// Unbounded FIFO of pending ad-hoc lines.
#[derive(Debug, Default)]
pub struct Feeder {
    queue: VecDeque<FeederLine>,
    hold: bool,
}

impl Feeder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append lines sharing one context to the tail.
    ///
    /// Returns the number of lines accepted; zero while the feeder is held
    /// (alarm lockout).
    pub fn feed(&mut self, lines: Vec<String>, context: Context) -> usize {
        if self.hold {
            return 0;
        }
        let count = lines.len();
        for line in lines {
            self.queue.push_back(FeederLine {
                line,
                context: context.clone(),
            });
        }
        count
    }

    /// Pop and return the head line, if any.
    pub fn next(&mut self) -> Option<FeederLine> {
        self.queue.pop_front()
    }

    /// The head line without popping it.
    pub fn peek(&self) -> Option<&FeederLine> {
        self.queue.front()
    }

    /// Drop all queued lines.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Whether at least one line is queued.
    pub fn is_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Refuse (or accept again) new lines. Held feeders drop their queue.
    pub fn set_hold(&mut self, hold: bool) {
        if hold {
            self.queue.clear();
        }
        self.hold = hold;
    }

    pub fn is_held(&self) -> bool {
        self.hold
    }

    /// Serializable snapshot for `feeder:status`.
    pub fn status(&self) -> FeederStatus {
        FeederStatus {
            queued: self.queue.len(),
            pending: self.is_pending(),
            hold: self.hold,
        }
    }
}
