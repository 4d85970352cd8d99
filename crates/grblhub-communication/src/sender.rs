//! Sender: character-counting streamer for a loaded G-code program.
//!
//! Grbl acknowledges each line with `ok`/`error` once it leaves the serial
//! receive buffer. The sender tracks the byte length of every in-flight line
//! and admits new lines only while the sum stays under the window, so the
//! firmware's receive buffer can never overrun. The single-byte `?` and the
//! `$G\n` polls bypass this accounting entirely; the default window leaves
//! 8 bytes of headroom for them.

use grblhub_core::{Context, SenderStatus};
use std::collections::VecDeque;

/// Grbl serial receive buffer size in bytes.
pub const GRBL_RX_BUFFER_SIZE: usize = 128;

/// Headroom reserved for realtime and poll bytes that bypass the window.
pub const WINDOW_HEADROOM: usize = 8;

/// Default outstanding-bytes ceiling.
pub const DEFAULT_WINDOW: usize = GRBL_RX_BUFFER_SIZE - WINDOW_HEADROOM;

#[derive(Debug, Clone, Default)]
struct Program {
    name: String,
    lines: Vec<String>,
    context: Context,
}

/// Character-counting streamer.
///
/// Invariants, preserved by every operation:
/// - `0 <= received <= sent <= total`
/// - `data_length == sum(queue)`
/// - a new line is admitted only when `data_length + len + 1 <= buffer_size`,
///   except that the window always accepts one line when empty.
#[derive(Debug, Default)]
pub struct Sender {
    program: Option<Program>,
    sent: usize,
    received: usize,
    buffer_size: usize,
    data_length: usize,
    queue: VecDeque<usize>,
}

impl Sender {
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_WINDOW,
            ..Self::default()
        }
    }

    /// Load a program, splitting it into lines on `\n`.
    ///
    /// Lines that are empty after trimming are dropped here; they would put
    /// no bytes on the wire and draw no acknowledgement, so they never
    /// occupy a slot. Returns `false` when nothing remains.
    ///
    /// Loading resets the window to the default so growth observed while a
    /// previous program was idle cannot over-admit this one.
    pub fn load(&mut self, name: &str, gcode: &str, context: Context) -> bool {
        let lines: Vec<String> = gcode
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();

        if lines.is_empty() {
            return false;
        }

        tracing::debug!("Loaded program '{}': {} lines", name, lines.len());
        self.program = Some(Program {
            name: name.to_string(),
            lines,
            context,
        });
        self.sent = 0;
        self.received = 0;
        self.buffer_size = DEFAULT_WINDOW;
        self.data_length = 0;
        self.queue.clear();
        true
    }

    /// Clear the loaded program and all streaming state.
    pub fn unload(&mut self) {
        self.program = None;
        self.sent = 0;
        self.received = 0;
        self.buffer_size = DEFAULT_WINDOW;
        self.data_length = 0;
        self.queue.clear();
    }

    /// Admit every not-yet-sent line that fits under the window and return
    /// them for transmission, in order.
    ///
    /// Each admitted line costs `len + 1` bytes for the appended newline.
    /// An oversized line is still admitted when nothing is in flight, so a
    /// single line longer than the window cannot wedge the stream.
    pub fn next(&mut self) -> Vec<String> {
        let Some(program) = &self.program else {
            return Vec::new();
        };

        let mut admitted = Vec::new();
        while self.sent < program.lines.len() {
            let line = &program.lines[self.sent];
            let cost = line.len() + 1;
            if self.data_length > 0 && self.data_length + cost > self.buffer_size {
                break;
            }
            self.queue.push_back(cost);
            self.data_length += cost;
            self.sent += 1;
            admitted.push(line.clone());
        }
        admitted
    }

    /// Consume one acknowledgement: pop the oldest in-flight byte count and
    /// advance `received`. A spurious ack with nothing in flight is ignored.
    pub fn ack(&mut self) {
        if let Some(cost) = self.queue.pop_front() {
            self.data_length -= cost;
            self.received += 1;
        }
    }

    /// Restart the program from the first line, dropping in-flight state.
    pub fn rewind(&mut self) {
        self.sent = 0;
        self.received = 0;
        self.data_length = 0;
        self.queue.clear();
    }

    /// Grow the window from a firmware-reported rx buffer size.
    ///
    /// Never shrinks, and never drops below the default. The controller only
    /// calls this while the workflow is idle with nothing in flight.
    pub fn grow_window(&mut self, reported_rx: usize) {
        let candidate = reported_rx.saturating_sub(WINDOW_HEADROOM);
        if candidate > self.buffer_size {
            tracing::debug!("Growing streaming window {} -> {}", self.buffer_size, candidate);
            self.buffer_size = candidate;
        }
    }

    /// Whether a program is loaded.
    pub fn is_loaded(&self) -> bool {
        self.program.is_some()
    }

    /// Whether every program line has been acknowledged.
    pub fn is_done(&self) -> bool {
        self.program
            .as_ref()
            .is_some_and(|p| self.received >= p.lines.len())
    }

    /// The program line at `index`, if loaded and in range.
    pub fn line_at(&self, index: usize) -> Option<&str> {
        self.program
            .as_ref()
            .and_then(|p| p.lines.get(index))
            .map(String::as_str)
    }

    /// Context supplied at load time.
    pub fn context(&self) -> Option<&Context> {
        self.program.as_ref().map(|p| &p.context)
    }

    pub fn total(&self) -> usize {
        self.program.as_ref().map_or(0, |p| p.lines.len())
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn data_length(&self) -> usize {
        self.data_length
    }

    /// Serializable snapshot for `sender:status`.
    pub fn status(&self) -> SenderStatus {
        SenderStatus {
            name: self
                .program
                .as_ref()
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            total: self.total(),
            sent: self.sent,
            received: self.received,
            buffer_size: self.buffer_size,
            data_length: self.data_length,
        }
    }

    #[cfg(test)]
    fn queued_bytes(&self) -> usize {
        self.queue.iter().sum()
    }
}
