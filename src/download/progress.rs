//! Byte-threshold progress tracking for streamed downloads

use crate::types::Progress;

/// Decides when a streamed download reports progress
///
/// A report is produced each time the written byte count crosses another
/// multiple of `interval`. The reported expected size is never below the
/// written count, so observers never see more than 100%.
#[derive(Debug)]
pub struct ProgressTracker {
    written: u64,
    expected: Option<u64>,
    interval: u64,
    next_report: u64,
    last_reported: Option<u64>,
}

impl ProgressTracker {
    /// Track a download of `expected` bytes (if known), reporting every `interval` bytes
    pub fn new(expected: Option<u64>, interval: u64) -> Self {
        let interval = interval.max(1);
        Self {
            written: 0,
            expected,
            interval,
            next_report: interval,
            last_reported: None,
        }
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Expected size announced by the server
    pub fn expected(&self) -> Option<u64> {
        self.expected
    }

    /// Record `bytes` more written, returning a report when a threshold was crossed
    pub fn advance(&mut self, bytes: u64) -> Option<Progress> {
        self.written = self.written.saturating_add(bytes);
        if self.written < self.next_report {
            return None;
        }
        self.next_report = (self.written / self.interval + 1).saturating_mul(self.interval);
        self.last_reported = Some(self.written);
        Some(self.current())
    }

    /// Final report once the stream ended
    ///
    /// The total is now known, so the expected size becomes the written count.
    /// Returns `None` when the last threshold report already covered it.
    pub fn finish(&mut self) -> Option<Progress> {
        self.expected = Some(self.written);
        if self.last_reported == Some(self.written) {
            return None;
        }
        self.last_reported = Some(self.written);
        Some(self.current())
    }

    /// Current state
    pub fn current(&self) -> Progress {
        Progress {
            bytes_written: self.written,
            bytes_expected: self.expected.map(|e| e.max(self.written)),
        }
    }
}
