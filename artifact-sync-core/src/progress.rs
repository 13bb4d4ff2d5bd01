//! Upload progress bookkeeping and the default `tracing`-backed progress sink.

use tracing::{info, warn};

use crate::contract::{AttemptOutcome, ProgressSink};

/// Byte progress of one file upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressState {
    bytes_sent: u64,
    total_bytes: u64,
}

impl ProgressState {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            bytes_sent: 0,
            total_bytes,
        }
    }

    /// Records `len` more bytes and returns the new counter value.
    pub fn advance(&mut self, len: u64) -> u64 {
        self.bytes_sent = self.bytes_sent.saturating_add(len);
        self.bytes_sent
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_sent >= self.total_bytes
    }
}

/// Default sink: reports everything as `tracing` events.
///
/// Progress is logged at most once per `log_every` bytes, plus the final chunk.
#[derive(Debug, Clone)]
pub struct TracingSink {
    log_every: u64,
}

impl TracingSink {
    pub fn new(log_every: u64) -> Self {
        Self {
            log_every: log_every.max(1),
        }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        // one line per 64 MiB
        Self::new(64 * 1024 * 1024)
    }
}

impl ProgressSink for TracingSink {
    fn on_progress(&self, label: &str, bytes_sent: u64, total_bytes: u64) {
        if bytes_sent == total_bytes || bytes_sent % self.log_every == 0 {
            let percent = if total_bytes == 0 {
                100.0
            } else {
                bytes_sent as f64 * 100.0 / total_bytes as f64
            };
            info!(
                label,
                bytes_sent,
                total_bytes,
                percent = format!("{percent:.1}"),
                "[UPLOAD] Progress"
            );
        }
    }

    fn on_attempt(&self, label: &str, attempt: u32, outcome: &AttemptOutcome) {
        match outcome {
            AttemptOutcome::Succeeded => {
                info!(label, attempt, "[PUBLISH] Attempt succeeded");
            }
            AttemptOutcome::Failed { error, retry_in } => {
                warn!(
                    label,
                    attempt,
                    error = %error,
                    retry_in = ?retry_in,
                    "[PUBLISH] Attempt failed"
                );
            }
        }
    }
}
