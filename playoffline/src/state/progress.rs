//! Per-token download progress.
//!
//! Progress is a fraction in `[0, 1]`. While a download is running the value
//! only moves forward; the state machine stops feeding it updates while the
//! download is paused, and only a fresh restart puts it back to zero.

use std::collections::HashMap;

use crate::registry::DownloadToken;

/// Monotonic progress fractions keyed by download token.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    by_token: HashMap<DownloadToken, f64>,
}

impl ProgressTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin tracking a token at zero.
    pub fn start(&mut self, token: DownloadToken) {
        self.by_token.insert(token, 0.0);
    }

    /// Track a token at a known fraction, e.g. when restoring persisted state.
    pub fn restore(&mut self, token: DownloadToken, fraction: f64) {
        let value = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.by_token.insert(token, value);
    }

    /// Move a token's progress forward.
    ///
    /// Returns the new value, or `None` when the update was dropped: the
    /// token is unknown, the value is not finite, or it does not exceed the
    /// current progress.
    pub fn advance(&mut self, token: &DownloadToken, fraction: f64) -> Option<f64> {
        if !fraction.is_finite() {
            return None;
        }
        let current = self.by_token.get_mut(token)?;
        let value = fraction.clamp(0.0, 1.0);
        if value <= *current {
            return None;
        }
        *current = value;
        Some(value)
    }

    /// Mark a token fully transferred.
    pub fn complete(&mut self, token: &DownloadToken) {
        if let Some(current) = self.by_token.get_mut(token) {
            *current = 1.0;
        }
    }

    /// Put a token back to zero for a fresh restart.
    pub fn reset(&mut self, token: &DownloadToken) {
        if let Some(current) = self.by_token.get_mut(token) {
            *current = 0.0;
        }
    }

    /// Current fraction for a token.
    pub fn get(&self, token: &DownloadToken) -> Option<f64> {
        self.by_token.get(token).copied()
    }

    /// Stop tracking a token.
    pub fn remove(&mut self, token: &DownloadToken) -> Option<f64> {
        self.by_token.remove(token)
    }
}
