//! Storage size estimates and final download sizes.
//!
//! Two independent caches with different keys:
//! - estimated bytes by video, filled before a download starts
//! - actual bytes by token, filled once when the engine reports completion
//!
//! An estimate is never overwritten by an actual size. Views ask for
//! [`SizeEstimator::display_size`], which prefers the actual size.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::catalog::{CatalogEntry, VideoId};
use crate::registry::DownloadToken;

/// Text shown while no size is known yet.
pub const SIZE_PENDING_LABEL: &str = "calculating…";

/// Produces a pre-download size estimate for a catalog entry.
pub trait SizeSource {
    /// Estimated bytes, or `None` if the entry carries too little information.
    fn estimate_bytes(&self, entry: &CatalogEntry) -> Option<u64>;
}

/// Estimates size from the entry's duration at a fixed bitrate.
#[derive(Debug, Clone, Copy)]
pub struct BitrateSizeSource {
    bitrate_bps: u64,
}

impl BitrateSizeSource {
    /// Create a source estimating at `bitrate_bps` bits per second.
    pub fn new(bitrate_bps: u64) -> Self {
        Self { bitrate_bps }
    }
}

impl SizeSource for BitrateSizeSource {
    fn estimate_bytes(&self, entry: &CatalogEntry) -> Option<u64> {
        let duration = entry.metadata.duration?;
        Some((duration.as_secs_f64() * self.bitrate_bps as f64 / 8.0) as u64)
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedEstimate {
    fingerprint: u64,
    bytes: Option<u64>,
}

/// Caches estimated sizes by video and actual sizes by token.
#[derive(Debug, Default)]
pub struct SizeEstimator {
    estimates: HashMap<VideoId, CachedEstimate>,
    actual: HashMap<DownloadToken, u64>,
}

impl SizeEstimator {
    /// Create empty caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimated size for an entry, computed through `source` on first use.
    ///
    /// The result (including "unknown") is cached per video and only
    /// recomputed when the entry's content changes.
    pub fn estimate(&mut self, entry: &CatalogEntry, source: &dyn SizeSource) -> Option<u64> {
        let fingerprint = entry.fingerprint();
        if let Some(cached) = self.estimates.get(&entry.video_id) {
            if cached.fingerprint == fingerprint {
                return cached.bytes;
            }
        }

        let bytes = source.estimate_bytes(entry);
        debug!(video_id = %entry.video_id, bytes = ?bytes, "Estimated download size");
        self.estimates.insert(
            entry.video_id.clone(),
            CachedEstimate { fingerprint, bytes },
        );
        bytes
    }

    /// Cached estimate without computing one.
    pub fn cached_estimate(&self, video_id: &VideoId) -> Option<u64> {
        self.estimates.get(video_id).and_then(|cached| cached.bytes)
    }

    /// Drop a video's estimate so the next display recomputes it.
    pub fn invalidate(&mut self, video_id: &VideoId) {
        self.estimates.remove(video_id);
    }

    /// Record the final size of a completed download.
    ///
    /// Returns `false` and leaves the existing value in place if the token
    /// was already finalized.
    pub fn finalize(&mut self, token: DownloadToken, bytes: u64) -> bool {
        if let Some(existing) = self.actual.get(&token) {
            warn!(token = %token, existing, rejected = bytes, "Download size already finalized");
            return false;
        }
        self.actual.insert(token, bytes);
        true
    }

    /// Final size of a completed download.
    pub fn actual(&self, token: &DownloadToken) -> Option<u64> {
        self.actual.get(token).copied()
    }

    /// Forget a token's final size after its download is deleted.
    pub fn forget_token(&mut self, token: &DownloadToken) {
        self.actual.remove(token);
    }

    /// Size to show for a video: actual by token, else estimate by video.
    pub fn display_size(&self, video_id: &VideoId, token: Option<&DownloadToken>) -> Option<u64> {
        token
            .and_then(|t| self.actual(t))
            .or_else(|| self.cached_estimate(video_id))
    }
}

/// Human-readable size, or the pending label when unknown.
pub fn format_size(bytes: Option<u64>) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    match bytes {
        None => SIZE_PENDING_LABEL.to_string(),
        Some(b) if b >= GB => format!("{:.2} GB", b as f64 / GB as f64),
        Some(b) if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        Some(b) if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        Some(b) => format!("{} bytes", b),
    }
}
