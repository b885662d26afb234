//! Download records and their public projections.

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogEntry, VideoId};
use crate::error::CoreError;
use crate::registry::DownloadToken;
use crate::settings::LicensePolicy;
use crate::state::VideoState;

/// Live bookkeeping for a video that owns a token.
#[derive(Debug, Clone)]
pub(crate) struct DownloadRecord {
    /// Entry as of the latest catalog; kept when the entry leaves the catalog.
    pub entry: CatalogEntry,
    pub token: DownloadToken,
    pub state: VideoState,
    /// Policy in force when the download was requested.
    pub license: LicensePolicy,
    pub failure: Option<String>,
}

/// A download persisted by the engine, replayed at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineRecord {
    pub entry: CatalogEntry,
    pub token: DownloadToken,
    pub state: VideoState,
    pub progress: f64,
    /// Final size, for completed downloads.
    pub bytes: Option<u64>,
    pub license: LicensePolicy,
}

/// Outcome of [`OfflineLibrary::restore`](super::OfflineLibrary::restore).
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Records accepted.
    pub restored: usize,
    /// Records rejected, with the reason.
    pub rejected: Vec<CoreError>,
    /// View diffs produced while publishing restored rows.
    pub diffs: Vec<crate::notifier::ViewDiff>,
}

/// Details shown for a selected download.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadInfo {
    pub video_id: VideoId,
    pub title: String,
    pub token: DownloadToken,
    pub state: VideoState,
    pub progress: Option<f64>,
    pub display_size: Option<u64>,
    pub license: LicensePolicy,
    pub failure_reason: Option<String>,
}

impl DownloadInfo {
    /// The engine failure behind an `Error` state.
    pub fn failure(&self) -> Option<CoreError> {
        self.failure_reason
            .as_ref()
            .map(|reason| CoreError::EngineFailure {
                video_id: self.video_id.clone(),
                token: self.token.clone(),
                reason: reason.clone(),
            })
    }
}
