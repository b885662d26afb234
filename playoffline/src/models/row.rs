//! Per-row view model.

use serde::{Deserialize, Serialize};

use crate::catalog::VideoId;
use crate::registry::DownloadToken;
use crate::size::format_size;
use crate::state::VideoState;

/// Everything a view needs to render one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRow {
    pub video_id: VideoId,
    pub title: String,
    pub state: VideoState,
    /// Present iff the state holds a token.
    pub token: Option<DownloadToken>,
    /// Transfer progress in `[0, 1]`, while a token exists.
    pub progress: Option<f64>,
    /// Actual size when downloaded, otherwise the estimate.
    pub display_size: Option<u64>,
}

impl VideoRow {
    /// Display size as text, e.g. `95.0 MB` or `calculating…`.
    pub fn size_label(&self) -> String {
        format_size(self.display_size)
    }

    /// Progress rounded to whole percent.
    pub fn progress_percent(&self) -> Option<u8> {
        self.progress.map(|p| (p.clamp(0.0, 1.0) * 100.0).round() as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> VideoRow {
        VideoRow {
            video_id: VideoId::new("v1"),
            title: "One".to_string(),
            state: VideoState::Downloading,
            token: Some(DownloadToken::new("t1")),
            progress: Some(0.426),
            display_size: None,
        }
    }

    #[test]
    fn test_labels() {
        let row = row();
        assert_eq!(row.progress_percent(), Some(43));
        assert_eq!(row.size_label(), "calculating…");
    }

    #[test]
    fn test_serializes_for_ui() {
        let json = serde_json::to_value(row()).unwrap();
        assert_eq!(json["video_id"], "v1");
        assert_eq!(json["state"], "Downloading");
        assert_eq!(json["token"], "t1");
    }
}
