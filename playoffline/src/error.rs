//! Error types for the download core.

use thiserror::Error;

use crate::catalog::VideoId;
use crate::registry::DownloadToken;
use crate::state::{Input, VideoState};

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the registry, state machine and notifier.
///
/// None of these are fatal to the application. `AlreadyRegistered` and
/// `InvalidTransition` mean a request or callback was dropped;
/// `EngineFailure` describes a download that ended in the `Error` state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A video already owns a download token (or the token is taken).
    #[error("video {video_id} already has download token {token}")]
    AlreadyRegistered {
        video_id: VideoId,
        token: DownloadToken,
    },

    /// The input is not valid for the video's current state.
    #[error("{input} is not valid for video {video_id} in state {state}")]
    InvalidTransition {
        video_id: VideoId,
        state: VideoState,
        input: Input,
    },

    /// The engine reported that a download failed.
    #[error("download {token} of video {video_id} failed: {reason}")]
    EngineFailure {
        video_id: VideoId,
        token: DownloadToken,
        reason: String,
    },

    /// A subscriber tried to publish from inside its own handler.
    #[error("publish attempted from inside a subscriber handler")]
    ReentrantPublish,

    /// A subscriber could not be borrowed for delivery.
    #[error("subscriber #{index} is borrowed elsewhere")]
    SubscriberBusy { index: usize },

    /// The video is neither in the catalog nor in the download records.
    #[error("unknown video: {0}")]
    UnknownVideo(VideoId),

    /// The engine referenced a token that is not registered.
    #[error("unknown download token: {0}")]
    UnknownToken(DownloadToken),
}

impl CoreError {
    /// Whether this error reflects an ignored, out-of-order input rather
    /// than a broken invariant.
    pub fn is_ignorable(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidTransition { .. } | CoreError::UnknownToken(_)
        )
    }
}
