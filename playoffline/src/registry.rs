//! Download token registry.
//!
//! Maps a catalog video to zero-or-one engine-issued download token and back.
//! This is the source of truth for "is this video downloaded or downloading".
//!
//! Both directions are kept in separate hash maps and are only ever mutated
//! together, so `lookup` and `lookup_video_id` are always inverse.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog::VideoId;
use crate::error::{CoreError, CoreResult};

/// Opaque handle issued by the download engine for one offline copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadToken(String);

impl DownloadToken {
    /// Wrap an engine-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DownloadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DownloadToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

/// Bidirectional video ⇄ token map.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    by_video: HashMap<VideoId, DownloadToken>,
    by_token: HashMap<DownloadToken, VideoId>,
}

impl TokenRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `token` with `video_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AlreadyRegistered`] if the video already has a
    /// live token, or if the token is already bound to another video. The
    /// registry is left untouched in both cases.
    pub fn register(&mut self, video_id: VideoId, token: DownloadToken) -> CoreResult<()> {
        if let Some(existing) = self.by_video.get(&video_id) {
            warn!(video_id = %video_id, token = %existing, rejected = %token, "Video already has a download token");
            return Err(CoreError::AlreadyRegistered {
                video_id,
                token: existing.clone(),
            });
        }
        if let Some(owner) = self.by_token.get(&token) {
            warn!(video_id = %owner, token = %token, rejected = %video_id, "Token already bound to another video");
            return Err(CoreError::AlreadyRegistered {
                video_id: owner.clone(),
                token,
            });
        }

        self.by_token.insert(token.clone(), video_id.clone());
        self.by_video.insert(video_id, token);
        Ok(())
    }

    /// Token registered for a video.
    pub fn lookup(&self, video_id: &VideoId) -> Option<&DownloadToken> {
        self.by_video.get(video_id)
    }

    /// Video a token was registered for.
    pub fn lookup_video_id(&self, token: &DownloadToken) -> Option<&VideoId> {
        self.by_token.get(token)
    }

    /// Remove a token's mapping. No-op if the token is not registered.
    ///
    /// Returns the video the token belonged to, if any.
    pub fn unregister(&mut self, token: &DownloadToken) -> Option<VideoId> {
        let video_id = self.by_token.remove(token)?;
        self.by_video.remove(&video_id);
        Some(video_id)
    }

    /// Number of registered tokens.
    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    /// Whether no tokens are registered.
    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }

    /// Iterate over `(video, token)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&VideoId, &DownloadToken)> {
        self.by_video.iter()
    }
}
