//! Catalog entries as fetched from the remote video catalog.
//!
//! Entries are immutable once fetched; identity is the [`VideoId`]. Fetching
//! and parsing the catalog happen outside this crate.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::state::VideoState;

/// Catalog identifier of a video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Create a video identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VideoId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for VideoId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Descriptive metadata carried by a catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Playback duration, when the catalog reports one.
    pub duration: Option<Duration>,
    /// Free-form description.
    pub description: Option<String>,
    /// Poster image URL.
    pub poster_url: Option<String>,
}

/// A remotely listed video available for online playback or download.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Catalog identifier.
    pub video_id: VideoId,
    /// Human-readable title.
    pub title: String,
    /// Descriptive metadata.
    pub metadata: VideoMetadata,
    /// Whether a downloadable source exists for this video.
    ///
    /// Videos without one are playable online only and never enter the
    /// download state machine.
    pub downloadable: bool,
}

impl CatalogEntry {
    /// Create a downloadable catalog entry.
    pub fn new(video_id: impl Into<VideoId>, title: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            title: title.into(),
            metadata: VideoMetadata::default(),
            downloadable: true,
        }
    }

    /// Create an entry that can only be streamed.
    pub fn online_only(video_id: impl Into<VideoId>, title: impl Into<String>) -> Self {
        Self {
            downloadable: false,
            ..Self::new(video_id, title)
        }
    }

    /// Set the playback duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.metadata.duration = Some(duration);
        self
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: VideoMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// State of this video when no download token exists for it.
    pub fn initial_state(&self) -> VideoState {
        if self.downloadable {
            VideoState::Downloadable
        } else {
            VideoState::OnlineOnly
        }
    }

    /// Content fingerprint used to detect a changed entry across catalog
    /// refreshes.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_follows_capability_flag() {
        assert_eq!(
            CatalogEntry::new("v1", "One").initial_state(),
            VideoState::Downloadable
        );
        assert_eq!(
            CatalogEntry::online_only("v2", "Two").initial_state(),
            VideoState::OnlineOnly
        );
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let entry = CatalogEntry::new("v1", "One");
        let same = CatalogEntry::new("v1", "One");
        let longer = entry.clone().with_duration(Duration::from_secs(90));

        assert_eq!(entry.fingerprint(), same.fingerprint());
        assert_ne!(entry.fingerprint(), longer.fingerprint());
    }

    #[test]
    fn test_video_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&VideoId::new("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }
}
