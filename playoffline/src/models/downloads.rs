//! Downloads table model.

use std::collections::HashMap;

use super::{RowDiff, VideoRow, DOWNLOADS_VIEW};
use crate::catalog::VideoId;
use crate::notifier::{Subscriber, VideoEvent};
use crate::registry::DownloadToken;
use crate::state::VideoState;

/// In-progress and completed downloads, keyed by token, in the order the
/// downloads were first seen.
#[derive(Debug, Default)]
pub struct DownloadsModel {
    rows: Vec<VideoRow>,
    index: HashMap<DownloadToken, usize>,
}

impl DownloadsModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows.
    pub fn rows(&self) -> &[VideoRow] {
        &self.rows
    }

    /// Row at `index`.
    pub fn row(&self, index: usize) -> Option<&VideoRow> {
        self.rows.get(index)
    }

    /// Row for a token.
    pub fn row_for_token(&self, token: &DownloadToken) -> Option<&VideoRow> {
        self.index.get(token).map(|&i| &self.rows[i])
    }

    /// Video shown at `index`, for routing pause/resume/cancel/delete.
    pub fn video_id_at(&self, index: usize) -> Option<&VideoId> {
        self.rows.get(index).map(|row| &row.video_id)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no downloads.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows currently in `state`.
    pub fn count_in(&self, state: VideoState) -> usize {
        self.rows.iter().filter(|row| row.state == state).count()
    }

    /// Sum of display sizes over downloads with no active transfer.
    pub fn stored_bytes(&self) -> u64 {
        self.rows
            .iter()
            .filter(|row| row.state.is_terminal())
            .filter_map(|row| row.display_size)
            .sum()
    }

    fn upsert(&mut self, row: &VideoRow) -> RowDiff {
        let token = match (&row.token, row.state.has_token()) {
            (Some(token), true) => token,
            _ => return self.remove_video(&row.video_id),
        };

        match self.index.get(token) {
            Some(&i) if self.rows[i] == *row => RowDiff::none(),
            Some(&i) => {
                self.rows[i] = row.clone();
                RowDiff::updated(i)
            }
            None => {
                self.rows.push(row.clone());
                let i = self.rows.len() - 1;
                self.index.insert(token.clone(), i);
                RowDiff::inserted(i)
            }
        }
    }

    fn remove_token(&mut self, token: &DownloadToken) -> RowDiff {
        let Some(i) = self.index.get(token).copied() else {
            return RowDiff::none();
        };
        self.rows.remove(i);
        self.reindex();
        RowDiff::removed(i)
    }

    fn remove_video(&mut self, video_id: &VideoId) -> RowDiff {
        let token = self
            .rows
            .iter()
            .find(|row| &row.video_id == video_id)
            .and_then(|row| row.token.clone());
        match token {
            Some(token) => self.remove_token(&token),
            None => RowDiff::none(),
        }
    }

    /// Refresh rows whose catalog entry changed.
    fn refresh_from_catalog(&mut self, rows: &[VideoRow]) -> RowDiff {
        let mut diff = RowDiff::none();
        for row in rows {
            let Some(token) = &row.token else { continue };
            if let Some(&i) = self.index.get(token) {
                if self.rows[i] != *row {
                    self.rows[i] = row.clone();
                    diff.updated.push(i);
                }
            }
        }
        diff
    }

    fn reindex(&mut self) {
        self.index = self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| row.token.clone().map(|token| (token, i)))
            .collect();
    }
}

impl Subscriber for DownloadsModel {
    fn view_name(&self) -> &'static str {
        DOWNLOADS_VIEW
    }

    fn apply_event(&mut self, event: &VideoEvent) -> RowDiff {
        match event {
            VideoEvent::Updated(row) => self.upsert(row),
            VideoEvent::Removed { token, .. } => self.remove_token(token),
            VideoEvent::CatalogReplaced(rows) => self.refresh_from_catalog(rows),
        }
    }
}
