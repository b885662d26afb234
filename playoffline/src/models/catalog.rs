//! Catalog table model.

use std::collections::{HashMap, HashSet};

use super::{RowDiff, VideoRow, CATALOG_VIEW};
use crate::catalog::VideoId;
use crate::notifier::{Subscriber, VideoEvent};

/// Ordered catalog rows keyed by video.
#[derive(Debug, Default)]
pub struct CatalogModel {
    rows: Vec<VideoRow>,
    index: HashMap<VideoId, usize>,
}

impl CatalogModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows in catalog order.
    pub fn rows(&self) -> &[VideoRow] {
        &self.rows
    }

    /// Row at `index`.
    pub fn row(&self, index: usize) -> Option<&VideoRow> {
        self.rows.get(index)
    }

    /// Row for a video.
    pub fn row_for(&self, video_id: &VideoId) -> Option<&VideoRow> {
        self.index.get(video_id).map(|&i| &self.rows[i])
    }

    /// Position of a video's row.
    pub fn index_of(&self, video_id: &VideoId) -> Option<usize> {
        self.index.get(video_id).copied()
    }

    /// Video shown at `index`, for routing user commands.
    pub fn video_id_at(&self, index: usize) -> Option<&VideoId> {
        self.rows.get(index).map(|row| &row.video_id)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Replace every row, diffing by video.
    ///
    /// Rows kept from the previous catalog are reported as updated only if
    /// their content or position changed.
    pub fn set_rows(&mut self, rows: Vec<VideoRow>) -> RowDiff {
        let incoming: HashSet<&VideoId> = rows.iter().map(|row| &row.video_id).collect();

        let removed = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !incoming.contains(&row.video_id))
            .map(|(i, _)| i)
            .collect();

        let mut inserted = Vec::new();
        let mut updated = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            match self.index.get(&row.video_id) {
                None => inserted.push(i),
                Some(&old) if old != i || self.rows[old] != *row => updated.push(i),
                Some(_) => {}
            }
        }

        self.rows = rows;
        self.reindex();

        RowDiff {
            inserted,
            updated,
            removed,
        }
    }

    fn update_row(&mut self, row: &VideoRow) -> RowDiff {
        let Some(&i) = self.index.get(&row.video_id) else {
            // Downloads may outlive their catalog entry.
            return RowDiff::none();
        };
        if self.rows[i] == *row {
            return RowDiff::none();
        }
        self.rows[i] = row.clone();
        RowDiff::updated(i)
    }

    fn reindex(&mut self) {
        self.index = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.video_id.clone(), i))
            .collect();
    }
}

impl Subscriber for CatalogModel {
    fn view_name(&self) -> &'static str {
        CATALOG_VIEW
    }

    fn apply_event(&mut self, event: &VideoEvent) -> RowDiff {
        match event {
            VideoEvent::Updated(row) | VideoEvent::Removed { row, .. } => self.update_row(row),
            VideoEvent::CatalogReplaced(rows) => self.set_rows(rows.clone()),
        }
    }
}
