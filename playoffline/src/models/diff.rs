//! Row-level change sets.

/// Rows touched by one model update.
///
/// `removed` holds indices into the rows as they were before the update;
/// `inserted` and `updated` hold indices into the rows after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowDiff {
    pub inserted: Vec<usize>,
    pub updated: Vec<usize>,
    pub removed: Vec<usize>,
}

impl RowDiff {
    /// A diff with no changes.
    pub fn none() -> Self {
        Self::default()
    }

    /// A single inserted row.
    pub fn inserted(index: usize) -> Self {
        Self {
            inserted: vec![index],
            ..Self::default()
        }
    }

    /// A single updated row.
    pub fn updated(index: usize) -> Self {
        Self {
            updated: vec![index],
            ..Self::default()
        }
    }

    /// A single removed row.
    pub fn removed(index: usize) -> Self {
        Self {
            removed: vec![index],
            ..Self::default()
        }
    }

    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}
