//! Table models feeding the catalog and downloads views.
//!
//! Both models are [`Subscriber`](crate::notifier::Subscriber)s: they receive
//! every [`VideoEvent`](crate::notifier::VideoEvent) from the notifier and
//! answer with a [`RowDiff`] describing the rows that changed, so the UI can
//! refresh incrementally.
//!
//! - [`CatalogModel`] - one row per catalog entry, keyed by video
//! - [`DownloadsModel`] - one row per download token, in the order downloads began

mod catalog;
mod diff;
mod downloads;
mod row;

pub use catalog::CatalogModel;
pub use diff::RowDiff;
pub use downloads::DownloadsModel;
pub use row::VideoRow;

/// View name reported by [`CatalogModel`].
pub const CATALOG_VIEW: &str = "catalog";

/// View name reported by [`DownloadsModel`].
pub const DOWNLOADS_VIEW: &str = "downloads";
