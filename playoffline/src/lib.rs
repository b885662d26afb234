//! PlayOffline - download state tracking for offline video playback
//!
//! This library keeps three independent views of a video catalog (the
//! browsing catalog, the downloads list and the settings-driven license
//! policy) consistent with the asynchronous, callback-driven state of an
//! external download engine.
//!
//! # Architecture
//!
//! ```text
//! DownloadEngine ──callbacks──► EngineSender ──► EngineReceiver
//!   (any thread)                                      │ pump() on owner thread
//!                                                     ▼
//!                                              OfflineLibrary
//!                    ┌──────────────┬──────────────┼──────────────┐
//!              TokenRegistry   state machine   SizeEstimator   ProgressTracker
//!                                                     │
//!                                                     ▼ VideoEvent
//!                                                 Notifier
//!                                          ┌──────────┴──────────┐
//!                                    CatalogModel          DownloadsModel
//! ```
//!
//! User commands (`request_download`, `request_pause`, ...) are validated
//! against the transition table and forwarded to the engine. State changes
//! only when the engine confirms them through a callback event.
//!
//! # Example
//!
//! ```ignore
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use playoffline::{
//!     engine_channel, CatalogEntry, CatalogModel, LibraryConfig, MemorySettings, Notifier,
//!     OfflineLibrary, SimulatedEngine, SimulationConfig,
//! };
//!
//! let (sender, receiver) = engine_channel();
//! let engine = SimulatedEngine::new(sender, SimulationConfig::default());
//!
//! let notifier = Rc::new(Notifier::new());
//! let catalog = Rc::new(RefCell::new(CatalogModel::new()));
//! notifier.subscribe(catalog.clone());
//!
//! let mut library = OfflineLibrary::new(
//!     &LibraryConfig::default(),
//!     Box::new(engine),
//!     receiver,
//!     Box::new(MemorySettings::default()),
//!     Rc::clone(&notifier),
//! );
//! library.use_catalog(vec![CatalogEntry::new("v1", "First video")])?;
//! library.request_download(&"v1".into())?;
//!
//! // Later, on the UI thread:
//! let diffs = library.pump();
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod library;
pub mod logging;
pub mod models;
pub mod notifier;
pub mod registry;
pub mod settings;
pub mod size;
pub mod state;

pub use catalog::{CatalogEntry, VideoId, VideoMetadata};
pub use config::LibraryConfig;
pub use engine::{
    engine_channel, DownloadEngine, EngineEvent, EngineEventKind, EngineReceiver, EngineSender,
    SimulatedEngine, SimulationConfig,
};
pub use error::{CoreError, CoreResult};
pub use library::{DownloadInfo, OfflineLibrary, OfflineRecord, RestoreReport};
pub use models::{CatalogModel, DownloadsModel, RowDiff, VideoRow};
pub use notifier::{Notifier, Subscriber, VideoEvent, ViewDiff};
pub use registry::{DownloadToken, TokenRegistry};
pub use settings::{IniSettingsStore, LicensePolicy, MemorySettings, SettingsError, SettingsStore};
pub use size::{format_size, BitrateSizeSource, SizeEstimator, SizeSource};
pub use state::{Command, Input, ProgressTracker, Signal, VideoState};
