//! Offline library coordinator.
//!
//! [`OfflineLibrary`] owns the token registry, per-video download records,
//! progress and size caches. It is the only place the state machine is
//! driven from:
//!
//! - user commands are validated against the command table and forwarded to
//!   the engine; nothing changes until the engine confirms
//! - engine events are applied through the event table; events that do not
//!   fit the current state are logged and ignored
//! - every accepted change is published through the [`Notifier`] so all
//!   subscribed views update in the same cycle
//!
//! The library is single-threaded. Engine callbacks reach it through
//! [`EngineReceiver`], drained by [`OfflineLibrary::pump`] on the owner
//! thread.

mod record;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, info, trace, warn};

use crate::catalog::{CatalogEntry, VideoId};
use crate::config::LibraryConfig;
use crate::engine::{DownloadEngine, EngineEvent, EngineEventKind, EngineReceiver};
use crate::error::{CoreError, CoreResult};
use crate::models::VideoRow;
use crate::notifier::{Notifier, VideoEvent, ViewDiff};
use crate::registry::{DownloadToken, TokenRegistry};
use crate::settings::{LicensePolicy, SettingsStore};
use crate::size::{BitrateSizeSource, SizeEstimator, SizeSource};
use crate::state::{
    command_action, next_state, Command, CommandAction, Input, ProgressTracker, Signal, VideoState,
};

use record::DownloadRecord;
pub use record::{DownloadInfo, OfflineRecord, RestoreReport};

/// Upper bound on events applied by one [`OfflineLibrary::pump`] call, so a
/// chatty engine cannot starve the UI thread.
pub const MAX_EVENTS_PER_PUMP: usize = 1024;

/// Download state for a video catalog, reconciled across views.
pub struct OfflineLibrary {
    engine: Box<dyn DownloadEngine>,
    events: EngineReceiver,
    settings: Box<dyn SettingsStore>,
    notifier: Rc<Notifier>,
    size_source: Box<dyn SizeSource>,
    catalog: Vec<CatalogEntry>,
    catalog_index: HashMap<VideoId, usize>,
    registry: TokenRegistry,
    records: HashMap<VideoId, DownloadRecord>,
    /// Download requests awaiting the engine's `Started` callback.
    pending: HashMap<VideoId, LicensePolicy>,
    /// Event received while a view was busy; applied before the queue.
    deferred: Option<EngineEvent>,
    progress: ProgressTracker,
    sizes: SizeEstimator,
}

impl fmt::Debug for OfflineLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineLibrary")
            .field("catalog", &self.catalog.len())
            .field("registry", &self.registry)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl OfflineLibrary {
    /// Create a library with an empty catalog.
    pub fn new(
        config: &LibraryConfig,
        engine: Box<dyn DownloadEngine>,
        events: EngineReceiver,
        settings: Box<dyn SettingsStore>,
        notifier: Rc<Notifier>,
    ) -> Self {
        Self {
            engine,
            events,
            settings,
            notifier,
            size_source: Box::new(BitrateSizeSource::new(config.estimated_bitrate_bps)),
            catalog: Vec::new(),
            catalog_index: HashMap::new(),
            registry: TokenRegistry::new(),
            records: HashMap::new(),
            pending: HashMap::new(),
            deferred: None,
            progress: ProgressTracker::new(),
            sizes: SizeEstimator::new(),
        }
    }

    /// Replace the size source used for pre-download estimates.
    pub fn with_size_source(mut self, source: Box<dyn SizeSource>) -> Self {
        self.size_source = source;
        self
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// The notifier this library publishes to.
    pub fn notifier(&self) -> &Rc<Notifier> {
        &self.notifier
    }

    /// Catalog entries in catalog order.
    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    /// Catalog entry for a video, or the entry remembered by its download.
    pub fn entry(&self, video_id: &VideoId) -> Option<&CatalogEntry> {
        self.catalog_index
            .get(video_id)
            .map(|&i| &self.catalog[i])
            .or_else(|| self.records.get(video_id).map(|r| &r.entry))
    }

    /// Current state of a video, or `None` if the video is unknown.
    pub fn state(&self, video_id: &VideoId) -> Option<VideoState> {
        match self.records.get(video_id) {
            Some(record) => Some(record.state),
            None => self.entry(video_id).map(CatalogEntry::initial_state),
        }
    }

    /// Token held by a video.
    pub fn token(&self, video_id: &VideoId) -> Option<&DownloadToken> {
        self.registry.lookup(video_id)
    }

    /// The token registry.
    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    /// Progress of a video's download.
    pub fn progress(&self, video_id: &VideoId) -> Option<f64> {
        self.token(video_id).and_then(|t| self.progress.get(t))
    }

    /// Size to show for a video: actual if downloaded, else the cached estimate.
    pub fn display_size(&self, video_id: &VideoId) -> Option<u64> {
        self.sizes.display_size(video_id, self.token(video_id))
    }

    /// Whether a download was requested and the engine has not yet answered.
    pub fn is_pending(&self, video_id: &VideoId) -> bool {
        self.pending.contains_key(video_id)
    }

    /// Forget a download request the engine never answered.
    ///
    /// A `Started` event arriving later still registers the download, with
    /// the current license policy. Returns `false` if nothing was pending.
    pub fn cancel_pending(&mut self, video_id: &VideoId) -> bool {
        let cleared = self.pending.remove(video_id).is_some();
        if cleared {
            info!(video_id = %video_id, "Pending download request cleared");
        }
        cleared
    }

    /// License policy that the next download would use.
    pub fn license_policy(&self) -> LicensePolicy {
        self.settings.license_policy()
    }

    /// View model for one video, computing its size estimate on first use.
    pub fn row(&mut self, video_id: &VideoId) -> Option<VideoRow> {
        self.build_row(video_id)
    }

    /// View models for the whole catalog, in catalog order.
    pub fn rows(&mut self) -> Vec<VideoRow> {
        let ids: Vec<VideoId> = self.catalog.iter().map(|e| e.video_id.clone()).collect();
        ids.iter().filter_map(|id| self.build_row(id)).collect()
    }

    /// Details for a video holding a token.
    pub fn download_info(&self, video_id: &VideoId) -> Option<DownloadInfo> {
        let record = self.records.get(video_id)?;
        Some(DownloadInfo {
            video_id: video_id.clone(),
            title: record.entry.title.clone(),
            token: record.token.clone(),
            state: record.state,
            progress: self.progress.get(&record.token),
            display_size: self.sizes.display_size(video_id, Some(&record.token)),
            license: record.license,
            failure_reason: record.failure.clone(),
        })
    }

    // ------------------------------------------------------------------
    // User commands
    // ------------------------------------------------------------------

    /// Ask the engine to download a `Downloadable` video.
    pub fn request_download(&mut self, video_id: &VideoId) -> CoreResult<Vec<ViewDiff>> {
        self.request(video_id, Command::Download)
    }

    /// Ask the engine to pause a `Downloading` video.
    pub fn request_pause(&mut self, video_id: &VideoId) -> CoreResult<Vec<ViewDiff>> {
        self.request(video_id, Command::Pause)
    }

    /// Ask the engine to resume a `Paused` video.
    pub fn request_resume(&mut self, video_id: &VideoId) -> CoreResult<Vec<ViewDiff>> {
        self.request(video_id, Command::Resume)
    }

    /// Ask the engine to cancel a `Downloading` or `Paused` video.
    pub fn request_cancel(&mut self, video_id: &VideoId) -> CoreResult<Vec<ViewDiff>> {
        self.request(video_id, Command::Cancel)
    }

    /// Delete a `Cancelled`, `Downloaded` or `Error` video's download.
    ///
    /// Takes effect immediately: the token is unregistered and a
    /// [`VideoEvent::Removed`] is published before this returns.
    pub fn request_delete(&mut self, video_id: &VideoId) -> CoreResult<Vec<ViewDiff>> {
        self.request(video_id, Command::Delete)
    }

    /// Restart a failed download from zero.
    pub fn request_retry(&mut self, video_id: &VideoId) -> CoreResult<Vec<ViewDiff>> {
        self.request(video_id, Command::Retry)
    }

    fn request(&mut self, video_id: &VideoId, command: Command) -> CoreResult<Vec<ViewDiff>> {
        let state = self.state(video_id).ok_or_else(|| {
            warn!(video_id = %video_id, %command, "Command for unknown video");
            CoreError::UnknownVideo(video_id.clone())
        })?;
        let Some(action) = command_action(state, command) else {
            return Err(self.reject(video_id, state, Input::Command(command)));
        };

        match action {
            CommandAction::Start => self.start(video_id),
            CommandAction::Pause => self.forward(video_id, command, |engine, token| engine.pause(token)),
            CommandAction::Resume => {
                self.forward(video_id, command, |engine, token| engine.resume(token))
            }
            CommandAction::Cancel => {
                self.forward(video_id, command, |engine, token| engine.cancel(token))
            }
            CommandAction::Delete => self.delete(video_id),
        }
    }

    fn start(&mut self, video_id: &VideoId) -> CoreResult<Vec<ViewDiff>> {
        if self.pending.contains_key(video_id) {
            debug!(video_id = %video_id, "Download already requested");
            return Err(self.reject(
                video_id,
                VideoState::Downloadable,
                Input::Command(Command::Download),
            ));
        }
        let entry = self
            .catalog_index
            .get(video_id)
            .map(|&i| self.catalog[i].clone())
            .ok_or_else(|| CoreError::UnknownVideo(video_id.clone()))?;

        let policy = self.settings.license_policy();
        self.pending.insert(video_id.clone(), policy);
        info!(video_id = %video_id, policy = %policy, "Requesting download");
        self.engine.start_download(&entry, &policy);
        Ok(Vec::new())
    }

    fn forward(
        &self,
        video_id: &VideoId,
        command: Command,
        send: impl FnOnce(&dyn DownloadEngine, &DownloadToken),
    ) -> CoreResult<Vec<ViewDiff>> {
        let token = self
            .registry
            .lookup(video_id)
            .ok_or_else(|| CoreError::UnknownVideo(video_id.clone()))?;
        info!(video_id = %video_id, token = %token, %command, "Forwarding command to engine");
        send(self.engine.as_ref(), token);
        Ok(Vec::new())
    }

    fn delete(&mut self, video_id: &VideoId) -> CoreResult<Vec<ViewDiff>> {
        self.notifier.ensure_ready()?;
        let record = self
            .records
            .remove(video_id)
            .ok_or_else(|| CoreError::UnknownVideo(video_id.clone()))?;
        let token = record.token.clone();

        self.registry.unregister(&token);
        self.progress.remove(&token);
        self.sizes.forget_token(&token);
        info!(video_id = %video_id, token = %token, from = ?record.state, "Download deleted");
        self.engine.delete_local(&token);

        let row = match self.build_row(video_id) {
            Some(row) => row,
            // Entry already left the catalog; describe it from the record.
            None => VideoRow {
                video_id: video_id.clone(),
                title: record.entry.title.clone(),
                state: record.entry.initial_state(),
                token: None,
                progress: None,
                display_size: self.sizes.cached_estimate(video_id),
            },
        };
        self.notifier.publish(&VideoEvent::Removed { token, row })
    }

    fn reject(&self, video_id: &VideoId, state: VideoState, input: Input) -> CoreError {
        debug!(video_id = %video_id, state = ?state, %input, "Ignoring input not valid in current state");
        CoreError::InvalidTransition {
            video_id: video_id.clone(),
            state,
            input,
        }
    }

    // ------------------------------------------------------------------
    // Engine events
    // ------------------------------------------------------------------

    /// Apply every queued engine event, in arrival order.
    ///
    /// Events rejected by the state machine are logged and skipped. Returns
    /// the diffs of every view update made along the way.
    pub fn pump(&mut self) -> Vec<ViewDiff> {
        let mut diffs = Vec::new();
        for _ in 0..MAX_EVENTS_PER_PUMP {
            if let Err(e) = self.notifier.ensure_ready() {
                debug!(error = %e, "Views busy, engine events left queued");
                break;
            }
            let Some(event) = self.deferred.take().or_else(|| self.events.try_next()) else {
                break;
            };
            match self.handle_event(event) {
                Ok(mut applied) => diffs.append(&mut applied),
                Err(e) if e.is_ignorable() => {}
                Err(e) => warn!(error = %e, "Engine event dropped"),
            }
        }
        diffs
    }

    /// Wait for the next engine event and apply it.
    ///
    /// Returns `None` once every engine sender has been dropped.
    pub async fn pump_next(&mut self) -> Option<CoreResult<Vec<ViewDiff>>> {
        let event = match self.deferred.take() {
            Some(event) => event,
            None => self.events.next().await?,
        };
        if let Err(e) = self.notifier.ensure_ready() {
            // Keep the event for the next pump instead of dropping it.
            self.deferred = Some(event);
            return Some(Err(e));
        }
        Some(self.handle_event(event))
    }

    /// Apply one engine event delivered on the owner thread.
    ///
    /// # Errors
    ///
    /// - [`CoreError::AlreadyRegistered`] for a `Started` event on a video
    ///   that already holds a token
    /// - [`CoreError::UnknownToken`] for an event on an unregistered token
    /// - [`CoreError::InvalidTransition`] when the event does not fit the
    ///   video's current state; nothing changes
    /// - [`CoreError::SubscriberBusy`] when a view is borrowed elsewhere; the
    ///   event is not applied and may be handed in again
    pub fn handle_event(&mut self, event: EngineEvent) -> CoreResult<Vec<ViewDiff>> {
        self.notifier.ensure_ready()?;
        let EngineEvent { token, kind } = event;
        let kind = match kind {
            EngineEventKind::Started { video_id } => return self.on_started(video_id, token),
            other => other,
        };
        let signal = kind.signal();

        let Some(video_id) = self.registry.lookup_video_id(&token).cloned() else {
            debug!(token = %token, %signal, "Event for unregistered token ignored");
            return Err(CoreError::UnknownToken(token));
        };
        let Some(record) = self.records.get_mut(&video_id) else {
            return Err(CoreError::UnknownToken(token));
        };
        let current = record.state;
        let Some(next) = next_state(current, signal) else {
            return Err(self.reject(&video_id, current, Input::Event(signal)));
        };

        match kind {
            EngineEventKind::Progress(fraction) => {
                if self.progress.advance(&token, fraction).is_none() {
                    trace!(token = %token, fraction, "Stale progress ignored");
                    return Ok(Vec::new());
                }
                trace!(video_id = %video_id, fraction, "Progress");
            }
            EngineEventKind::Completed { bytes } => {
                self.progress.complete(&token);
                self.sizes.finalize(token.clone(), bytes);
            }
            EngineEventKind::Failed { reason } => {
                let failure = CoreError::EngineFailure {
                    video_id: video_id.clone(),
                    token: token.clone(),
                    reason: reason.clone(),
                };
                warn!(error = %failure, "Download failed");
                record.failure = Some(reason);
            }
            EngineEventKind::Resumed if current == VideoState::Error => {
                self.progress.reset(&token);
                record.failure = None;
            }
            _ => {}
        }

        record.state = next;
        if next != current {
            info!(video_id = %video_id, token = %token, from = ?current, to = ?next, "Download state changed");
        }
        self.publish_update(&video_id)
    }

    fn on_started(&mut self, video_id: VideoId, token: DownloadToken) -> CoreResult<Vec<ViewDiff>> {
        let policy = self.pending.remove(&video_id);
        let Some(entry) = self
            .catalog_index
            .get(&video_id)
            .map(|&i| self.catalog[i].clone())
        else {
            warn!(video_id = %video_id, token = %token, "Download started for a video outside the catalog");
            return Err(CoreError::UnknownVideo(video_id));
        };
        let current = self
            .records
            .get(&video_id)
            .map_or_else(|| entry.initial_state(), |r| r.state);

        self.registry.register(video_id.clone(), token.clone())?;
        let Some(next) = next_state(current, Signal::Started) else {
            self.registry.unregister(&token);
            return Err(self.reject(&video_id, current, Input::Event(Signal::Started)));
        };

        let license = policy.unwrap_or_else(|| self.settings.license_policy());
        self.progress.start(token.clone());
        self.records.insert(
            video_id.clone(),
            DownloadRecord {
                entry,
                token: token.clone(),
                state: next,
                license,
                failure: None,
            },
        );
        info!(video_id = %video_id, token = %token, license = %license, "Download started");
        self.publish_update(&video_id)
    }

    // ------------------------------------------------------------------
    // Catalog and startup reconciliation
    // ------------------------------------------------------------------

    /// Replace the catalog.
    ///
    /// Downloads are kept, including those whose video left the catalog.
    /// Size estimates are recomputed for entries whose content changed.
    /// Pending download requests for videos that left the catalog are dropped.
    pub fn use_catalog(&mut self, entries: Vec<CatalogEntry>) -> CoreResult<Vec<ViewDiff>> {
        self.notifier.ensure_ready()?;
        let mut catalog = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());

        for entry in entries {
            if index.contains_key(&entry.video_id) {
                warn!(video_id = %entry.video_id, "Duplicate catalog entry ignored");
                continue;
            }
            let changed = self
                .catalog_index
                .get(&entry.video_id)
                .is_some_and(|&i| self.catalog[i].fingerprint() != entry.fingerprint());
            if changed {
                self.sizes.invalidate(&entry.video_id);
            }
            if let Some(record) = self.records.get_mut(&entry.video_id) {
                record.entry = entry.clone();
            }
            index.insert(entry.video_id.clone(), catalog.len());
            catalog.push(entry);
        }

        for old in &self.catalog {
            if !index.contains_key(&old.video_id) {
                self.sizes.invalidate(&old.video_id);
            }
        }
        self.pending.retain(|video_id, _| {
            let kept = index.contains_key(video_id);
            if !kept {
                debug!(video_id = %video_id, "Pending request dropped with its catalog entry");
            }
            kept
        });

        self.catalog = catalog;
        self.catalog_index = index;
        info!(
            entries = self.catalog.len(),
            downloads = self.records.len(),
            "Catalog replaced"
        );

        let rows = self.rows();
        self.notifier.publish(&VideoEvent::CatalogReplaced(rows))
    }

    /// Rebuild download state from the engine's persisted offline records.
    ///
    /// Records carrying a state without a token, or a second record for the
    /// same video, are rejected and reported.
    pub fn restore(&mut self, records: Vec<OfflineRecord>) -> RestoreReport {
        let mut report = RestoreReport::default();
        for record in records {
            match self.restore_one(record) {
                Ok(mut diffs) => {
                    report.restored += 1;
                    report.diffs.append(&mut diffs);
                }
                Err(e) => {
                    warn!(error = %e, "Offline record rejected");
                    report.rejected.push(e);
                }
            }
        }
        info!(
            restored = report.restored,
            rejected = report.rejected.len(),
            "Offline records restored"
        );
        report
    }

    fn restore_one(&mut self, record: OfflineRecord) -> CoreResult<Vec<ViewDiff>> {
        let OfflineRecord {
            entry,
            token,
            state,
            progress,
            bytes,
            license,
        } = record;
        let video_id = entry.video_id.clone();

        self.notifier.ensure_ready()?;
        if !state.has_token() {
            return Err(self.reject(&video_id, state, Input::Restore));
        }
        self.registry.register(video_id.clone(), token.clone())?;

        let entry = self
            .catalog_index
            .get(&video_id)
            .map(|&i| self.catalog[i].clone())
            .unwrap_or(entry);
        self.progress.restore(token.clone(), progress);
        if state == VideoState::Downloaded {
            self.progress.complete(&token);
            if let Some(bytes) = bytes {
                self.sizes.finalize(token.clone(), bytes);
            }
        }
        self.records.insert(
            video_id.clone(),
            DownloadRecord {
                entry,
                token,
                state,
                license,
                failure: None,
            },
        );
        self.publish_update(&video_id)
    }

    // ------------------------------------------------------------------
    // Row derivation
    // ------------------------------------------------------------------

    fn publish_update(&mut self, video_id: &VideoId) -> CoreResult<Vec<ViewDiff>> {
        let row = self
            .build_row(video_id)
            .ok_or_else(|| CoreError::UnknownVideo(video_id.clone()))?;
        self.notifier.publish(&VideoEvent::Updated(row))
    }

    fn build_row(&mut self, video_id: &VideoId) -> Option<VideoRow> {
        let record = self.records.get(video_id);
        let entry = match self.catalog_index.get(video_id) {
            Some(&i) => &self.catalog[i],
            None => &record?.entry,
        };
        let state = record.map_or_else(|| entry.initial_state(), |r| r.state);
        let token = record.map(|r| r.token.clone());

        if entry.downloadable || record.is_some() {
            self.sizes.estimate(entry, self.size_source.as_ref());
        }

        Some(VideoRow {
            video_id: video_id.clone(),
            title: entry.title.clone(),
            state,
            progress: token.as_ref().and_then(|t| self.progress.get(t)),
            display_size: self.sizes.display_size(video_id, token.as_ref()),
            token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{engine_channel, EngineSender};
    use crate::models::{CatalogModel, DownloadsModel, CATALOG_VIEW, DOWNLOADS_VIEW};
    use crate::settings::MemorySettings;
    use std::cell::{Cell, RefCell};
    use std::time::Duration;

    const MB: u64 = 1024 * 1024;

    /// Records commands and confirms them through the channel, like a
    /// well-behaved engine.
    struct ScriptedEngine {
        sender: EngineSender,
        log: Rc<RefCell<Vec<String>>>,
        next_token: Cell<u32>,
    }

    impl DownloadEngine for ScriptedEngine {
        fn start_download(&self, entry: &CatalogEntry, _policy: &LicensePolicy) {
            let n = self.next_token.get() + 1;
            self.next_token.set(n);
            let token = DownloadToken::new(format!("tok-{n}"));
            self.log.borrow_mut().push(format!("start {}", entry.video_id));
            self.sender.started(&token, &entry.video_id);
        }

        fn pause(&self, token: &DownloadToken) {
            self.log.borrow_mut().push(format!("pause {token}"));
            self.sender.confirm(token, EngineEventKind::Paused);
        }

        fn resume(&self, token: &DownloadToken) {
            self.log.borrow_mut().push(format!("resume {token}"));
            self.sender.confirm(token, EngineEventKind::Resumed);
        }

        fn cancel(&self, token: &DownloadToken) {
            self.log.borrow_mut().push(format!("cancel {token}"));
            self.sender.confirm(token, EngineEventKind::Cancelled);
        }

        fn delete_local(&self, token: &DownloadToken) {
            self.log.borrow_mut().push(format!("delete {token}"));
        }
    }

    struct FixedSize(u64);

    impl SizeSource for FixedSize {
        fn estimate_bytes(&self, _entry: &CatalogEntry) -> Option<u64> {
            Some(self.0)
        }
    }

    struct Harness {
        library: OfflineLibrary,
        sender: EngineSender,
        log: Rc<RefCell<Vec<String>>>,
        catalog: Rc<RefCell<CatalogModel>>,
        downloads: Rc<RefCell<DownloadsModel>>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_settings(MemorySettings::default())
        }

        fn with_settings(settings: MemorySettings) -> Self {
            let (sender, receiver) = engine_channel();
            let log = Rc::new(RefCell::new(Vec::new()));
            let engine = ScriptedEngine {
                sender: sender.clone(),
                log: Rc::clone(&log),
                next_token: Cell::new(0),
            };

            let notifier = Rc::new(Notifier::new());
            let catalog = Rc::new(RefCell::new(CatalogModel::new()));
            let downloads = Rc::new(RefCell::new(DownloadsModel::new()));
            notifier.subscribe(catalog.clone());
            notifier.subscribe(downloads.clone());

            let mut library = OfflineLibrary::new(
                &LibraryConfig::default(),
                Box::new(engine),
                receiver,
                Box::new(settings),
                notifier,
            )
            .with_size_source(Box::new(FixedSize(100 * MB)));
            library
                .use_catalog(vec![
                    CatalogEntry::new("v1", "First"),
                    CatalogEntry::new("v2", "Second"),
                    CatalogEntry::online_only("v3", "Live only"),
                ])
                .unwrap();

            Self {
                library,
                sender,
                log,
                catalog,
                downloads,
            }
        }

        fn token(&self, id: &str) -> DownloadToken {
            self.library.token(&vid(id)).cloned().unwrap()
        }

        fn start(&mut self, id: &str) -> DownloadToken {
            self.library.request_download(&vid(id)).unwrap();
            self.library.pump();
            self.token(id)
        }
    }

    fn vid(id: &str) -> VideoId {
        VideoId::new(id)
    }

    #[test]
    fn test_initial_states() {
        let h = Harness::new();
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Downloadable));
        assert_eq!(h.library.state(&vid("v3")), Some(VideoState::OnlineOnly));
        assert_eq!(h.library.state(&vid("nope")), None);
        assert_eq!(h.catalog.borrow().len(), 3);
        assert!(h.downloads.borrow().is_empty());
    }

    #[test]
    fn test_download_waits_for_engine_confirmation() {
        let mut h = Harness::new();

        h.library.request_download(&vid("v1")).unwrap();
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Downloadable));
        assert!(h.library.is_pending(&vid("v1")));
        assert!(h.library.token(&vid("v1")).is_none());

        h.library.pump();
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Downloading));
        assert_eq!(h.library.progress(&vid("v1")), Some(0.0));
        assert!(!h.library.is_pending(&vid("v1")));
        assert_eq!(h.downloads.borrow().len(), 1);
    }

    #[test]
    fn test_duplicate_download_request_is_rejected() {
        let mut h = Harness::new();
        h.library.request_download(&vid("v1")).unwrap();

        let err = h.library.request_download(&vid("v1")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(h.log.borrow().len(), 1);
    }

    #[test]
    fn test_full_download_scenario() {
        let mut h = Harness::new();
        let token = h.start("v1");

        h.sender.progress(&token, 0.4);
        h.sender.progress(&token, 0.8);
        h.sender.completed(&token, 95 * MB);
        h.library.pump();

        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Downloaded));
        assert_eq!(h.library.token(&vid("v1")), Some(&token));
        assert_eq!(h.library.display_size(&vid("v1")), Some(95 * MB));
        assert_eq!(h.library.progress(&vid("v1")), Some(1.0));

        let catalog = h.catalog.borrow();
        let row = catalog.row_for(&vid("v1")).unwrap();
        assert_eq!(row.state, VideoState::Downloaded);
        assert_eq!(row.display_size, Some(95 * MB));
    }

    #[test]
    fn test_pause_freezes_progress_and_ignores_late_events() {
        let mut h = Harness::new();
        let token = h.start("v1");
        h.sender.progress(&token, 0.4);
        h.library.pump();

        h.library.request_pause(&vid("v1")).unwrap();
        h.library.pump();
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Paused));

        let late = h
            .library
            .handle_event(EngineEvent::new(token.clone(), EngineEventKind::Progress(0.5)))
            .unwrap_err();
        assert!(matches!(late, CoreError::InvalidTransition { .. }));
        assert_eq!(h.library.progress(&vid("v1")), Some(0.4));
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Paused));

        h.library.request_resume(&vid("v1")).unwrap();
        h.library.pump();
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Downloading));
        assert_eq!(h.library.progress(&vid("v1")), Some(0.4));
    }

    #[test]
    fn test_invalid_commands_are_not_forwarded() {
        let mut h = Harness::new();
        let token = h.start("v1");
        let commands_before = h.log.borrow().len();

        assert!(h.library.request_resume(&vid("v1")).is_err());
        assert!(h.library.request_delete(&vid("v1")).is_err());
        assert!(h.library.request_retry(&vid("v1")).is_err());
        assert!(h.library.request_download(&vid("v3")).is_err());
        assert!(matches!(
            h.library.request_pause(&vid("missing")),
            Err(CoreError::UnknownVideo(_))
        ));

        assert_eq!(h.log.borrow().len(), commands_before);
        assert_eq!(h.library.token(&vid("v1")), Some(&token));
    }

    #[test]
    fn test_cancel_then_delete() {
        let mut h = Harness::new();
        let token = h.start("v1");

        h.library.request_cancel(&vid("v1")).unwrap();
        h.library.pump();
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Cancelled));
        assert_eq!(h.library.token(&vid("v1")), Some(&token));

        h.library.request_delete(&vid("v1")).unwrap();
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Downloadable));
        assert!(h.library.registry().is_empty());
        assert!(h.log.borrow().contains(&format!("delete {token}")));
    }

    #[test]
    fn test_delete_reaches_every_view_in_one_publish() {
        let mut h = Harness::new();
        let token = h.start("v1");
        h.sender.completed(&token, 95 * MB);
        h.library.pump();
        assert_eq!(h.downloads.borrow().len(), 1);

        let diffs = h.library.request_delete(&vid("v1")).unwrap();

        let views: Vec<_> = diffs.iter().map(|d| d.view).collect();
        assert_eq!(views, vec![CATALOG_VIEW, DOWNLOADS_VIEW]);
        assert_eq!(diffs[0].diff.updated, vec![0]);
        assert_eq!(diffs[1].diff.removed, vec![0]);

        assert!(h.downloads.borrow().is_empty());
        let catalog = h.catalog.borrow();
        let row = catalog.row_for(&vid("v1")).unwrap();
        assert_eq!(row.state, VideoState::Downloadable);
        assert_eq!(row.token, None);
        assert_eq!(row.display_size, Some(100 * MB));
    }

    #[test]
    fn test_failure_and_retry_restarts_from_zero() {
        let mut h = Harness::new();
        let token = h.start("v1");
        h.sender.progress(&token, 0.6);
        h.sender.failed(&token, "connection reset");
        h.library.pump();

        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Error));
        let info = h.library.download_info(&vid("v1")).unwrap();
        assert_eq!(
            info.failure(),
            Some(CoreError::EngineFailure {
                video_id: vid("v1"),
                token: token.clone(),
                reason: "connection reset".to_string(),
            })
        );

        h.library.request_retry(&vid("v1")).unwrap();
        h.library.pump();
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Downloading));
        assert_eq!(h.library.progress(&vid("v1")), Some(0.0));
        assert!(h.library.download_info(&vid("v1")).unwrap().failure().is_none());
    }

    #[test]
    fn test_error_can_be_deleted() {
        let mut h = Harness::new();
        let token = h.start("v1");
        h.sender.failed(&token, "disk full");
        h.library.pump();

        h.library.request_delete(&vid("v1")).unwrap();
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Downloadable));
    }

    #[test]
    fn test_second_started_event_is_already_registered() {
        let mut h = Harness::new();
        let token = h.start("v1");

        let err = h
            .library
            .handle_event(EngineEvent::new(
                DownloadToken::new("rogue"),
                EngineEventKind::Started { video_id: vid("v1") },
            ))
            .unwrap_err();

        assert_eq!(
            err,
            CoreError::AlreadyRegistered {
                video_id: vid("v1"),
                token: token.clone(),
            }
        );
        assert_eq!(h.library.token(&vid("v1")), Some(&token));
    }

    #[test]
    fn test_started_for_online_only_video_is_rejected() {
        let mut h = Harness::new();
        let err = h
            .library
            .handle_event(EngineEvent::new(
                DownloadToken::new("t"),
                EngineEventKind::Started { video_id: vid("v3") },
            ))
            .unwrap_err();

        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert!(h.library.registry().is_empty());
    }

    #[test]
    fn test_events_for_unknown_tokens_are_ignored() {
        let mut h = Harness::new();
        h.sender.progress(&DownloadToken::new("ghost"), 0.5);
        assert!(h.library.pump().is_empty());
    }

    #[test]
    fn test_duplicate_completion_keeps_first_size() {
        let mut h = Harness::new();
        let token = h.start("v1");
        h.sender.completed(&token, 95 * MB);
        h.sender.completed(&token, 10 * MB);
        h.library.pump();

        assert_eq!(h.library.display_size(&vid("v1")), Some(95 * MB));
    }

    #[test]
    fn test_license_policy_snapshot() {
        let mut h = Harness::with_settings(MemorySettings::new(LicensePolicy::Purchase));
        h.start("v1");

        let info = h.library.download_info(&vid("v1")).unwrap();
        assert_eq!(info.license, LicensePolicy::Purchase);
        assert_eq!(info.title, "First");
    }

    #[test]
    fn test_catalog_replacement_keeps_downloads() {
        let mut h = Harness::new();
        let token = h.start("v1");
        h.sender.completed(&token, 95 * MB);
        h.library.pump();

        h.library
            .use_catalog(vec![CatalogEntry::new("v2", "Second"), CatalogEntry::new("v4", "Fourth")])
            .unwrap();

        assert_eq!(h.catalog.borrow().len(), 2);
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Downloaded));
        assert_eq!(h.downloads.borrow().len(), 1);

        // Deleting a download whose entry left the catalog still works.
        h.library.request_delete(&vid("v1")).unwrap();
        assert!(h.downloads.borrow().is_empty());
        assert_eq!(h.library.state(&vid("v1")), None);
    }

    #[test]
    fn test_restore_rebuilds_state() {
        let mut h = Harness::new();
        let records = vec![
            OfflineRecord {
                entry: CatalogEntry::new("v1", "First"),
                token: DownloadToken::new("old-1"),
                state: VideoState::Downloaded,
                progress: 1.0,
                bytes: Some(90 * MB),
                license: LicensePolicy::Purchase,
            },
            OfflineRecord {
                entry: CatalogEntry::new("v2", "Second"),
                token: DownloadToken::new("old-2"),
                state: VideoState::Paused,
                progress: 0.3,
                bytes: None,
                license: LicensePolicy::default(),
            },
            OfflineRecord {
                entry: CatalogEntry::new("v1", "First"),
                token: DownloadToken::new("old-3"),
                state: VideoState::Downloading,
                progress: 0.1,
                bytes: None,
                license: LicensePolicy::default(),
            },
            OfflineRecord {
                entry: CatalogEntry::new("v9", "Gone"),
                token: DownloadToken::new("old-4"),
                state: VideoState::Downloadable,
                progress: 0.0,
                bytes: None,
                license: LicensePolicy::default(),
            },
        ];

        let report = h.library.restore(records);

        assert_eq!(report.restored, 2);
        assert_eq!(report.rejected.len(), 2);
        assert!(matches!(report.rejected[0], CoreError::AlreadyRegistered { .. }));
        assert!(matches!(report.rejected[1], CoreError::InvalidTransition { .. }));
        assert_eq!(h.library.display_size(&vid("v1")), Some(90 * MB));
        assert_eq!(h.library.progress(&vid("v2")), Some(0.3));
        assert_eq!(h.downloads.borrow().len(), 2);

        h.library.request_resume(&vid("v2")).unwrap();
        h.library.pump();
        assert_eq!(h.library.state(&vid("v2")), Some(VideoState::Downloading));
    }

    #[test]
    fn test_estimates_use_catalog_duration() {
        let (sender, receiver) = engine_channel();
        let engine = ScriptedEngine {
            sender,
            log: Rc::new(RefCell::new(Vec::new())),
            next_token: Cell::new(0),
        };
        let mut library = OfflineLibrary::new(
            &LibraryConfig::default().with_estimated_bitrate(8_000_000),
            Box::new(engine),
            receiver,
            Box::new(MemorySettings::default()),
            Rc::new(Notifier::new()),
        );
        library
            .use_catalog(vec![
                CatalogEntry::new("v1", "One").with_duration(Duration::from_secs(60)),
                CatalogEntry::new("v2", "Two"),
            ])
            .unwrap();

        let rows = library.rows();
        assert_eq!(rows[0].display_size, Some(60_000_000));
        assert_eq!(rows[1].display_size, None);
        assert_eq!(rows[1].size_label(), "calculating…");
    }

    #[test]
    fn test_delete_with_busy_view_changes_nothing() {
        let mut h = Harness::new();
        let token = h.start("v1");
        h.sender.completed(&token, 95 * MB);
        h.library.pump();

        let held = h.downloads.borrow();
        let err = h.library.request_delete(&vid("v1")).unwrap_err();
        drop(held);

        assert_eq!(err, CoreError::SubscriberBusy { index: 1 });
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Downloaded));
        assert_eq!(h.library.token(&vid("v1")), Some(&token));
        assert!(!h.log.borrow().contains(&format!("delete {token}")));
        assert_eq!(h.downloads.borrow().len(), 1);

        // Retrying from the same row succeeds once the view is released.
        let target = h.downloads.borrow().video_id_at(0).cloned().unwrap();
        h.library.request_delete(&target).unwrap();
        assert!(h.downloads.borrow().is_empty());
        let catalog = h.catalog.borrow();
        assert_eq!(
            catalog.row_for(&vid("v1")).unwrap().state,
            VideoState::Downloadable
        );
    }

    #[test]
    fn test_events_stay_queued_while_view_is_busy() {
        let mut h = Harness::new();
        h.library.request_download(&vid("v1")).unwrap();

        let held = h.catalog.borrow();
        assert!(h.library.pump().is_empty());
        drop(held);
        assert!(h.library.is_pending(&vid("v1")));
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Downloadable));

        let diffs = h.library.pump();
        assert_eq!(diffs.len(), 2);
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Downloading));
        assert_eq!(h.catalog.borrow().row_for(&vid("v1")).unwrap().state, VideoState::Downloading);
        assert_eq!(h.downloads.borrow().len(), 1);
    }

    #[test]
    fn test_handle_event_with_busy_view_changes_nothing() {
        let mut h = Harness::new();
        let token = h.start("v1");

        let held = h.downloads.borrow();
        let err = h
            .library
            .handle_event(EngineEvent::new(token.clone(), EngineEventKind::Completed { bytes: MB }))
            .unwrap_err();
        drop(held);

        assert_eq!(err, CoreError::SubscriberBusy { index: 1 });
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Downloading));
        assert_eq!(h.library.progress(&vid("v1")), Some(0.0));
        assert_eq!(h.library.display_size(&vid("v1")), Some(100 * MB));
    }

    #[test]
    fn test_restore_with_busy_view_applies_nothing() {
        let mut h = Harness::new();
        let record = OfflineRecord {
            entry: CatalogEntry::new("v1", "First"),
            token: DownloadToken::new("old-1"),
            state: VideoState::Downloaded,
            progress: 1.0,
            bytes: Some(90 * MB),
            license: LicensePolicy::Purchase,
        };

        let held = h.catalog.borrow();
        let report = h.library.restore(vec![record.clone()]);
        drop(held);

        assert_eq!(report.restored, 0);
        assert_eq!(report.rejected, vec![CoreError::SubscriberBusy { index: 0 }]);
        assert!(h.library.registry().is_empty());
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Downloadable));

        let report = h.library.restore(vec![record]);
        assert_eq!(report.restored, 1);
        assert_eq!(h.downloads.borrow().len(), 1);
    }

    #[test]
    fn test_pump_applies_at_most_the_cap() {
        let mut h = Harness::new();
        let token = h.start("v1");
        let total = MAX_EVENTS_PER_PUMP + 10;
        let fraction = |i: usize| i as f64 / total as f64;
        for i in 1..=MAX_EVENTS_PER_PUMP + 5 {
            h.sender.progress(&token, fraction(i));
        }

        h.library.pump();
        assert_eq!(h.library.progress(&vid("v1")), Some(fraction(MAX_EVENTS_PER_PUMP)));

        h.library.pump();
        assert_eq!(
            h.library.progress(&vid("v1")),
            Some(fraction(MAX_EVENTS_PER_PUMP + 5))
        );
    }

    #[test]
    fn test_cancel_pending_allows_a_new_request() {
        let mut h = Harness::new();
        h.library.request_download(&vid("v1")).unwrap();

        assert!(h.library.cancel_pending(&vid("v1")));
        assert!(!h.library.cancel_pending(&vid("v1")));
        assert!(!h.library.is_pending(&vid("v1")));

        h.library.request_download(&vid("v1")).unwrap();
        assert!(h.library.is_pending(&vid("v1")));
        assert_eq!(h.log.borrow().len(), 2);
    }

    #[test]
    fn test_catalog_replacement_drops_orphaned_pending_requests() {
        let mut h = Harness::new();
        h.library.request_download(&vid("v1")).unwrap();
        h.library.request_download(&vid("v2")).unwrap();

        h.library
            .use_catalog(vec![CatalogEntry::new("v2", "Second")])
            .unwrap();

        assert!(!h.library.is_pending(&vid("v1")));
        assert!(h.library.is_pending(&vid("v2")));
    }

    /// Engine that never reports back, so the channel closes once the test
    /// drops its sender.
    struct SilentEngine;

    impl DownloadEngine for SilentEngine {
        fn start_download(&self, _entry: &CatalogEntry, _policy: &LicensePolicy) {}
        fn pause(&self, _token: &DownloadToken) {}
        fn resume(&self, _token: &DownloadToken) {}
        fn cancel(&self, _token: &DownloadToken) {}
        fn delete_local(&self, _token: &DownloadToken) {}
    }

    #[tokio::test]
    async fn test_pump_next_applies_events_until_senders_drop() {
        let (sender, receiver) = engine_channel();
        let notifier = Rc::new(Notifier::new());
        let downloads = Rc::new(RefCell::new(DownloadsModel::new()));
        notifier.subscribe(downloads.clone());
        let mut library = OfflineLibrary::new(
            &LibraryConfig::default(),
            Box::new(SilentEngine),
            receiver,
            Box::new(MemorySettings::default()),
            notifier,
        );
        library.use_catalog(vec![CatalogEntry::new("v1", "First")]).unwrap();

        let token = DownloadToken::new("t1");
        sender.started(&token, &vid("v1"));
        sender.progress(&token, 0.25);
        drop(sender);

        let started = library.pump_next().await.unwrap().unwrap();
        assert_eq!(started[0].diff.inserted, vec![0]);
        library.pump_next().await.unwrap().unwrap();
        assert_eq!(library.progress(&vid("v1")), Some(0.25));

        assert!(library.pump_next().await.is_none());
        assert_eq!(downloads.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_pump_next_keeps_event_while_view_is_busy() {
        let mut h = Harness::new();
        h.library.request_download(&vid("v1")).unwrap();

        let held = h.downloads.borrow();
        let err = h.library.pump_next().await.unwrap().unwrap_err();
        drop(held);
        assert_eq!(err, CoreError::SubscriberBusy { index: 1 });
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Downloadable));

        h.library.pump_next().await.unwrap().unwrap();
        assert_eq!(h.library.state(&vid("v1")), Some(VideoState::Downloading));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Step {
            Command(usize, Command),
            Progress(usize, f64),
            Complete(usize),
            Fail(usize),
            Pump,
        }

        fn step() -> impl Strategy<Value = Step> {
            let command = prop_oneof![
                Just(Command::Download),
                Just(Command::Pause),
                Just(Command::Resume),
                Just(Command::Cancel),
                Just(Command::Delete),
                Just(Command::Retry),
            ];
            prop_oneof![
                (0usize..3, command).prop_map(|(v, c)| Step::Command(v, c)),
                (0usize..3, 0.0..1.0_f64).prop_map(|(v, p)| Step::Progress(v, p)),
                (0usize..3).prop_map(Step::Complete),
                (0usize..3).prop_map(Step::Fail),
                Just(Step::Pump),
            ]
        }

        proptest! {
            #[test]
            fn test_invariants_hold_for_any_sequence(steps in proptest::collection::vec(step(), 0..80)) {
                let mut h = Harness::new();
                let ids = [vid("v1"), vid("v2"), vid("v3")];
                let mut last_progress: HashMap<DownloadToken, f64> = HashMap::new();

                for step in steps {
                    match step {
                        Step::Command(v, command) => {
                            let _ = h.library.request(&ids[v], command);
                        }
                        Step::Progress(v, p) => {
                            if let Some(token) = h.library.token(&ids[v]).cloned() {
                                h.sender.progress(&token, p);
                            }
                        }
                        Step::Complete(v) => {
                            if let Some(token) = h.library.token(&ids[v]).cloned() {
                                h.sender.completed(&token, MB);
                            }
                        }
                        Step::Fail(v) => {
                            if let Some(token) = h.library.token(&ids[v]).cloned() {
                                h.sender.failed(&token, "boom");
                            }
                        }
                        Step::Pump => {
                            h.library.pump();
                        }
                    }

                    for id in &ids {
                        let state = h.library.state(id).unwrap();
                        let token = h.library.token(id);
                        prop_assert_eq!(token.is_some(), state.has_token(), "{} in {}", id, state);
                        if let Some(token) = token {
                            prop_assert_eq!(h.library.registry().lookup_video_id(token), Some(id));
                            let progress = h.library.progress(id).unwrap();
                            if state == VideoState::Downloading {
                                if let Some(&last) = last_progress.get(token) {
                                    // Only a retry from Error may go back to zero.
                                    prop_assert!(progress >= last || progress == 0.0);
                                }
                            }
                            last_progress.insert(token.clone(), progress);
                        }
                    }
                    prop_assert!(h.library.state(&ids[2]) == Some(VideoState::OnlineOnly));
                    prop_assert_eq!(h.downloads.borrow().len(), h.library.registry().len());
                }
            }
        }
    }
}
