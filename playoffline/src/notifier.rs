//! Cross-view notifier.
//!
//! A single event bus, constructed once at application start and handed by
//! reference to everything that needs it. `publish` fans an event out
//! synchronously to every subscriber in registration order; nothing is
//! queued or dropped, so a deletion made through the downloads view is
//! visible in the catalog view before `publish` returns.
//!
//! Subscribers must not publish from inside their own handler. Such an
//! attempt fails with [`CoreError::ReentrantPublish`] (and trips a debug
//! assertion in debug builds).
//!
//! The notifier is single-threaded (`Rc`/`RefCell`): it lives on the thread
//! that owns the models.

use std::cell::{Cell, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::catalog::VideoId;
use crate::error::{CoreError, CoreResult};
use crate::models::{RowDiff, VideoRow};
use crate::registry::DownloadToken;

/// Change notification shared by all views.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoEvent {
    /// A video's derived state, progress or size changed.
    Updated(VideoRow),
    /// A download was deleted and its token unregistered. `row` is the
    /// video's reverted state.
    Removed { token: DownloadToken, row: VideoRow },
    /// The catalog was replaced; rows are in catalog order.
    CatalogReplaced(Vec<VideoRow>),
}

impl VideoEvent {
    /// Video the event is about, for single-video events.
    pub fn video_id(&self) -> Option<&VideoId> {
        match self {
            VideoEvent::Updated(row) | VideoEvent::Removed { row, .. } => Some(&row.video_id),
            VideoEvent::CatalogReplaced(_) => None,
        }
    }
}

/// A view model listening to the notifier.
pub trait Subscriber {
    /// Name reported alongside this subscriber's diffs.
    fn view_name(&self) -> &'static str;

    /// Apply an event and report the rows that changed.
    fn apply_event(&mut self, event: &VideoEvent) -> RowDiff;
}

/// One subscriber's response to a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDiff {
    pub view: &'static str,
    pub diff: RowDiff,
}

/// Shared handle to a subscriber.
pub type SharedSubscriber = Rc<RefCell<dyn Subscriber>>;

/// Process-wide, single-threaded event bus.
#[derive(Default)]
pub struct Notifier {
    subscribers: RefCell<Vec<SharedSubscriber>>,
    publishing: Cell<bool>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscribers.borrow().len())
            .field("publishing", &self.publishing.get())
            .finish()
    }
}

/// Clears the publishing flag even if a handler panics.
struct PublishGuard<'a>(&'a Cell<bool>);

impl Drop for PublishGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Notifier {
    /// Create a notifier with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Events are delivered in registration order.
    ///
    /// Returns `false` if this subscriber was already registered.
    pub fn subscribe(&self, subscriber: SharedSubscriber) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let ptr = Rc::as_ptr(&subscriber) as *const ();
        if subscribers
            .iter()
            .any(|existing| Rc::as_ptr(existing) as *const () == ptr)
        {
            return false;
        }
        subscribers.push(subscriber);
        true
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Whether a publish is in progress.
    pub fn is_publishing(&self) -> bool {
        self.publishing.get()
    }

    /// Check that a publish made now would reach every subscriber.
    ///
    /// Callers that change state before publishing check this first, so a
    /// busy view fails the whole operation instead of losing its event.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ReentrantPublish`] while a publish is in progress
    /// - [`CoreError::SubscriberBusy`] when a subscriber is borrowed elsewhere
    pub fn ensure_ready(&self) -> CoreResult<()> {
        if self.publishing.get() {
            return Err(CoreError::ReentrantPublish);
        }
        for (index, subscriber) in self.subscribers.borrow().iter().enumerate() {
            if subscriber.try_borrow_mut().is_err() {
                debug!(index, "Subscriber busy");
                return Err(CoreError::SubscriberBusy { index });
            }
        }
        Ok(())
    }

    /// Deliver `event` to every subscriber and collect their diffs.
    ///
    /// Delivery is all-or-nothing: every subscriber is borrowed before any
    /// handler runs.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ReentrantPublish`] when called from inside a handler
    /// - [`CoreError::SubscriberBusy`] when a subscriber is borrowed elsewhere
    pub fn publish(&self, event: &VideoEvent) -> CoreResult<Vec<ViewDiff>> {
        if self.publishing.replace(true) {
            warn!(video_id = ?event.video_id(), "Reentrant publish rejected");
            debug_assert!(false, "reentrant publish from inside a subscriber handler");
            return Err(CoreError::ReentrantPublish);
        }
        let _guard = PublishGuard(&self.publishing);

        let subscribers: Vec<SharedSubscriber> = self.subscribers.borrow().clone();
        let mut targets: Vec<RefMut<'_, dyn Subscriber>> = Vec::with_capacity(subscribers.len());
        for (index, subscriber) in subscribers.iter().enumerate() {
            match subscriber.try_borrow_mut() {
                Ok(target) => targets.push(target),
                Err(_) => {
                    warn!(index, "Subscriber busy, event not delivered");
                    return Err(CoreError::SubscriberBusy { index });
                }
            }
        }

        let diffs = targets
            .iter_mut()
            .map(|target| {
                let diff = target.apply_event(event);
                trace!(view = target.view_name(), ?diff, "Event applied");
                ViewDiff {
                    view: target.view_name(),
                    diff,
                }
            })
            .collect();
        Ok(diffs)
    }
}
