//! Download engine boundary.
//!
//! The offline download/DRM engine is an external capability. This module
//! describes what the core needs from it and how its callbacks reach the
//! owner thread:
//!
//! - [`DownloadEngine`] - fire-and-forget commands; effects arrive later as events
//! - [`EngineEvent`] - tagged callback `{token, kind}`
//! - [`engine_channel`] - marshals callbacks from any thread onto the owner thread
//! - [`SimulatedEngine`] - thread-per-download engine for demos and manual testing
//!
//! ```text
//! engine thread(s) ──EngineSender──► unbounded channel ──► EngineReceiver
//!                                                              │
//!                                              OfflineLibrary::pump() (owner thread)
//! ```

mod channel;
mod simulated;

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogEntry, VideoId};
use crate::registry::DownloadToken;
use crate::settings::LicensePolicy;
use crate::state::Signal;

pub use channel::{engine_channel, EngineReceiver, EngineSender};
pub use simulated::{SimulatedEngine, SimulationConfig};

/// Callback payload from the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEventKind {
    /// A requested download was created; delivers its token.
    Started { video_id: VideoId },
    /// Transfer progress as a fraction in `[0, 1]`.
    Progress(f64),
    /// A pause request took effect.
    Paused,
    /// A resume (or retry) request took effect.
    Resumed,
    /// The transfer finished.
    Completed { bytes: u64 },
    /// The transfer failed.
    Failed { reason: String },
    /// A cancel request took effect.
    Cancelled,
}

impl EngineEventKind {
    /// Payload-free signal used by the transition table.
    pub fn signal(&self) -> Signal {
        match self {
            EngineEventKind::Started { .. } => Signal::Started,
            EngineEventKind::Progress(_) => Signal::Progress,
            EngineEventKind::Paused => Signal::Paused,
            EngineEventKind::Resumed => Signal::Resumed,
            EngineEventKind::Completed { .. } => Signal::Completed,
            EngineEventKind::Failed { .. } => Signal::Failed,
            EngineEventKind::Cancelled => Signal::Cancelled,
        }
    }
}

/// One engine callback for one download token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub token: DownloadToken,
    pub kind: EngineEventKind,
}

impl EngineEvent {
    /// Create an event.
    pub fn new(token: DownloadToken, kind: EngineEventKind) -> Self {
        Self { token, kind }
    }
}

/// Commands accepted by the download engine.
///
/// Every command is fire-and-forget: its effect is observed later through an
/// [`EngineEvent`], never through a return value.
pub trait DownloadEngine {
    /// Begin downloading `entry` under `policy`. The token arrives in a
    /// [`EngineEventKind::Started`] event.
    fn start_download(&self, entry: &CatalogEntry, policy: &LicensePolicy);

    /// Suspend a transfer.
    fn pause(&self, token: &DownloadToken);

    /// Resume a paused transfer, or restart a failed one.
    fn resume(&self, token: &DownloadToken);

    /// Abort a transfer.
    fn cancel(&self, token: &DownloadToken);

    /// Remove local files and licenses for a token.
    fn delete_local(&self, token: &DownloadToken);
}
