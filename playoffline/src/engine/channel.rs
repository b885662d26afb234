//! Owner-thread delivery of engine callbacks.
//!
//! Engine callbacks may fire on any thread. They are pushed into an unbounded
//! channel and drained on the thread that owns the models, so the core never
//! sees concurrent mutation. Events from one sender arrive in send order.

use tokio::sync::mpsc;
use tracing::debug;

use super::{EngineEvent, EngineEventKind};
use crate::catalog::VideoId;
use crate::registry::DownloadToken;

/// Create a connected sender/receiver pair.
pub fn engine_channel() -> (EngineSender, EngineReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EngineSender { tx }, EngineReceiver { rx })
}

/// Thread-safe handle engines use to report callbacks.
#[derive(Debug, Clone)]
pub struct EngineSender {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineSender {
    /// Queue an event for the owner thread.
    ///
    /// Returns `false` if the receiving side has been dropped.
    pub fn send(&self, event: EngineEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                debug!(token = %event.token, "Engine event dropped, receiver closed");
                false
            }
        }
    }

    /// Report that a download was created for `video_id`.
    pub fn started(&self, token: &DownloadToken, video_id: &VideoId) -> bool {
        self.send(EngineEvent::new(
            token.clone(),
            EngineEventKind::Started {
                video_id: video_id.clone(),
            },
        ))
    }

    /// Report transfer progress.
    pub fn progress(&self, token: &DownloadToken, fraction: f64) -> bool {
        self.send(EngineEvent::new(
            token.clone(),
            EngineEventKind::Progress(fraction),
        ))
    }

    /// Report a finished transfer.
    pub fn completed(&self, token: &DownloadToken, bytes: u64) -> bool {
        self.send(EngineEvent::new(
            token.clone(),
            EngineEventKind::Completed { bytes },
        ))
    }

    /// Report a failed transfer.
    pub fn failed(&self, token: &DownloadToken, reason: impl Into<String>) -> bool {
        self.send(EngineEvent::new(
            token.clone(),
            EngineEventKind::Failed {
                reason: reason.into(),
            },
        ))
    }

    /// Report a payload-free confirmation (paused, resumed, cancelled).
    pub fn confirm(&self, token: &DownloadToken, kind: EngineEventKind) -> bool {
        self.send(EngineEvent::new(token.clone(), kind))
    }

    /// Whether the receiver is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owner-thread end of the callback channel.
#[derive(Debug)]
pub struct EngineReceiver {
    rx: mpsc::UnboundedReceiver<EngineEvent>,
}

impl EngineReceiver {
    /// Take the next queued event without blocking.
    pub fn try_next(&mut self) -> Option<EngineEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next event. Returns `None` once every sender is dropped.
    pub async fn next(&mut self) -> Option<EngineEvent> {
        self.rx.recv().await
    }
}
