//! State tag and transition tables.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mutually exclusive display state of a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoState {
    /// No downloadable source; streaming only.
    OnlineOnly,
    /// A source exists and no download token is held.
    Downloadable,
    /// The engine is transferring the video.
    Downloading,
    /// Transfer suspended with progress frozen.
    Paused,
    /// Transfer cancelled; the token is kept until the user deletes it.
    Cancelled,
    /// Transfer complete; the video plays offline.
    Downloaded,
    /// Transfer failed; can be retried or deleted.
    Error,
}

impl VideoState {
    /// Every state, in declaration order.
    pub const ALL: [VideoState; 7] = [
        VideoState::OnlineOnly,
        VideoState::Downloadable,
        VideoState::Downloading,
        VideoState::Paused,
        VideoState::Cancelled,
        VideoState::Downloaded,
        VideoState::Error,
    ];

    /// Whether a video in this state owns a registry token.
    pub fn has_token(self) -> bool {
        !matches!(self, VideoState::OnlineOnly | VideoState::Downloadable)
    }

    /// Whether this state holds an active engine transfer.
    pub fn holds_engine_resource(self) -> bool {
        matches!(self, VideoState::Downloading | VideoState::Paused)
    }

    /// Terminal for storage accounting: no transfer is running.
    pub fn is_terminal(self) -> bool {
        matches!(self, VideoState::Downloaded | VideoState::Cancelled)
    }

    /// Short user-facing label.
    pub fn label(self) -> &'static str {
        match self {
            VideoState::OnlineOnly => "Online only",
            VideoState::Downloadable => "Download",
            VideoState::Downloading => "Downloading",
            VideoState::Paused => "Paused",
            VideoState::Cancelled => "Cancelled",
            VideoState::Downloaded => "Downloaded",
            VideoState::Error => "Error",
        }
    }
}

impl fmt::Display for VideoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A user request entering the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    Download,
    Pause,
    Resume,
    Cancel,
    Delete,
    Retry,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Download => "download",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Cancel => "cancel",
            Command::Delete => "delete",
            Command::Retry => "retry",
        };
        f.write_str(name)
    }
}

/// Engine callback kind, stripped of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    Started,
    Progress,
    Paused,
    Resumed,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::Started => "started",
            Signal::Progress => "progress",
            Signal::Paused => "paused",
            Signal::Resumed => "resumed",
            Signal::Completed => "completed",
            Signal::Failed => "failed",
            Signal::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Anything that can be rejected by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Input {
    Command(Command),
    Event(Signal),
    /// A persisted record replayed at startup.
    Restore,
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Command(command) => write!(f, "command '{}'", command),
            Input::Event(signal) => write!(f, "event '{}'", signal),
            Input::Restore => f.write_str("restored record"),
        }
    }
}

/// What a valid command does once accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    /// Ask the engine to start a new download.
    Start,
    /// Forward `pause(token)`.
    Pause,
    /// Forward `resume(token)`.
    Resume,
    /// Forward `cancel(token)`.
    Cancel,
    /// Drop the token locally and forward `delete_local(token)`.
    Delete,
}

const COMMAND_TABLE: &[(VideoState, Command, CommandAction)] = &[
    (VideoState::Downloadable, Command::Download, CommandAction::Start),
    (VideoState::Downloading, Command::Pause, CommandAction::Pause),
    (VideoState::Downloading, Command::Cancel, CommandAction::Cancel),
    (VideoState::Paused, Command::Resume, CommandAction::Resume),
    (VideoState::Paused, Command::Cancel, CommandAction::Cancel),
    (VideoState::Cancelled, Command::Delete, CommandAction::Delete),
    (VideoState::Downloaded, Command::Delete, CommandAction::Delete),
    (VideoState::Error, Command::Retry, CommandAction::Resume),
    (VideoState::Error, Command::Delete, CommandAction::Delete),
];

const EVENT_TABLE: &[(VideoState, Signal, VideoState)] = &[
    (VideoState::Downloadable, Signal::Started, VideoState::Downloading),
    (VideoState::Downloading, Signal::Progress, VideoState::Downloading),
    (VideoState::Downloading, Signal::Paused, VideoState::Paused),
    (VideoState::Downloading, Signal::Completed, VideoState::Downloaded),
    (VideoState::Downloading, Signal::Failed, VideoState::Error),
    (VideoState::Downloading, Signal::Cancelled, VideoState::Cancelled),
    (VideoState::Paused, Signal::Resumed, VideoState::Downloading),
    (VideoState::Paused, Signal::Cancelled, VideoState::Cancelled),
    (VideoState::Error, Signal::Resumed, VideoState::Downloading),
];

/// Look up the action for a user command, or `None` if the command is not
/// valid in `state`.
pub fn command_action(state: VideoState, command: Command) -> Option<CommandAction> {
    COMMAND_TABLE
        .iter()
        .find(|(from, cmd, _)| *from == state && *cmd == command)
        .map(|(_, _, action)| *action)
}

/// Look up the state an engine signal leads to, or `None` if the signal is
/// not expected in `state`.
pub fn next_state(state: VideoState, signal: Signal) -> Option<VideoState> {
    EVENT_TABLE
        .iter()
        .find(|(from, sig, _)| *from == state && *sig == signal)
        .map(|(_, _, to)| *to)
}
