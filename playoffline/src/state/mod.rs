//! Video state machine.
//!
//! A video's display state is a pure function of its registry entry and the
//! latest engine event applied to it. This module holds the state tag, the
//! transition tables, and per-token progress tracking.
//!
//! # State Machine
//!
//! ```text
//! Downloadable --[Started]--> Downloading --[Completed]--> Downloaded
//!                               │    ▲  │                      │
//!                        [Paused]  [Resumed] [Failed]          │ delete
//!                               ▼    │  ▼                      ▼
//!                              Paused   Error --delete--> Downloadable
//!                               │          (retry: Resumed → Downloading)
//!                    [Cancelled]│
//!                               ▼
//!                           Cancelled --delete--> Downloadable
//! ```
//!
//! Any input not listed for the current state is ignored.

mod machine;
mod progress;

pub use machine::{command_action, next_state, Command, CommandAction, Input, Signal, VideoState};
pub use progress::ProgressTracker;
