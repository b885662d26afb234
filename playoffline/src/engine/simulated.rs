//! Thread-per-download simulated engine.
//!
//! Each download runs on its own thread, emitting `Started`, a series of
//! `Progress` events and finally `Completed`. Pause, resume and cancel are
//! delivered to the job thread over a command channel and confirmed through
//! the engine sender, exactly as a real engine would confirm them.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{DownloadEngine, EngineEventKind, EngineSender};
use crate::catalog::{CatalogEntry, VideoId};
use crate::registry::DownloadToken;
use crate::settings::LicensePolicy;

/// Bytes reported for entries without a duration.
const FALLBACK_BYTES: u64 = 50 * 1024 * 1024;

/// Tuning for the simulated engine.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Delay between progress steps.
    pub tick: Duration,
    /// Number of progress steps per download.
    pub steps: u32,
    /// Encoded bitrate used to compute the final size (bits/s).
    pub bitrate_bps: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            steps: 20,
            bitrate_bps: 2_400_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobCommand {
    Pause,
    Resume,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Running,
    Paused,
    Failed,
}

struct JobPlan {
    token: DownloadToken,
    steps: u32,
    tick: Duration,
    total_bytes: u64,
    fail_at: Option<u32>,
}

/// Simulated download engine.
pub struct SimulatedEngine {
    sender: EngineSender,
    config: SimulationConfig,
    next_token: AtomicU64,
    jobs: Mutex<HashMap<DownloadToken, Sender<JobCommand>>>,
    failures: Mutex<HashSet<VideoId>>,
}

impl std::fmt::Debug for SimulatedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedEngine")
            .field("config", &self.config)
            .field("jobs", &self.jobs.lock().len())
            .finish_non_exhaustive()
    }
}

impl SimulatedEngine {
    /// Create an engine reporting through `sender`.
    pub fn new(sender: EngineSender, config: SimulationConfig) -> Self {
        Self {
            sender,
            config,
            next_token: AtomicU64::new(1),
            jobs: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashSet::new()),
        }
    }

    /// Make the next download of `video_id` fail halfway through.
    pub fn fail_once(&self, video_id: impl Into<VideoId>) {
        self.failures.lock().insert(video_id.into());
    }

    /// Number of jobs whose local data has not been deleted.
    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    fn total_bytes(&self, entry: &CatalogEntry) -> u64 {
        match entry.metadata.duration {
            Some(duration) => {
                (duration.as_secs_f64() * self.config.bitrate_bps as f64 / 8.0) as u64
            }
            None => FALLBACK_BYTES,
        }
    }

    fn send_command(&self, token: &DownloadToken, command: JobCommand) {
        match self.jobs.lock().get(token) {
            Some(tx) => {
                if tx.send(command).is_err() {
                    debug!(token = %token, ?command, "Job already finished");
                }
            }
            None => debug!(token = %token, ?command, "No job for token"),
        }
    }
}

impl DownloadEngine for SimulatedEngine {
    fn start_download(&self, entry: &CatalogEntry, policy: &LicensePolicy) {
        let token = DownloadToken::new(format!(
            "sim-{}",
            self.next_token.fetch_add(1, Ordering::SeqCst)
        ));
        let steps = self.config.steps.max(1);
        let fail_at = self
            .failures
            .lock()
            .remove(&entry.video_id)
            .then_some((steps / 2).max(1));

        let (tx, rx) = mpsc::channel();
        self.jobs.lock().insert(token.clone(), tx);

        info!(
            video_id = %entry.video_id,
            token = %token,
            policy = %policy,
            "Simulated download created"
        );
        self.sender.started(&token, &entry.video_id);

        let plan = JobPlan {
            token,
            steps,
            tick: self.config.tick,
            total_bytes: self.total_bytes(entry),
            fail_at,
        };
        let sender = self.sender.clone();
        thread::spawn(move || run_job(plan, rx, sender));
    }

    fn pause(&self, token: &DownloadToken) {
        self.send_command(token, JobCommand::Pause);
    }

    fn resume(&self, token: &DownloadToken) {
        self.send_command(token, JobCommand::Resume);
    }

    fn cancel(&self, token: &DownloadToken) {
        self.send_command(token, JobCommand::Cancel);
    }

    fn delete_local(&self, token: &DownloadToken) {
        // Dropping the command sender stops a job that is still running.
        if self.jobs.lock().remove(token).is_some() {
            debug!(token = %token, "Simulated local data deleted");
        }
    }
}

fn run_job(plan: JobPlan, commands: Receiver<JobCommand>, sender: EngineSender) {
    let JobPlan {
        token,
        steps,
        tick,
        total_bytes,
        mut fail_at,
    } = plan;
    let mut state = JobState::Running;
    let mut step = 0u32;

    loop {
        loop {
            let command = match commands.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            };
            match (command, state) {
                (JobCommand::Pause, JobState::Running) => {
                    state = JobState::Paused;
                    sender.confirm(&token, EngineEventKind::Paused);
                }
                (JobCommand::Resume, JobState::Paused) => {
                    state = JobState::Running;
                    sender.confirm(&token, EngineEventKind::Resumed);
                }
                (JobCommand::Resume, JobState::Failed) => {
                    state = JobState::Running;
                    step = 0;
                    fail_at = None;
                    sender.confirm(&token, EngineEventKind::Resumed);
                }
                (JobCommand::Cancel, JobState::Running | JobState::Paused) => {
                    sender.confirm(&token, EngineEventKind::Cancelled);
                    return;
                }
                _ => {}
            }
        }

        if state == JobState::Running {
            step += 1;
            if fail_at == Some(step) {
                state = JobState::Failed;
                sender.failed(&token, "simulated network failure");
            } else {
                sender.progress(&token, f64::from(step) / f64::from(steps));
                if step >= steps {
                    sender.completed(&token, total_bytes);
                    return;
                }
            }
        }

        if sender.is_closed() {
            return;
        }
        thread::sleep(tick);
    }
}
