//! Simulated download run.
//!
//! Builds a small catalog, downloads every downloadable video through the
//! simulated engine and drives scripted user actions (pause/resume,
//! retry after failure, cancel and delete) from the UI loop. Progress is
//! shown with one bar per download; the final catalog rows are printed when
//! every download has settled.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use playoffline::{
    engine_channel, format_size, CatalogEntry, CatalogModel, CoreResult, DownloadsModel,
    IniSettingsStore, LibraryConfig, Notifier, OfflineLibrary, SimulatedEngine, SimulationConfig,
    VideoId, VideoRow, VideoState, ViewDiff,
};
use tracing::{debug, info};

use super::settings_path;
use crate::error::CliError;

/// Progress at which scripted pause and cancel actions fire.
const SCRIPT_TRIGGER: f64 = 0.5;

/// Every fifth catalog video is online-only.
const ONLINE_ONLY_EVERY: usize = 5;

/// Arguments for `playoffline simulate`.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Number of catalog videos
    #[arg(long, default_value_t = 4)]
    pub videos: usize,

    /// Fail this video halfway through, then retry it (repeatable)
    #[arg(long, value_name = "ID")]
    pub fail: Vec<String>,

    /// Pause this video halfway through, then resume it (repeatable)
    #[arg(long, value_name = "ID")]
    pub pause: Vec<String>,

    /// Cancel this video halfway through, then delete it (repeatable)
    #[arg(long, value_name = "ID")]
    pub cancel: Vec<String>,

    /// Progress steps per download
    #[arg(long, default_value_t = 20)]
    pub steps: u32,

    /// Milliseconds between progress steps
    #[arg(long, default_value_t = 50)]
    pub tick_ms: u64,

    /// Print the final rows as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run a simulation.
pub fn run(args: SimulateArgs, config: &LibraryConfig) -> Result<(), CliError> {
    if args.videos == 0 {
        return Err(CliError::Config("--videos must be at least 1".to_string()));
    }
    let entries = build_catalog(args.videos);
    let known: HashSet<&str> = entries.iter().map(|e| e.video_id.as_str()).collect();
    for id in args.fail.iter().chain(&args.pause).chain(&args.cancel) {
        if !known.contains(id.as_str()) {
            return Err(CliError::Config(format!(
                "Unknown video '{}'. Catalog ids are video-1..video-{}",
                id, args.videos
            )));
        }
    }

    let settings = IniSettingsStore::open_or_default(settings_path(config)?);
    let tick = Duration::from_millis(args.tick_ms.max(1));
    let simulation = SimulationConfig {
        tick,
        steps: args.steps.max(1),
        ..SimulationConfig::default()
    };

    let (sender, receiver) = engine_channel();
    let engine = SimulatedEngine::new(sender, simulation);
    for id in &args.fail {
        engine.fail_once(id.as_str());
    }

    let notifier = Rc::new(Notifier::new());
    let catalog = Rc::new(RefCell::new(CatalogModel::new()));
    let downloads = Rc::new(RefCell::new(DownloadsModel::new()));
    notifier.subscribe(catalog.clone());
    notifier.subscribe(downloads.clone());

    let mut library = OfflineLibrary::new(
        config,
        Box::new(engine),
        receiver,
        Box::new(settings),
        notifier,
    );
    library.use_catalog(entries)?;

    let targets: Vec<VideoId> = library
        .catalog()
        .iter()
        .filter(|e| e.downloadable)
        .map(|e| e.video_id.clone())
        .collect();
    info!(
        videos = args.videos,
        downloads = targets.len(),
        license = %library.license_policy(),
        "Simulation starting"
    );
    for id in &targets {
        library.request_download(id)?;
    }

    let mut script = Script::new(&args);
    let mut bars = Bars::new();
    let mut view_updates = 0usize;
    let budget = tick * (args.steps.max(1) * 4) + Duration::from_secs(10);
    let deadline = Instant::now() + budget;

    loop {
        view_updates += count_updates(&library.pump());
        bars.refresh(downloads.borrow().rows());
        view_updates += count_updates(&script.step(&mut library)?);

        if script.settled(&library, &targets) {
            break;
        }
        if Instant::now() > deadline {
            return Err(CliError::Timeout(format!(
                "downloads did not settle within {}s",
                budget.as_secs()
            )));
        }
        thread::sleep(tick / 2);
    }
    bars.refresh(downloads.borrow().rows());

    let rows = catalog.borrow().rows().to_vec();
    if args.json {
        let json = serde_json::to_string_pretty(&rows)
            .map_err(|e| CliError::Output(e.to_string()))?;
        println!("{}", json);
    } else {
        print_rows(&rows);
        let downloads = downloads.borrow();
        println!();
        println!(
            "{} downloaded, {} stored, {} view updates",
            downloads.count_in(VideoState::Downloaded),
            format_size(Some(downloads.stored_bytes())),
            view_updates
        );
    }
    Ok(())
}

/// Catalog of `count` videos with increasing durations.
fn build_catalog(count: usize) -> Vec<CatalogEntry> {
    (1..=count)
        .map(|i| {
            let id = format!("video-{}", i);
            let title = format!("Episode {}", i);
            if i % ONLINE_ONLY_EVERY == 0 {
                CatalogEntry::online_only(id, title)
            } else {
                CatalogEntry::new(id, title).with_duration(Duration::from_secs(45 * i as u64))
            }
        })
        .collect()
}

fn count_updates(diffs: &[ViewDiff]) -> usize {
    diffs.iter().filter(|d| !d.diff.is_empty()).count()
}

fn print_rows(rows: &[VideoRow]) {
    println!(
        "{}",
        style(format!(
            "{:<10} {:<14} {:<13} {:>10}",
            "ID", "TITLE", "STATE", "SIZE"
        ))
        .bold()
    );
    for row in rows {
        let state = format!("{:<13}", row.state.label());
        let state = match row.state {
            VideoState::Downloaded => style(state).green(),
            VideoState::Error => style(state).red(),
            VideoState::OnlineOnly => style(state).dim(),
            _ => style(state).yellow(),
        };
        println!(
            "{:<10} {:<14} {} {:>10}",
            row.video_id,
            row.title,
            state,
            row.size_label()
        );
    }
}

// ============================================================================
// Scripted user actions
// ============================================================================

/// User actions performed from the UI loop as downloads progress.
#[derive(Debug, Default)]
struct Script {
    /// Videos to pause; holds when the pause was confirmed.
    pause: HashMap<VideoId, Option<Instant>>,
    /// Videos to cancel; `true` once the cancel was requested.
    cancel: HashMap<VideoId, bool>,
    /// Videos to retry once they fail.
    retry: HashSet<VideoId>,
    /// Videos deleted by the script.
    deleted: HashSet<VideoId>,
    /// How long a paused video stays paused.
    hold: Duration,
}

impl Script {
    fn new(args: &SimulateArgs) -> Self {
        let ids = |list: &[String]| -> Vec<VideoId> {
            list.iter().map(|s| VideoId::new(s.as_str())).collect()
        };
        Self {
            pause: ids(&args.pause).into_iter().map(|id| (id, None)).collect(),
            cancel: ids(&args.cancel).into_iter().map(|id| (id, false)).collect(),
            retry: ids(&args.fail).into_iter().collect(),
            deleted: HashSet::new(),
            hold: Duration::from_millis(args.tick_ms.max(1) * 5),
        }
    }

    /// Issue whichever scripted commands are due.
    fn step(&mut self, library: &mut OfflineLibrary) -> Result<Vec<ViewDiff>, CliError> {
        let mut diffs = Vec::new();

        let paused: Vec<VideoId> = self.pause.keys().cloned().collect();
        for id in paused {
            let halfway = library.progress(&id).is_some_and(|p| p >= SCRIPT_TRIGGER);
            match (library.state(&id), self.pause.get(&id).copied().flatten()) {
                (Some(VideoState::Downloading), None) if halfway => {
                    if accepted(library.request_pause(&id), &mut diffs)? {
                        debug!(video_id = %id, "Scripted pause");
                    }
                }
                (Some(VideoState::Paused), None) => {
                    self.pause.insert(id, Some(Instant::now()));
                }
                (Some(VideoState::Paused), Some(since)) if since.elapsed() >= self.hold => {
                    if accepted(library.request_resume(&id), &mut diffs)? {
                        debug!(video_id = %id, "Scripted resume");
                        self.pause.remove(&id);
                    }
                }
                _ => {}
            }
        }

        let cancelled: Vec<VideoId> = self.cancel.keys().cloned().collect();
        for id in cancelled {
            let requested = self.cancel.get(&id).copied().unwrap_or(false);
            let halfway = library.progress(&id).is_some_and(|p| p >= SCRIPT_TRIGGER);
            match library.state(&id) {
                Some(VideoState::Downloading | VideoState::Paused) if halfway && !requested => {
                    if accepted(library.request_cancel(&id), &mut diffs)? {
                        self.cancel.insert(id, true);
                    }
                }
                Some(VideoState::Cancelled) => {
                    if accepted(library.request_delete(&id), &mut diffs)? {
                        debug!(video_id = %id, "Scripted delete");
                        self.cancel.remove(&id);
                        self.deleted.insert(id);
                    }
                }
                _ => {}
            }
        }

        let failed: Vec<VideoId> = self
            .retry
            .iter()
            .filter(|id| library.state(id) == Some(VideoState::Error))
            .cloned()
            .collect();
        for id in failed {
            if accepted(library.request_retry(&id), &mut diffs)? {
                debug!(video_id = %id, "Scripted retry");
                self.retry.remove(&id);
            }
        }

        Ok(diffs)
    }

    /// Whether every target finished downloading or was deleted.
    fn settled(&self, library: &OfflineLibrary, targets: &[VideoId]) -> bool {
        targets.iter().all(|id| match library.state(id) {
            Some(VideoState::Downloaded) => true,
            Some(VideoState::Downloadable) => self.deleted.contains(id) && !library.is_pending(id),
            _ => false,
        })
    }
}

/// Collect a command's diffs. Commands that lost a race with an engine
/// event are skipped.
fn accepted(result: CoreResult<Vec<ViewDiff>>, diffs: &mut Vec<ViewDiff>) -> Result<bool, CliError> {
    match result {
        Ok(mut applied) => {
            diffs.append(&mut applied);
            Ok(true)
        }
        Err(e) if e.is_ignorable() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Progress display
// ============================================================================

/// One progress bar per download, keyed by video.
struct Bars {
    multi: MultiProgress,
    bars: HashMap<VideoId, ProgressBar>,
}

impl Bars {
    fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
        }
    }

    /// Sync bars with the downloads model rows.
    fn refresh(&mut self, rows: &[VideoRow]) {
        for row in rows {
            let bar = self
                .bars
                .entry(row.video_id.clone())
                .or_insert_with(|| self.multi.add(make_progress_bar(&row.title)));
            bar.set_position(u64::from(row.progress_percent().unwrap_or(0)));
            let message = format!("{:<12} {}", row.state.label(), row.size_label());
            match row.state {
                VideoState::Downloaded => bar.finish_with_message(message),
                _ => bar.set_message(message),
            }
        }

        let live: HashSet<&VideoId> = rows.iter().map(|row| &row.video_id).collect();
        self.bars.retain(|id, bar| {
            let keep = live.contains(id);
            if !keep {
                bar.abandon_with_message("deleted");
            }
            keep
        });
    }
}

fn make_progress_bar(title: &str) -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{prefix:<14} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━━╌");
    bar.set_style(style);
    bar.set_prefix(title.to_string());
    bar
}
