use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::process::ProcessHandle;
use crate::progress::parser::{FileProgress, LineKind, ProgressParser, ProgressSnapshot, Stage};
use crate::settings::PosSettings;
use crate::size::MIB_TO_BYTES;

/// Lines of cleaned postcli output kept for display
pub const LOG_TAIL_CAPACITY: usize = 200;

/// Input to the aggregator, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Launched(ProcessHandle),
    /// One raw output line from postcli
    Output(String),
    ProcessExited { code: Option<i32> },
    /// Result of one polling tick; `bytes` is `None` when the query failed
    FileSize { tick: u64, file_index: u32, bytes: Option<u64> },
    /// The user stopped the process
    Stopped,
    /// A new run is about to start
    Reset,
}

/// Side effect the caller must carry out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Entered the Error stage; show `details` verbatim. Emitted once per run.
    ShowError(String),
}

/// UI-facing state of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedProgress {
    pub stage: Stage,
    pub progress: f64,
    pub details: String,
    pub is_error: bool,
    pub file_progress: Option<FileProgress>,
    /// Rule that produced the adopted observation
    pub last_kind: LineKind,
    /// Bytes of the current data file at the latest applied poll
    pub current_file_bytes: Option<u64>,
    pub current_file_percent: f64,
    pub handle: Option<ProcessHandle>,
}

impl Default for AggregatedProgress {
    fn default() -> Self {
        Self {
            stage: Stage::NotStarted,
            progress: 0.0,
            details: String::new(),
            is_error: false,
            file_progress: None,
            last_kind: LineKind::Unrecognized,
            current_file_bytes: None,
            current_file_percent: 0.0,
            handle: None,
        }
    }
}

impl AggregatedProgress {
    /// Overall percent including the partial current file
    pub fn fine_percent(&self, total_files: u64) -> f64 {
        if self.stage == Stage::Complete {
            return 100.0;
        }
        match (self.last_kind, self.file_progress) {
            (LineKind::FileStarted, Some(file)) => {
                let finished = f64::from(file.current_file) + self.current_file_percent / 100.0;
                (finished / total_files.max(1) as f64 * 100.0).clamp(0.0, 100.0)
            }
            _ => self.progress,
        }
    }
}

/// Folds parsed snapshots and polling results into [`AggregatedProgress`].
///
/// Complete and Error are terminal: only `Reset` leaves them.
pub struct ProgressAggregator {
    parser: ProgressParser,
    settings: PosSettings,
    state: AggregatedProgress,
    last_tick: Option<u64>,
    log_tail: VecDeque<String>,
}

impl ProgressAggregator {
    pub fn new(parser: ProgressParser, settings: PosSettings) -> Self {
        Self {
            parser,
            settings,
            state: AggregatedProgress::default(),
            last_tick: None,
            log_tail: VecDeque::with_capacity(LOG_TAIL_CAPACITY),
        }
    }

    pub fn state(&self) -> &AggregatedProgress {
        &self.state
    }

    pub fn settings(&self) -> PosSettings {
        self.settings
    }

    pub fn log_tail(&self) -> impl Iterator<Item = &str> {
        self.log_tail.iter().map(String::as_str)
    }

    /// File index to poll, while the run is live and a file is known
    pub fn poll_target(&self) -> Option<u32> {
        if self.state.stage.is_terminal() || self.state.handle.is_none() {
            return None;
        }
        self.state.file_progress.map(|f| f.current_file)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.settings.max_file_size_mib * MIB_TO_BYTES
    }

    pub fn apply(&mut self, event: ProgressEvent) -> Option<Effect> {
        match event {
            ProgressEvent::Reset => {
                self.state = AggregatedProgress::default();
                self.last_tick = None;
                self.log_tail.clear();
                None
            }
            ProgressEvent::Launched(handle) => {
                self.state.handle = Some(handle);
                None
            }
            ProgressEvent::Output(line) => self.apply_line(&line),
            ProgressEvent::ProcessExited { code } => {
                self.state.handle = None;
                match code {
                    Some(code) if code != 0 && !self.state.stage.is_terminal() => {
                        self.apply_snapshot(ProgressSnapshot {
                            stage: Stage::Error,
                            progress: 0.0,
                            details: format!("postcli exited with status {code}"),
                            is_error: true,
                            file_progress: None,
                            kind: LineKind::Error,
                        })
                    }
                    _ => None,
                }
            }
            ProgressEvent::Stopped => {
                self.state.handle = None;
                None
            }
            ProgressEvent::FileSize { tick, file_index, bytes } => {
                self.apply_file_size(tick, file_index, bytes);
                None
            }
        }
    }

    fn apply_line(&mut self, line: &str) -> Option<Effect> {
        let clean = self.parser.clean(line);
        if !clean.trim().is_empty() {
            if self.log_tail.len() == LOG_TAIL_CAPACITY {
                self.log_tail.pop_front();
            }
            self.log_tail.push_back(clean.to_string());
        }
        let snapshot = self.parser.parse(line, self.settings);
        debug!(stage = ?snapshot.stage, kind = ?snapshot.kind, progress = snapshot.progress, "Parsed postcli output");
        self.apply_snapshot(snapshot)
    }

    fn apply_snapshot(&mut self, snapshot: ProgressSnapshot) -> Option<Effect> {
        if self.state.stage.is_terminal() {
            return None;
        }

        if let (Some(previous), Some(next)) = (self.state.file_progress, snapshot.file_progress) {
            if previous.current_file != next.current_file {
                self.state.current_file_bytes = None;
                self.state.current_file_percent = 0.0;
            }
        }

        self.state.stage = snapshot.stage;
        self.state.progress = snapshot.progress;
        self.state.details = snapshot.details;
        self.state.is_error = snapshot.is_error;
        self.state.file_progress = snapshot.file_progress;
        self.state.last_kind = snapshot.kind;

        match snapshot.stage {
            Stage::Error => {
                warn!(details = %self.state.details, "Generation failed");
                Some(Effect::ShowError(self.state.details.clone()))
            }
            Stage::Complete => {
                self.state.current_file_percent = 100.0;
                info!("{}", self.state.details);
                None
            }
            _ => None,
        }
    }

    fn apply_file_size(&mut self, tick: u64, file_index: u32, bytes: Option<u64>) {
        if self.last_tick.is_some_and(|last| tick <= last) {
            debug!(tick, "Ignoring stale poll result");
            return;
        }
        if self.state.stage.is_terminal() {
            return;
        }
        if self.state.file_progress.map(|f| f.current_file) != Some(file_index) {
            return;
        }
        self.last_tick = Some(tick);

        let max_bytes = self.max_file_size_bytes();
        self.state.current_file_bytes = bytes;
        self.state.current_file_percent = match (bytes, max_bytes) {
            (Some(bytes), max) if max > 0 => (bytes as f64 / max as f64 * 100.0).clamp(0.0, 100.0),
            _ => 0.0,
        };
    }
}
