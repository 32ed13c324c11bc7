use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::process::ProcessHandle;
use crate::progress::{AggregatedProgress, Stage};

/// Receives progress updates from the monitor loop
pub trait ProgressReporter: Send {
    fn started(&mut self, handle: ProcessHandle, total_files: u64);

    fn update(&mut self, state: &AggregatedProgress, total_files: u64);

    /// The run entered the Error stage; `details` is postcli's own message
    fn error(&mut self, details: &str);

    fn finished(&mut self, state: &AggregatedProgress);
}

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}";

/// `indicatif` progress bar on stderr
pub struct TerminalReporter {
    bar: ProgressBar,
}

impl TerminalReporter {
    /// With `show_bar` false the bar is hidden; final messages still print
    pub fn new(show_bar: bool) -> Self {
        let bar = if show_bar { ProgressBar::new(100) } else { ProgressBar::hidden() };
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressReporter for TerminalReporter {
    fn started(&mut self, handle: ProcessHandle, total_files: u64) {
        self.bar.println(format!(
            "postcli started (pid {}), {} files to generate",
            handle.process_id, total_files
        ));
        self.bar.set_message("Starting POS data generation...");
    }

    fn update(&mut self, state: &AggregatedProgress, total_files: u64) {
        self.bar.set_position(state.fine_percent(total_files).floor() as u64);
        self.bar.set_message(state.details.clone());
    }

    fn error(&mut self, details: &str) {
        self.bar.abandon_with_message("failed");
        eprintln!("Error: {details}");
    }

    fn finished(&mut self, state: &AggregatedProgress) {
        match state.stage {
            Stage::Complete => {
                self.bar.set_position(100);
                self.bar.finish_with_message(state.details.clone());
                eprintln!("{}", state.details);
            }
            Stage::Error => {}
            _ => self.bar.abandon_with_message("stopped"),
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum JsonEvent<'a> {
    Started { timestamp: u64, process_id: u32, total_files: u64 },
    Progress {
        timestamp: u64,
        total_files: u64,
        percent: f64,
        #[serde(flatten)]
        state: &'a AggregatedProgress,
    },
    Error { timestamp: u64, details: &'a str },
    Finished {
        timestamp: u64,
        #[serde(flatten)]
        state: &'a AggregatedProgress,
    },
}

/// One JSON object per line, for machine consumers
pub struct JsonReporter<W: Write + Send> {
    out: W,
    dropped: u64,
}

impl JsonReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out, dropped: 0 }
    }

    /// Events that could not be serialised or written
    pub fn dropped_events(&self) -> u64 {
        self.dropped
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, event: &JsonEvent<'_>) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                self.dropped += 1;
                warn!("Failed to serialise progress event: {}", e);
                return;
            }
        };
        if let Err(e) = writeln!(self.out, "{line}").and_then(|()| self.out.flush()) {
            self.dropped += 1;
            warn!(dropped = self.dropped, "Failed to write progress event: {}", e);
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl<W: Write + Send> ProgressReporter for JsonReporter<W> {
    fn started(&mut self, handle: ProcessHandle, total_files: u64) {
        self.emit(&JsonEvent::Started {
            timestamp: now_millis(),
            process_id: handle.process_id,
            total_files,
        });
    }

    fn update(&mut self, state: &AggregatedProgress, total_files: u64) {
        self.emit(&JsonEvent::Progress {
            timestamp: now_millis(),
            total_files,
            percent: state.fine_percent(total_files),
            state,
        });
    }

    fn error(&mut self, details: &str) {
        self.emit(&JsonEvent::Error { timestamp: now_millis(), details });
    }

    fn finished(&mut self, state: &AggregatedProgress) {
        self.emit(&JsonEvent::Finished { timestamp: now_millis(), state });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_json_lines() {
        let mut reporter = JsonReporter::new(Vec::new());
        let handle = ProcessHandle { process_id: 11, running: true };
        let state = AggregatedProgress {
            stage: Stage::Processing,
            progress: 25.0,
            details: "16 of 64 files generated (25%)".into(),
            handle: Some(handle),
            ..AggregatedProgress::default()
        };
        reporter.started(handle, 64);
        reporter.update(&state, 64);
        reporter.error("ERROR disk full");

        let out = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<Value> = out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["event"], "started");
        assert_eq!(lines[0]["process_id"], 11);
        assert_eq!(lines[1]["event"], "progress");
        assert_eq!(lines[1]["stage"], "PROCESSING");
        assert_eq!(lines[1]["percent"], 25.0);
        assert_eq!(lines[2]["details"], "ERROR disk full");
    }

    /// Writer whose reader went away
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failures_are_counted_not_fatal() {
        let mut reporter = JsonReporter::new(ClosedPipe);
        let handle = ProcessHandle { process_id: 3, running: true };
        reporter.started(handle, 64);
        reporter.update(&AggregatedProgress::default(), 64);
        reporter.finished(&AggregatedProgress::default());
        assert_eq!(reporter.dropped_events(), 3);

        let mut healthy = JsonReporter::new(Vec::new());
        healthy.started(handle, 64);
        assert_eq!(healthy.dropped_events(), 0);
    }

    #[test]
    fn test_hidden_terminal_reporter() {
        let mut reporter = TerminalReporter::new(false);
        let state = AggregatedProgress { stage: Stage::Complete, ..AggregatedProgress::default() };
        reporter.update(&state, 4);
        reporter.finished(&state);
        assert!(reporter.bar.is_finished());
    }
}
