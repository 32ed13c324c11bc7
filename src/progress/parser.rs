use anyhow::Result;
use regex_automata::meta::Regex;
use regex_automata::util::captures::Captures;
use regex_automata::Input;
use serde::Serialize;

use crate::settings::PosSettings;
use crate::size::calculate_num_files;

pub const DEFAULT_DETAILS: &str = "Starting POS data generation...";

/// Stage of a generation run.
///
/// The parser only produces `Processing`, `Complete` and `Error`;
/// `NotStarted` belongs to the aggregator before anything was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    NotStarted,
    Processing,
    Complete,
    Error,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Complete | Stage::Error)
    }
}

/// Which rule produced a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Unrecognized,
    FileStarted,
    FileCompleted,
    RunCompleted,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileProgress {
    pub current_file: u32,
    pub current_labels: Option<u64>,
    pub target_labels: Option<u64>,
}

/// One parsed observation of a postcli output line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub stage: Stage,
    /// Always within `0.0..=100.0`
    pub progress: f64,
    pub details: String,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_progress: Option<FileProgress>,
    pub kind: LineKind,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            stage: Stage::Processing,
            progress: 0.0,
            details: DEFAULT_DETAILS.to_string(),
            is_error: false,
            file_progress: None,
            kind: LineKind::Unrecognized,
        }
    }
}

/// Stateless postcli log line parser.
///
/// Rules are checked most specific first: error, file completed, file
/// starting, run completed. Anything else yields the default snapshot.
pub struct ProgressParser {
    prefix: Regex,
    error: Regex,
    file_completed: Regex,
    file_starting: Regex,
    run_completed: Regex,
    file_index: Regex,
    labels_written: Regex,
    current_labels: Regex,
    target_labels: Regex,
}

fn field_pattern(name: &str) -> String {
    format!(r#""?{name}"?\s*[:=]\s*(\d+)"#)
}

impl ProgressParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            prefix: Regex::new(r"^(?:postcli )?(?:stdout|stderr):\s*")?,
            error: Regex::new(r"(?i)error|aborting")?,
            file_completed: Regex::new(r"initialization:\s+(?:completed|file already initialized)")?,
            file_starting: Regex::new(r"initialization:\s+starting to write file")?,
            run_completed: Regex::new(r"cli: initialization completed|initialization: completed, found nonce")?,
            file_index: Regex::new(&field_pattern("fileIndex"))?,
            labels_written: Regex::new(&field_pattern("numLabelsWritten"))?,
            current_labels: Regex::new(&field_pattern("currentNumLabels"))?,
            target_labels: Regex::new(&field_pattern("targetNumLabels"))?,
        })
    }

    /// The line with any `postcli stdout:` style tag removed
    pub fn clean<'a>(&self, line: &'a str) -> &'a str {
        let line = line.trim_end_matches(['\r', '\n']);
        match self.prefix.find(line) {
            Some(m) => &line[m.end()..],
            None => line,
        }
    }

    pub fn parse(&self, line: &str, settings: PosSettings) -> ProgressSnapshot {
        let clean = self.clean(line);
        if clean.trim().is_empty() {
            return ProgressSnapshot::default();
        }

        let total_files = calculate_num_files(settings.num_units, settings.max_file_size_mib);

        if self.error.is_match(clean) {
            return ProgressSnapshot {
                stage: Stage::Error,
                progress: 0.0,
                details: clean.to_string(),
                is_error: true,
                file_progress: None,
                kind: LineKind::Error,
            };
        }

        if self.file_completed.is_match(clean) {
            if let Some(current_file) = self.capture_file_index(clean) {
                let labels = self.capture_u64(&self.labels_written, clean);
                let progress = file_percent(current_file, total_files);
                return ProgressSnapshot {
                    stage: Stage::Processing,
                    progress,
                    details: format!(
                        "{} of {} files generated ({}%)",
                        u64::from(current_file) + 1,
                        total_files,
                        progress.round()
                    ),
                    is_error: false,
                    file_progress: Some(FileProgress {
                        current_file,
                        current_labels: labels,
                        target_labels: labels,
                    }),
                    kind: LineKind::FileCompleted,
                };
            }
        }

        if self.file_starting.is_match(clean) {
            if let Some(current_file) = self.capture_file_index(clean) {
                let progress = file_percent(current_file, total_files);
                return ProgressSnapshot {
                    stage: Stage::Processing,
                    progress,
                    details: format!("Writing file {} of {}", u64::from(current_file) + 1, total_files),
                    is_error: false,
                    file_progress: Some(FileProgress {
                        current_file,
                        current_labels: self.capture_u64(&self.current_labels, clean),
                        target_labels: self.capture_u64(&self.target_labels, clean),
                    }),
                    kind: LineKind::FileStarted,
                };
            }
        }

        if self.run_completed.is_match(clean) {
            return ProgressSnapshot {
                stage: Stage::Complete,
                progress: 100.0,
                details: format!("All {total_files} files have been generated successfully"),
                is_error: false,
                file_progress: None,
                kind: LineKind::RunCompleted,
            };
        }

        ProgressSnapshot::default()
    }

    /// `fileIndex` field; an index that does not fit a `u32` is no match
    fn capture_file_index(&self, haystack: &str) -> Option<u32> {
        self.capture_u64(&self.file_index, haystack)
            .and_then(|index| u32::try_from(index).ok())
    }

    fn capture_u64(&self, re: &Regex, haystack: &str) -> Option<u64> {
        let mut caps: Captures = re.create_captures();
        re.captures(Input::new(haystack), &mut caps);
        let span = caps.get_group(1)?;
        haystack[span.start..span.end].parse().ok()
    }
}

/// `(index + 1) / total * 100`, clamped to `0..=100`
fn file_percent(file_index: u32, total_files: u64) -> f64 {
    let done = f64::from(file_index) + 1.0;
    (done / total_files.max(1) as f64 * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: PosSettings = PosSettings { num_units: 100, max_file_size_mib: 1000 };

    fn parser() -> ProgressParser {
        ProgressParser::new().unwrap()
    }

    #[test]
    fn test_empty_line_is_default() {
        let snapshot = parser().parse("", SETTINGS);
        assert_eq!(snapshot, ProgressSnapshot::default());
        assert_eq!(snapshot.details, "Starting POS data generation...");
        assert_eq!(parser().parse("postcli stdout: ", SETTINGS), ProgressSnapshot::default());
    }

    #[test]
    fn test_unrecognized_line_is_default() {
        assert_eq!(parser().parse("some random log message", SETTINGS), ProgressSnapshot::default());
    }

    #[test]
    fn test_file_completed_with_labels() {
        let line = r#"2024-12-17T22:34:57.991+0100	INFO	initialization: completed	{"fileIndex": 5, "numLabelsWritten": 26559}"#;
        let snapshot = parser().parse(line, SETTINGS);
        let expected_progress = 6.0 / 6554.0 * 100.0;
        assert_eq!(snapshot.stage, Stage::Processing);
        assert_eq!(snapshot.kind, LineKind::FileCompleted);
        assert!((snapshot.progress - expected_progress).abs() < 1e-9);
        assert_eq!(snapshot.details, "6 of 6554 files generated (0%)");
        assert_eq!(
            snapshot.file_progress,
            Some(FileProgress { current_file: 5, current_labels: Some(26559), target_labels: Some(26559) })
        );
    }

    #[test]
    fn test_file_already_initialized_with_prefix() {
        let line = r#"postcli stdout: INFO	initialization: file already initialized	{"fileIndex": 3}"#;
        let snapshot = parser().parse(line, PosSettings { num_units: 4, max_file_size_mib: 4096 });
        assert_eq!(snapshot.details, "4 of 64 files generated (6%)");
        assert_eq!(snapshot.file_progress.unwrap().current_file, 3);
        assert_eq!(snapshot.file_progress.unwrap().current_labels, None);
    }

    #[test]
    fn test_file_starting() {
        let line = r#"postcli stderr: INFO	initialization: starting to write file	{"fileIndex": 0, "currentNumLabels": 0, "targetNumLabels": 268435456, "startPosition": 0}"#;
        let snapshot = parser().parse(line, PosSettings { num_units: 4, max_file_size_mib: 4096 });
        assert_eq!(snapshot.kind, LineKind::FileStarted);
        assert_eq!(snapshot.stage, Stage::Processing);
        assert_eq!(
            snapshot.file_progress,
            Some(FileProgress { current_file: 0, current_labels: Some(0), target_labels: Some(268435456) })
        );
        assert!((snapshot.progress - 100.0 / 64.0).abs() < 1e-9);
    }

    #[test]
    fn test_error_lines() {
        let snapshot = parser().parse("ERROR: Failed to write file", SETTINGS);
        assert_eq!(
            snapshot,
            ProgressSnapshot {
                stage: Stage::Error,
                progress: 0.0,
                details: "ERROR: Failed to write file".to_string(),
                is_error: true,
                file_progress: None,
                kind: LineKind::Error,
            }
        );
        let aborting = parser().parse("postcli stdout: WARNING cannot proceed, Aborting", SETTINGS);
        assert_eq!(aborting.stage, Stage::Error);
        assert_eq!(aborting.details, "WARNING cannot proceed, Aborting");
    }

    #[test]
    fn test_error_wins_over_completion() {
        let line = r#"INFO initialization: completed {"fileIndex": 1} with error"#;
        assert_eq!(parser().parse(line, SETTINGS).stage, Stage::Error);
    }

    #[test]
    fn test_run_completion_markers() {
        for line in ["cli: initialization completed", "INFO initialization: completed, found nonce {\"nonce\": 12}"] {
            let snapshot = parser().parse(line, SETTINGS);
            assert_eq!(snapshot.stage, Stage::Complete);
            assert_eq!(snapshot.progress, 100.0);
            assert_eq!(snapshot.details, "All 6554 files have been generated successfully");
        }
    }

    #[test]
    fn test_per_file_marker_without_index_is_not_completion() {
        let snapshot = parser().parse("INFO initialization: completed", SETTINGS);
        assert_eq!(snapshot.stage, Stage::Processing);
        assert_eq!(snapshot.kind, LineKind::Unrecognized);
    }

    #[test]
    fn test_oversized_file_index_is_not_a_file_event() {
        let p = parser();
        let completed = r#"INFO initialization: completed {"fileIndex": 4294967296}"#;
        assert_eq!(p.parse(completed, SETTINGS), ProgressSnapshot::default());

        let starting = r#"INFO initialization: starting to write file {"fileIndex": 4294967296, "currentNumLabels": 0}"#;
        assert_eq!(p.parse(starting, SETTINGS).kind, LineKind::Unrecognized);

        let last = r#"INFO initialization: completed {"fileIndex": 4294967295}"#;
        assert_eq!(p.parse(last, SETTINGS).file_progress.unwrap().current_file, u32::MAX);
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let p = parser();
        let line = r#"INFO initialization: completed {"fileIndex": 9}"#;
        assert_eq!(p.parse(line, SETTINGS), p.parse(line, SETTINGS));
    }

    #[test]
    fn test_percent_is_monotonic_and_clamped() {
        let total = calculate_num_files(4, 4096);
        let mut last = 0.0;
        for index in 0..total as u32 {
            let percent = file_percent(index, total);
            assert!(percent >= last);
            assert!(percent < 100.0 || index as u64 == total - 1);
            last = percent;
        }
        assert_eq!(last, 100.0);
        assert_eq!(file_percent(500, total), 100.0);
        assert_eq!(file_percent(0, 0), 100.0);
    }
}
