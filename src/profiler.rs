// Proving speed profiling: profiler invocation, its JSON output, and what the
// measured speed means for how much data can be initialized safely.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::capability::PosCapabilities;
use crate::error::CapabilityError;
use crate::size::{calculate_max_data_size, size_per_unit, DEFAULT_LABELS_PER_UNIT};

/// Nonces are processed in groups of this size
pub const NONCES_PER_GROUP: u32 = 16;

/// Chance of finding a proof in one pass with a single group of nonces
const BASE_GROUP_PROBABILITY: f64 = 0.0124;

/// Parameters for one profiler run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilerConfig {
    pub nonces: u32,
    pub threads: u32,
    /// Data read during the run, GiB
    pub data_size_gib: u32,
    pub duration_secs: u32,
    /// Data file to read; a temporary file is used and removed when `None`
    pub data_file: Option<PathBuf>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            nonces: NONCES_PER_GROUP,
            threads: 1,
            data_size_gib: 1,
            duration_secs: 10,
            data_file: None,
        }
    }
}

impl ProfilerConfig {
    pub fn check(&self) -> Result<(), CapabilityError> {
        if self.nonces == 0 {
            return Err(CapabilityError::Profiler("Nonces parameter is required".to_string()));
        }
        if self.nonces % NONCES_PER_GROUP != 0 {
            return Err(CapabilityError::Profiler(format!(
                "Nonces must be a multiple of {NONCES_PER_GROUP}"
            )));
        }
        if self.threads == 0 {
            return Err(CapabilityError::Profiler("Threads must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Profiler arguments reading from `data_file`
    pub fn args(&self, data_file: &Path) -> Vec<String> {
        vec![
            "--threads".to_string(),
            self.threads.to_string(),
            "--nonces".to_string(),
            self.nonces.to_string(),
            "--data-file".to_string(),
            data_file.to_string_lossy().into_owned(),
            "--data-size".to_string(),
            self.data_size_gib.to_string(),
            "--duration".to_string(),
            self.duration_secs.to_string(),
        ]
    }
}

/// The fields of the profiler's stdout JSON we rely on
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ProfilerOutput {
    pub time_s: f64,
    pub speed_gib_s: f64,
}

impl ProfilerOutput {
    pub fn parse(stdout: &[u8]) -> Result<Self, CapabilityError> {
        let output: ProfilerOutput = serde_json::from_slice(stdout)
            .map_err(|e| CapabilityError::Profiler(format!("Failed to parse profiler output: {e}")))?;
        if !output.speed_gib_s.is_finite() || output.speed_gib_s < 0.0 {
            return Err(CapabilityError::Profiler(format!(
                "profiler reported an invalid speed: {}",
                output.speed_gib_s
            )));
        }
        Ok(output)
    }
}

/// One completed profiler run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfilerResult {
    pub nonces: u32,
    pub threads: u32,
    pub time_s: f64,
    pub speed_gib_s: f64,
    pub data_size_gib: u32,
    pub duration_secs: u32,
    pub data_file: Option<PathBuf>,
}

impl ProfilerResult {
    pub fn new(config: &ProfilerConfig, output: ProfilerOutput) -> Self {
        Self {
            nonces: config.nonces,
            threads: config.threads,
            time_s: output.time_s,
            speed_gib_s: output.speed_gib_s,
            data_size_gib: config.data_size_gib,
            duration_secs: config.duration_secs,
            data_file: config.data_file.clone(),
        }
    }
}

/// Probability of finding a proof in one pass over the data with `nonces`
pub fn post_probability(nonces: u32) -> f64 {
    let groups = f64::from(nonces) / f64::from(NONCES_PER_GROUP);
    1.0 - (1.0 - BASE_GROUP_PROBABILITY).powf(groups)
}

/// What a measured speed allows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    #[serde(flatten)]
    pub result: ProfilerResult,
    /// Largest data size provable within the safe part of a cycle gap
    pub max_data_bytes: u64,
    /// Whole space units fitting in `max_data_bytes`
    pub max_num_units: u64,
    pub post_probability: f64,
}

impl ProfileSummary {
    pub fn new(result: ProfilerResult) -> Self {
        let max_data_bytes = calculate_max_data_size(result.speed_gib_s);
        Self {
            max_num_units: max_data_bytes / size_per_unit(DEFAULT_LABELS_PER_UNIT),
            post_probability: post_probability(result.nonces),
            max_data_bytes,
            result,
        }
    }
}

/// Run the profiler and work out how much data its speed allows
pub async fn profile(
    capabilities: &dyn PosCapabilities,
    config: &ProfilerConfig,
) -> Result<ProfileSummary, CapabilityError> {
    let result = capabilities.run_profiler(config).await?;
    let summary = ProfileSummary::new(result);
    info!(
        speed_gib_s = summary.result.speed_gib_s,
        max_num_units = summary.max_num_units,
        "Profiling complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_check() {
        assert!(ProfilerConfig::default().check().is_ok());

        let zero = ProfilerConfig { nonces: 0, ..ProfilerConfig::default() };
        assert_eq!(zero.check().unwrap_err().to_string(), "profiler run failed: Nonces parameter is required");

        let odd = ProfilerConfig { nonces: 20, ..ProfilerConfig::default() };
        assert!(odd.check().unwrap_err().to_string().contains("multiple of 16"));

        let no_threads = ProfilerConfig { threads: 0, ..ProfilerConfig::default() };
        assert!(no_threads.check().is_err());
    }

    #[test]
    fn test_args_order() {
        let config = ProfilerConfig { nonces: 32, threads: 8, ..ProfilerConfig::default() };
        assert_eq!(
            config.args(Path::new("/tmp/data")),
            vec![
                "--threads", "8", "--nonces", "32", "--data-file", "/tmp/data", "--data-size", "1",
                "--duration", "10",
            ]
        );
    }

    #[test]
    fn test_output_parsing() {
        let output = ProfilerOutput::parse(br#"{"time_s": 9.87, "speed_gib_s": 2.5, "extra": true}"#).unwrap();
        assert_eq!(output, ProfilerOutput { time_s: 9.87, speed_gib_s: 2.5 });

        let missing = ProfilerOutput::parse(br#"{"time_s": 1.0}"#).unwrap_err();
        assert!(missing.to_string().contains("Failed to parse profiler output"));
        assert!(ProfilerOutput::parse(b"not json").is_err());
        assert!(ProfilerOutput::parse(br#"{"time_s": 1.0, "speed_gib_s": -1.0}"#).is_err());
    }

    #[test]
    fn test_probability() {
        assert_eq!(post_probability(0), 0.0);
        assert!((post_probability(16) - 0.0124).abs() < 1e-12);
        assert!(post_probability(32) > post_probability(16));
        assert!(post_probability(16 * 1000) < 1.0);
    }

    #[test]
    fn test_summary_from_speed() {
        let result = ProfilerResult::new(
            &ProfilerConfig::default(),
            ProfilerOutput { time_s: 10.0, speed_gib_s: 1.0 },
        );
        let summary = ProfileSummary::new(result);
        // 1 GiB/s over 70% of 12h is 30240 GiB, 472 whole units of 64 GiB
        assert_eq!(summary.max_num_units, 472);
        assert_eq!(summary.max_data_bytes, calculate_max_data_size(1.0));
    }
}
