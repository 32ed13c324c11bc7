// Typed errors for the I/O boundaries: capability calls, launching, metadata.
// Pure functions (validation, argument building, log parsing) do not fail.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of one call on the external capability surface
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("postcli executable not found at {0}")]
    ToolMissing(PathBuf),

    #[error("failed to execute postcli: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to terminate process {pid}: {reason}")]
    Stop { pid: u32, reason: String },

    #[error("failed to get file size of {path}: {source}")]
    FileSize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch latest ATX ID from network: {0}")]
    Fetch(String),

    #[error("directory selection failed: {0}")]
    DirectorySelection(String),

    #[error("failed to list providers: {0}")]
    Providers(String),

    #[error("profiler executable not found at {0}")]
    ProfilerMissing(PathBuf),

    #[error("profiler run failed: {0}")]
    Profiler(String),
}

/// Why a launch did not produce a running process
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Argument building returned nothing (ATX id pending, missing or in error)
    #[error("Cannot proceed: Valid ATX ID is required")]
    NotReady,

    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

/// Problems with an existing `postdata_metadata.json`
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to read metadata file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse metadata file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("LabelsPerUnit mismatch, got {got}, expected {expected}. Please select another directory.")]
    LabelsPerUnitMismatch { got: u64, expected: u64 },

    #[error("metadata field {field} is not valid base64")]
    InvalidEncoding { field: &'static str },
}
