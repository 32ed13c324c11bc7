use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::error::CapabilityError;
use crate::profiler::{ProfilerConfig, ProfilerResult};

/// Which pipe a line of postcli output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    /// Tag prepended to forwarded lines, e.g. `postcli stdout: `
    pub fn tag(self) -> &'static str {
        match self {
            OutputStream::Stdout => "postcli stdout",
            OutputStream::Stderr => "postcli stderr",
        }
    }
}

/// Events emitted by a detached process, in the order they happened per stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Line { stream: OutputStream, text: String },
    /// Always the last event; `code` is `None` when killed by a signal
    Exited { code: Option<i32> },
}

impl OutputEvent {
    pub fn stdout(text: impl Into<String>) -> Self {
        OutputEvent::Line { stream: OutputStream::Stdout, text: text.into() }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        OutputEvent::Line { stream: OutputStream::Stderr, text: text.into() }
    }

    /// Line as the parser expects it: `postcli stdout: <text>`
    pub fn tagged_line(&self) -> Option<String> {
        match self {
            OutputEvent::Line { stream, text } => Some(format!("{}: {}", stream.tag(), text)),
            OutputEvent::Exited { .. } => None,
        }
    }
}

/// A process started without waiting for it
#[derive(Debug)]
pub struct DetachedProcess {
    pub process_id: u32,
    pub output: mpsc::UnboundedReceiver<OutputEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryValidation {
    pub exists: bool,
    pub has_write_permission: bool,
    pub has_space: bool,
    pub error: Option<String>,
}

impl DirectoryValidation {
    pub fn is_ok(&self) -> bool {
        self.exists && self.has_write_permission && self.has_space && self.error.is_none()
    }
}

/// A compute provider as reported by `postcli -printProviders`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "DeviceType")]
    pub device_type: String,
}

/// Everything the core needs from the operating system and the network.
///
/// `NativeCapabilities` is the real implementation; tests script their own.
#[async_trait]
pub trait PosCapabilities: Send + Sync {
    async fn spawn_detached(&self, args: &[String]) -> Result<DetachedProcess, CapabilityError>;

    async fn stop_process(&self, process_id: u32) -> Result<(), CapabilityError>;

    async fn file_size(&self, path: &Path) -> Result<u64, CapabilityError>;

    /// `Ok(None)` when the user cancelled the selection
    async fn select_directory(&self) -> Result<Option<PathBuf>, CapabilityError>;

    async fn verify_directory(&self, path: &Path) -> DirectoryValidation;

    /// Latest ATX id as lowercase 64-character hex
    async fn fetch_latest_atx_id(&self) -> Result<String, CapabilityError>;

    fn cpu_cores(&self) -> usize;

    async fn list_providers(&self) -> Result<Vec<Provider>, CapabilityError>;

    /// Measure proving speed with the bundled profiler
    async fn run_profiler(&self, config: &ProfilerConfig) -> Result<ProfilerResult, CapabilityError>;
}
