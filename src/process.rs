use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::capability::{OutputEvent, PosCapabilities};
use crate::command::build_args;
use crate::error::{CapabilityError, LaunchError};
use crate::settings::Settings;

/// Identity of the tracked postcli run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessHandle {
    pub process_id: u32,
    pub running: bool,
}

/// A successful launch: the handle plus the process output channel
#[derive(Debug)]
pub struct LaunchedProcess {
    pub handle: ProcessHandle,
    pub output: mpsc::UnboundedReceiver<OutputEvent>,
}

/// Owns the single external process handle.
///
/// Other components receive copies of [`ProcessHandle`]; only the tracker
/// changes it.
pub struct ProcessTracker {
    capabilities: Arc<dyn PosCapabilities>,
    current: Option<ProcessHandle>,
}

impl ProcessTracker {
    pub fn new(capabilities: Arc<dyn PosCapabilities>) -> Self {
        Self { capabilities, current: None }
    }

    pub fn current(&self) -> Option<ProcessHandle> {
        self.current
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some_and(|h| h.running)
    }

    /// Spawn postcli for `settings`. Nothing is recorded on failure.
    pub async fn start(&mut self, settings: &Settings) -> Result<LaunchedProcess, LaunchError> {
        let args = build_args(settings).ok_or(LaunchError::NotReady)?;
        if let Some(previous) = self.current {
            warn!(process_id = previous.process_id, "Starting a new run while another is tracked");
        }

        let detached = self.capabilities.spawn_detached(&args).await?;
        let handle = ProcessHandle { process_id: detached.process_id, running: true };
        self.current = Some(handle);
        info!(process_id = handle.process_id, "POS data generation started in background");

        Ok(LaunchedProcess { handle, output: detached.output })
    }

    /// Terminate the tracked process.
    ///
    /// Local state is cleared before the capability call, so a failed stop
    /// still leaves the tracker idle; the failure is then returned.
    pub async fn stop(&mut self) -> Result<(), CapabilityError> {
        let Some(handle) = self.current.take() else {
            return Ok(());
        };
        match self.capabilities.stop_process(handle.process_id).await {
            Ok(()) => {
                info!(process_id = handle.process_id, "Stopped postcli");
                Ok(())
            }
            Err(e) => {
                warn!(process_id = handle.process_id, "Stop failed, process probably exited: {}", e);
                Err(e)
            }
        }
    }

    /// Forget the handle without signalling, after the process exited on its own
    pub fn release(&mut self) -> Option<ProcessHandle> {
        self.current.take()
    }
}
