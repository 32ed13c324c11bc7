// Event loop joining postcli output, file-size polling and shutdown

use anyhow::Result;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::capability::{OutputEvent, PosCapabilities};
use crate::process::{LaunchedProcess, ProcessTracker};
use crate::progress::{Effect, FileSizePoller, ProgressAggregator, ProgressEvent, Stage};
use crate::reporter::ProgressReporter;
use crate::size::calculate_num_files;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Directory holding the `postdata_<n>.bin` files
    pub data_dir: PathBuf,
    pub poll_interval: Duration,
}

/// How a monitored run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    Complete,
    Failed(String),
    /// Shutdown was requested and the process was asked to stop
    Stopped,
    /// postcli exited without a completion or error marker
    Exited { code: Option<i32> },
}

impl MonitorOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, MonitorOutcome::Complete)
    }
}

/// Drive `aggregator` from `launched` until the run ends or `shutdown` fires.
///
/// On Error the process is stopped best-effort; on Complete the handle is
/// released without a signal; on shutdown it is stopped.
pub async fn run_monitor<F>(
    tracker: &mut ProcessTracker,
    capabilities: Arc<dyn PosCapabilities>,
    launched: LaunchedProcess,
    aggregator: &mut ProgressAggregator,
    reporter: &mut dyn ProgressReporter,
    config: MonitorConfig,
    shutdown: F,
) -> Result<MonitorOutcome>
where
    F: Future<Output = ()>,
{
    let LaunchedProcess { handle, mut output } = launched;
    let settings = aggregator.settings();
    let total_files = calculate_num_files(settings.num_units, settings.max_file_size_mib);

    aggregator.apply(ProgressEvent::Launched(handle));
    reporter.started(handle, total_files);

    let (target_tx, target_rx) = watch::channel(aggregator.poll_target());
    let (poll_tx, mut poll_rx) = mpsc::unbounded_channel();
    let poller = FileSizePoller::spawn(
        capabilities,
        config.data_dir.clone(),
        config.poll_interval,
        target_rx,
        poll_tx,
    );

    tokio::pin!(shutdown);

    let outcome = loop {
        let event = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!(process_id = handle.process_id, "Shutdown requested, stopping postcli");
                if let Err(e) = tracker.stop().await {
                    warn!("Failed to stop postcli: {}", e);
                }
                aggregator.apply(ProgressEvent::Stopped);
                break MonitorOutcome::Stopped;
            }
            received = output.recv() => match received {
                Some(OutputEvent::Exited { code }) => ProgressEvent::ProcessExited { code },
                Some(line) => match line.tagged_line() {
                    Some(text) => ProgressEvent::Output(text),
                    None => continue,
                },
                None => ProgressEvent::ProcessExited { code: None },
            },
            Some(sample) = poll_rx.recv() => sample,
        };

        let exited = match &event {
            ProgressEvent::ProcessExited { code } => Some(*code),
            _ => None,
        };
        if exited.is_some() {
            tracker.release();
        }

        if let Some(Effect::ShowError(details)) = aggregator.apply(event) {
            reporter.error(&details);
        }
        target_tx.send_replace(aggregator.poll_target());
        reporter.update(aggregator.state(), total_files);

        match aggregator.state().stage {
            Stage::Complete => {
                tracker.release();
                break MonitorOutcome::Complete;
            }
            Stage::Error => {
                if tracker.is_running() {
                    if let Err(e) = tracker.stop().await {
                        warn!("Failed to stop postcli after error: {}", e);
                    }
                }
                break MonitorOutcome::Failed(aggregator.state().details.clone());
            }
            _ => {}
        }

        if let Some(code) = exited {
            break MonitorOutcome::Exited { code };
        }
    };

    poller.cancel();
    reporter.finished(aggregator.state());
    info!(?outcome, "Monitoring finished");
    Ok(outcome)
}
