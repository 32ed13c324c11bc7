use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::capability::PosCapabilities;
use crate::datadir::post_file_path;
use crate::progress::aggregator::ProgressEvent;

/// Repeating file-size query for the data file currently being written.
///
/// Each tick awaits its query before the next tick is scheduled, so at most
/// one query is in flight. Results carry an increasing tick number so the
/// aggregator can drop stale ones. The task is aborted on [`cancel`] or drop.
///
/// [`cancel`]: FileSizePoller::cancel
pub struct FileSizePoller {
    task: JoinHandle<()>,
}

impl FileSizePoller {
    /// Start polling `<data_dir>/postdata_<n>.bin`, where `n` is read from
    /// `target` on every tick; ticks with no target are skipped.
    pub fn spawn(
        capabilities: Arc<dyn PosCapabilities>,
        data_dir: PathBuf,
        interval: Duration,
        target: watch::Receiver<Option<u32>>,
        results: mpsc::UnboundedSender<ProgressEvent>,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut tick: u64 = 0;

            loop {
                ticker.tick().await;
                let Some(file_index) = *target.borrow() else {
                    continue;
                };
                tick += 1;

                let path = post_file_path(&data_dir, file_index);
                let bytes = match capabilities.file_size(&path).await {
                    Ok(bytes) => {
                        debug!(tick, file_index, bytes, "Polled data file size");
                        Some(bytes)
                    }
                    Err(e) => {
                        warn!(tick, file_index, "Error getting file size: {}", e);
                        None
                    }
                };

                if results.send(ProgressEvent::FileSize { tick, file_index, bytes }).is_err() {
                    break;
                }
            }
        });
        Self { task }
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for FileSizePoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}
