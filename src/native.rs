// Real capability implementation on top of tokio, nix and reqwest

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::atx::AtxClient;
use crate::capability::{
    DetachedProcess, DirectoryValidation, OutputEvent, OutputStream, PosCapabilities, Provider,
};
use crate::config::AppConfig;
use crate::error::CapabilityError;
use crate::profiler::{ProfilerConfig, ProfilerOutput, ProfilerResult};

const WRITE_TEST_FILE: &str = ".write_test_temp";

/// Directory under the system temp dir holding the profiler's scratch file
const PROFILER_TEMP_DIR: &str = "posinit-profiler";

/// Capabilities backed by the local machine and the network API
pub struct NativeCapabilities {
    postcli_path: PathBuf,
    profiler_path: PathBuf,
    min_free_space_bytes: u64,
    atx: AtxClient,
}

impl NativeCapabilities {
    pub fn new(config: &AppConfig) -> Result<Self, CapabilityError> {
        Ok(Self {
            postcli_path: config.postcli_path.clone(),
            profiler_path: config.profiler_path.clone(),
            min_free_space_bytes: config.min_free_space_bytes,
            atx: AtxClient::new(config.atx_api_url.clone(), config.request_timeout())?,
        })
    }

    pub fn postcli_path(&self) -> &Path {
        &self.postcli_path
    }

    fn command(&self, args: &[String]) -> Result<Command, CapabilityError> {
        if !self.postcli_path.exists() {
            return Err(CapabilityError::ToolMissing(self.postcli_path.clone()));
        }
        let mut cmd = Command::new(&self.postcli_path);
        cmd.args(args).stdin(Stdio::null());
        Ok(cmd)
    }

    fn map_spawn_error(&self, err: std::io::Error) -> CapabilityError {
        if err.kind() == std::io::ErrorKind::NotFound {
            CapabilityError::ToolMissing(self.postcli_path.clone())
        } else {
            CapabilityError::Spawn(err)
        }
    }
}

async fn forward_lines<R>(reader: R, stream: OutputStream, tx: mpsc::UnboundedSender<OutputEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = LinesStream::new(BufReader::new(reader).lines());
    while let Some(line) = lines.next().await {
        match line {
            Ok(text) => {
                debug!("{}: {}", stream.tag(), text);
                if tx.send(OutputEvent::Line { stream, text }).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Failed to read {}: {}", stream.tag(), e);
                break;
            }
        }
    }
}

#[async_trait]
impl PosCapabilities for NativeCapabilities {
    async fn spawn_detached(&self, args: &[String]) -> Result<DetachedProcess, CapabilityError> {
        let mut child = self
            .command(args)?
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.map_spawn_error(e))?;

        let process_id = child
            .id()
            .ok_or_else(|| CapabilityError::Spawn(std::io::Error::other("process exited before reporting its id")))?;
        info!(process_id, ?args, "Started postcli");

        let (tx, rx) = mpsc::unbounded_channel();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        tokio::spawn(async move {
            let out = async {
                if let Some(stdout) = stdout {
                    forward_lines(stdout, OutputStream::Stdout, tx.clone()).await;
                }
            };
            let err = async {
                if let Some(stderr) = stderr {
                    forward_lines(stderr, OutputStream::Stderr, tx.clone()).await;
                }
            };
            futures::join!(out, err);

            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(process_id, "Failed to wait for postcli: {}", e);
                    None
                }
            };
            info!(process_id, ?code, "postcli exited");
            let _ = tx.send(OutputEvent::Exited { code });
        });

        Ok(DetachedProcess { process_id, output: rx })
    }

    async fn stop_process(&self, process_id: u32) -> Result<(), CapabilityError> {
        info!(process_id, "Stopping postcli");
        terminate(process_id).await
    }

    async fn file_size(&self, path: &Path) -> Result<u64, CapabilityError> {
        tokio::fs::metadata(path)
            .await
            .map(|m| m.len())
            .map_err(|source| CapabilityError::FileSize { path: path.to_path_buf(), source })
    }

    async fn select_directory(&self) -> Result<Option<PathBuf>, CapabilityError> {
        use tokio::io::AsyncWriteExt;

        let mut stderr = tokio::io::stderr();
        stderr
            .write_all(b"Data directory (leave empty to cancel): ")
            .await
            .map_err(|e| CapabilityError::DirectorySelection(e.to_string()))?;
        stderr.flush().await.map_err(|e| CapabilityError::DirectorySelection(e.to_string()))?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| CapabilityError::DirectorySelection(e.to_string()))?;
        let line = line.trim();
        Ok((!line.is_empty()).then(|| PathBuf::from(line)))
    }

    async fn verify_directory(&self, path: &Path) -> DirectoryValidation {
        verify_directory(path, self.min_free_space_bytes).await
    }

    async fn fetch_latest_atx_id(&self) -> Result<String, CapabilityError> {
        self.atx.fetch_latest().await
    }

    fn cpu_cores(&self) -> usize {
        num_cpus::get()
    }

    async fn list_providers(&self) -> Result<Vec<Provider>, CapabilityError> {
        let output = self
            .command(&["-printProviders".to_string()])?
            .output()
            .await
            .map_err(|e| self.map_spawn_error(e))?;
        if !output.status.success() {
            return Err(CapabilityError::Providers(format!(
                "postcli exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        serde_json::from_slice(&output.stdout).map_err(|e| CapabilityError::Providers(e.to_string()))
    }

    async fn run_profiler(&self, config: &ProfilerConfig) -> Result<ProfilerResult, CapabilityError> {
        config.check()?;
        if !self.profiler_path.exists() {
            return Err(CapabilityError::ProfilerMissing(self.profiler_path.clone()));
        }

        let data_file = match &config.data_file {
            Some(path) => path.clone(),
            None => {
                let dir = std::env::temp_dir().join(PROFILER_TEMP_DIR);
                tokio::fs::create_dir_all(&dir)
                    .await
                    .map_err(|e| CapabilityError::Profiler(format!("Failed to create {}: {e}", dir.display())))?;
                dir.join("profiler-data")
            }
        };

        let args = config.args(&data_file);
        info!(?args, "Running profiler");
        let output = Command::new(&self.profiler_path)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| CapabilityError::Profiler(format!("Failed to run profiler: {e}")));

        if config.data_file.is_none() {
            if let Err(e) = tokio::fs::remove_file(&data_file).await {
                debug!("Profiler scratch file not removed: {}", e);
            }
        }

        let output = output?;
        if !output.status.success() {
            return Err(CapabilityError::Profiler(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let parsed = ProfilerOutput::parse(&output.stdout)?;
        info!(speed_gib_s = parsed.speed_gib_s, time_s = parsed.time_s, "Profiler finished");
        Ok(ProfilerResult::new(config, parsed))
    }
}

/// Existence, write permission and free space checks for a data directory.
/// The first failing check sets `error` and stops.
pub async fn verify_directory(path: &Path, min_free_space_bytes: u64) -> DirectoryValidation {
    let mut validation = DirectoryValidation::default();

    validation.exists = tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false);
    if !validation.exists {
        validation.error = Some("Directory does not exist".to_string());
        return validation;
    }

    let test_file = path.join(WRITE_TEST_FILE);
    match tokio::fs::write(&test_file, b"test").await {
        Ok(()) => {
            validation.has_write_permission = true;
            let _ = tokio::fs::remove_file(&test_file).await;
        }
        Err(e) => {
            validation.error = Some(format!("No write permission: {e}"));
            return validation;
        }
    }

    match free_space(path) {
        Some(space) => {
            validation.has_space = space >= min_free_space_bytes;
            if !validation.has_space {
                validation.error = Some(format!(
                    "Insufficient disk space. Required: {:.2} GB, Available: {:.2} GB",
                    min_free_space_bytes as f64 / (1u64 << 30) as f64,
                    space as f64 / (1u64 << 30) as f64
                ));
            }
        }
        None => validation.error = Some("Failed to check disk space".to_string()),
    }
    validation
}

#[cfg(unix)]
fn free_space(path: &Path) -> Option<u64> {
    match nix::sys::statvfs::statvfs(path) {
        Ok(stat) => Some((stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64)),
        Err(e) => {
            warn!("statvfs failed for {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(not(unix))]
fn free_space(_path: &Path) -> Option<u64> {
    Some(u64::MAX)
}

#[cfg(unix)]
async fn terminate(process_id: u32) -> Result<(), CapabilityError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = i32::try_from(process_id).map_err(|_| CapabilityError::Stop {
        pid: process_id,
        reason: "process id out of range".to_string(),
    })?;
    kill(Pid::from_raw(pid), Signal::SIGTERM)
        .map_err(|e| CapabilityError::Stop { pid: process_id, reason: e.to_string() })
}

#[cfg(windows)]
async fn terminate(process_id: u32) -> Result<(), CapabilityError> {
    let output = Command::new("taskkill")
        .args(["/PID", &process_id.to_string(), "/F"])
        .output()
        .await
        .map_err(|e| CapabilityError::Stop { pid: process_id, reason: e.to_string() })?;
    if output.status.success() {
        Ok(())
    } else {
        Err(CapabilityError::Stop {
            pid: process_id,
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
