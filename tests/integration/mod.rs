// Shared helpers for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use posinit::profiler::ProfilerOutput;
use posinit::{
    CapabilityError, DetachedProcess, DirectoryValidation, OutputEvent, PosCapabilities, ProfilerConfig,
    ProfilerResult, Provider, Settings, SettingsUpdate,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;

pub const PROCESS_ID: u32 = 31337;

/// In-memory capability surface. Output events are pushed by the test
/// through [`ScriptedCapabilities::emit`] after the spawn.
#[derive(Default)]
pub struct ScriptedCapabilities {
    pub fail_spawn: bool,
    pub fail_stop: bool,
    spawned: Mutex<Vec<Vec<String>>>,
    sender: Mutex<Option<mpsc::UnboundedSender<OutputEvent>>>,
    stops: AtomicUsize,
    file_sizes: Mutex<HashMap<PathBuf, u64>>,
    atx: Mutex<Option<String>>,
    profiler_speed: Mutex<Option<f64>>,
    profiled: Mutex<Vec<ProfilerConfig>>,
}

impl ScriptedCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_stop() -> Self {
        Self { fail_stop: true, ..Self::default() }
    }

    pub fn failing_spawn() -> Self {
        Self { fail_spawn: true, ..Self::default() }
    }

    pub fn with_atx(self, id: &str) -> Self {
        *self.atx.lock().unwrap() = Some(id.to_string());
        self
    }

    /// Make the profiler report `speed_gib_s`; without it the profiler is missing
    pub fn with_profiler_speed(self, speed_gib_s: f64) -> Self {
        *self.profiler_speed.lock().unwrap() = Some(speed_gib_s);
        self
    }

    pub fn profiled_configs(&self) -> Vec<ProfilerConfig> {
        self.profiled.lock().unwrap().clone()
    }

    /// Push one raw stdout line to the running process
    pub fn emit(&self, line: &str) {
        self.send(OutputEvent::stdout(line));
    }

    pub fn exit(&self, code: Option<i32>) {
        self.send(OutputEvent::Exited { code });
    }

    fn send(&self, event: OutputEvent) {
        let guard = self.sender.lock().unwrap();
        let sender = guard.as_ref().expect("process was not spawned");
        sender.send(event).expect("monitor dropped the output channel");
    }

    pub fn set_file_size(&self, path: PathBuf, bytes: u64) {
        self.file_sizes.lock().unwrap().insert(path, bytes);
    }

    pub fn spawned_args(&self) -> Vec<Vec<String>> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PosCapabilities for ScriptedCapabilities {
    async fn spawn_detached(&self, args: &[String]) -> Result<DetachedProcess, CapabilityError> {
        if self.fail_spawn {
            return Err(CapabilityError::ToolMissing(PathBuf::from("bin/postcli/postcli")));
        }
        self.spawned.lock().unwrap().push(args.to_vec());
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap() = Some(tx);
        Ok(DetachedProcess { process_id: PROCESS_ID, output: rx })
    }

    async fn stop_process(&self, process_id: u32) -> Result<(), CapabilityError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            return Err(CapabilityError::Stop { pid: process_id, reason: "No such process".into() });
        }
        Ok(())
    }

    async fn file_size(&self, path: &Path) -> Result<u64, CapabilityError> {
        self.file_sizes.lock().unwrap().get(path).copied().ok_or_else(|| CapabilityError::FileSize {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })
    }

    async fn select_directory(&self) -> Result<Option<PathBuf>, CapabilityError> {
        Ok(None)
    }

    async fn verify_directory(&self, _path: &Path) -> DirectoryValidation {
        DirectoryValidation { exists: true, has_write_permission: true, has_space: true, error: None }
    }

    async fn fetch_latest_atx_id(&self) -> Result<String, CapabilityError> {
        self.atx
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| CapabilityError::Fetch("network unreachable".into()))
    }

    fn cpu_cores(&self) -> usize {
        8
    }

    async fn list_providers(&self) -> Result<Vec<Provider>, CapabilityError> {
        Ok(vec![Provider { id: 0, model: "CPU".into(), device_type: "CPU".into() }])
    }

    async fn run_profiler(&self, config: &ProfilerConfig) -> Result<ProfilerResult, CapabilityError> {
        config.check()?;
        self.profiled.lock().unwrap().push(config.clone());
        let speed_gib_s = self
            .profiler_speed
            .lock()
            .unwrap()
            .ok_or_else(|| CapabilityError::ProfilerMissing(PathBuf::from("bin/profiler/profiler")))?;
        Ok(ProfilerResult::new(config, ProfilerOutput { time_s: 10.0, speed_gib_s }))
    }
}

/// Temporary data directory for one test
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub root_path: PathBuf,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root_path = temp_dir.path().to_path_buf();
        Self { temp_dir, root_path }
    }

    /// Settings that pass validation, writing into this fixture's directory
    pub fn ready_settings(&self) -> Settings {
        Settings::default()
            .apply(SettingsUpdate::SetProvider { id: 0, model: Some("CPU".into()) })
            .apply(SettingsUpdate::SetDirectory(Some(self.root_path.clone())))
            .apply(SettingsUpdate::ManualAtxId(atx_id()))
    }
}

pub fn atx_id() -> String {
    "9f".repeat(32)
}
