pub mod atx;
pub mod capability;
pub mod command;
pub mod config;
pub mod datadir;
pub mod error;
pub mod hex;
pub mod identity;
pub mod metadata;
pub mod monitor;
pub mod native;
pub mod process;
pub mod profiler;
pub mod progress;
pub mod reporter;
pub mod settings;
pub mod size;

// Re-export the types most callers need
pub use capability::{DetachedProcess, DirectoryValidation, OutputEvent, OutputStream, PosCapabilities, Provider};
pub use command::build_args;
pub use config::AppConfig;
pub use error::{CapabilityError, LaunchError, MetadataError};
pub use monitor::{run_monitor, MonitorConfig, MonitorOutcome};
pub use native::NativeCapabilities;
pub use process::{LaunchedProcess, ProcessHandle, ProcessTracker};
pub use profiler::{ProfileSummary, ProfilerConfig, ProfilerResult};
pub use progress::{
    AggregatedProgress, Effect, FileProgress, FileSizePoller, LineKind, ProgressAggregator,
    ProgressEvent, ProgressParser, ProgressSnapshot, Stage,
};
pub use reporter::{JsonReporter, ProgressReporter, TerminalReporter};
pub use settings::{validate, AtxIdSource, Identity, PosSettings, Settings, SettingsUpdate};
