use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use posinit::datadir::{default_data_dir, scan_post_files};
use posinit::hex::truncate_hex;
use posinit::metadata::{load_metadata_settings, read_metadata};
use posinit::profiler::{profile, NONCES_PER_GROUP};
use posinit::size::{
    calculate_max_data_size, calculate_num_files, calculate_total_size, format_bytes,
    DEFAULT_MAX_FILE_SIZE_MIB, DEFAULT_NUM_UNITS,
};
use posinit::{
    build_args, identity, run_monitor, validate, AppConfig, AtxIdSource, JsonReporter, MonitorConfig,
    MonitorOutcome, NativeCapabilities, PosCapabilities, ProcessTracker, ProfilerConfig, ProgressAggregator,
    ProgressParser, ProgressReporter, Settings, SettingsUpdate, TerminalReporter,
};

#[derive(Parser, Debug)]
#[command(name = "posinit")]
#[command(about = "Configure, launch and monitor postcli proof-of-space data generation")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate settings, launch postcli and follow its progress
    Generate {
        #[command(flatten)]
        settings: SettingsArgs,

        /// Suppress the console progress bar
        #[arg(long)]
        no_progress: bool,

        /// Emit progress as JSON lines on stdout
        #[arg(long)]
        json: bool,

        /// Override the data file polling interval
        #[arg(long)]
        poll_interval_ms: Option<u64>,
    },
    /// Print the postcli arguments without launching
    #[command(name = "args")]
    PrintArgs {
        #[command(flatten)]
        settings: SettingsArgs,

        /// Print as a JSON array
        #[arg(long)]
        json: bool,
    },
    /// Check that a directory can hold generated data
    VerifyDir { path: PathBuf },
    /// Fetch the latest ATX id from the network
    Atx,
    /// List the compute providers postcli can use
    Providers,
    /// Print the number of logical CPU cores
    Cores,
    /// Measure proving speed and show how many space units it can serve
    Profile {
        #[arg(long, default_value_t = NONCES_PER_GROUP)]
        nonces: u32,

        /// Profiler threads; defaults to the number of CPU cores
        #[arg(long)]
        threads: Option<u32>,

        /// Data read during the run, GiB
        #[arg(long, default_value_t = 1)]
        data_size: u32,

        /// Run duration in seconds
        #[arg(long, default_value_t = 10)]
        duration: u32,

        /// Existing data file to read instead of a temporary one
        #[arg(long)]
        data_file: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show total size and file count for a configuration
    Size {
        #[arg(long)]
        num_units: u32,

        #[arg(long, default_value_t = DEFAULT_MAX_FILE_SIZE_MIB)]
        max_file_size: u64,

        /// Provider speed in GiB/s, to estimate the largest safe data size
        #[arg(long)]
        speed: Option<f64>,
    },
    /// Show the data files and metadata in a directory
    Status {
        #[arg(long)]
        datadir: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
struct SettingsArgs {
    /// Provider id (see `posinit providers`)
    #[arg(long)]
    provider: Option<u32>,

    #[arg(long)]
    provider_model: Option<String>,

    /// Number of 64 GiB space units
    #[arg(long, default_value_t = DEFAULT_NUM_UNITS)]
    num_units: u32,

    /// Maximum size of one data file in MiB
    #[arg(long, default_value_t = DEFAULT_MAX_FILE_SIZE_MIB)]
    max_file_size: u64,

    /// Data directory; falls back to the configured `data_dir`, then postcli's default
    #[arg(long, conflicts_with = "pick_dir")]
    datadir: Option<PathBuf>,

    /// Ask for the data directory interactively
    #[arg(long)]
    pick_dir: bool,

    /// Identity public key (64 hex characters)
    #[arg(long, conflicts_with = "identity_file")]
    public_key: Option<String>,

    /// Identity key file to read the public key from
    #[arg(long)]
    identity_file: Option<PathBuf>,

    /// Commitment ATX id; fetched from the network when omitted
    #[arg(long)]
    atx_id: Option<String>,

    /// Adopt settings from an existing postdata_metadata.json
    #[arg(long)]
    use_metadata: bool,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    info!("Starting posinit v{}", env!("CARGO_PKG_VERSION"));
    let config = AppConfig::load(cli.config.as_deref())?;
    info!(?config, "Loaded configuration");

    let native = NativeCapabilities::new(&config).context("Failed to initialise capabilities")?;
    let capabilities: Arc<dyn PosCapabilities> = Arc::new(native);

    match cli.command {
        Commands::Generate { settings, no_progress, json, poll_interval_ms } => {
            let settings = resolve_settings(&settings, &config, capabilities.as_ref()).await?;
            ensure_valid(&settings)?;
            let mut config = config;
            if let Some(ms) = poll_interval_ms {
                config.poll_interval_ms = ms;
            }
            generate(settings, &config, capabilities, !no_progress, json).await
        }
        Commands::PrintArgs { settings, json } => {
            let settings = resolve_settings(&settings, &config, capabilities.as_ref()).await?;
            ensure_valid(&settings)?;
            let Some(args) = build_args(&settings) else {
                bail!("Cannot proceed: Valid ATX ID is required");
            };
            if json {
                println!("{}", serde_json::to_string(&args)?);
            } else {
                println!("{}", args.join(" "));
            }
            Ok(())
        }
        Commands::VerifyDir { path } => {
            let validation = capabilities.verify_directory(&path).await;
            println!("{}", serde_json::to_string_pretty(&validation)?);
            if !validation.is_ok() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Atx => {
            let id = capabilities.fetch_latest_atx_id().await?;
            println!("{id}");
            Ok(())
        }
        Commands::Providers => {
            let providers = capabilities.list_providers().await?;
            for provider in providers {
                println!("{}\t{}\t{}", provider.id, provider.device_type, provider.model);
            }
            Ok(())
        }
        Commands::Cores => {
            println!("{}", capabilities.cpu_cores());
            Ok(())
        }
        Commands::Profile { nonces, threads, data_size, duration, data_file, json } => {
            let threads = match threads {
                Some(threads) => threads,
                None => u32::try_from(capabilities.cpu_cores()).unwrap_or(u32::MAX).max(1),
            };
            let profiler_config = ProfilerConfig {
                nonces,
                threads,
                data_size_gib: data_size,
                duration_secs: duration,
                data_file,
            };
            let summary = profile(capabilities.as_ref(), &profiler_config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Speed: {:.2} GiB/s ({} threads, {} nonces)", summary.result.speed_gib_s, threads, nonces);
                println!("Max data size: {}", format_bytes(summary.max_data_bytes));
                println!("Max space units: {}", summary.max_num_units);
                println!("PoST probability per pass: {:.2}%", summary.post_probability * 100.0);
            }
            Ok(())
        }
        Commands::Size { num_units, max_file_size, speed } => {
            println!("Total size: {}", calculate_total_size(num_units));
            println!("Files: {}", calculate_num_files(num_units, max_file_size));
            if let Some(speed) = speed {
                println!("Max data size for {speed} GiB/s: {}", format_bytes(calculate_max_data_size(speed)));
            }
            Ok(())
        }
        Commands::Status { datadir } => {
            let dir = datadir
                .or_else(|| config.data_dir.clone())
                .or_else(default_data_dir)
                .context("Could not determine the data directory")?;
            status(&dir)
        }
    }
}

/// Build a settings snapshot from the command line, the config, the
/// metadata file and the network
async fn resolve_settings(
    args: &SettingsArgs,
    config: &AppConfig,
    capabilities: &dyn PosCapabilities,
) -> Result<Settings> {
    let mut settings = Settings::default();

    if let Some(dir) = default_data_dir() {
        settings = settings.apply(SettingsUpdate::SetDefaultDirectory(dir));
    }
    if let Some(id) = args.provider {
        settings = settings.apply(SettingsUpdate::SetProvider { id, model: args.provider_model.clone() });
    }
    settings = settings
        .apply(SettingsUpdate::SetNumUnits(args.num_units))
        .apply(SettingsUpdate::SetMaxFileSize(args.max_file_size));

    // a configured directory is a real choice and must reach postcli as -datadir
    if let Some(dir) = &args.datadir {
        settings = settings.apply(SettingsUpdate::SetDirectory(Some(dir.clone())));
    } else if args.pick_dir {
        match capabilities.select_directory().await? {
            Some(dir) => settings = settings.apply(SettingsUpdate::SetDirectory(Some(dir))),
            None => bail!("No directory selected"),
        }
    } else if let Some(dir) = &config.data_dir {
        settings = settings.apply(SettingsUpdate::SetDirectory(Some(dir.clone())));
    }

    if let Some(key) = &args.public_key {
        settings = settings.apply(SettingsUpdate::SetPublicKey(key.clone()));
    } else if let Some(path) = &args.identity_file {
        let public_key = identity::load_public_key(path)?;
        info!("Using identity {}", truncate_hex(&public_key, 6));
        settings = settings.apply(SettingsUpdate::SetIdentityFile {
            path: path.clone(),
            public_key: Some(public_key),
        });
    }

    if args.use_metadata {
        if let Some(dir) = settings.effective_dir().cloned() {
            match load_metadata_settings(&dir)? {
                Some(metadata) => settings = settings.apply(SettingsUpdate::LoadMetadata(metadata)),
                None => warn!("No metadata file found in {}", dir.display()),
            }
        }
    }

    if let Some(atx) = &args.atx_id {
        settings = settings.apply(SettingsUpdate::ManualAtxId(atx.clone()));
    } else if settings.atx_id_source == AtxIdSource::Api {
        settings = settings.apply(SettingsUpdate::AtxFetchStarted);
        settings = match capabilities.fetch_latest_atx_id().await {
            Ok(id) => settings.apply(SettingsUpdate::AtxFetched(id)),
            Err(e) => {
                warn!("Failed to fetch ATX ID: {}", e);
                settings.apply(SettingsUpdate::AtxFetchFailed(e.to_string()))
            }
        };
    }

    Ok(settings)
}

fn ensure_valid(settings: &Settings) -> Result<()> {
    let errors = validate(settings);
    if errors.is_empty() {
        return Ok(());
    }
    eprintln!("Please fix the following:");
    for error in &errors {
        eprintln!("  - {error}");
    }
    bail!("Settings are not valid ({} problem(s))", errors.len())
}

async fn generate(
    settings: Settings,
    config: &AppConfig,
    capabilities: Arc<dyn PosCapabilities>,
    show_bar: bool,
    json: bool,
) -> Result<()> {
    let data_dir = settings
        .effective_dir()
        .cloned()
        .context("Could not determine the data directory")?;

    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
    let validation = capabilities.verify_directory(&data_dir).await;
    if !validation.is_ok() {
        bail!(
            "Directory {} cannot be used: {}",
            data_dir.display(),
            validation.error.unwrap_or_default()
        );
    }

    if let Some(metadata) = read_metadata(&data_dir)? {
        if !metadata.matches(&settings) {
            warn!("{} already holds data initialized with different settings", data_dir.display());
        }
    }

    let mut tracker = ProcessTracker::new(capabilities.clone());
    let launched = tracker.start(&settings).await?;

    let mut aggregator = ProgressAggregator::new(ProgressParser::new()?, settings.pos_settings());
    let mut reporter: Box<dyn ProgressReporter> = if json {
        Box::new(JsonReporter::stdout())
    } else {
        Box::new(TerminalReporter::new(show_bar))
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let outcome = run_monitor(
        &mut tracker,
        capabilities,
        launched,
        &mut aggregator,
        reporter.as_mut(),
        MonitorConfig { data_dir, poll_interval: config.poll_interval() },
        shutdown,
    )
    .await?;

    match outcome {
        MonitorOutcome::Complete => Ok(()),
        MonitorOutcome::Stopped => {
            eprintln!("Generation stopped");
            Ok(())
        }
        MonitorOutcome::Failed(details) => bail!("Generation failed: {details}"),
        MonitorOutcome::Exited { code: Some(0) } => Ok(()),
        MonitorOutcome::Exited { code } => bail!("postcli exited unexpectedly (status {code:?})"),
    }
}

fn status(dir: &Path) -> Result<()> {
    println!("Data directory: {}", dir.display());
    let files = scan_post_files(dir)?;
    let total: u64 = files.iter().map(|f| f.size_bytes).sum();
    println!("Data files: {} ({})", files.len(), format_bytes(total));
    for file in &files {
        println!("  postdata_{}.bin  {}", file.index, format_bytes(file.size_bytes));
    }

    match read_metadata(dir)? {
        Some(metadata) => {
            let parsed = metadata.to_settings()?;
            println!("Metadata:");
            println!("  Space units: {}", parsed.num_units);
            println!("  Max file size: {} MiB", parsed.max_file_size_mib);
            if let Some(atx) = parsed.atx_id {
                println!("  Commitment ATX: {}", truncate_hex(&atx, 6));
            }
            if let Some(key) = parsed.public_key {
                println!("  Node ID: {}", truncate_hex(&key, 6));
            }
            let expected = calculate_num_files(parsed.num_units, parsed.max_file_size_mib);
            println!("  Files expected: {expected}");
        }
        None => println!("Metadata: none"),
    }
    Ok(())
}
