//! PureRate CLI Application

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use purerate_core::domain::parser::{extract_candidate_rate, scan};
use purerate_core::domain::{
    Command, CommandExecutor, ConfigManager, ConfigWatcher, DeviceController, DeviceId, Monitor,
    MonitorState, Notifier, ReconciliationEngine, SampleRate, Settings, SettingsStore,
    SilentNotifier,
};
use purerate_infra::{platform_controller, LogNotifier, OsascriptNotifier, UnifiedLogSource};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "purerate")]
#[command(
    about = "Keeps the output device's sample rate in step with what the music player decodes",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor playback and switch the device rate (default)
    Run {
        /// Print state changes as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// List output devices and their capabilities
    Devices,
    /// Show the target device's current state
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Extract sample rates from log lines in FILE, or stdin
    Parse { file: Option<PathBuf> },
    /// Edit persisted settings
    Settings(SettingsArgs),
}

#[derive(Args)]
struct SettingsArgs {
    /// Turn monitoring on
    #[arg(long, conflicts_with = "disable")]
    enable: bool,

    /// Turn monitoring off
    #[arg(long)]
    disable: bool,

    /// Post a notification after each switch
    #[arg(long, value_enum)]
    notifications: Option<Toggle>,

    /// Device to control instead of the system default output
    #[arg(long, value_name = "ID", conflicts_with = "system_default")]
    target: Option<u32>,

    /// Follow the system default output device
    #[arg(long)]
    system_default: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(
            ConfigManager::default_config_dir().context("Locating config directory")?,
        ),
    };

    match cli.command.unwrap_or(Commands::Run { json: false }) {
        Commands::Run { json } => run(manager, json).await,
        Commands::Devices => devices().await,
        Commands::Status { json } => status(manager, json).await,
        Commands::Parse { file } => parse(file).await,
        Commands::Settings(args) => settings(manager, args).await,
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(manager: ConfigManager, json: bool) -> Result<()> {
    info!("🎵 PureRate starting...");

    let config = manager.load().await;
    let manager = Arc::new(manager);

    let notifier: Arc<dyn Notifier> = if cfg!(target_os = "macos") {
        Arc::new(OsascriptNotifier)
    } else {
        Arc::new(LogNotifier)
    };

    let settings = config.settings.clone();
    let history_capacity = config.monitor.history_capacity;
    let engine = tokio::task::spawn_blocking(move || {
        ReconciliationEngine::new(platform_controller(), notifier, &settings, history_capacity)
    })
    .await
    .context("Resolving output device")?;

    let monitor = Monitor::new(
        engine,
        Arc::new(UnifiedLogSource::new()),
        manager.clone(),
        config.settings.clone(),
        &config.monitor,
    );

    let watcher = match ConfigWatcher::new(manager.config_path().to_path_buf()).await {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(error = %e, "Settings hot reload unavailable");
            None
        }
    };
    let mut reloads = watcher.as_ref().map(ConfigWatcher::subscribe);

    let mut states = monitor.subscribe();
    let mut last_line = render_state(&states.borrow_and_update(), json)?;
    println!("{}", last_line);

    monitor.start().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("Listening for Ctrl-C")?;
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = render_state(&states.borrow_and_update(), json)?;
                if line != last_line {
                    println!("{}", line);
                    last_line = line;
                }
            }
            Some(()) = next_reload(&mut reloads) => {
                match manager.load_settings().await {
                    Ok(settings) => {
                        info!("Config file changed, applying settings");
                        monitor.execute(Command::ApplySettings(settings)).await;
                    }
                    Err(e) => warn!(error = %e, "Ignoring unreadable config change"),
                }
            }
        }
    }

    info!("Shutting down");
    monitor.shutdown().await;
    Ok(())
}

/// Wait for the next config change, or forever without a watcher
async fn next_reload(reloads: &mut Option<broadcast::Receiver<PathBuf>>) -> Option<()> {
    let Some(rx) = reloads else {
        return std::future::pending().await;
    };

    let received = rx.recv().await;
    match received {
        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => Some(()),
        Err(broadcast::error::RecvError::Closed) => {
            *reloads = None;
            None
        }
    }
}

fn render_state(state: &MonitorState, json: bool) -> Result<String> {
    if json {
        return serde_json::to_string(state).context("Encoding state");
    }

    let rate = state
        .current_sample_rate
        .map(|r| format!("{} ({})", r, r.class().label()))
        .unwrap_or_else(|| "unknown rate".to_string());
    let device = state.active_device_name.as_deref().unwrap_or("no device");
    let depth = state
        .bit_depth
        .map(|b| format!(", {}-bit", b))
        .unwrap_or_default();
    let activity = if state.monitoring_active { "monitoring" } else { "paused" };

    let mut line = format!(
        "{} on {}{} | {} | {} switches",
        rate, device, depth, activity, state.total_switches
    );
    if let Some(error) = &state.last_error {
        line.push_str(&format!(" | error: {}", error));
    }
    Ok(line)
}

fn format_rates<'a>(rates: impl IntoIterator<Item = &'a SampleRate>) -> String {
    let rates: Vec<String> = rates.into_iter().map(ToString::to_string).collect();
    if rates.is_empty() {
        "unknown".to_string()
    } else {
        rates.join(", ")
    }
}

async fn devices() -> Result<()> {
    let listing = tokio::task::spawn_blocking(|| {
        let controller = platform_controller();
        let default = controller.default_output_device();
        controller
            .list_output_devices()
            .into_iter()
            .map(|device| {
                let capabilities = controller.capabilities(device.id);
                (Some(device.id) == default, device, capabilities)
            })
            .collect::<Vec<_>>()
    })
    .await
    .context("Enumerating devices")?;

    if listing.is_empty() {
        println!("No output devices found");
        return Ok(());
    }

    for (is_default, device, capabilities) in listing {
        let marker = if is_default { "*" } else { " " };
        let rate = capabilities
            .nominal_rate
            .map(|r| r.to_string())
            .unwrap_or_else(|| "?".to_string());
        let depth = capabilities
            .bit_depth
            .map(|b| format!("{}-bit", b))
            .unwrap_or_else(|| "?-bit".to_string());

        println!("{} [{}] {}", marker, device.id, device.name);
        println!("      {} {}", rate, depth);
        println!("      supports: {}", format_rates(&capabilities.supported_rates));
    }

    Ok(())
}

async fn status(manager: ConfigManager, json: bool) -> Result<()> {
    let config = manager.load().await;
    let settings = config.settings.clone();
    let capacity = config.monitor.history_capacity;

    let state = tokio::task::spawn_blocking(move || {
        ReconciliationEngine::new(
            platform_controller(),
            Arc::new(SilentNotifier),
            &settings,
            capacity,
        )
        .snapshot()
    })
    .await
    .context("Resolving output device")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&state).context("Encoding state")?
        );
        return Ok(());
    }

    let target = config
        .settings
        .target_device_id
        .map(|id| format!("device {}", id))
        .unwrap_or_else(|| "system default".to_string());

    println!("Device:    {}", state.active_device_name.as_deref().unwrap_or("none"));
    println!("Target:    {}", target);
    match state.current_sample_rate {
        Some(rate) => println!("Rate:      {} ({})", rate, rate.class().label()),
        None => println!("Rate:      unknown"),
    }
    if let Some(depth) = state.bit_depth {
        println!("Bit depth: {}-bit", depth);
    }
    println!("Supports:  {}", format_rates(&state.supported_rates));
    println!(
        "Enabled:   {}, notifications {}",
        config.settings.enabled,
        if config.settings.notifications_enabled { "on" } else { "off" }
    );

    Ok(())
}

async fn parse(file: Option<PathBuf>) -> Result<()> {
    let text = match file {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Reading {}", path.display()))?,
        None => tokio::task::spawn_blocking(|| {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text).map(|_| text)
        })
        .await?
        .context("Reading stdin")?,
    };

    let lines: Vec<&str> = text.lines().collect();
    for found in scan(&lines) {
        println!("{:>6}  {:<18} {}", found.index + 1, found.pattern, found.rate);
    }

    match extract_candidate_rate(&lines) {
        Some(rate) => println!("candidate: {} ({})", rate, rate.class().label()),
        None => println!("candidate: none"),
    }

    Ok(())
}

async fn settings(manager: ConfigManager, args: SettingsArgs) -> Result<()> {
    let mut settings = manager.load().await.settings;
    let before = settings.clone();

    apply_settings_args(&mut settings, &args);

    if settings != before {
        manager
            .save_settings(&settings)
            .await
            .with_context(|| format!("Saving {}", manager.config_path().display()))?;
        info!(path = %manager.config_path().display(), "Settings saved");
    }

    println!("enabled               = {}", settings.enabled);
    println!("notifications_enabled = {}", settings.notifications_enabled);
    match settings.target_device_id {
        Some(id) => println!("target_device_id      = {}", id),
        None => println!("target_device_id      = (system default)"),
    }

    Ok(())
}

fn apply_settings_args(settings: &mut Settings, args: &SettingsArgs) {
    if args.enable {
        settings.enabled = true;
    }
    if args.disable {
        settings.enabled = false;
    }
    if let Some(toggle) = args.notifications {
        settings.notifications_enabled = matches!(toggle, Toggle::On);
    }
    if let Some(id) = args.target {
        settings.target_device_id = Some(DeviceId::new(id));
    }
    if args.system_default {
        settings.target_device_id = None;
    }
}
