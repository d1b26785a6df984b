//! Motion Sensor Agent CLI
//!
//! Runs a simulated wearable and its companion over an in-process link.

use clap::{Parser, Subcommand};
use motion_sensor_agent::{
    collector::{GeneratorHandle, SystemClock, VirtualSensorHub},
    config::{Config, SensorSelection},
    session::{
        CompanionController, MemoryNetwork, MemoryTransport, RemoteListener, SessionCoordinator,
        UiState, WearableService,
    },
    transparency::{create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog},
    DATA_DECLARATION, VERSION,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "motion-sensor")]
#[command(version = VERSION)]
#[command(
    about = "Wearable motion recording with on-device activity classification",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a simulated session between a wearable and its companion
    Simulate {
        /// Recording length in seconds
        #[arg(long, default_value = "10")]
        duration: u64,

        /// Sensors present on the simulated wearable (acc, grav, gyro, or all)
        #[arg(long, default_value = "all")]
        sensors: String,

        /// Upload the received file (requires upload feature)
        #[arg(long)]
        upload: bool,
    },

    /// Run the companion control server with a simulated wearable attached
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8787")]
        port: u16,

        /// Sensors present on the simulated wearable (acc, grav, gyro, or all)
        #[arg(long, default_value = "all")]
        sensors: String,
    },

    /// Show configuration and cumulative statistics
    Status,

    /// Display the data declaration
    Privacy,

    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            duration,
            sensors,
            upload,
        } => cmd_simulate(duration, &sensors, upload).await,
        Commands::Serve { port, sensors } => cmd_serve(port, &sensors).await,
        Commands::Status => {
            cmd_status();
            Ok(())
        }
        Commands::Privacy => {
            println!("{DATA_DECLARATION}");
            Ok(())
        }
        Commands::Config => {
            cmd_config();
            Ok(())
        }
    }
}

/// Wearable half of the simulation.
struct Wearable {
    coordinator: Arc<SessionCoordinator>,
    generator: GeneratorHandle,
}

/// Companion half of the simulation.
struct Companion {
    controller: CompanionController,
    ui: UiState,
}

fn node_prefix() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "local".to_string())
}

fn load_config(sensors: &str) -> anyhow::Result<Config> {
    let mut config = Config::load().unwrap_or_default();
    config.sensors = SensorSelection::from_csv(sensors);
    if !config.sensors.any_enabled() {
        anyhow::bail!("At least one sensor must be enabled (acc, grav or gyro)");
    }
    config.validate()?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    Ok(config)
}

fn spawn_wearable(
    config: &Config,
    network: &MemoryNetwork,
    log: &SharedTransparencyLog,
) -> anyhow::Result<Wearable> {
    let node_id = format!("{}-watch", node_prefix());
    let capabilities = [config.capability.as_str()];
    let (transport, inbox) = network.join(node_id, "Simulated watch", &capabilities);

    let clock = Arc::new(SystemClock::new());
    let hub = Arc::new(VirtualSensorHub::new(config.sensors.sensors(), clock.clone()));
    let generator = hub.start_generator(config.sample_period)?;

    let coordinator = Arc::new(SessionCoordinator::from_config(
        config,
        Arc::new(transport),
        hub,
        Arc::new(UiState::new()),
        clock,
        log.clone(),
    ));

    let service = WearableService::new(Arc::clone(&coordinator));
    tokio::spawn(service.run(inbox));

    Ok(Wearable {
        coordinator,
        generator,
    })
}

fn spawn_companion(
    config: &Config,
    network: &MemoryNetwork,
    log: &SharedTransparencyLog,
    upload: bool,
) -> anyhow::Result<Companion> {
    let node_id = format!("{}-phone", node_prefix());
    let (transport, inbox): (MemoryTransport, _) = network.join(node_id, "Companion", &[]);
    let ui = UiState::new();

    let listener = RemoteListener::new(Arc::new(ui.clone()), &config.receive_path, log.clone())
        .with_timezone(config.tz()?);
    let listener = attach_uploader(listener, config, upload || config.upload.enabled)?;
    tokio::spawn(Arc::new(listener).run(inbox));

    let controller =
        CompanionController::new(Arc::new(transport), Arc::new(ui.clone()), &config.capability);
    Ok(Companion { controller, ui })
}

#[cfg(feature = "upload")]
fn attach_uploader(
    listener: RemoteListener,
    config: &Config,
    enabled: bool,
) -> anyhow::Result<RemoteListener> {
    use motion_sensor_agent::upload::{HttpUploader, UploadConfig};

    if !enabled {
        return Ok(listener);
    }
    let Some(api_key) = config.upload.resolved_api_key() else {
        eprintln!("Warning: Upload enabled but no API key configured; set MOTION_SENSOR_API_KEY");
        return Ok(listener);
    };
    let uploader = HttpUploader::new(UploadConfig::new(&config.upload.base_url))?;
    println!("  Upload: enabled ({})", uploader.config().ingest_url());
    Ok(listener.with_upload(Arc::new(uploader), api_key))
}

#[cfg(not(feature = "upload"))]
fn attach_uploader(
    listener: RemoteListener,
    _config: &Config,
    enabled: bool,
) -> anyhow::Result<RemoteListener> {
    if enabled {
        eprintln!("Warning: upload ignored (upload feature not enabled at compile time)");
    }
    Ok(listener)
}

async fn cmd_simulate(duration: u64, sensors: &str, upload: bool) -> anyhow::Result<()> {
    println!("Motion Sensor Agent v{VERSION}");
    println!();

    let config = load_config(sensors)?;
    let log = create_shared_log_with_persistence(config.transparency_path());
    let network = MemoryNetwork::new();

    println!("Starting simulated session...");
    println!("  Sensors: {:?}", config.sensors.sensors());
    println!("  Window capacity: {} values", config.window_capacity);
    println!("  Prediction period: {}ms", config.prediction_period.as_millis());
    println!("  Received files: {:?}", config.receive_path);

    let mut wearable = spawn_wearable(&config, &network, &log)?;
    let companion = spawn_companion(&config, &network, &log, upload)?;

    println!();
    println!("Press Ctrl+C to stop early");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let reached = companion.controller.start_recording().await?;
    if reached.is_empty() {
        anyhow::bail!("No wearable answered the start request");
    }

    let started = Instant::now();
    let mut last_shown = None;
    while running.load(Ordering::SeqCst) && started.elapsed() < Duration::from_secs(duration) {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let prediction = companion.ui.snapshot().prediction;
        if prediction.is_some() && prediction != last_shown {
            println!(
                "[{:>5.1}s] Prediction: {}",
                started.elapsed().as_secs_f32(),
                prediction.as_deref().unwrap_or_default()
            );
            last_shown = prediction;
        }
    }

    println!();
    println!("Stopping session...");
    companion.controller.stop_recording().await?;

    let deadline = Instant::now() + Duration::from_secs(5);
    while companion.ui.snapshot().received_files.is_empty() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    wearable.generator.stop();
    wearable.coordinator.shutdown().await;

    match companion.ui.snapshot().received_files.last() {
        Some(path) => println!("Session file received: {path:?}"),
        None => eprintln!("Warning: No session file arrived at the companion"),
    }

    if let Err(e) = log.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }

    println!();
    println!("{}", log.summary());
    Ok(())
}

#[cfg(feature = "server")]
async fn cmd_serve(port: u16, sensors: &str) -> anyhow::Result<()> {
    use motion_sensor_agent::server::{run, ServerConfig, ServerState};

    let config = load_config(sensors)?;
    let log = create_shared_log_with_persistence(config.transparency_path());
    let network = MemoryNetwork::new();

    let mut wearable = spawn_wearable(&config, &network, &log)?;
    let companion = spawn_companion(&config, &network, &log, config.upload.enabled)?;

    let state = Arc::new(ServerState::new(companion.controller, companion.ui, log.clone()));
    let (addr, shutdown_tx) = run(ServerConfig::new(port), state).await?;
    println!("Control server listening on http://{addr}");
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;

    let _ = shutdown_tx.send(());
    wearable.generator.stop();
    wearable.coordinator.shutdown().await;
    if let Err(e) = log.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }
    Ok(())
}

#[cfg(not(feature = "server"))]
async fn cmd_serve(_port: u16, _sensors: &str) -> anyhow::Result<()> {
    anyhow::bail!("serve requires the server feature (cargo build --features server)")
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Motion Sensor Agent Status");
    println!("==========================");
    println!();

    println!("Configuration:");
    println!("  Sensors: {:?}", config.sensors.sensors());
    println!("  Window capacity: {} values", config.window_capacity);
    println!("  Bucket interval: {}ms", config.bucket_interval_ms);
    println!("  Prediction period: {}ms", config.prediction_period.as_millis());
    println!(
        "  Upload: {}",
        if config.upload.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!();

    let stats_path = config.transparency_path();
    if stats_path.exists() {
        let stats = TransparencyLog::with_persistence(stats_path).stats();
        println!("Cumulative Statistics:");
        println!("  Readings: {}", stats.total_readings());
        println!("  Windows classified: {}", stats.windows_flushed);
        println!("  Predictions sent: {}", stats.predictions_sent);
        println!("  Files sent / received: {} / {}", stats.files_sent, stats.files_received);
        println!(
            "  Uploads completed / failed: {} / {}",
            stats.uploads_completed, stats.uploads_failed
        );
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}
