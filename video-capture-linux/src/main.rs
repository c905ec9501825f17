use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context};
use clap::Parser;
use log::{error, info};

use video_capture_core::{
    CaptureError, ConnectivityMonitor, FsDiskUsage, ProgressStore, RetentionManager, ShardedRecorder,
    UploadCoordinator,
};
use video_capture_linux::{DaemonConfig, HttpTransport, PipeCaptureDriver, ThermalLoggingUsage};

#[derive(Parser, Debug)]
#[command(name = "video-capture", about = "Record while offline, upload when connected")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE", default_value = "video-capture.toml")]
    config: PathBuf,

    /// Turn debug logging on
    #[arg(short, long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    let config = DaemonConfig::load(&cli.config)?;
    let storage = &config.capture.storage;
    for dir in [&storage.video_dir, &storage.uploads_dir] {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    info!(
        "video-capture starting: shards in {}, progress in {}",
        storage.video_dir.display(),
        storage.uploads_dir.display()
    );

    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("Shutdown requested");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    let watcher = start_watcher(&config, running.clone())?;

    let driver = PipeCaptureDriver::new(
        config.driver.command.clone(),
        config.driver.framerate,
        config.capture.recorder.flush_interval,
    );
    let mut recorder = ShardedRecorder::new(
        driver,
        config.capture.storage.clone(),
        config.capture.recorder.clone(),
        ConnectivityMonitor::from_config(&config.capture.connectivity),
    )
    .with_running_flag(running.clone());
    recorder.run();

    watcher
        .join()
        .map_err(|_| anyhow!("watcher thread panicked"))?
        .context("watcher stopped")?;
    info!("video-capture stopped");
    Ok(())
}

/// Retention and uploads on their own thread. A fatal watcher error clears
/// `running` so the recorder stops too.
fn start_watcher(
    config: &DaemonConfig,
    running: Arc<AtomicBool>,
) -> anyhow::Result<thread::JoinHandle<Result<(), CaptureError>>> {
    let capture = &config.capture;
    let usage = ThermalLoggingUsage::new(
        FsDiskUsage::new(capture.storage.video_dir.clone()),
        config.driver.thermal_sensor.clone(),
    );
    let retention = RetentionManager::new(
        capture.storage.video_dir.clone(),
        ProgressStore::new(capture.storage.uploads_dir.clone()),
        capture.retention.clone(),
        Box::new(usage),
    );
    let mut coordinator = UploadCoordinator::new(
        capture.storage.clone(),
        capture.upload.clone(),
        retention,
        ConnectivityMonitor::from_config(&capture.connectivity),
        Arc::new(HttpTransport::new(config.transport.clone())),
    )
    .with_running_flag(running.clone());

    let handle = thread::Builder::new().name("watcher".into()).spawn(move || {
        let result = coordinator.run();
        if let Err(e) = &result {
            error!("Watcher failed: {}", e);
            running.store(false, Ordering::SeqCst);
        }
        result
    })?;
    Ok(handle)
}
