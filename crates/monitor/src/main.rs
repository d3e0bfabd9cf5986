//! Drowsiness Monitor - Main Entry Point

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use monitor::{init_logging, run_pipeline, AppConfig};
use tracing::{info, warn};

/// Watches a face video stream and sounds an alarm when the eyes stay closed
#[derive(Parser, Debug)]
#[command(name = "drowsiness-monitor")]
#[command(version)]
#[command(about = "Real-time drowsiness detection from eye state")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of frames to process (overrides the configuration)
    #[arg(short, long)]
    frames: Option<PathBuf>,

    /// Write annotated frames to this directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Font used to write the eye status onto annotated frames
    #[arg(long)]
    font: Option<PathBuf>,

    /// Alarm timing preset: default, strict or lenient
    #[arg(short, long)]
    profile: Option<String>,

    /// Log only, never play the alarm sound
    #[arg(long)]
    silent: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(profile) = &args.profile {
        config.apply_profile(profile)?;
    }
    if let Some(frames) = args.frames {
        config.capture.frames_dir = frames;
    }
    if args.output.is_some() {
        config.output_dir = args.output;
    }
    if args.font.is_some() {
        config.overlay_font = args.font;
    }
    if args.silent {
        config.alarm.audible = false;
    }
    info!(
        "Alarm after {} closed frames, repeating every {}",
        config.dms.closed_frame_threshold, config.dms.alarm_repeat_interval
    );

    let stop = Arc::new(AtomicBool::new(false));
    spawn_stop_signals(Arc::clone(&stop))?;

    let summary = tokio::task::spawn_blocking(move || run_pipeline(config, &stop))
        .await
        .context("processing thread panicked")??;

    info!(
        "Processed {} frames ({} failed), {} alarms, {} repeats",
        summary.frames_processed, summary.frames_failed, summary.alarms_triggered, summary.alarms_repeated
    );
    Ok(())
}

/// Ctrl-C, or a `q` line on stdin, requests a stop
fn spawn_stop_signals(stop: Arc<AtomicBool>) -> Result<()> {
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupted; stopping");
                    stop.store(true, Ordering::Release);
                }
                Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
            }
        });
    }

    // detached: a blocked stdin read must not hold up exit
    std::thread::Builder::new()
        .name("stdin-quit".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                        info!("Quit requested");
                        stop.store(true, Ordering::Release);
                        break;
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        })
        .context("failed to spawn stdin listener")?;
    Ok(())
}
