// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for pipeline operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Running the live pipeline for a fixed duration
//! - Writing the default configuration

use camera_pipeline::backends::camera::{CameraFormat, get_backend};
use camera_pipeline::constants::{analysis, get_resolution_label};
use camera_pipeline::media::Frame;
use camera_pipeline::{Config, PipelineController};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// List all available cameras
pub fn list_cameras(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default(config_path)?;
    let backend = get_backend(config.backend, &config)?;

    let cameras = backend.enumerate_cameras();
    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras ({} backend):", config.backend);
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        println!("  [{}] {} ({})", index, camera.name, camera.kind);
        println!("      Path: {}", camera.path);

        match backend.get_formats(camera) {
            Ok(formats) if !formats.is_empty() => {
                println!("      Formats: {}", summarize_formats(&formats).join(", "));
            }
            Ok(_) => println!("      Formats: none"),
            Err(e) => println!("      Formats: unavailable ({})", e),
        }
        println!();
    }

    Ok(())
}

/// Group formats by resolution, keep the best framerate, highest resolution first
fn summarize_formats(formats: &[CameraFormat]) -> Vec<String> {
    let mut resolutions: Vec<(u32, u32, f64)> = Vec::new();
    for format in formats {
        let fps = format.framerate.map(|f| f.as_f64()).unwrap_or(0.0);
        if let Some(existing) = resolutions
            .iter_mut()
            .find(|(w, h, _)| *w == format.width && *h == format.height)
        {
            if fps > existing.2 {
                existing.2 = fps;
            }
        } else {
            resolutions.push((format.width, format.height, fps));
        }
    }

    resolutions.sort_by_key(|&(w, h, _)| std::cmp::Reverse(u64::from(w) * u64::from(h)));

    resolutions
        .iter()
        .take(3)
        .map(|&(w, h, fps)| {
            let label = get_resolution_label(w)
                .map(|l| format!(" {}", l))
                .unwrap_or_default();
            if fps > 0.0 {
                format!("{}x{}@{:.0}fps{}", w, h, fps, label)
            } else {
                format!("{}x{}{}", w, h, label)
            }
        })
        .collect()
}

/// Run the pipeline until the duration elapses or Ctrl+C is pressed
pub fn run_pipeline(
    config_path: Option<&Path>,
    duration: u64,
    camera: Option<String>,
    snapshots: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load_or_default(config_path)?;
    if camera.is_some() {
        config.preferred_camera = camera;
    }

    let controller = PipelineController::from_config(&config)?;
    controller.initialize()?;

    if let Some((device, format)) = controller.active_source() {
        println!("Using camera: {}", device.name);
        println!("Capture format: {}", format);
    }
    println!("Filter: {}", config.filter);
    if config.analysis.enabled {
        println!("Text analysis: enabled");
    }

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!();
    if duration == 0 {
        println!("Running... (press Ctrl+C to stop)");
    } else {
        println!("Running for {} seconds... (press Ctrl+C to stop early)", duration);
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let received = rt.block_on(watch_frames(&controller, duration, &stop_flag))?;
    println!();

    if let Some(dir) = snapshots {
        match controller.latest_frames() {
            Some(pair) => {
                std::fs::create_dir_all(&dir)?;
                let timestamp = Local::now().format("%Y%m%d_%H%M%S");
                let preview = save_snapshot(&pair.preview, &dir, &format!("preview_{}", timestamp))?;
                let processed =
                    save_snapshot(&pair.processed, &dir, &format!("processed_{}", timestamp))?;
                println!("Preview saved: {}", preview.display());
                println!("Processed saved: {}", processed.display());
            }
            None => println!("No frames captured, no snapshots written"),
        }
    }

    controller.wait_analysis_idle(analysis::IDLE_WAIT);
    controller.deinitialize();

    let stats = controller.stats();
    println!("Frame signals received: {}", received);
    println!("Frames processed: {}", stats.frames_processed);
    println!("Frames dropped: {}", stats.frames_dropped);
    if stats.conversion_failures + stats.transform_failures > 0 {
        println!(
            "Failed frames: {} conversion, {} transformation",
            stats.conversion_failures, stats.transform_failures
        );
    }
    if let Some(analysis) = stats.analysis {
        println!(
            "Analysis: {} started, {} skipped, {} completed, {} failed",
            analysis.started, analysis.skipped, analysis.completed, analysis.failed
        );
    }
    match controller.recognized_text() {
        Some(text) => println!("Recognized text:\n{}", text.trim_end()),
        None => println!("Recognized text: none"),
    }

    Ok(())
}

/// Count frame-ready signals while printing progress
async fn watch_frames(
    controller: &PipelineController,
    duration: u64,
    stop_flag: &AtomicBool,
) -> Result<u64, Box<dyn std::error::Error>> {
    let mut ready = controller.subscribe();
    let start = Instant::now();
    let target_duration = (duration > 0).then(|| Duration::from_secs(duration));
    let mut received = 0u64;
    let mut sequence = ready.latest_sequence();

    loop {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }
        if target_duration.is_some_and(|d| start.elapsed() >= d) {
            break;
        }

        tokio::select! {
            changed = ready.changed() => match changed {
                Some(seq) => {
                    received += 1;
                    sequence = seq;
                }
                None => break,
            },
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }

        let elapsed = start.elapsed().as_secs();
        print!(
            "\rRunning: {:02}:{:02}  frame #{}",
            elapsed / 60,
            elapsed % 60,
            sequence
        );
        std::io::Write::flush(&mut std::io::stdout())?;
    }

    Ok(received)
}

fn save_snapshot(
    frame: &Frame,
    dir: &Path,
    stem: &str,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = dir.join(format!("{}.png", stem));
    frame.to_rgba_image().save(&path)?;
    Ok(path)
}

/// Write the default configuration to `path` or the default location
pub fn init_config(path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::default_path().ok_or("No configuration directory available")?,
    };

    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
    }

    Config::default().save(&path)?;
    println!("Configuration written: {}", path.display());
    Ok(())
}
