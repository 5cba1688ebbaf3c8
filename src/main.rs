// SPDX-License-Identifier: GPL-3.0-only

use camera_pipeline::constants::app_info;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-pipeline")]
#[command(about = "Live camera pipeline with frame transformation and text analysis")]
#[command(version = app_info::version())]
struct Cli {
    /// Configuration file (default: ~/.config/camera-pipeline/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Run the pipeline and report frames as they are published
    Run {
        /// Run duration in seconds (0 runs until Ctrl+C)
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Camera device path to prefer (from 'camera-pipeline list')
        #[arg(long)]
        camera: Option<String>,

        /// Directory for preview/processed snapshots taken at the end of the run
        #[arg(short, long)]
        snapshots: Option<PathBuf>,
    },

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_pipeline=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::List => cli::list_cameras(config),
        Commands::Run {
            duration,
            camera,
            snapshots,
        } => cli::run_pipeline(config, duration, camera, snapshots),
        Commands::InitConfig { force } => cli::init_config(config, force),
    }
}
