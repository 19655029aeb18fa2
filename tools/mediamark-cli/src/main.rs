//! Mediamark CLI: burn overlays into videos from the command line.
//!
//! Usage:
//!   mediamark export <SOURCE>   Export SOURCE with text/image overlays
//!   mediamark info <SOURCE>     Show probed tracks and capture orientation
//!   mediamark check             Check for ffmpeg and ffprobe

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mediamark_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "mediamark",
    about = "Burn text and image overlays into videos",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/mediamark/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a video with overlays burned in
    Export {
        /// Source video
        source: PathBuf,

        /// Text overlay, drawn bottom-left (repeatable)
        #[arg(long)]
        text: Vec<String>,

        /// Image overlay, drawn top-right (repeatable)
        #[arg(long)]
        image: Vec<PathBuf>,

        /// JSON file with a list of positioned overlay elements
        #[arg(long)]
        elements: Option<PathBuf>,

        /// Output size as WIDTHxHEIGHT (defaults to the upright source size)
        #[arg(long)]
        size: Option<String>,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Font size for --text overlays
        #[arg(long, default_value = "36")]
        font_size: f64,

        /// Text colour as #rrggbb or #rrggbbaa
        #[arg(long, default_value = "#ffffff")]
        color: String,
    },

    /// Show source tracks and capture orientation
    Info {
        /// Source video
        source: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check system capabilities
    Check {
        /// Write the effective config to the standard location
        #[arg(long)]
        write_config: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    mediamark_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Export {
            source,
            text,
            image,
            elements,
            size,
            output,
            font_size,
            color,
        } => {
            commands::export::run(
                &config,
                commands::export::ExportArgs {
                    source,
                    text,
                    image,
                    elements,
                    size,
                    output,
                    font_size,
                    color,
                },
            )
            .await
        }
        Commands::Info { source, json } => commands::info::run(source, json),
        Commands::Check { write_config } => commands::check::run(&config, write_config),
    }
}
