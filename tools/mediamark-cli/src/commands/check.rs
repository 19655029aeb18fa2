//! Check system capabilities.

use mediamark_common::config::{config_file_path, AppConfig};
use mediamark_media_model::AssetLoader;
use mediamark_render_engine::{ExportBackend, FfmpegBackend, FfprobeAssetLoader};

pub fn run(config: &AppConfig, write_config: bool) -> anyhow::Result<()> {
    println!("Mediamark System Check");
    println!("{}", "=".repeat(50));
    println!("Checked at {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!();

    let backend = FfmpegBackend::new(config.export.clone());
    match backend.binary() {
        Some(path) => println!("[OK] ffmpeg: {}", path.display()),
        None => println!("[MISSING] ffmpeg: not found in PATH (required for export)"),
    }

    let loader = FfprobeAssetLoader::new();
    match loader.binary() {
        Some(path) => println!("[OK] ffprobe: {}", path.display()),
        None => println!("[MISSING] ffprobe: not found in PATH (required to read sources)"),
    }

    match &config.export.font_file {
        Some(font) if font.is_file() => println!("[OK] Font: {}", font.display()),
        Some(font) => println!("[WARN] Font: {} does not exist", font.display()),
        None => println!("[OK] Font: ffmpeg default"),
    }

    println!();
    let config_path = config_file_path();
    if write_config {
        config.save()?;
        println!("Config: wrote {}", config_path.display());
    } else if config_path.exists() {
        println!("Config: {}", config_path.display());
    } else {
        println!("Config: defaults ({} not found)", config_path.display());
    }
    println!("Output: {}", config.output.dir.display());
    println!(
        "Encoder: {} preset={} crf={} @ {}fps",
        config.export.video_codec, config.export.preset, config.export.crf, config.export.frame_rate
    );

    println!();
    if backend.is_available() && loader.is_available() {
        println!("All required tools are available. Mediamark is ready.");
    } else {
        println!("Some required tools are missing. Install ffmpeg to continue.");
    }

    Ok(())
}
