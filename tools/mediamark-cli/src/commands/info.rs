//! Show source tracks and capture orientation.

use std::path::PathBuf;

use mediamark_composition::Orientation;
use mediamark_media_model::{AssetLoader, TrackKind};
use mediamark_render_engine::FfprobeAssetLoader;

pub fn run(source: PathBuf, json: bool) -> anyhow::Result<()> {
    let loader = FfprobeAssetLoader::new();
    let asset = loader
        .load(&source)
        .map_err(|e| anyhow::anyhow!("Failed to probe {}: {e}", source.display()))?;
    let orientation = Orientation::of_asset(&asset);

    if json {
        let report = serde_json::json!({
            "asset": asset,
            "orientation": orientation,
            "upright_size": asset
                .natural_size()
                .zip(orientation)
                .map(|(size, o)| o.upright_size(size)),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Source: {}", asset.location.display());
    println!("  Duration: {:.3}s", asset.duration.as_secs());
    match (asset.natural_size(), orientation) {
        (Some(size), Some(o)) => {
            let upright = o.upright_size(size);
            println!("  Orientation: {}", o.as_str());
            println!(
                "  Natural size: {}x{} (upright {}x{})",
                size.width, size.height, upright.width, upright.height
            );
        }
        _ => println!("  Orientation: n/a (no video track)"),
    }
    println!();

    println!("Tracks:");
    for track in &asset.tracks {
        let kind = match track.kind {
            TrackKind::Video => "Video",
            TrackKind::Audio => "Audio",
        };
        let codec = track.codec.as_deref().unwrap_or("unknown");
        match track.kind {
            TrackKind::Video => println!(
                "  #{} {kind}: {}x{} {codec} ({:.1}s, {} fps)",
                track.id,
                track.natural_size.width,
                track.natural_size.height,
                track.time_range.duration.as_secs(),
                track
                    .nominal_frame_rate
                    .map(|fps| format!("{fps:.2}"))
                    .unwrap_or_else(|| "?".to_string()),
            ),
            TrackKind::Audio => println!(
                "  #{} {kind}: {codec} ({:.1}s)",
                track.id,
                track.time_range.duration.as_secs()
            ),
        }
    }

    Ok(())
}
