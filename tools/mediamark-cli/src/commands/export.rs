//! Export a video with overlays burned in.

use std::io::Write;
use std::path::PathBuf;

use mediamark_common::config::AppConfig;
use mediamark_composition::Orientation;
use mediamark_media_model::{
    AssetLoader, Bitmap, MediaElement, MediaItem, Rect, Rgba, Size, TextStyle,
};
use mediamark_render_engine::{FfprobeAssetLoader, MediaProcessor, OutputLocation};
use tokio::sync::oneshot;

/// Distance between overlays and the frame edge, in output pixels.
const EDGE_MARGIN: f64 = 24.0;

pub struct ExportArgs {
    pub source: PathBuf,
    pub text: Vec<String>,
    pub image: Vec<PathBuf>,
    pub elements: Option<PathBuf>,
    pub size: Option<String>,
    pub output: Option<PathBuf>,
    pub font_size: f64,
    pub color: String,
}

pub async fn run(config: &AppConfig, args: ExportArgs) -> anyhow::Result<()> {
    println!("Exporting: {}", args.source.display());

    let asset = FfprobeAssetLoader::new()
        .load(&args.source)
        .map_err(|e| anyhow::anyhow!("Failed to probe source: {e}"))?;

    let size = match args.size.as_deref() {
        Some(value) => parse_size(value)?,
        None => {
            let natural = asset
                .natural_size()
                .ok_or_else(|| anyhow::anyhow!("Source has no video track"))?;
            Orientation::of_asset(&asset)
                .map(|o| o.upright_size(natural))
                .unwrap_or(natural)
        }
    };

    let color = Rgba::from_hex(&args.color)
        .ok_or_else(|| anyhow::anyhow!("Invalid colour: {}. Use #rrggbb or #rrggbbaa", args.color))?;
    let style = TextStyle {
        font_size: args.font_size,
        color,
        font_file: None,
    };

    let mut elements = match &args.elements {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            serde_json::from_str::<Vec<MediaElement>>(&json)
                .map_err(|e| anyhow::anyhow!("Invalid elements file {}: {e}", path.display()))?
        }
        None => Vec::new(),
    };
    elements.extend(text_elements(&args.text, &style, size));
    elements.extend(image_elements(&args.image, size));

    let item = MediaItem::video(asset, size).with_elements(elements);

    let mut processor = MediaProcessor::with_ffmpeg(config);
    if let Some(output) = args.output {
        processor = processor.with_output(OutputLocation::Fixed(output));
    }

    println!("  Resolution: {}x{}", size.width, size.height);
    println!("  Overlays: {}", item.elements.len());

    let (tx, rx) = oneshot::channel();
    let on_progress = |progress: f32| {
        print!("\r  Progress: {:.1}%  ", progress * 100.0);
        let _ = std::io::stdout().flush();
    };
    let handle = processor.process_item(&item, on_progress, move |outcome| {
        let _ = tx.send(outcome);
    });
    if let Some(handle) = &handle {
        println!("  Output: {}", handle.output_path().display());
    }

    let outcome = tokio::select! {
        outcome = rx => outcome,
        _ = tokio::signal::ctrl_c() => {
            println!("\nCancelling export...");
            processor.cancel_export();
            if let Some(handle) = &handle {
                handle.finished().await;
            }
            return Err(anyhow::anyhow!("Export cancelled"));
        }
    };

    match outcome {
        Ok(Ok(result)) => {
            let artifact = result
                .artifact()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            tracing::info!(output = %artifact, "Export finished");
            println!("\nExport complete: {artifact}");
            Ok(())
        }
        Ok(Err(e)) => Err(anyhow::anyhow!("Export failed: {e}")),
        Err(_) => Err(anyhow::anyhow!("Export ended without an outcome")),
    }
}

/// Parse `WIDTHxHEIGHT`.
fn parse_size(value: &str) -> anyhow::Result<Size> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow::anyhow!("Invalid size: {value}. Use WIDTHxHEIGHT"))?;
    let width: u32 = w.trim().parse()?;
    let height: u32 = h.trim().parse()?;
    if width == 0 || height == 0 {
        return Err(anyhow::anyhow!("Size must be non-zero: {value}"));
    }
    Ok(Size::new(width as f64, height as f64))
}

/// Stack text lines upward from the bottom-left corner, first line lowest.
fn text_elements(lines: &[String], style: &TextStyle, frame: Size) -> Vec<MediaElement> {
    let line_height = style.font_size * 1.5;
    let width = (frame.width - 2.0 * EDGE_MARGIN).max(0.0);
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let y = frame.height - EDGE_MARGIN - line_height * (i as f64 + 1.0);
            MediaElement::styled_text(
                line.clone(),
                style.clone(),
                Rect::new(EDGE_MARGIN, y, width, line_height),
            )
        })
        .collect()
}

/// Stack square logos downward from the top-right corner.
fn image_elements(paths: &[PathBuf], frame: Size) -> Vec<MediaElement> {
    let side = (frame.width.min(frame.height) / 5.0).round();
    let x = frame.width - EDGE_MARGIN - side;
    paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let y = EDGE_MARGIN + (side + EDGE_MARGIN) * i as f64;
            MediaElement::image(Bitmap::new(path), Rect::new(x, y, side, side))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1080x1920").unwrap(), Size::new(1080.0, 1920.0));
        assert_eq!(parse_size("640X360").unwrap(), Size::new(640.0, 360.0));
        assert!(parse_size("1080").is_err());
        assert!(parse_size("0x720").is_err());
    }

    #[test]
    fn test_text_stacks_from_bottom_left() {
        let style = TextStyle::default();
        let lines = vec!["first".to_string(), "second".to_string()];
        let elements = text_elements(&lines, &style, Size::new(1280.0, 720.0));
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].frame.origin.x, EDGE_MARGIN);
        assert_eq!(elements[0].frame.max_y(), 720.0 - EDGE_MARGIN);
        assert!(elements[1].frame.max_y() <= elements[0].frame.min_y());
    }

    #[test]
    fn test_images_stack_from_top_right() {
        let paths = vec![PathBuf::from("a.png"), PathBuf::from("b.png")];
        let elements = image_elements(&paths, Size::new(1000.0, 500.0));
        assert_eq!(elements[0].frame, Rect::new(876.0, 24.0, 100.0, 100.0));
        assert_eq!(elements[1].frame.origin.y, 148.0);
    }
}
