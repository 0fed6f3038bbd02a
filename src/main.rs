// src/main.rs

mod aggregator;
mod calibration;
mod config;
mod error;
mod export;
mod image_analysis;
mod types;
mod video_analysis;
mod video_processor;
mod workbook;

use aggregator::VideoRegistry;
use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};
use types::{Config, VideoInput};

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(Path::new(&config_path))?;

    tracing_subscriber::fmt()
        .with_env_filter(format!("bubble_analysis={}", config.logging.level))
        .init();

    info!("Bubble analysis batch starting");
    info!(
        "Parameters: step={}, scale={}, agitation={}",
        config.analysis.step, config.analysis.scale, config.analysis.agitation
    );

    let registry = build_registry(&config)?;
    info!("{} video(s) registered", registry.len());

    let outcome = aggregator::analyze_all(
        &registry,
        &config.analysis,
        &config.auxiliary,
        &config.calibration,
    )?;

    if let Some(dump_dir) = &config.video.frame_dump_dir {
        dump_sampled_frames(&outcome, config.analysis.step, dump_dir);
    }

    let summary = aggregator::generate_summary(&outcome.videos);
    let report = export::build_report(&outcome, &summary);
    export::write_report(&report, &config.report.output_path)?;

    info!("✓ Batch complete");
    info!("  Videos analyzed: {}", outcome.videos.len());
    info!("  Summary rows: {}", summary.records.len());
    for (path, cause) in &outcome.skipped {
        warn!("  Dropped {}: {cause}", path.display());
    }

    Ok(())
}

/// Collect the configured inputs plus any videos found by directory scan
/// into an insertion-ordered registry.
fn build_registry(config: &Config) -> Result<VideoRegistry> {
    let mut inputs: Vec<VideoInput> = config.video.inputs.clone();
    if let Some(dir) = &config.video.input_dir {
        for path in video_processor::find_video_files(dir) {
            inputs.push(VideoInput {
                path,
                workbook: None,
            });
        }
    }

    let mut registry = VideoRegistry::default();
    for input in inputs {
        match registry.add_video(&input.path) {
            Ok(Some(frames)) => {
                info!("Registered {} ({frames} frames)", input.path.display());
                if let Some(book) = input.workbook {
                    info!("  workbook attached: {}", book.display());
                    registry.attach_workbook(&input.path, book);
                }
            }
            Ok(None) => warn!("Duplicate input ignored: {}", input.path.display()),
            Err(e) => warn!("Skipping input: {e}"),
        }
    }
    Ok(registry)
}

/// Write the sampled frames of every analyzed video as PNG stills, one
/// subdirectory per video.
fn dump_sampled_frames(outcome: &aggregator::BatchOutcome, step: u64, dump_dir: &Path) {
    for video in &outcome.videos {
        let stem = video
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        let out_dir = dump_dir.join(stem);

        match video_analysis::extract_frames(&video.path, step, &out_dir) {
            Ok(saved) => info!(
                "Dumped {saved} frame(s) of {} to {}",
                video.path.display(),
                out_dir.display()
            ),
            Err(e) => warn!("Frame dump failed for {}: {e}", video.path.display()),
        }
    }
}
