// src/video_analysis.rs
//
// Frame-sampling pipeline for one video: decide which frame indices to
// analyze, run the segmenter on each, and produce the ordered measurement
// series.

use crate::error::AnalysisError;
use crate::image_analysis;
use crate::types::{AnalysisParams, VideoSeries};
use crate::video_processor::VideoReader;
use opencv::{core::Vector, imgcodecs};
use std::path::Path;
use tracing::debug;

/// Sampling policy: frame `i` is analyzed iff it lies past the agitation
/// skip (strictly — the agitation-count frame itself is still skipped) and
/// falls on the step interval.
pub fn is_sampled(index: u64, step: u64, agitation: u64) -> bool {
    index > agitation && index % step == 0
}

/// Analyze one video into its measurement series.
///
/// Frames are read in order from index 0; end-of-stream is normal
/// termination. The decoder handle is released on every exit path.
pub fn analyze_video(path: &Path, params: &AnalysisParams) -> Result<VideoSeries, AnalysisError> {
    params.validate()?;

    let mut reader = VideoReader::open(path)?;
    debug!(
        "{}: {} frame(s) announced at {:.1} fps",
        path.display(),
        reader.frame_count,
        reader.fps
    );
    let mut series = VideoSeries::default();

    loop {
        let next = reader.read_frame().map_err(|e| AnalysisError::Frame {
            path: path.to_path_buf(),
            frame_index: series
                .measurements
                .last()
                .map(|m| m.frame_index + 1)
                .unwrap_or(0),
            reason: e.to_string(),
        })?;

        let Some((index, frame)) = next else {
            break;
        };

        if !is_sampled(index, params.step, params.agitation) {
            continue;
        }

        let measurement = image_analysis::measure_frame(index, &frame, params.scale).map_err(
            |e| AnalysisError::Frame {
                path: path.to_path_buf(),
                frame_index: index,
                reason: e.to_string(),
            },
        )?;

        debug!(
            "frame {}: {} bubble(s), mean area {:.3}",
            index, measurement.bubble_count, measurement.mean_area
        );
        series.measurements.push(measurement);
    }

    let _ = reader.release();
    Ok(series)
}

/// Dump every step-th frame of a video as a PNG for visual inspection.
/// Returns the number of images written.
pub fn extract_frames(path: &Path, step: u64, out_dir: &Path) -> Result<usize, AnalysisError> {
    if step == 0 {
        return Err(AnalysisError::InvalidParameter(
            "step must be a positive integer".to_string(),
        ));
    }

    std::fs::create_dir_all(out_dir).map_err(|e| AnalysisError::Frame {
        path: path.to_path_buf(),
        frame_index: 0,
        reason: format!("cannot create {}: {e}", out_dir.display()),
    })?;

    let mut reader = VideoReader::open(path)?;
    debug!(
        "dumping {}x{} frames from {}",
        reader.width,
        reader.height,
        path.display()
    );
    let mut saved = 0usize;

    while let Some((index, frame)) = reader.read_frame().map_err(|e| AnalysisError::Frame {
        path: path.to_path_buf(),
        frame_index: saved as u64,
        reason: e.to_string(),
    })? {
        if index % step != 0 {
            continue;
        }

        let out_path = out_dir.join(format!("frame_{saved:03}.png"));
        let written = imgcodecs::imwrite(
            out_path.to_str().unwrap_or_default(),
            &frame,
            &Vector::<i32>::new(),
        )
        .map_err(|e| AnalysisError::Frame {
            path: path.to_path_buf(),
            frame_index: index,
            reason: e.to_string(),
        })?;

        if written {
            saved += 1;
        }
    }

    let _ = reader.release();
    Ok(saved)
}
