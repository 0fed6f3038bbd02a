// src/video_processor.rs

use crate::error::AnalysisError;
use anyhow::Result;
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

/// Recursively collect video files under a directory.
pub fn find_video_files(dir: &Path) -> Vec<PathBuf> {
    let video_extensions = ["mp4", "avi", "mov", "mkv", "MP4", "AVI", "MOV", "MKV"];

    let mut videos = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if let Some(ext) = path.extension() {
            if video_extensions.contains(&ext.to_str().unwrap_or("")) {
                videos.push(path.to_path_buf());
            }
        }
    }
    videos.sort();

    info!("Found {} video file(s) under {}", videos.len(), dir.display());
    videos
}

/// Sequential frame reader over one video file.
pub struct VideoReader {
    cap: VideoCapture,
    pub fps: f64,
    pub frame_count: u64,
    pub width: i32,
    pub height: i32,
    next_index: u64,
}

impl VideoReader {
    /// Open a video for sequential reading. Any container/codec the platform
    /// decoding backend accepts works; anything else is a `VideoOpen` error.
    pub fn open(path: &Path) -> Result<Self, AnalysisError> {
        let open_err = |reason: String| AnalysisError::VideoOpen {
            path: path.to_path_buf(),
            reason,
        };

        let path_str = path
            .to_str()
            .ok_or_else(|| open_err("path is not valid UTF-8".to_string()))?;

        let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)
            .map_err(|e| open_err(e.to_string()))?;

        if !cap.is_opened().map_err(|e| open_err(e.to_string()))? {
            return Err(open_err("decoder refused the source".to_string()));
        }

        let prop = |id: i32| -> Result<f64, AnalysisError> {
            cap.get(id).map_err(|e| open_err(e.to_string()))
        };
        let fps = prop(videoio::CAP_PROP_FPS)?;
        let frame_count = prop(videoio::CAP_PROP_FRAME_COUNT)?.max(0.0) as u64;
        let width = prop(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = prop(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        info!(
            "Opened {}: {}x{} @ {:.1} FPS, {} frames",
            path.display(),
            width,
            height,
            fps,
            frame_count
        );

        Ok(Self {
            cap,
            fps,
            frame_count,
            width,
            height,
            next_index: 0,
        })
    }

    /// Read the next frame as a BGR `Mat` along with its ordinal index.
    /// `None` is normal end-of-stream, not an error.
    pub fn read_frame(&mut self) -> Result<Option<(u64, Mat)>> {
        let mut mat = Mat::default();
        if !self.cap.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }

        let index = self.next_index;
        self.next_index += 1;
        Ok(Some((index, mat)))
    }

    /// Release the decoder handle. Dropping the reader releases it too, so
    /// early exits stay safe without calling this.
    pub fn release(&mut self) -> Result<()> {
        self.cap.release()?;
        Ok(())
    }
}
