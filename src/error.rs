// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Batch-level and per-video analysis failures.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The video cannot be opened (missing file, unsupported codec, corrupt
    /// container). Fatal for that video, non-fatal for the batch.
    #[error("cannot open video {}: {reason}", .path.display())]
    VideoOpen { path: PathBuf, reason: String },

    /// A frame could not be decoded or processed mid-stream.
    #[error("frame {frame_index} of {} could not be processed: {reason}", .path.display())]
    Frame {
        path: PathBuf,
        frame_index: u64,
        reason: String,
    },

    /// Caller-supplied invalid argument. Raised before any video is processed.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Every registered video failed; nothing usable came out of the batch.
    #[error("no registered video produced a usable series")]
    NoUsableSeries,
}

/// Auxiliary-table merge failure. Degrades that video's auxiliary columns to
/// absent; never raised to the batch caller.
#[derive(Debug, Error)]
pub enum AuxiliaryMergeError {
    #[error("cannot open workbook {}: {reason}", .path.display())]
    Workbook { path: PathBuf, reason: String },

    #[error("none of the configured columns could be extracted from {}", .path.display())]
    NoColumnsExtracted { path: PathBuf },
}

/// Calibration-sheet extraction failure. Degrades that video's parameter
/// table to absent; never raised to the batch caller.
#[derive(Debug, Error)]
pub enum CalibrationExtractError {
    #[error("cannot open workbook {}: {reason}", .path.display())]
    Workbook { path: PathBuf, reason: String },

    #[error("workbook {} has no sheets", .path.display())]
    NoSheets { path: PathBuf },

    #[error("sheet '{sheet}' of {} is missing or empty: {reason}", .path.display())]
    Sheet {
        path: PathBuf,
        sheet: String,
        reason: String,
    },
}
