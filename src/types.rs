// src/types.rs

use crate::error::{AnalysisError, AuxiliaryMergeError, CalibrationExtractError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// Report column names, kept identical across per-video tables and the summary
// so that cross-video averaging groups them correctly.
pub const COL_FRAME: &str = "frame";
pub const COL_BUBBLE_COUNT: &str = "nb_bulles";
pub const COL_MEAN_AREA: &str = "surface_moyenne[mm²]";
pub const COL_STD_DEV: &str = "ecart_type[mm²]";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub video: VideoConfig,
    pub analysis: AnalysisParams,
    #[serde(default)]
    pub auxiliary: AuxiliaryConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    pub report: ReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    #[serde(default)]
    pub inputs: Vec<VideoInput>,
    #[serde(default)]
    pub input_dir: Option<PathBuf>,
    #[serde(default)]
    pub frame_dump_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInput {
    pub path: PathBuf,
    #[serde(default)]
    pub workbook: Option<PathBuf>,
}

/// Batch analysis parameters supplied by the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnalysisParams {
    /// Sampling interval in frames; 1 analyzes every frame.
    pub step: u64,
    /// Calibration factor in pixels per physical-length-unit.
    pub scale: f64,
    /// Number of leading frames excluded while transient turbulence settles.
    pub agitation: u64,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            step: 1,
            scale: 1.0,
            agitation: 0,
        }
    }
}

impl AnalysisParams {
    /// Reject caller-supplied invalid arguments before any video is touched.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.step == 0 {
            return Err(AnalysisError::InvalidParameter(
                "step must be a positive integer".to_string(),
            ));
        }
        if !self.scale.is_finite() {
            return Err(AnalysisError::InvalidParameter(format!(
                "scale must be a finite number, got {}",
                self.scale
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuxiliaryConfig {
    #[serde(default)]
    pub sheets: Vec<SheetSelection>,
}

/// One sheet of an attached workbook and the columns to pull from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetSelection {
    pub sheet: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Sheet holding the (key, value) parameter table; the workbook's last
    /// sheet when unset.
    #[serde(default)]
    pub sheet: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// One sampled frame's result. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameMeasurement {
    pub frame_index: u64,
    pub bubble_count: usize,
    /// Average blob area in physical units; 0 when no blobs were detected.
    pub mean_area: f64,
    /// Population standard deviation of blob areas; 0 when no blobs.
    pub area_std_dev: f64,
}

/// Ordered per-video measurement sequence, strictly increasing frame index.
#[derive(Debug, Clone, Default)]
pub struct VideoSeries {
    pub measurements: Vec<FrameMeasurement>,
}

impl VideoSeries {
    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn frame_indices(&self) -> Vec<u64> {
        self.measurements.iter().map(|m| m.frame_index).collect()
    }
}

/// Extra per-frame column merged from an attached workbook. Values are
/// row-aligned to the sampled frames by position; a `None` entry is a cell
/// that was empty or non-numeric.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxiliaryColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Per-video auxiliary merge outcome. A degraded merge keeps its cause so the
/// caller (and tests) can see why the columns are absent.
#[derive(Debug)]
pub enum AuxiliaryData {
    NotAttached,
    Merged(Vec<AuxiliaryColumn>),
    Degraded(AuxiliaryMergeError),
}

impl AuxiliaryData {
    pub fn columns(&self) -> &[AuxiliaryColumn] {
        match self {
            AuxiliaryData::Merged(columns) => columns,
            _ => &[],
        }
    }
}

/// Opaque two-column (key, value) parameter table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyValueTable {
    pub rows: Vec<(String, String)>,
}

/// Per-video calibration-parameter extraction outcome.
#[derive(Debug)]
pub enum CalibrationData {
    NotAttached,
    Extracted(KeyValueTable),
    Degraded(CalibrationExtractError),
}

/// One row of the cross-video summary: the mean of every column present at
/// this frame index, aligned to `Summary::columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    pub frame_index: u64,
    pub values: Vec<Option<f64>>,
}

/// Cross-video summary table, ascending frame index.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub columns: Vec<String>,
    pub records: Vec<SummaryRecord>,
}

impl Summary {
    /// Look up one averaged value by frame index and column name.
    pub fn value(&self, frame_index: u64, column: &str) -> Option<f64> {
        let col = self.columns.iter().position(|c| c == column)?;
        let record = self.records.iter().find(|r| r.frame_index == frame_index)?;
        record.values.get(col).copied().flatten()
    }
}

/// Chart the report sink is asked to draw from the summary table.
#[derive(Debug, Clone)]
pub struct ChartDirective {
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    /// Zero-based summary column plotted as the series.
    pub value_column: u16,
    /// Zero-based summary column used as categories.
    pub category_column: u16,
}

impl Default for ChartDirective {
    fn default() -> Self {
        Self {
            title: "Evolution du nombre de bulles".to_string(),
            x_title: "Image".to_string(),
            y_title: "Nombre de bulles".to_string(),
            value_column: 1,
            category_column: 0,
        }
    }
}
