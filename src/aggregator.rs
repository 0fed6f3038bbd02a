// src/aggregator.rs
//
// Multi-video batch: an insertion-ordered registry of video descriptors, the
// per-video analysis loop with typed degraded outcomes, and the cross-video
// summary.

use crate::error::AnalysisError;
use crate::types::{
    AnalysisParams, AuxiliaryConfig, AuxiliaryData, CalibrationConfig, CalibrationData, Summary,
    SummaryRecord, VideoSeries, COL_BUBBLE_COUNT, COL_MEAN_AREA, COL_STD_DEV,
};
use crate::video_analysis::analyze_video;
use crate::video_processor::VideoReader;
use crate::workbook;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Key under which the batch scale is appended to every extracted
/// calibration-parameter table.
pub const SCALE_PARAMETER_KEY: &str = "scale[px/mm]";

/// One registered video and its optional attached workbook.
#[derive(Debug, Clone)]
pub struct VideoDescriptor {
    pub path: PathBuf,
    pub frame_count: u64,
    pub workbook: Option<PathBuf>,
}

/// Insertion-ordered collection of registered videos. Output ordering of the
/// batch mirrors registration order.
#[derive(Debug, Default)]
pub struct VideoRegistry {
    videos: Vec<VideoDescriptor>,
}

impl VideoRegistry {
    /// Register a video, probing it once for its frame count. Returns
    /// `Ok(None)` when the path is already registered.
    pub fn add_video(&mut self, path: &Path) -> Result<Option<u64>, AnalysisError> {
        if self.videos.iter().any(|v| v.path == path) {
            return Ok(None);
        }

        let mut reader = VideoReader::open(path)?;
        let frame_count = reader.frame_count;
        let _ = reader.release();

        self.videos.push(VideoDescriptor {
            path: path.to_path_buf(),
            frame_count,
            workbook: None,
        });
        Ok(Some(frame_count))
    }

    /// Remove a registered video. Returns whether it was present.
    pub fn remove_video(&mut self, path: &Path) -> bool {
        let before = self.videos.len();
        self.videos.retain(|v| v.path != path);
        self.videos.len() != before
    }

    /// Attach an external workbook to a registered video. Returns whether
    /// the video was present.
    pub fn attach_workbook(&mut self, path: &Path, workbook: PathBuf) -> bool {
        match self.videos.iter_mut().find(|v| v.path == path) {
            Some(video) => {
                video.workbook = Some(workbook);
                true
            }
            None => false,
        }
    }

    pub fn videos(&self) -> &[VideoDescriptor] {
        &self.videos
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }
}

/// Everything the batch produced for one video.
#[derive(Debug)]
pub struct VideoAnalysis {
    pub path: PathBuf,
    pub series: VideoSeries,
    pub auxiliary: AuxiliaryData,
    pub calibration: CalibrationData,
}

/// Batch result: analyzed videos in registration order, plus the videos that
/// had to be dropped and why.
#[derive(Debug)]
pub struct BatchOutcome {
    pub videos: Vec<VideoAnalysis>,
    pub skipped: Vec<(PathBuf, AnalysisError)>,
}

/// Analyze every registered video in order.
///
/// Invalid parameters and an empty registry fail fast before any video is
/// touched. A video that cannot be opened is dropped from the batch with a
/// diagnostic; auxiliary-merge and calibration-extraction failures degrade
/// per video without aborting anything.
pub fn analyze_all(
    registry: &VideoRegistry,
    params: &AnalysisParams,
    auxiliary: &AuxiliaryConfig,
    calibration: &CalibrationConfig,
) -> Result<BatchOutcome, AnalysisError> {
    params.validate()?;
    if registry.is_empty() {
        return Err(AnalysisError::InvalidParameter(
            "no videos registered".to_string(),
        ));
    }

    let mut outcome = BatchOutcome {
        videos: Vec::with_capacity(registry.len()),
        skipped: Vec::new(),
    };

    for descriptor in registry.videos() {
        info!(
            "Analyzing {} ({} frames)",
            descriptor.path.display(),
            descriptor.frame_count
        );

        let series = match analyze_video(&descriptor.path, params) {
            Ok(series) => series,
            Err(e) => {
                warn!("dropping {} from batch: {e}", descriptor.path.display());
                outcome.skipped.push((descriptor.path.clone(), e));
                continue;
            }
        };
        info!(
            "{}: {} sampled frame(s)",
            descriptor.path.display(),
            series.len()
        );

        let auxiliary_data = match &descriptor.workbook {
            Some(book) if !auxiliary.sheets.is_empty() => {
                match workbook::extract_auxiliary(book, &auxiliary.sheets, series.len()) {
                    Ok(columns) => AuxiliaryData::Merged(columns),
                    Err(e) => {
                        warn!("auxiliary merge degraded for {}: {e}", descriptor.path.display());
                        AuxiliaryData::Degraded(e)
                    }
                }
            }
            _ => AuxiliaryData::NotAttached,
        };

        let calibration_data = match &descriptor.workbook {
            Some(book) => match workbook::extract_calibration(book, calibration.sheet.as_deref()) {
                Ok(mut table) => {
                    table
                        .rows
                        .push((SCALE_PARAMETER_KEY.to_string(), params.scale.to_string()));
                    CalibrationData::Extracted(table)
                }
                Err(e) => {
                    warn!(
                        "calibration extraction degraded for {}: {e}",
                        descriptor.path.display()
                    );
                    CalibrationData::Degraded(e)
                }
            },
            None => CalibrationData::NotAttached,
        };

        outcome.videos.push(VideoAnalysis {
            path: descriptor.path.clone(),
            series,
            auxiliary: auxiliary_data,
            calibration: calibration_data,
        });
    }

    if outcome.videos.is_empty() {
        return Err(AnalysisError::NoUsableSeries);
    }
    Ok(outcome)
}

/// Build the cross-video summary: for every frame index sampled by any
/// video, the arithmetic mean of each column over the videos that have a
/// value there. Frame indices present in a single video are kept (mean over
/// the singleton). Records come out in ascending frame-index order.
pub fn generate_summary(videos: &[VideoAnalysis]) -> Summary {
    let mut columns: Vec<String> = vec![
        COL_BUBBLE_COUNT.to_string(),
        COL_MEAN_AREA.to_string(),
        COL_STD_DEV.to_string(),
    ];
    for video in videos {
        for column in video.auxiliary.columns() {
            if !columns.contains(&column.name) {
                columns.push(column.name.clone());
            }
        }
    }

    // frame index -> per-column (sum, count)
    let mut grouped: BTreeMap<u64, Vec<(f64, u32)>> = BTreeMap::new();

    for video in videos {
        let aux = video.auxiliary.columns();
        for (row, measurement) in video.series.measurements.iter().enumerate() {
            let slots = grouped
                .entry(measurement.frame_index)
                .or_insert_with(|| vec![(0.0, 0); columns.len()]);

            let defaults = [
                measurement.bubble_count as f64,
                measurement.mean_area,
                measurement.area_std_dev,
            ];
            for (slot, value) in slots.iter_mut().zip(defaults) {
                slot.0 += value;
                slot.1 += 1;
            }

            for column in aux {
                let Some(index) = columns.iter().position(|c| c == &column.name) else {
                    continue;
                };
                if let Some(Some(value)) = column.values.get(row) {
                    slots[index].0 += value;
                    slots[index].1 += 1;
                }
            }
        }
    }

    let records = grouped
        .into_iter()
        .map(|(frame_index, slots)| SummaryRecord {
            frame_index,
            values: slots
                .into_iter()
                .map(|(sum, count)| (count > 0).then(|| sum / count as f64))
                .collect(),
        })
        .collect();

    Summary { columns, records }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuxiliaryColumn, FrameMeasurement, SheetSelection};
    use opencv::{
        core::{self, Mat},
        prelude::*,
        videoio::VideoWriter,
    };
    use rust_xlsxwriter::Workbook;

    fn measurement(frame_index: u64, bubble_count: usize, mean_area: f64) -> FrameMeasurement {
        FrameMeasurement {
            frame_index,
            bubble_count,
            mean_area,
            area_std_dev: 0.0,
        }
    }

    fn analysis(measurements: Vec<FrameMeasurement>) -> VideoAnalysis {
        VideoAnalysis {
            path: PathBuf::from("test.avi"),
            series: VideoSeries { measurements },
            auxiliary: AuxiliaryData::NotAttached,
            calibration: CalibrationData::NotAttached,
        }
    }

    fn write_black_video(dir: &Path, name: &str, frames: usize) -> PathBuf {
        let path = dir.join(name);
        let fourcc = VideoWriter::fourcc('M', 'J', 'P', 'G').unwrap();
        let mut writer = VideoWriter::new(
            path.to_str().unwrap(),
            fourcc,
            10.0,
            core::Size::new(320, 240),
            true,
        )
        .unwrap();
        assert!(writer.is_opened().unwrap(), "MJPG writer unavailable");
        let frame =
            Mat::new_rows_cols_with_default(240, 320, core::CV_8UC3, core::Scalar::all(0.0))
                .unwrap();
        for _ in 0..frames {
            writer.write(&frame).unwrap();
        }
        writer.release().unwrap();
        path
    }

    fn write_heights_workbook(dir: &Path, rows: usize) -> PathBuf {
        let path = dir.join("mesures.xlsx");
        let mut book = Workbook::new();
        let sheet = book.add_worksheet();
        sheet.set_name("Mesures").unwrap();
        sheet.write_string(0, 0, "hauteur[mm]").unwrap();
        for row in 0..rows as u32 {
            sheet.write_number(row + 1, 0, 100.0 + row as f64).unwrap();
        }
        let params = book.add_worksheet();
        params.set_name("Parametres").unwrap();
        params.write_string(0, 0, "parametre").unwrap();
        params.write_string(0, 1, "valeur").unwrap();
        params.write_string(1, 0, "debit[L/min]").unwrap();
        params.write_number(1, 1, 2.5).unwrap();
        book.save(&path).unwrap();
        path
    }

    #[test]
    fn test_summary_averages_matching_frame_indices() {
        let videos = vec![
            analysis(vec![measurement(3, 2, 10.0)]),
            analysis(vec![measurement(3, 4, 30.0)]),
        ];
        let summary = generate_summary(&videos);

        assert_eq!(summary.value(3, COL_BUBBLE_COUNT), Some(3.0));
        assert_eq!(summary.value(3, COL_MEAN_AREA), Some(20.0));
    }

    #[test]
    fn test_summary_singleton_frame_keeps_exact_values() {
        let videos = vec![
            analysis(vec![measurement(1, 5, 12.5)]),
            analysis(vec![measurement(2, 9, 1.25)]),
        ];
        let summary = generate_summary(&videos);

        assert_eq!(summary.value(1, COL_BUBBLE_COUNT), Some(5.0));
        assert_eq!(summary.value(1, COL_MEAN_AREA), Some(12.5));
        assert_eq!(summary.value(2, COL_BUBBLE_COUNT), Some(9.0));
        assert_eq!(summary.value(2, COL_MEAN_AREA), Some(1.25));
    }

    #[test]
    fn test_summary_records_ascend_by_frame_index() {
        let videos = vec![
            analysis(vec![measurement(8, 1, 1.0), measurement(9, 1, 1.0)]),
            analysis(vec![measurement(2, 1, 1.0)]),
        ];
        let summary = generate_summary(&videos);

        let indices: Vec<u64> = summary.records.iter().map(|r| r.frame_index).collect();
        assert_eq!(indices, vec![2, 8, 9]);
    }

    #[test]
    fn test_summary_includes_auxiliary_columns() {
        let mut with_aux = analysis(vec![measurement(1, 1, 1.0), measurement(2, 1, 1.0)]);
        with_aux.auxiliary = AuxiliaryData::Merged(vec![AuxiliaryColumn {
            name: "hauteur[mm]".to_string(),
            values: vec![Some(50.0)],
        }]);
        let without_aux = analysis(vec![measurement(1, 3, 3.0)]);

        let summary = generate_summary(&[with_aux, without_aux]);

        assert!(summary.columns.contains(&"hauteur[mm]".to_string()));
        // frame 1: only the first video carries the column
        assert_eq!(summary.value(1, "hauteur[mm]"), Some(50.0));
        // frame 2: the auxiliary table ran out of rows
        assert_eq!(summary.value(2, "hauteur[mm]"), None);
        // defaults still average across both videos
        assert_eq!(summary.value(1, COL_BUBBLE_COUNT), Some(2.0));
    }

    #[test]
    fn test_registry_preserves_order_and_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_black_video(dir.path(), "a.avi", 4);
        let second = write_black_video(dir.path(), "b.avi", 4);

        let mut registry = VideoRegistry::default();
        assert_eq!(registry.add_video(&first).unwrap(), Some(4));
        assert_eq!(registry.add_video(&second).unwrap(), Some(4));
        assert_eq!(registry.add_video(&first).unwrap(), None);

        let paths: Vec<&Path> = registry.videos().iter().map(|v| v.path.as_path()).collect();
        assert_eq!(paths, vec![first.as_path(), second.as_path()]);

        assert!(registry.attach_workbook(&first, PathBuf::from("x.xlsx")));
        assert!(!registry.attach_workbook(Path::new("ghost.avi"), PathBuf::from("x.xlsx")));

        assert!(registry.remove_video(&second));
        assert!(!registry.remove_video(&second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_analyze_all_rejects_empty_registry() {
        let registry = VideoRegistry::default();
        let err = analyze_all(
            &registry,
            &AnalysisParams::default(),
            &AuxiliaryConfig::default(),
            &CalibrationConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidParameter(_)));
    }

    #[test]
    fn test_analyze_all_fails_fast_on_invalid_step() {
        let dir = tempfile::tempdir().unwrap();
        let video = write_black_video(dir.path(), "a.avi", 4);
        let mut registry = VideoRegistry::default();
        registry.add_video(&video).unwrap();

        let params = AnalysisParams {
            step: 0,
            ..Default::default()
        };
        let err = analyze_all(
            &registry,
            &params,
            &AuxiliaryConfig::default(),
            &CalibrationConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidParameter(_)));
    }

    #[test]
    fn test_analyze_all_drops_unopenable_video_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let vanishing = write_black_video(dir.path(), "gone.avi", 4);
        let stable = write_black_video(dir.path(), "stays.avi", 4);

        let mut registry = VideoRegistry::default();
        registry.add_video(&vanishing).unwrap();
        registry.add_video(&stable).unwrap();
        std::fs::remove_file(&vanishing).unwrap();

        let outcome = analyze_all(
            &registry,
            &AnalysisParams::default(),
            &AuxiliaryConfig::default(),
            &CalibrationConfig::default(),
        )
        .unwrap();

        assert_eq!(outcome.videos.len(), 1);
        assert_eq!(outcome.videos[0].path, stable);
        assert_eq!(outcome.skipped.len(), 1);
        assert!(matches!(
            outcome.skipped[0].1,
            AnalysisError::VideoOpen { .. }
        ));
    }

    #[test]
    fn test_analyze_all_with_no_usable_video_is_batch_error() {
        let dir = tempfile::tempdir().unwrap();
        let vanishing = write_black_video(dir.path(), "gone.avi", 4);

        let mut registry = VideoRegistry::default();
        registry.add_video(&vanishing).unwrap();
        std::fs::remove_file(&vanishing).unwrap();

        let err = analyze_all(
            &registry,
            &AnalysisParams::default(),
            &AuxiliaryConfig::default(),
            &CalibrationConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::NoUsableSeries));
    }

    #[test]
    fn test_analyze_all_merges_attached_workbook() {
        let dir = tempfile::tempdir().unwrap();
        // 10 frames at step 1 / agitation 0 sample indices 1..=9
        let video = write_black_video(dir.path(), "a.avi", 10);
        let book = write_heights_workbook(dir.path(), 4);

        let mut registry = VideoRegistry::default();
        registry.add_video(&video).unwrap();
        registry.attach_workbook(&video, book);

        let auxiliary = AuxiliaryConfig {
            sheets: vec![SheetSelection {
                sheet: "Mesures".to_string(),
                columns: vec!["hauteur[mm]".to_string()],
            }],
        };
        let outcome = analyze_all(
            &registry,
            &AnalysisParams::default(),
            &auxiliary,
            &CalibrationConfig::default(),
        )
        .unwrap();

        let video_result = &outcome.videos[0];
        assert_eq!(video_result.series.len(), 9);

        // 4 workbook rows against 9 sampled frames: min truncation
        let columns = video_result.auxiliary.columns();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].values.len(), 4);
        assert_eq!(columns[0].values[0], Some(100.0));

        // parameter table picked up from the last sheet, scale appended
        match &video_result.calibration {
            CalibrationData::Extracted(table) => {
                assert_eq!(
                    table.rows.last().unwrap(),
                    &(SCALE_PARAMETER_KEY.to_string(), "1".to_string())
                );
                assert!(table
                    .rows
                    .iter()
                    .any(|(k, v)| k == "debit[L/min]" && v == "2.5"));
            }
            other => panic!("expected extracted calibration, got {other:?}"),
        }
    }

    #[test]
    fn test_analyze_all_degrades_on_missing_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let video = write_black_video(dir.path(), "a.avi", 4);

        let mut registry = VideoRegistry::default();
        registry.add_video(&video).unwrap();
        registry.attach_workbook(&video, dir.path().join("missing.xlsx"));

        let auxiliary = AuxiliaryConfig {
            sheets: vec![SheetSelection {
                sheet: "Mesures".to_string(),
                columns: vec!["hauteur[mm]".to_string()],
            }],
        };
        let outcome = analyze_all(
            &registry,
            &AnalysisParams::default(),
            &auxiliary,
            &CalibrationConfig::default(),
        )
        .unwrap();

        let video_result = &outcome.videos[0];
        assert!(matches!(video_result.auxiliary, AuxiliaryData::Degraded(_)));
        assert!(matches!(
            video_result.calibration,
            CalibrationData::Degraded(_)
        ));
        // the degraded merge never aborts the batch
        assert!(outcome.skipped.is_empty());
    }
}
