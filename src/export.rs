// src/export.rs
//
// Report assembly and the spreadsheet sink. The core's obligation is the
// table shapes; the sink turns them into one workbook with a trend chart on
// the summary sheet.

use crate::aggregator::{BatchOutcome, VideoAnalysis};
use crate::types::{ChartDirective, KeyValueTable, Summary, COL_BUBBLE_COUNT, COL_FRAME,
    COL_MEAN_AREA, COL_STD_DEV};
use anyhow::{Context, Result};
use rust_xlsxwriter::{Chart, ChartLine, ChartType, Workbook, Worksheet};
use std::path::Path;
use tracing::info;

pub const SUMMARY_SHEET: &str = "Résumé";

/// Numeric table with named columns; `None` cells stay empty in the sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<f64>>>,
}

/// One video's contribution to the report.
#[derive(Debug)]
pub struct VideoReport {
    pub label: String,
    pub table: NumericTable,
    pub parameters: Option<KeyValueTable>,
}

/// The full report package handed to the sink.
#[derive(Debug)]
pub struct AnalysisReport {
    pub summary: NumericTable,
    pub videos: Vec<VideoReport>,
    pub chart: ChartDirective,
}

/// Per-video table: frame index, the three measurement columns, then any
/// merged auxiliary columns. Auxiliary cells past the truncated row count
/// stay empty.
pub fn video_table(analysis: &VideoAnalysis) -> NumericTable {
    let aux = analysis.auxiliary.columns();

    let mut columns = vec![
        COL_FRAME.to_string(),
        COL_BUBBLE_COUNT.to_string(),
        COL_MEAN_AREA.to_string(),
        COL_STD_DEV.to_string(),
    ];
    columns.extend(aux.iter().map(|c| c.name.clone()));

    let rows = analysis
        .series
        .measurements
        .iter()
        .enumerate()
        .map(|(row, m)| {
            let mut cells = vec![
                Some(m.frame_index as f64),
                Some(m.bubble_count as f64),
                Some(m.mean_area),
                Some(m.area_std_dev),
            ];
            cells.extend(aux.iter().map(|c| c.values.get(row).copied().flatten()));
            cells
        })
        .collect();

    NumericTable { columns, rows }
}

/// Summary table: frame index first, then the summary's averaged columns.
pub fn summary_table(summary: &Summary) -> NumericTable {
    let mut columns = vec![COL_FRAME.to_string()];
    columns.extend(summary.columns.iter().cloned());

    let rows = summary
        .records
        .iter()
        .map(|record| {
            let mut cells = vec![Some(record.frame_index as f64)];
            cells.extend(record.values.iter().copied());
            cells
        })
        .collect();

    NumericTable { columns, rows }
}

/// Assemble the report package from a batch outcome. Video labels follow
/// registration order: `video1`, `video2`, ...
pub fn build_report(outcome: &BatchOutcome, summary: &Summary) -> AnalysisReport {
    let videos = outcome
        .videos
        .iter()
        .enumerate()
        .map(|(i, analysis)| VideoReport {
            label: format!("video{}", i + 1),
            table: video_table(analysis),
            parameters: match &analysis.calibration {
                crate::types::CalibrationData::Extracted(table) => Some(table.clone()),
                _ => None,
            },
        })
        .collect();

    AnalysisReport {
        summary: summary_table(summary),
        videos,
        chart: ChartDirective::default(),
    }
}

fn write_numeric_table(sheet: &mut Worksheet, table: &NumericTable) -> Result<()> {
    for (col, name) in table.columns.iter().enumerate() {
        sheet.write_string(0, col as u16, name.as_str())?;
    }
    for (row, cells) in table.rows.iter().enumerate() {
        for (col, cell) in cells.iter().enumerate() {
            if let Some(value) = cell {
                sheet.write_number(row as u32 + 1, col as u16, *value)?;
            }
        }
    }
    Ok(())
}

fn write_parameter_table(sheet: &mut Worksheet, table: &KeyValueTable) -> Result<()> {
    sheet.write_string(0, 0, "Configuration")?;
    sheet.write_string(0, 1, "Value")?;
    for (row, (key, value)) in table.rows.iter().enumerate() {
        sheet.write_string(row as u32 + 1, 0, key.as_str())?;
        sheet.write_string(row as u32 + 1, 1, value.as_str())?;
    }
    Ok(())
}

fn summary_chart(directive: &ChartDirective, row_count: usize) -> Chart {
    let last_row = row_count as u32;
    let mut chart = Chart::new(ChartType::Line);

    chart
        .add_series()
        .set_values((SUMMARY_SHEET, 1, directive.value_column, last_row, directive.value_column))
        .set_categories((
            SUMMARY_SHEET,
            1,
            directive.category_column,
            last_row,
            directive.category_column,
        ))
        .set_smooth(true)
        .set_format(ChartLine::new().set_color("#4472C4"));

    chart.title().set_name(directive.title.as_str());
    chart.x_axis().set_name(directive.x_title.as_str());
    chart.y_axis().set_name(directive.y_title.as_str());
    chart.legend().set_hidden();

    chart
}

/// Persist the report: summary sheet first with its chart, then one sheet
/// per video and one per extracted parameter table.
pub fn write_report(report: &AnalysisReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name(SUMMARY_SHEET)?;
    write_numeric_table(sheet, &report.summary)?;
    if !report.summary.rows.is_empty() {
        let chart = summary_chart(&report.chart, report.summary.rows.len());
        sheet.insert_chart(1, 6, &chart)?;
    }

    for video in &report.videos {
        let sheet = workbook.add_worksheet();
        sheet.set_name(video.label.as_str())?;
        write_numeric_table(sheet, &video.table)?;

        if let Some(parameters) = &video.parameters {
            let sheet = workbook.add_worksheet();
            sheet.set_name(format!("{}_param", video.label))?;
            write_parameter_table(sheet, parameters)?;
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("writing report {}", path.display()))?;
    info!("Report written to {}", path.display());
    Ok(())
}
