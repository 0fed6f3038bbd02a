// src/workbook.rs
//
// Workbook input: auxiliary per-frame columns and calibration parameter
// tables from spreadsheets attached to individual videos. Extracted columns
// are row-aligned to the sampled frames by position; there is no explicit
// frame-index join key in the workbooks.

use crate::error::{AuxiliaryMergeError, CalibrationExtractError};
use crate::types::{AuxiliaryColumn, KeyValueTable, SheetSelection};
use calamine::{open_workbook_auto, Data, DataType, Reader};
use std::path::Path;
use tracing::warn;

fn cell_text(cell: Option<&Data>) -> String {
    match cell {
        None | Some(Data::Empty) => String::new(),
        Some(data) => data.to_string(),
    }
}

/// Extract the configured auxiliary columns for one video.
///
/// The k-th data row of a sheet belongs to the k-th sampled frame; each
/// column is truncated to `min(available_rows, sampled_count)` rows. A
/// missing sheet or column is skipped with a diagnostic; the extraction only
/// fails when nothing at all could be pulled out.
pub fn extract_auxiliary(
    path: &Path,
    selection: &[SheetSelection],
    sampled_count: usize,
) -> Result<Vec<AuxiliaryColumn>, AuxiliaryMergeError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| AuxiliaryMergeError::Workbook {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let sheet_names = workbook.sheet_names();

    let mut columns = Vec::new();
    for wanted in selection {
        if !sheet_names.contains(&wanted.sheet) {
            warn!(
                "sheet '{}' not found in {}, skipping",
                wanted.sheet,
                path.display()
            );
            continue;
        }

        let range = match workbook.worksheet_range(&wanted.sheet) {
            Ok(range) => range,
            Err(e) => {
                warn!(
                    "cannot read sheet '{}' of {}: {e}",
                    wanted.sheet,
                    path.display()
                );
                continue;
            }
        };

        let mut rows = range.rows();
        let Some(header) = rows.next() else {
            warn!("sheet '{}' of {} is empty", wanted.sheet, path.display());
            continue;
        };
        let header: Vec<String> = header.iter().map(|c| cell_text(Some(c))).collect();
        let data_rows: Vec<&[Data]> = rows.collect();

        for name in &wanted.columns {
            let Some(col) = header.iter().position(|h| h == name) else {
                warn!(
                    "column '{name}' not found in sheet '{}' of {}",
                    wanted.sheet,
                    path.display()
                );
                continue;
            };

            let values: Vec<Option<f64>> = data_rows
                .iter()
                .take(sampled_count)
                .map(|row| row.get(col).and_then(|c| c.as_f64()))
                .collect();
            columns.push(AuxiliaryColumn {
                name: name.clone(),
                values,
            });
        }
    }

    if columns.is_empty() {
        return Err(AuxiliaryMergeError::NoColumnsExtracted {
            path: path.to_path_buf(),
        });
    }
    Ok(columns)
}

/// Read the designated calibration sheet (the last sheet when unset) as an
/// opaque (key, value) table. The sheet's own header row is discarded; the
/// report names the columns `Configuration` / `Value`.
pub fn extract_calibration(
    path: &Path,
    designated: Option<&str>,
) -> Result<KeyValueTable, CalibrationExtractError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| CalibrationExtractError::Workbook {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let sheet_names = workbook.sheet_names();

    let sheet = match designated {
        Some(name) => name.to_string(),
        None => sheet_names
            .last()
            .cloned()
            .ok_or_else(|| CalibrationExtractError::NoSheets {
                path: path.to_path_buf(),
            })?,
    };

    let sheet_err = |reason: String| CalibrationExtractError::Sheet {
        path: path.to_path_buf(),
        sheet: sheet.clone(),
        reason,
    };

    if !sheet_names.contains(&sheet) {
        return Err(sheet_err("not present in workbook".to_string()));
    }

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| sheet_err(e.to_string()))?;

    let mut rows = range.rows();
    if rows.next().is_none() {
        return Err(sheet_err("sheet is empty".to_string()));
    }

    let mut table = KeyValueTable::default();
    for row in rows {
        let key = cell_text(row.first());
        let value = cell_text(row.get(1));
        if key.is_empty() && value.is_empty() {
            continue;
        }
        table.rows.push((key, value));
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;
    use std::path::PathBuf;

    fn selection(sheet: &str, columns: &[&str]) -> Vec<SheetSelection> {
        vec![SheetSelection {
            sheet: sheet.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }]
    }

    /// Workbook with a measurement sheet (numeric + text columns, 5 data
    /// rows) followed by a parameter sheet.
    fn write_fixture(dir: &Path) -> PathBuf {
        let path = dir.join("fixture.xlsx");
        let mut workbook = Workbook::new();

        let sheet = workbook.add_worksheet();
        sheet.set_name("Mesures").unwrap();
        sheet.write_string(0, 0, "hauteur[mm]").unwrap();
        sheet.write_string(0, 1, "commentaire").unwrap();
        for row in 0..5u32 {
            sheet.write_number(row + 1, 0, 10.0 + row as f64).unwrap();
            sheet.write_string(row + 1, 1, "ok").unwrap();
        }

        let params = workbook.add_worksheet();
        params.set_name("Parametres").unwrap();
        params.write_string(0, 0, "parametre").unwrap();
        params.write_string(0, 1, "valeur").unwrap();
        params.write_string(1, 0, "debit[L/min]").unwrap();
        params.write_number(1, 1, 2.5).unwrap();
        params.write_string(2, 0, "operateur").unwrap();
        params.write_string(2, 1, "MG").unwrap();

        workbook.save(&path).unwrap();
        path
    }

    #[test]
    fn test_auxiliary_truncates_to_row_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());

        // 9 sampled frames but only 5 data rows: min(5, 9) entries
        let columns =
            extract_auxiliary(&path, &selection("Mesures", &["hauteur[mm]"]), 9).unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "hauteur[mm]");
        assert_eq!(columns[0].values.len(), 5);
        assert_eq!(columns[0].values[0], Some(10.0));
        assert_eq!(columns[0].values[4], Some(14.0));
    }

    #[test]
    fn test_auxiliary_truncates_to_sampled_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());

        // 3 sampled frames against 5 data rows: min(5, 3) entries
        let columns =
            extract_auxiliary(&path, &selection("Mesures", &["hauteur[mm]"]), 3).unwrap();
        assert_eq!(columns[0].values, vec![Some(10.0), Some(11.0), Some(12.0)]);
    }

    #[test]
    fn test_auxiliary_non_numeric_cells_are_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());

        let columns =
            extract_auxiliary(&path, &selection("Mesures", &["commentaire"]), 5).unwrap();
        assert_eq!(columns[0].values, vec![None; 5]);
    }

    #[test]
    fn test_auxiliary_missing_column_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());

        let columns = extract_auxiliary(
            &path,
            &selection("Mesures", &["absente", "hauteur[mm]"]),
            5,
        )
        .unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "hauteur[mm]");
    }

    #[test]
    fn test_auxiliary_nothing_extracted_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());

        let err = extract_auxiliary(&path, &selection("Inconnue", &["x"]), 5).unwrap_err();
        assert!(matches!(
            err,
            AuxiliaryMergeError::NoColumnsExtracted { .. }
        ));
    }

    #[test]
    fn test_auxiliary_unreadable_workbook_is_error() {
        let err =
            extract_auxiliary(Path::new("/nonexistent.xlsx"), &selection("S", &["c"]), 5)
                .unwrap_err();
        assert!(matches!(err, AuxiliaryMergeError::Workbook { .. }));
    }

    #[test]
    fn test_calibration_defaults_to_last_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());

        let table = extract_calibration(&path, None).unwrap();
        assert_eq!(
            table.rows,
            vec![
                ("debit[L/min]".to_string(), "2.5".to_string()),
                ("operateur".to_string(), "MG".to_string()),
            ]
        );
    }

    #[test]
    fn test_calibration_designated_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());

        // the measurement sheet read as a parameter table: header dropped,
        // first two columns kept verbatim
        let table = extract_calibration(&path, Some("Mesures")).unwrap();
        assert_eq!(table.rows.len(), 5);
        assert_eq!(table.rows[0], ("10".to_string(), "ok".to_string()));
    }

    #[test]
    fn test_calibration_missing_sheet_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());

        let err = extract_calibration(&path, Some("Inconnue")).unwrap_err();
        assert!(matches!(err, CalibrationExtractError::Sheet { .. }));
    }

    #[test]
    fn test_calibration_unreadable_workbook_is_error() {
        let err = extract_calibration(Path::new("/nonexistent.xlsx"), None).unwrap_err();
        assert!(matches!(err, CalibrationExtractError::Workbook { .. }));
    }
}
