use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{CellValue, RawRow};

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No reader exists for this kind of file.
    #[error("no spreadsheet reader available for {name} (extension '{extension}')")]
    Unavailable { name: String, extension: String },

    #[error("{name} contains no sheets")]
    NoSheets { name: String },

    #[error("{name} is not a readable workbook: {source}")]
    InvalidWorkbook {
        name: String,
        #[source]
        source: calamine::Error,
    },

    #[error("failed to load sheet '{sheet}' from {name}: {source}")]
    SheetLoad {
        name: String,
        sheet: String,
        #[source]
        source: calamine::Error,
    },

    #[error("failed to parse CSV {name}: {source}")]
    Csv {
        name: String,
        #[source]
        source: csv::Error,
    },
}

/// Reads a spreadsheet file and returns the rows of its first sheet.
pub async fn read_input(path: &Path) -> Result<Vec<RawRow>, IngestError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path.display().to_string();
    let rows = parse_rows(&name, bytes)?;
    info!(file = %name, rows = rows.len(), "loaded spreadsheet");
    Ok(rows)
}

/// Parses file bytes into rows, picking the reader from the file name.
pub fn parse_rows(name: &str, bytes: Vec<u8>) -> Result<Vec<RawRow>, IngestError> {
    let extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if extension == "csv" {
        parse_csv(name, &bytes)
    } else if WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
        parse_workbook(name, bytes)
    } else {
        Err(IngestError::Unavailable {
            name: name.to_string(),
            extension,
        })
    }
}

fn parse_workbook(name: &str, bytes: Vec<u8>) -> Result<Vec<RawRow>, IngestError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|source| {
        IngestError::InvalidWorkbook {
            name: name.to_string(),
            source,
        }
    })?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| IngestError::NoSheets {
            name: name.to_string(),
        })?;

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|source| IngestError::SheetLoad {
            name: name.to_string(),
            sheet: sheet.clone(),
            source,
        })?;

    let mut lines = range.rows();
    let Some(header_cells) = lines.next() else {
        debug!(file = %name, sheet = %sheet, "first sheet is empty");
        return Ok(Vec::new());
    };
    let headers = unique_headers(header_cells.iter().map(|cell| cell_value(cell).to_text()));

    Ok(lines
        .map(|cells| build_row(&headers, cells.iter().map(cell_value)))
        .filter(|row| !row.values().all(CellValue::is_blank))
        .collect())
}

fn parse_csv(name: &str, bytes: &[u8]) -> Result<Vec<RawRow>, IngestError> {
    let csv_error = |source| IngestError::Csv {
        name: name.to_string(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);

    let headers = unique_headers(reader.headers().map_err(csv_error)?.iter().map(str::to_string));

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let row = build_row(
            &headers,
            record.iter().map(|value| {
                if value.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::from(value)
                }
            }),
        );
        if !row.values().all(CellValue::is_blank) {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Names blank headers `__EMPTY`, `__EMPTY_1`, ... and suffixes repeats
/// with `_1`, `_2`, ... so every column keeps its own key.
fn unique_headers(raw: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.map(|header| {
        let base = if header.trim().is_empty() {
            "__EMPTY".to_string()
        } else {
            header
        };
        let mut candidate = base.clone();
        let mut suffix = 0;
        while !seen.insert(candidate.clone()) {
            suffix += 1;
            candidate = format!("{base}_{suffix}");
        }
        candidate
    })
    .collect()
}

/// Every header gets a value; missing trailing cells are empty.
fn build_row(headers: &[String], cells: impl Iterator<Item = CellValue>) -> RawRow {
    let mut cells = cells;
    headers
        .iter()
        .map(|header| (header.clone(), cells.next().unwrap_or_default()))
        .collect()
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn workbook_bytes() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Email").unwrap();
        sheet.write_string(0, 1, "Date").unwrap();
        sheet.write_string(0, 3, "Lesson").unwrap();
        sheet.write_string(0, 4, "Lesson").unwrap();
        sheet.write_string(1, 0, "a@x.com").unwrap();
        sheet.write_number(1, 1, 45292.0).unwrap();
        sheet.write_string(1, 2, "Completed").unwrap();
        sheet.write_string(1, 3, "Not Completed").unwrap();
        sheet.write_string(3, 0, "b@x.com").unwrap();
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn reads_first_sheet_of_workbook() {
        let rows = parse_rows("export.xlsx", workbook_bytes()).unwrap();
        assert_eq!(rows.len(), 2, "blank row 3 is skipped");

        let first = &rows[0];
        let keys: Vec<&str> = first.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Email", "Date", "__EMPTY", "Lesson", "Lesson_1"]);
        assert_eq!(first["Email"], CellValue::from("a@x.com"));
        assert_eq!(first["Date"], CellValue::Number(45292.0));
        assert_eq!(first["__EMPTY"], CellValue::from("Completed"));
        assert_eq!(first["Lesson_1"], CellValue::Empty);

        assert_eq!(rows[1]["Email"], CellValue::from("b@x.com"));
        assert_eq!(rows[1]["Date"], CellValue::Empty);
    }

    #[test]
    fn reads_csv_with_missing_cells() {
        let csv = "Email,Lesson 1,Lesson 2\na@x.com,Completed\n,,\nb@x.com,,Not Completed\n";
        let rows = parse_rows("lms.CSV", csv.as_bytes().to_vec()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Lesson 2"], CellValue::Empty);
        assert_eq!(rows[1]["Lesson 2"], CellValue::from("Not Completed"));
    }

    #[test]
    fn unknown_extension_is_unavailable() {
        let err = parse_rows("notes.txt", b"hello".to_vec()).unwrap_err();
        assert!(matches!(err, IngestError::Unavailable { ref extension, .. } if extension == "txt"));
    }

    #[test]
    fn garbage_workbook_is_rejected() {
        let err = parse_rows("broken.xlsx", b"not a zip archive".to_vec()).unwrap_err();
        assert!(matches!(err, IngestError::InvalidWorkbook { .. }));
    }

    #[test]
    fn header_names_stay_unique() {
        let headers = unique_headers(
            ["Name", "", "Name", " ", "Name"]
                .into_iter()
                .map(str::to_string),
        );
        assert_eq!(headers, vec!["Name", "__EMPTY", "Name_1", "__EMPTY_1", "Name_2"]);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let err = read_input(Path::new("/nonexistent/lms.xlsx")).await.unwrap_err();
        assert!(matches!(err, IngestError::Io { .. }));
    }
}
