use indexmap::IndexSet;

use crate::models::RawRow;
use crate::normalize::normalize_cell;

/// Normalized values that mark a lesson as done.
const COMPLETED_VALUES: &[&str] = &["completed (achieved pass grade)", "completed"];

/// Every status phrase an LMS lesson column can hold.
const STATUS_VALUES: &[&str] = &["completed (achieved pass grade)", "completed", "not completed"];

/// Columns that hold a lesson status in at least one row, in order of
/// first appearance.
pub fn infer_lesson_columns(rows: &[RawRow]) -> IndexSet<String> {
    let mut columns = IndexSet::new();
    for row in rows {
        for key in row.keys() {
            columns.insert(key.clone());
        }
    }

    columns.retain(|column: &String| {
        rows.iter().any(|row| {
            row.get(column)
                .map(normalize_cell)
                .is_some_and(|value| STATUS_VALUES.contains(&value.as_str()))
        })
    });
    columns
}

/// Fraction of lesson columns the row marks completed.
pub fn score(row: &RawRow, lesson_columns: &IndexSet<String>) -> f64 {
    if lesson_columns.is_empty() {
        return 0.0;
    }

    let done = lesson_columns
        .iter()
        .filter(|column| {
            row.get(column.as_str())
                .map(normalize_cell)
                .is_some_and(|value| COMPLETED_VALUES.contains(&value.as_str()))
        })
        .count();

    done as f64 / lesson_columns.len() as f64
}
