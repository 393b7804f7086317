use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

pub const DISTRICT: &str = "District";
pub const CITY: &str = "City";
pub const SUPERVISOR: &str = "Supervisor Name";
pub const DATE: &str = "Date";
pub const PHARMACY_NO: &str = "Pharmacy No.";
pub const USER_ID: &str = "User/Employee ID";
pub const EMAIL: &str = "Username (Email)";
pub const DISPLAY_NAME: &str = "Display Name (Pharmacist name)";
pub const PHONE: &str = "Phone number (Whatsapp)";
pub const SCFHS: &str = "SCFHS";
pub const ATTENDANCE_STATUS: &str = "Attendance Status";
pub const NOTES: &str = "Notes";
pub const COMPLETION_RATE: &str = "Completion Rate";

/// Rates at or above this count as fully complete.
pub const COMPLETE_THRESHOLD: f64 = 0.999;

/// A single spreadsheet cell as it arrives from ingestion.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl CellValue {
    /// String form of the cell; empty cells become "".
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Number(n) => n.is_nan(),
            CellValue::Text(s) => s.trim().is_empty(),
        }
    }

    /// Whether a roster cell may override an LMS cell: non-empty text or a
    /// non-zero number.
    pub fn is_truthy(&self) -> bool {
        match self {
            CellValue::Empty => false,
            CellValue::Number(n) => *n != 0.0 && !n.is_nan(),
            CellValue::Text(s) => !s.is_empty(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

/// One sheet row keyed by column header, in sheet column order.
pub type RawRow = IndexMap<String, CellValue>;

/// Text of a column in a row, "" when the column is missing.
pub fn field(row: &RawRow, column: &str) -> String {
    row.get(column).map(CellValue::to_text).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalRecord {
    #[serde(rename = "District")]
    pub district: String,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "Supervisor Name")]
    pub supervisor: String,
    #[serde(rename = "Pharmacy No.")]
    pub pharmacy_no: String,
    #[serde(rename = "User/Employee ID")]
    pub user_id: String,
    #[serde(rename = "Username (Email)")]
    pub email: String,
    #[serde(rename = "Display Name (Pharmacist name)")]
    pub display_name: String,
    #[serde(rename = "Phone number (Whatsapp)")]
    pub phone: String,
    #[serde(rename = "SCFHS")]
    pub scfhs: String,
    #[serde(rename = "Completion Rate")]
    pub completion_rate: f64,
}

impl FinalRecord {
    pub fn status(&self) -> CompletionStatus {
        CompletionStatus::from_rate(self.completion_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Completed,
    InProgress,
    NotStarted,
}

impl CompletionStatus {
    pub fn from_rate(rate: f64) -> Self {
        if rate >= COMPLETE_THRESHOLD {
            CompletionStatus::Completed
        } else if rate > 0.0 {
            CompletionStatus::InProgress
        } else {
            CompletionStatus::NotStarted
        }
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionStatus::Completed => write!(f, "Completed"),
            CompletionStatus::InProgress => write!(f, "In Progress"),
            CompletionStatus::NotStarted => write!(f, "Not Started"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompletionSummary {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub not_started: usize,
    pub completion_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub group: String,
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub not_started: usize,
    pub completion: f64,
}
