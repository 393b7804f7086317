//! Excel rendering of the completion report.
//!
//! - Dashboard: summary counts and the full pharmacist listing
//! - Pivot: one breakdown table per grouping field

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_xlsxwriter::{
    Color, ConditionalFormatCell, ConditionalFormatCellRule, Format, FormatAlign, FormatBorder,
    Workbook, Worksheet,
};
use tracing::info;

use crate::models::{CompletionSummary, FinalRecord, GroupSummary, COMPLETE_THRESHOLD};
use crate::report::GroupField;

const LISTING_HEADERS: [&str; 10] = [
    "District",
    "City",
    "Supervisor Name",
    "Pharmacy No.",
    "User/Employee ID",
    "Username (Email)",
    "Display Name (Pharmacist name)",
    "Phone number (Whatsapp)",
    "SCFHS",
    "Completion Rate",
];

const PIVOT_HEADERS: [&str; 5] = [
    "Total",
    "Completed",
    "In Progress",
    "Not Started",
    "Completion %",
];

const GREEN: u32 = 0xC6EFCE;
const AMBER: u32 = 0xFFEB9C;
const GRAY: u32 = 0xE7E6E6;

fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x1F4E78))
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Center)
}

fn title_format() -> Format {
    Format::new().set_bold().set_font_size(16)
}

fn percent_format() -> Format {
    Format::new().set_num_format("0.0%")
}

/// Builds the report workbook in memory.
pub fn build_workbook(
    generated_on: NaiveDate,
    records: &[FinalRecord],
    summary: &CompletionSummary,
    groups: &[(GroupField, Vec<GroupSummary>)],
) -> Result<Workbook> {
    let mut workbook = Workbook::new();

    let dashboard = workbook.add_worksheet();
    write_dashboard(dashboard, generated_on, records, summary)?;

    let pivot = workbook.add_worksheet();
    write_pivot(pivot, groups)?;

    Ok(workbook)
}

/// Builds the workbook and saves it to `path`.
pub fn save_report(
    path: &Path,
    generated_on: NaiveDate,
    records: &[FinalRecord],
    summary: &CompletionSummary,
    groups: &[(GroupField, Vec<GroupSummary>)],
) -> Result<()> {
    let mut workbook = build_workbook(generated_on, records, summary, groups)?;
    workbook
        .save(path)
        .with_context(|| format!("Failed to save Excel file: {}", path.display()))?;
    info!(path = %path.display(), records = records.len(), "report written");
    Ok(())
}

fn write_dashboard(
    sheet: &mut Worksheet,
    generated_on: NaiveDate,
    records: &[FinalRecord],
    summary: &CompletionSummary,
) -> Result<()> {
    sheet.set_name("Dashboard")?;

    let header = header_format();
    let bold = Format::new().set_bold();
    let percent = percent_format();

    sheet.write_string_with_format(0, 0, "LMS Completion Report", &title_format())?;
    sheet.write_string(1, 0, format!("Generated on {generated_on}"))?;

    sheet.write_string_with_format(3, 0, "Metric", &header)?;
    sheet.write_string_with_format(3, 1, "Value", &header)?;

    let counts = [
        ("Total Pharmacists", summary.total),
        ("Completed", summary.completed),
        ("In Progress", summary.in_progress),
        ("Not Started", summary.not_started),
    ];
    let mut row = 4u32;
    for (label, value) in counts {
        sheet.write_string_with_format(row, 0, label, &bold)?;
        sheet.write_number(row, 1, value as f64)?;
        row += 1;
    }
    sheet.write_string_with_format(row, 0, "Completion %", &bold)?;
    sheet.write_number_with_format(row, 1, summary.completion_pct, &percent)?;
    row += 2;

    let header_row = row;
    for (col, title) in LISTING_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(header_row, col as u16, *title, &header)?;
    }

    for (offset, record) in records.iter().enumerate() {
        let r = header_row + 1 + offset as u32;
        let texts = [
            &record.district,
            &record.city,
            &record.supervisor,
            &record.pharmacy_no,
            &record.user_id,
            &record.email,
            &record.display_name,
            &record.phone,
            &record.scfhs,
        ];
        for (col, text) in texts.iter().enumerate() {
            sheet.write_string(r, col as u16, text.as_str())?;
        }
        sheet.write_number_with_format(r, 9, record.completion_rate, &percent)?;
    }

    if !records.is_empty() {
        let first = header_row + 1;
        let last = header_row + records.len() as u32;
        add_rate_highlights(sheet, first, last, 9)?;
    }

    sheet.set_freeze_panes(header_row + 1, 0)?;
    sheet.autofit();
    Ok(())
}

/// Green for complete, gray for untouched, amber for anything between.
fn add_rate_highlights(sheet: &mut Worksheet, first: u32, last: u32, col: u16) -> Result<()> {
    let complete = ConditionalFormatCell::new()
        .set_rule(ConditionalFormatCellRule::GreaterThanOrEqualTo(COMPLETE_THRESHOLD))
        .set_format(Format::new().set_background_color(Color::RGB(GREEN)))
        .set_stop_if_true(true);
    let untouched = ConditionalFormatCell::new()
        .set_rule(ConditionalFormatCellRule::EqualTo(0.0))
        .set_format(Format::new().set_background_color(Color::RGB(GRAY)))
        .set_stop_if_true(true);
    let partial = ConditionalFormatCell::new()
        .set_rule(ConditionalFormatCellRule::Between(0.0, COMPLETE_THRESHOLD))
        .set_format(Format::new().set_background_color(Color::RGB(AMBER)));

    sheet.add_conditional_format(first, col, last, col, &complete)?;
    sheet.add_conditional_format(first, col, last, col, &untouched)?;
    sheet.add_conditional_format(first, col, last, col, &partial)?;
    Ok(())
}

fn write_pivot(sheet: &mut Worksheet, groups: &[(GroupField, Vec<GroupSummary>)]) -> Result<()> {
    sheet.set_name("Pivot")?;

    let header = header_format();
    let bold = Format::new().set_bold().set_font_size(13);
    let percent = percent_format();

    let mut row = 0u32;
    for (field, summaries) in groups {
        sheet.write_string_with_format(row, 0, format!("By {field}"), &bold)?;
        row += 1;

        sheet.write_string_with_format(row, 0, field.to_string(), &header)?;
        for (col, title) in PIVOT_HEADERS.iter().enumerate() {
            sheet.write_string_with_format(row, col as u16 + 1, *title, &header)?;
        }
        row += 1;

        for group in summaries {
            sheet.write_string(row, 0, group.group.as_str())?;
            sheet.write_number(row, 1, group.total as f64)?;
            sheet.write_number(row, 2, group.completed as f64)?;
            sheet.write_number(row, 3, group.in_progress as f64)?;
            sheet.write_number(row, 4, group.not_started as f64)?;
            sheet.write_number_with_format(row, 5, group.completion, &percent)?;
            row += 1;
        }
        row += 1;
    }

    sheet.autofit();
    Ok(())
}
