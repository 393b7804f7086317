use std::fmt::{self, Write};

use indexmap::IndexMap;

use crate::models::{CompletionStatus, CompletionSummary, FinalRecord, GroupSummary};

pub const BLANK_GROUP: &str = "(Blank)";

/// Fields the pivot view breaks results down by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    District,
    Supervisor,
    City,
    Status,
}

impl GroupField {
    pub const ALL: [GroupField; 4] = [
        GroupField::District,
        GroupField::Supervisor,
        GroupField::City,
        GroupField::Status,
    ];

    fn key(self, record: &FinalRecord) -> String {
        let raw = match self {
            GroupField::District => record.district.clone(),
            GroupField::Supervisor => record.supervisor.clone(),
            GroupField::City => record.city.clone(),
            GroupField::Status => record.status().to_string(),
        };
        if raw.is_empty() {
            BLANK_GROUP.to_string()
        } else {
            raw
        }
    }
}

impl fmt::Display for GroupField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupField::District => write!(f, "District"),
            GroupField::Supervisor => write!(f, "Supervisor Name"),
            GroupField::City => write!(f, "City"),
            GroupField::Status => write!(f, "Status"),
        }
    }
}

#[derive(Default)]
struct Tally {
    total: usize,
    completed: usize,
    in_progress: usize,
    not_started: usize,
}

impl Tally {
    fn add(&mut self, record: &FinalRecord) {
        self.total += 1;
        match record.status() {
            CompletionStatus::Completed => self.completed += 1,
            CompletionStatus::InProgress => self.in_progress += 1,
            CompletionStatus::NotStarted => self.not_started += 1,
        }
    }

    fn completion(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

pub fn aggregate(records: &[FinalRecord]) -> CompletionSummary {
    let mut tally = Tally::default();
    for record in records {
        tally.add(record);
    }

    CompletionSummary {
        total: tally.total,
        completed: tally.completed,
        in_progress: tally.in_progress,
        not_started: tally.not_started,
        completion_pct: tally.completion(),
    }
}

/// Per-group counts, largest groups first. Equal totals keep the order in
/// which the groups were first seen.
pub fn group_by(records: &[FinalRecord], field: GroupField) -> Vec<GroupSummary> {
    let mut groups: IndexMap<String, Tally> = IndexMap::new();

    for record in records {
        groups.entry(field.key(record)).or_default().add(record);
    }

    let mut summaries: Vec<GroupSummary> = groups
        .into_iter()
        .map(|(group, tally)| GroupSummary {
            completion: tally.completion(),
            group,
            total: tally.total,
            completed: tally.completed,
            in_progress: tally.in_progress,
            not_started: tally.not_started,
        })
        .collect();

    summaries.sort_by(|a, b| b.total.cmp(&a.total));
    summaries
}

pub fn all_groups(records: &[FinalRecord]) -> Vec<(GroupField, Vec<GroupSummary>)> {
    GroupField::ALL
        .iter()
        .map(|field| (*field, group_by(records, *field)))
        .collect()
}

pub fn build_report(
    generated_on: chrono::NaiveDate,
    summary: &CompletionSummary,
    groups: &[(GroupField, Vec<GroupSummary>)],
    limit: usize,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# LMS Completion Report");
    let _ = writeln!(output, "Generated on {}", generated_on);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Total pharmacists: {}", summary.total);
    let _ = writeln!(output, "- Completed: {}", summary.completed);
    let _ = writeln!(output, "- In progress: {}", summary.in_progress);
    let _ = writeln!(output, "- Not started: {}", summary.not_started);
    let _ = writeln!(
        output,
        "- Completion: {:.1}%",
        summary.completion_pct * 100.0
    );

    for (field, summaries) in groups {
        let _ = writeln!(output);
        let _ = writeln!(output, "## By {}", field);

        if summaries.is_empty() {
            let _ = writeln!(output, "No records to group.");
            continue;
        }

        for group in summaries.iter().take(limit) {
            let _ = writeln!(
                output,
                "- {}: {} total, {} completed, {} in progress, {} not started ({:.1}%)",
                group.group,
                group.total,
                group.completed,
                group.in_progress,
                group.not_started,
                group.completion * 100.0
            );
        }
    }

    output
}
