use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use indexmap::map::Entry;
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info};

use crate::columns::resolve_columns;
use crate::lessons::{infer_lesson_columns, score};
use crate::models::{
    field, CellValue, FinalRecord, RawRow, CITY, DATE, DISPLAY_NAME, DISTRICT, EMAIL, PHARMACY_NO,
    PHONE, SCFHS, SUPERVISOR, USER_ID,
};
use crate::normalize::normalize;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

/// Winning LMS row for one identity.
#[derive(Debug, Clone)]
pub struct DedupEntry {
    pub row: RawRow,
    pub rate: f64,
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub records: Vec<FinalRecord>,
    pub lesson_columns: IndexSet<String>,
    pub lms_rows: usize,
    pub dropped_without_identity: usize,
    pub identities: usize,
    pub suppressed: usize,
}

/// Normalized email of a row, `None` for blank or "undefined" emails.
pub fn identity_key(row: &RawRow) -> Option<String> {
    let key = normalize(&field(row, EMAIL));
    if key.is_empty() || key == "undefined" {
        None
    } else {
        Some(key)
    }
}

/// Milliseconds since the epoch for a date cell.
///
/// Numbers are taken as-is; text is parsed as a calendar date, then as a
/// plain number. Anything unusable is 0.
pub fn parse_timestamp(value: &CellValue) -> f64 {
    match value {
        CellValue::Empty => 0.0,
        CellValue::Number(n) if n.is_finite() => *n,
        CellValue::Number(_) => 0.0,
        CellValue::Text(text) => {
            let text = text.trim();
            calendar_millis(text)
                .filter(|ms| *ms != 0.0)
                .or_else(|| text.parse::<f64>().ok().filter(|n| n.is_finite()))
                .unwrap_or(0.0)
        }
    }
}

fn calendar_millis(text: &str) -> Option<f64> {
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.timestamp_millis() as f64);
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .or_else(|| partial_date(text))
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|datetime| datetime.and_utc().timestamp_millis() as f64)
}

/// `YYYY-MM` and `YYYY` read as the first day of that month or year.
fn partial_date(text: &str) -> Option<NaiveDate> {
    if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::from_ymd_opt(text.parse().ok()?, 1, 1);
    }
    NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d")
        .ok()
        .filter(|_| text.len() == 7)
}

/// Keeps the best row per identity: higher score wins, then later date,
/// then whichever came first.
pub fn dedupe(rows: &[RawRow], lesson_columns: &IndexSet<String>) -> IndexMap<String, DedupEntry> {
    let mut best: IndexMap<String, DedupEntry> = IndexMap::new();

    for row in rows {
        let Some(key) = identity_key(row) else {
            continue;
        };
        let rate = score(row, lesson_columns);

        match best.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(DedupEntry { row: row.clone(), rate });
            }
            Entry::Occupied(mut slot) => {
                let current = slot.get();
                let replace = if rate > current.rate {
                    true
                } else if rate == current.rate {
                    let incoming = parse_timestamp(row.get(DATE).unwrap_or(&CellValue::Empty));
                    let stored =
                        parse_timestamp(current.row.get(DATE).unwrap_or(&CellValue::Empty));
                    incoming > stored
                } else {
                    false
                };

                if replace {
                    debug!(identity = %slot.key(), rate, "replacing duplicate LMS row");
                    slot.insert(DedupEntry { row: row.clone(), rate });
                }
            }
        }
    }

    best
}

/// Indexes roster rows by identity. A later row with the same email
/// replaces an earlier one.
pub fn index_master(rows: &[RawRow]) -> HashMap<String, RawRow> {
    let mut index = HashMap::new();
    for row in rows {
        if let Some(key) = identity_key(row) {
            index.insert(key, row.clone());
        }
    }
    index
}

/// Builds the report row for one identity. A roster value wins when it is
/// truthy: empty text and a numeric 0 fall back to the LMS value.
pub fn merge(
    key: &str,
    entry: &DedupEntry,
    master_by_key: &HashMap<String, RawRow>,
) -> Option<FinalRecord> {
    let master = master_by_key.get(key);
    let pick = |column: &str| -> String {
        master
            .and_then(|row| row.get(column))
            .filter(|value| value.is_truthy())
            .or_else(|| entry.row.get(column))
            .map(CellValue::to_text)
            .unwrap_or_default()
    };

    let record = FinalRecord {
        district: pick(DISTRICT),
        city: pick(CITY),
        supervisor: pick(SUPERVISOR),
        pharmacy_no: pick(PHARMACY_NO),
        user_id: pick(USER_ID),
        email: pick(EMAIL),
        display_name: pick(DISPLAY_NAME),
        phone: pick(PHONE),
        scfhs: pick(SCFHS),
        completion_rate: entry.rate,
    };

    let is_noise = [&record.user_id, &record.email, &record.display_name]
        .iter()
        .all(|value| value.is_empty());
    if is_noise {
        None
    } else {
        Some(record)
    }
}

/// Runs the whole engine over two LMS exports and the master roster.
pub fn reconcile(lms_a: &[RawRow], lms_b: &[RawRow], master: &[RawRow]) -> Reconciliation {
    let lms: Vec<RawRow> = lms_a.iter().chain(lms_b).map(resolve_columns).collect();
    let master: Vec<RawRow> = master.iter().map(resolve_columns).collect();

    let lesson_columns = infer_lesson_columns(&lms);
    info!(
        lms_rows = lms.len(),
        master_rows = master.len(),
        lesson_columns = lesson_columns.len(),
        "reconciling completion data"
    );

    let dropped_without_identity = lms.iter().filter(|row| identity_key(row).is_none()).count();
    let best = dedupe(&lms, &lesson_columns);
    let master_by_key = index_master(&master);

    let mut records = Vec::with_capacity(best.len());
    for (key, entry) in &best {
        if let Some(record) = merge(key, entry, &master_by_key) {
            records.push(record);
        }
    }

    let suppressed = best.len() - records.len();
    debug!(
        dropped_without_identity,
        identities = best.len(),
        suppressed,
        "reconciliation finished"
    );

    Reconciliation {
        lms_rows: lms.len(),
        identities: best.len(),
        records,
        lesson_columns,
        dropped_without_identity,
        suppressed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), CellValue::from(*v)))
            .collect()
    }

    fn lessons(names: &[&str]) -> IndexSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn identity_skips_blank_and_undefined() {
        assert_eq!(identity_key(&row(&[(EMAIL, " A@X.com ")])), Some("a@x.com".into()));
        assert_eq!(identity_key(&row(&[(EMAIL, "  ")])), None);
        assert_eq!(identity_key(&row(&[(EMAIL, "Undefined")])), None);
        assert_eq!(identity_key(&row(&[("Other", "x")])), None);
    }

    #[test]
    fn timestamps_fall_back_to_numbers_then_zero() {
        assert_eq!(parse_timestamp(&CellValue::Number(45292.0)), 45292.0);
        assert_eq!(parse_timestamp(&CellValue::from("45292")), 45292.0);
        assert_eq!(parse_timestamp(&CellValue::from("not a date")), 0.0);
        assert_eq!(parse_timestamp(&CellValue::Empty), 0.0);
        assert!(
            parse_timestamp(&CellValue::from("2024-02-01"))
                > parse_timestamp(&CellValue::from("2024-01-01"))
        );
        assert_eq!(
            parse_timestamp(&CellValue::from("2024-01-01")),
            parse_timestamp(&CellValue::from("2024-01-01T00:00:00Z"))
        );
    }

    #[test]
    fn higher_score_wins_in_any_order() {
        let set = lessons(&["L1", "L2"]);
        let low = row(&[(EMAIL, "a@x.com"), ("L1", "Completed"), ("L2", "Not Completed")]);
        let high = row(&[(EMAIL, "a@x.com"), ("L1", "Completed"), ("L2", "Completed")]);

        for rows in [vec![low.clone(), high.clone()], vec![high.clone(), low.clone()]] {
            let best = dedupe(&rows, &set);
            assert_eq!(best.len(), 1);
            assert_eq!(best["a@x.com"].rate, 1.0);
        }
    }

    #[test]
    fn later_date_breaks_score_ties() {
        let set = lessons(&["L1", "L2"]);
        let feb = row(&[(EMAIL, "a@x.com"), (DATE, "2024-02-01"), ("L1", "Completed")]);
        let jan = row(&[(EMAIL, "a@x.com"), (DATE, "2024-01-01"), ("L1", "Completed")]);

        let best = dedupe(&[jan.clone(), feb.clone()], &set);
        assert_eq!(field(&best["a@x.com"].row, DATE), "2024-02-01");
        let best = dedupe(&[feb, jan], &set);
        assert_eq!(field(&best["a@x.com"].row, DATE), "2024-02-01");
    }

    #[test]
    fn partial_and_fractional_dates_parse() {
        let jan = parse_timestamp(&CellValue::from("2024-01-01"));
        for later in [
            "2024-03-01T09:00:00.000",
            "2024-01-05 10:00:00.5",
            "2024-01-05T10:00",
            "2024-02",
        ] {
            assert!(parse_timestamp(&CellValue::from(later)) > jan, "{later}");
        }
        assert_eq!(parse_timestamp(&CellValue::from("2024")), jan);
        assert_eq!(parse_timestamp(&CellValue::from("2024-13")), 0.0);
    }

    #[test]
    fn fractional_second_date_wins_score_tie() {
        let set = lessons(&["L1"]);
        let jan = row(&[(EMAIL, "a@x.com"), (DATE, "2024-01-01"), (CITY, "jan")]);
        let mar = row(&[(EMAIL, "a@x.com"), (DATE, "2024-03-01T09:00:00.000"), (CITY, "mar")]);
        let best = dedupe(&[jan, mar], &set);
        assert_eq!(field(&best["a@x.com"].row, CITY), "mar");
    }

    #[test]
    fn full_tie_keeps_first_seen() {
        let set = lessons(&["L1"]);
        let first = row(&[(EMAIL, "a@x.com"), (DATE, "garbage"), (CITY, "first")]);
        let second = row(&[(EMAIL, "A@x.com"), (DATE, ""), (CITY, "second")]);
        let best = dedupe(&[first, second], &set);
        assert_eq!(field(&best["a@x.com"].row, CITY), "first");
    }

    #[test]
    fn master_values_take_precedence_when_present() {
        let entry = DedupEntry {
            row: row(&[(EMAIL, "a@x.com"), (DISTRICT, ""), (CITY, "Jeddah")]),
            rate: 0.5,
        };
        let master = index_master(&[row(&[(EMAIL, "a@x.com"), (DISTRICT, "Riyadh"), (CITY, "")])]);

        let record = merge("a@x.com", &entry, &master).expect("record");
        assert_eq!(record.district, "Riyadh");
        assert_eq!(record.city, "Jeddah");
        assert_eq!(record.supervisor, "");
        assert_eq!(record.completion_rate, 0.5);
    }

    #[test]
    fn falsy_master_values_fall_back_to_lms() {
        let entry = DedupEntry {
            row: row(&[(EMAIL, "a@x.com"), (PHARMACY_NO, "P-7"), (CITY, "Jeddah")]),
            rate: 0.0,
        };
        let mut roster = row(&[(EMAIL, "a@x.com"), (CITY, " ")]);
        roster.insert(PHARMACY_NO.into(), CellValue::Number(0.0));

        let record = merge("a@x.com", &entry, &index_master(&[roster])).expect("record");
        assert_eq!(record.pharmacy_no, "P-7");
        assert_eq!(record.city, " ");
    }

    #[test]
    fn whitespace_identity_fields_are_not_noise() {
        let entry = DedupEntry {
            row: row(&[(DISPLAY_NAME, " ")]),
            rate: 0.0,
        };
        assert!(merge("x@x.com", &entry, &HashMap::new()).is_some());
    }

    #[test]
    fn completion_rate_ignores_master() {
        let entry = DedupEntry {
            row: row(&[(EMAIL, "a@x.com")]),
            rate: 0.25,
        };
        let mut stale = row(&[(EMAIL, "a@x.com")]);
        stale.insert("Completion Rate".into(), CellValue::Number(1.0));
        let record = merge("a@x.com", &entry, &index_master(&[stale])).expect("record");
        assert_eq!(record.completion_rate, 0.25);
    }

    #[test]
    fn later_master_duplicate_overwrites() {
        let index = index_master(&[
            row(&[(EMAIL, "a@x.com"), (DISTRICT, "East")]),
            row(&[(EMAIL, "A@X.COM"), (DISTRICT, "West")]),
        ]);
        assert_eq!(field(&index["a@x.com"], DISTRICT), "West");
    }

    #[test]
    fn noise_rows_are_suppressed() {
        let entry = DedupEntry {
            row: row(&[(PHONE, "0550000000"), (CITY, "Dammam")]),
            rate: 0.0,
        };
        assert!(merge("ghost@x.com", &entry, &HashMap::new()).is_none());
    }

    #[test]
    fn end_to_end_prefers_higher_score_and_roster_district() {
        let lms_a = vec![row(&[
            ("email", "a@x.com"),
            ("Date", "2024-01-01"),
            ("Lesson1", "Completed"),
            ("Lesson2", "Not Completed"),
        ])];
        let lms_b = vec![row(&[
            ("email", "A@X.com"),
            ("Date", "2024-02-01"),
            ("Lesson1", "Completed"),
            ("Lesson2", "Completed"),
        ])];
        let master = vec![row(&[("Username (Email)", "a@x.com"), ("District", "Riyadh")])];

        let outcome = reconcile(&lms_a, &lms_b, &master);
        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        assert_eq!(record.district, "Riyadh");
        assert_eq!(record.completion_rate, 1.0);
        assert_eq!(record.email, "a@x.com");
        assert_eq!(outcome.lesson_columns, lessons(&["Lesson1", "Lesson2"]));
    }

    #[test]
    fn rows_without_identity_are_counted_and_dropped() {
        let lms_a = vec![row(&[("Email", ""), ("L", "Completed")]), row(&[("Email", "b@x.com")])];
        let outcome = reconcile(&lms_a, &[], &[]);
        assert_eq!(outcome.lms_rows, 2);
        assert_eq!(outcome.dropped_without_identity, 1);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].completion_rate, 0.0);
    }
}
