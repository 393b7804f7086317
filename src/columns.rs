use crate::models::{
    RawRow, ATTENDANCE_STATUS, CITY, COMPLETION_RATE, DATE, DISPLAY_NAME, DISTRICT, EMAIL, NOTES,
    PHARMACY_NO, PHONE, SCFHS, SUPERVISOR, USER_ID,
};

/// Header variants seen in LMS exports and roster sheets, in lookup order.
pub const ALIASES: &[(&str, &str)] = &[
    ("Username (Email)", EMAIL),
    ("Email", EMAIL),
    ("Email address", EMAIL),
    ("Username", EMAIL),
    ("User Email", EMAIL),
    ("E-mail", EMAIL),
    ("User/Employee ID", USER_ID),
    ("User ID", USER_ID),
    ("Employee ID", USER_ID),
    ("EmployeeID", USER_ID),
    ("UserID", USER_ID),
    ("User/EmployeeID", USER_ID),
    ("ID", USER_ID),
    ("Emp ID", USER_ID),
    ("Display Name (Pharmacist name)", DISPLAY_NAME),
    ("Display Name", DISPLAY_NAME),
    ("Pharmacist Name", DISPLAY_NAME),
    ("Pharmacist", DISPLAY_NAME),
    ("Full Name", DISPLAY_NAME),
    ("Name", DISPLAY_NAME),
    ("Phone number (Whatsapp)", PHONE),
    ("Phone", PHONE),
    ("Mobile", PHONE),
    ("Phone Number", PHONE),
    ("Whatsapp", PHONE),
    ("Contact No", PHONE),
    ("Pharmacy No.", PHARMACY_NO),
    ("Pharmacy ID", PHARMACY_NO),
    ("Pharmacy #", PHARMACY_NO),
    ("Pharmacy Code", PHARMACY_NO),
    ("Supervisor Name", SUPERVISOR),
    ("Supervisor", SUPERVISOR),
    ("Manager", SUPERVISOR),
    ("District", DISTRICT),
    ("City", CITY),
    ("Date", DATE),
    ("Completion Date", DATE),
    ("SCFHS", SCFHS),
    ("SCFHS code", SCFHS),
    ("SCFHS No", SCFHS),
    ("Attendance Status", ATTENDANCE_STATUS),
    ("Attendance", ATTENDANCE_STATUS),
    ("Notes", NOTES),
    ("Note", NOTES),
    ("Completion Rate", COMPLETION_RATE),
    ("Completion %", COMPLETION_RATE),
];

/// Canonical name for a header, or `None` when the header is not an alias.
pub fn canonical_name(header: &str) -> Option<&'static str> {
    let trimmed = header.trim();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == trimmed)
        .or_else(|| {
            ALIASES
                .iter()
                .find(|(alias, _)| alias.eq_ignore_ascii_case(trimmed))
        })
        .map(|(_, canonical)| *canonical)
}

/// Rewrites a row's headers onto the canonical schema.
///
/// When two source columns land on the same canonical name, the first
/// non-empty value is kept.
pub fn resolve_columns(row: &RawRow) -> RawRow {
    let mut resolved = RawRow::with_capacity(row.len());

    for (key, value) in row {
        let target = canonical_name(key).map_or_else(|| key.clone(), str::to_string);
        match resolved.get_mut(&target) {
            Some(existing) => {
                if existing.is_blank() && !value.is_blank() {
                    *existing = value.clone();
                }
            }
            None => {
                resolved.insert(target, value.clone());
            }
        }
    }

    resolved
}
