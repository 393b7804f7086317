use crate::models::CellValue;

/// Space-like characters that spreadsheet exports leave behind.
const SPACE_LIKE: &[char] = &[
    '\u{00A0}', '\u{1680}', '\u{180E}', '\u{2000}', '\u{2001}', '\u{2002}', '\u{2003}', '\u{2004}',
    '\u{2005}', '\u{2006}', '\u{2007}', '\u{2008}', '\u{2009}', '\u{200A}', '\u{200B}',
    '\u{202F}', '\u{205F}', '\u{3000}', '\u{FEFF}',
];

/// Comparison form of a string: exotic spaces flattened, whitespace
/// collapsed, trimmed, lowercased.
pub fn normalize(value: &str) -> String {
    let flattened: String = value
        .chars()
        .map(|c| if SPACE_LIKE.contains(&c) { ' ' } else { c })
        .collect();
    flattened
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn normalize_cell(value: &CellValue) -> String {
    normalize(&value.to_text())
}
