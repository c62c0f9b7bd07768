//! Stateless helper utilities shared by the layout planner, writer and backend.

use std::collections::BTreeSet;

use crate::conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
};
use crate::spec::{EnumCellValue, SpecCellRef};

////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().trim_matches('\'').trim().to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

/// Derive a table name from a sheet name: alphanumerics only, never a digit
/// first or a cell reference, unique within `set_names_existing`
/// (case-insensitive).
pub fn derive_table_name(sheet_name: &str, set_names_existing: &mut BTreeSet<String>) -> String {
    let mut c_base: String = sheet_name
        .chars()
        .filter(|chr| chr.is_alphanumeric() || *chr == '_')
        .collect();
    if c_base.is_empty()
        || c_base.starts_with(|chr: char| chr.is_ascii_digit())
        || c_base.eq_ignore_ascii_case("r")
        || c_base.eq_ignore_ascii_case("c")
        || parse_a1_ref(&c_base).is_some()
    {
        c_base = format!("Table{c_base}");
    }

    if set_names_existing.insert(c_base.to_lowercase()) {
        return c_base;
    }

    let mut n_idx = 2usize;
    loop {
        let candidate = format!("{c_base}{n_idx}");
        if set_names_existing.insert(candidate.to_lowercase()) {
            return candidate;
        }
        n_idx += 1;
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellReferences

/// Convert a zero-based column index into letters (`0` -> `A`, `27` -> `AB`).
pub fn derive_column_letters(col: u16) -> String {
    let mut n_rest = u32::from(col) + 1;
    let mut l_chars = Vec::new();
    while n_rest > 0 {
        let n_rem = (n_rest - 1) % 26;
        l_chars.push(char::from(b'A' + n_rem as u8));
        n_rest = (n_rest - 1) / 26;
    }
    l_chars.iter().rev().collect()
}

/// Parse column letters into a zero-based index.
pub fn parse_column_letters(letters: &str) -> Option<u16> {
    if letters.is_empty() || !letters.chars().all(|chr| chr.is_ascii_alphabetic()) {
        return None;
    }
    let mut n_col: usize = 0;
    for chr in letters.chars() {
        n_col = n_col * 26 + (chr.to_ascii_uppercase() as usize - 'A' as usize + 1);
        if n_col > N_NCOLS_EXCEL_MAX {
            return None;
        }
    }
    u16::try_from(n_col - 1).ok()
}

/// Parse a one-based row number into a zero-based index.
pub fn parse_row_number(digits: &str) -> Option<u32> {
    let n_row: usize = digits.parse().ok()?;
    if n_row == 0 || n_row > N_NROWS_EXCEL_MAX {
        return None;
    }
    u32::try_from(n_row - 1).ok()
}

/// Parse an A1 reference (`$` anchors allowed).
pub fn parse_a1_ref(a1: &str) -> Option<SpecCellRef> {
    let c_ref = a1.trim().replace('$', "");
    let n_split = c_ref.find(|chr: char| chr.is_ascii_digit())?;
    let (c_letters, c_digits) = c_ref.split_at(n_split);
    Some(SpecCellRef {
        row: parse_row_number(c_digits)?,
        col: parse_column_letters(c_letters)?,
    })
}

/// Format a zero-based reference as A1.
pub fn derive_a1_ref(cell: SpecCellRef) -> String {
    format!("{}{}", derive_column_letters(cell.col), cell.row + 1)
}

/// Parse a row span such as `1:2` into zero-based inclusive rows.
pub fn parse_row_span(span: &str) -> Option<(u32, u32)> {
    let (c_first, c_last) = span.trim().replace('$', "").split_once(':').map(|(a, b)| {
        (a.to_string(), b.to_string())
    })?;
    let (n_first, n_last) = (parse_row_number(&c_first)?, parse_row_number(&c_last)?);
    (n_first <= n_last).then_some((n_first, n_last))
}

/// Parse a column span such as `A:B` into zero-based inclusive columns.
pub fn parse_column_span(span: &str) -> Option<(u16, u16)> {
    let (c_first, c_last) = span.trim().replace('$', "").split_once(':').map(|(a, b)| {
        (a.to_string(), b.to_string())
    })?;
    let (n_first, n_last) = (
        parse_column_letters(&c_first)?,
        parse_column_letters(&c_last)?,
    );
    (n_first <= n_last).then_some((n_first, n_last))
}

pub fn cast_row_num(value: usize) -> Result<u32, String> {
    u32::try_from(value).map_err(|_| format!("row index overflow: {value}"))
}

pub fn cast_col_num(value: usize) -> Result<u16, String> {
    u16::try_from(value).map_err(|_| format!("column index overflow: {value}"))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WidthEstimation

/// Estimate displayed width units for one cell value.
///
/// Used by autofit inference logic. `num_format` sizes date cells.
pub fn estimate_width_len(value: &EnumCellValue, num_format: &str) -> usize {
    match value {
        EnumCellValue::None => 0,
        EnumCellValue::String(s) => estimate_unicode_string_width(s),
        EnumCellValue::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                let n_digits = (*n as i64).to_string().len();
                if num_format.contains("#,##0") {
                    n_digits + n_digits.saturating_sub(1) / 3
                } else {
                    n_digits
                }
            } else {
                format!("{n:.2}").len()
            }
        }
        EnumCellValue::Boolean(_) => 5,
        EnumCellValue::DateTime(_) => num_format.len(),
    }
}

pub fn estimate_unicode_string_width(s: &str) -> usize {
    let n_ascii = s.chars().filter(|chr| chr.is_ascii()).count();
    let n_non_ascii = s.chars().count().saturating_sub(n_ascii);
    n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
