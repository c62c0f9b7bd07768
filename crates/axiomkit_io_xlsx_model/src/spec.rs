//! Shared XLSX value objects: formats, ranges, config, report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::conf::derive_default_document_config;

////////////////////////////////////////////////////////////////////////////////
// #region CellFormat

/// Cell format: font, alignment and number format.
///
/// Every property is optional so formats can be layered with [`Self::merge`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,
    /// Italic style.
    pub italic: Option<bool>,
    /// Font color (`#RRGGBB`).
    pub font_color: Option<String>,

    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Border style for all sides.
    pub border: Option<i64>,
    /// Text wrap.
    pub text_wrap: Option<bool>,

    /// Number format code.
    pub num_format: Option<String>,
    /// Background fill color.
    pub bg_color: Option<String>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            italic: other.italic.or(self.italic),
            font_color: other.font_color.clone().or_else(|| self.font_color.clone()),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            text_wrap: other.text_wrap.or(self.text_wrap),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
        }
    }

    /// Whether no property is set.
    pub fn is_empty(&self) -> bool {
        *self == SpecCellFormat::default()
    }
}

/// Raw spreadsheet-native cell value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EnumCellValue {
    /// Missing/blank value.
    #[default]
    None,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Boolean(bool),
    /// Date/time value as an Excel serial number (1900 date system).
    DateTime(f64),
}

/// One stored cell: value plus optional style.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecCell {
    /// Raw cell value.
    pub value: EnumCellValue,
    /// Cell style (number format included).
    pub format: Option<SpecCellFormat>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellRange

/// Zero-based cell reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpecCellRef {
    /// Row index.
    pub row: u32,
    /// Column index.
    pub col: u16,
}

/// Inclusive zero-based cell rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecCellRange {
    /// First row (inclusive).
    pub row_first: u32,
    /// First column (inclusive).
    pub col_first: u16,
    /// Last row (inclusive).
    pub row_last: u32,
    /// Last column (inclusive).
    pub col_last: u16,
}

impl SpecCellRange {
    /// Number of rows covered. An inverted range covers none.
    pub fn height(&self) -> u32 {
        self.row_last
            .checked_sub(self.row_first)
            .map_or(0, |n| n.saturating_add(1))
    }

    /// Number of columns covered. An inverted range covers none.
    pub fn width(&self) -> u16 {
        self.col_last
            .checked_sub(self.col_first)
            .map_or(0, |n| n.saturating_add(1))
    }
}

/// List data validation attached to a column range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecDataValidation {
    /// Covered cells.
    pub range: SpecCellRange,
    /// Allowed values, in declaration order.
    pub values: Vec<String>,
    /// Title of the error dialog.
    pub error_title: String,
    /// Body of the error dialog.
    pub error_message: String,
    /// Title of the input prompt.
    pub prompt_title: String,
    /// Body of the input prompt.
    pub prompt_message: String,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DocumentOptions

/// Autofit rule for column width inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumAutofitColumnsRule {
    /// Disable autofit.
    None,
    /// Infer width from header cells only.
    Header,
    /// Infer width from body cells only.
    Body,
    /// Infer width from both header and body cells (default).
    #[default]
    All,
}

/// Autofit policy applied to every written sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecAutofitCellsPolicy {
    /// Autofit width inference rule.
    pub rule_columns: EnumAutofitColumnsRule,
    /// Max body rows inspected when body-based inference is active.
    pub height_body_inferred_max: Option<usize>,
    /// Minimum final width.
    pub width_cell_min: usize,
    /// Maximum final width.
    pub width_cell_max: usize,
    /// Width padding added after inference.
    pub width_cell_padding: usize,
}

impl Default for SpecAutofitCellsPolicy {
    fn default() -> Self {
        Self {
            rule_columns: EnumAutofitColumnsRule::All,
            height_body_inferred_max: Some(20_000),
            width_cell_min: 5,
            width_cell_max: 60,
            width_cell_padding: 2,
        }
    }
}

/// Document-level export configuration.
///
/// Immutable input of [`crate::writer::export`]; nothing is read from global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecXlsxDocumentConfig {
    /// Font of the header row.
    pub header_font: Option<SpecCellFormat>,
    /// Font of the body rows.
    pub font: Option<SpecCellFormat>,
    /// Alignment patch for header cells (`align`/`valign` are read).
    pub header_alignment: Option<SpecCellFormat>,
    /// A1 reference of the freeze cell; `None` disables frozen panes.
    pub freeze_cell: Option<String>,
    /// Number format overrides keyed by `"<RecordType>.<field>"`.
    pub number_formats: BTreeMap<String, String>,
    /// Column width estimation.
    pub policy_autofit: SpecAutofitCellsPolicy,
    /// Center the printout horizontally.
    pub print_horizontal_centered: bool,
    /// Center the printout vertically.
    pub print_vertical_centered: bool,
    /// Rows repeated on each printed page (`"1:2"`); derived from the freeze
    /// cell when `None`, disabled when empty.
    pub print_title_rows: Option<String>,
    /// Columns repeated on each printed page (`"A:B"`); derived from the
    /// freeze cell when `None`, disabled when empty.
    pub print_title_columns: Option<String>,
}

impl Default for SpecXlsxDocumentConfig {
    fn default() -> Self {
        derive_default_document_config()
    }
}

/// Import-side options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecXlsxImportOptions {
    /// Ignore non-empty header cells right of the planned columns instead of
    /// reporting them.
    pub ignore_additional_columns: bool,
}

/// Print settings of one sheet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecPrintSettings {
    /// Center horizontally.
    pub horizontal_centered: bool,
    /// Center vertically.
    pub vertical_centered: bool,
    /// Inclusive zero-based rows repeated on each page.
    pub title_rows: Option<(u32, u32)>,
    /// Inclusive zero-based columns repeated on each page.
    pub title_columns: Option<(u16, u16)>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Report

/// Summary of one written sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSheetSummary {
    /// Sheet name in the document.
    pub sheet_name: String,
    /// Data rows written (header excluded).
    pub n_rows_data: usize,
    /// Columns written.
    pub n_cols: usize,
}

/// Per-export report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecXlsxReport {
    /// Sheets produced by the export call.
    pub sheets: Vec<SpecSheetSummary>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecXlsxReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_right_side_values() {
        let fmt_base = SpecCellFormat {
            font_name: Some("Arial".to_string()),
            bold: Some(true),
            ..Default::default()
        };
        let fmt_merged = fmt_base.with_(SpecCellFormat {
            bold: Some(false),
            num_format: Some("0.00".to_string()),
            ..Default::default()
        });

        assert_eq!(fmt_merged.font_name.as_deref(), Some("Arial"));
        assert_eq!(fmt_merged.bold, Some(false));
        assert_eq!(fmt_merged.num_format.as_deref(), Some("0.00"));
    }

    #[test]
    fn test_document_config_deserializes_partial_json() {
        let cfg: SpecXlsxDocumentConfig = serde_json::from_str(
            r#"{"freeze_cell": "B2", "number_formats": {"Order.total": "0.000"}}"#,
        )
        .unwrap();

        assert_eq!(cfg.freeze_cell.as_deref(), Some("B2"));
        assert_eq!(cfg.number_formats["Order.total"], "0.000");
        assert_eq!(
            cfg.header_font,
            SpecXlsxDocumentConfig::default().header_font
        );
        assert!(cfg.print_horizontal_centered);
    }

    #[test]
    fn test_range_extent_inverted_is_empty() {
        let range = SpecCellRange {
            row_first: 0,
            col_first: 2,
            row_last: 3,
            col_last: 4,
        };
        assert_eq!((range.height(), range.width()), (4, 3));

        let range_inverted = SpecCellRange {
            row_first: 5,
            col_first: 4,
            row_last: 1,
            col_last: 2,
        };
        assert_eq!((range_inverted.height(), range_inverted.width()), (0, 0));
    }
}
