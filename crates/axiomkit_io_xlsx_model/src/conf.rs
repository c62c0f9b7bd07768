//! XLSX constants and default preset factories.

use std::collections::BTreeMap;

use crate::schema::EnumScalarType;
use crate::spec::{SpecAutofitCellsPolicy, SpecCellFormat, SpecXlsxDocumentConfig};

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];
/// Excel limit for the comma-joined source of a list data validation.
pub const N_LEN_EXCEL_LIST_VALIDATION_MAX: usize = 255;

/// Zero-based row holding the header of every sheet written by the exporter.
pub const N_ROW_HEADER: u32 = 0;
/// Default freeze cell: header row sticks to the top.
pub const C_FREEZE_CELL_DEFAULT: &str = "A2";
/// Fallback number format when neither the field nor its type defines one.
pub const C_NUM_FORMAT_GENERAL: &str = "General";
/// Date cells (day granularity).
pub const C_NUM_FORMAT_DATE: &str = "yyyy-mm-dd";
/// Date-time cells (second granularity).
pub const C_NUM_FORMAT_DATETIME: &str = "yyyy-mm-dd hh:mm:ss";
/// Link-count columns.
pub const C_NUM_FORMAT_LINK_COUNT: &str = "0";
/// Separator between a nested field alias and its inlined column alias.
pub const C_SEP_NESTED_HEADER: &str = ".";
/// Suffix appended to a collection field alias to name its link-count column.
pub const C_SUFFIX_LINK_COUNT: &str = " count";

/// Build the default header font (`Arial`, bold).
pub fn derive_default_header_font() -> SpecCellFormat {
    SpecCellFormat {
        font_name: Some("Arial".to_string()),
        bold: Some(true),
        ..Default::default()
    }
}

/// Type-default number format for a scalar type.
///
/// Returns `None` for types that render fine with the generic format.
pub fn derive_default_num_format(scalar_type: &EnumScalarType) -> Option<String> {
    match scalar_type {
        EnumScalarType::Date => Some(C_NUM_FORMAT_DATE.to_string()),
        EnumScalarType::DateTime => Some(C_NUM_FORMAT_DATETIME.to_string()),
        EnumScalarType::Money(currency) => Some(currency.number_format()),
        EnumScalarType::Integer
        | EnumScalarType::Float
        | EnumScalarType::Text
        | EnumScalarType::Boolean => None,
    }
}

/// Build default document configuration.
pub fn derive_default_document_config() -> SpecXlsxDocumentConfig {
    SpecXlsxDocumentConfig {
        header_font: Some(derive_default_header_font()),
        font: None,
        header_alignment: None,
        freeze_cell: Some(C_FREEZE_CELL_DEFAULT.to_string()),
        number_formats: BTreeMap::new(),
        policy_autofit: SpecAutofitCellsPolicy::default(),
        print_horizontal_centered: true,
        print_vertical_centered: true,
        print_title_rows: None,
        print_title_columns: None,
    }
}
