//! File backends for [`XlsxDocument`].
//!
//! Reading goes through `calamine`, writing through `rust_xlsxwriter`. Cell
//! formats are written but not read back.

use std::collections::BTreeMap;
use std::path::Path;

use calamine::{Data, Range, Reader, Xlsx, open_workbook};
use rust_xlsxwriter::{
    DataValidation, Format, FormatAlign, FormatBorder, Table, TableColumn, Workbook, Worksheet,
};

use crate::document::{XlsxDocument, XlsxSheet};
use crate::error::BackendError;
use crate::spec::{EnumCellValue, SpecCellFormat, SpecCellRange};

/// Storage seam between the in-memory document and a file format.
pub trait SpreadsheetBackend {
    fn open(&self, path: &Path) -> Result<XlsxDocument, BackendError>;
    fn save(&self, doc: &XlsxDocument, path: &Path) -> Result<(), BackendError>;
}

/// `.xlsx` files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxFileBackend;

impl SpreadsheetBackend for XlsxFileBackend {
    fn open(&self, path: &Path) -> Result<XlsxDocument, BackendError> {
        let mut workbook: Xlsx<_> = open_workbook(path)?;
        workbook.load_tables()?;

        let mut doc = XlsxDocument::new();
        for sheet_name in workbook.sheet_names().to_vec() {
            let range = workbook.worksheet_range(&sheet_name)?;
            let mut sheet = XlsxSheet::new(sheet_name.clone());
            read_range_into_sheet(&range, &mut sheet)?;

            let l_table_names: Vec<String> = workbook
                .table_names_in_sheet(&sheet_name)
                .into_iter()
                .cloned()
                .collect();
            if let Some(table_name) = l_table_names.first() {
                let table = workbook.table_by_name(table_name)?;
                if let Some(range_table) = derive_table_range(table.data()) {
                    sheet.set_table_range(range_table, Some(table_name.clone()));
                }
                if l_table_names.len() > 1 {
                    tracing::warn!(
                        sheet = %sheet_name,
                        n_tables = l_table_names.len(),
                        "sheet holds several tables; only the first is used"
                    );
                }
            }

            tracing::debug!(
                sheet = %sheet_name,
                dimensions = ?sheet.dimensions(),
                if_table = sheet.table_range().is_some(),
                "worksheet read"
            );
            doc.sheets.push(sheet);
        }

        tracing::info!(path = %path.display(), n_sheets = doc.sheets.len(), "workbook opened");
        Ok(doc)
    }

    fn save(&self, doc: &XlsxDocument, path: &Path) -> Result<(), BackendError> {
        let mut workbook = Workbook::new();
        let mut dict_formats: BTreeMap<String, Format> = BTreeMap::new();

        for sheet in &doc.sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&sheet.name)?;
            write_sheet_cells(worksheet, sheet, &mut dict_formats)?;
            write_sheet_table(worksheet, sheet, &mut dict_formats)?;
            write_sheet_layout(worksheet, sheet)?;
        }

        workbook.save(path)?;
        tracing::info!(path = %path.display(), n_sheets = doc.sheets.len(), "workbook saved");
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// #region Read

fn read_range_into_sheet(range: &Range<Data>, sheet: &mut XlsxSheet) -> Result<(), BackendError> {
    let Some((n_row_start, n_col_start)) = range.start() else {
        return Ok(());
    };
    let n_col_start = cast_col_num(n_col_start as usize)?;

    for (n_row_rel, n_col_rel, data) in range.used_cells() {
        let value = derive_cell_value_from_data(data);
        if matches!(value, EnumCellValue::None) {
            continue;
        }
        let n_row = n_row_start.saturating_add(cast_row_num(n_row_rel)?);
        let n_col = n_col_start.saturating_add(cast_col_num(n_col_rel)?);
        sheet.set_cell(n_row, n_col, value, None);
    }

    if let Some((n_row_end, n_col_end)) = range.end() {
        sheet.set_dimension_hint(
            n_row_end.saturating_add(1),
            cast_col_num(n_col_end as usize)?.saturating_add(1),
        );
    }
    Ok(())
}

fn derive_cell_value_from_data(data: &Data) -> EnumCellValue {
    match data {
        Data::Empty => EnumCellValue::None,
        Data::String(s) => EnumCellValue::String(s.clone()),
        Data::Int(n) => EnumCellValue::Number(*n as f64),
        Data::Float(x) => EnumCellValue::Number(*x),
        Data::Bool(b) => EnumCellValue::Boolean(*b),
        Data::DateTime(dt) => EnumCellValue::DateTime(dt.as_f64()),
        Data::DateTimeIso(c) | Data::DurationIso(c) => EnumCellValue::String(c.clone()),
        Data::Error(err) => EnumCellValue::String(err.to_string()),
    }
}

/// Table range including its header row, from the table's data range.
fn derive_table_range(data: &Range<Data>) -> Option<SpecCellRange> {
    let (n_row_first, n_col_first) = data.start()?;
    let (n_row_last, n_col_last) = data.end()?;
    Some(SpecCellRange {
        row_first: n_row_first.checked_sub(1)?,
        col_first: u16::try_from(n_col_first).ok()?,
        row_last: n_row_last,
        col_last: u16::try_from(n_col_last).ok()?,
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Write

fn write_sheet_cells(
    worksheet: &mut Worksheet,
    sheet: &XlsxSheet,
    dict_formats: &mut BTreeMap<String, Format>,
) -> Result<(), BackendError> {
    for (cell_ref, cell) in sheet.cells() {
        let (n_row, n_col) = (cell_ref.row, cell_ref.col);
        let format = cell
            .format
            .as_ref()
            .and_then(|fmt| derive_cached_format(fmt, dict_formats));

        match (&cell.value, format) {
            (EnumCellValue::None, Some(fmt)) => {
                worksheet.write_blank(n_row, n_col, &fmt)?;
            }
            (EnumCellValue::None, None) => {}
            (EnumCellValue::String(val), Some(fmt)) => {
                worksheet.write_string_with_format(n_row, n_col, val, &fmt)?;
            }
            (EnumCellValue::String(val), None) => {
                worksheet.write_string(n_row, n_col, val)?;
            }
            (EnumCellValue::Number(val) | EnumCellValue::DateTime(val), Some(fmt)) => {
                worksheet.write_number_with_format(n_row, n_col, *val, &fmt)?;
            }
            (EnumCellValue::Number(val) | EnumCellValue::DateTime(val), None) => {
                worksheet.write_number(n_row, n_col, *val)?;
            }
            (EnumCellValue::Boolean(val), Some(fmt)) => {
                worksheet.write_boolean_with_format(n_row, n_col, *val, &fmt)?;
            }
            (EnumCellValue::Boolean(val), None) => {
                worksheet.write_boolean(n_row, n_col, *val)?;
            }
        }
    }
    Ok(())
}

fn write_sheet_table(
    worksheet: &mut Worksheet,
    sheet: &XlsxSheet,
    dict_formats: &mut BTreeMap<String, Format>,
) -> Result<(), BackendError> {
    let Some(range) = sheet.table_range() else {
        return Ok(());
    };
    if range.row_last <= range.row_first {
        tracing::warn!(sheet = %sheet.name, "header-only table not written");
        return Ok(());
    }

    let l_columns: Vec<TableColumn> = (range.col_first..=range.col_last)
        .map(|n_col| {
            let mut column = TableColumn::new();
            if let Some(cell) = sheet.cell(range.row_first, n_col) {
                if let EnumCellValue::String(c_header) = &cell.value {
                    column = column.set_header(c_header);
                }
                if let Some(fmt) = cell
                    .format
                    .as_ref()
                    .and_then(|fmt| derive_cached_format(fmt, dict_formats))
                {
                    column = column.set_header_format(fmt);
                }
            }
            column
        })
        .collect();

    let mut table = Table::new().set_columns(&l_columns);
    if let Some(c_name) = sheet.table_name() {
        table = table.set_name(c_name);
    }
    worksheet.add_table(
        range.row_first,
        range.col_first,
        range.row_last,
        range.col_last,
        &table,
    )?;
    Ok(())
}

fn write_sheet_layout(worksheet: &mut Worksheet, sheet: &XlsxSheet) -> Result<(), BackendError> {
    if let Some(cell) = sheet.freeze() {
        worksheet.set_freeze_panes(cell.row, cell.col)?;
    }

    for validation in sheet.data_validations() {
        let l_values: Vec<&str> = validation.values.iter().map(String::as_str).collect();
        let mut data_validation = DataValidation::new().allow_list_strings(&l_values)?;
        if !validation.error_title.is_empty() {
            data_validation = data_validation.set_error_title(&validation.error_title)?;
        }
        if !validation.error_message.is_empty() {
            data_validation = data_validation.set_error_message(&validation.error_message)?;
        }
        if !validation.prompt_title.is_empty() {
            data_validation = data_validation.set_input_title(&validation.prompt_title)?;
        }
        if !validation.prompt_message.is_empty() {
            data_validation = data_validation.set_input_message(&validation.prompt_message)?;
        }
        let range = validation.range;
        worksheet.add_data_validation(
            range.row_first,
            range.col_first,
            range.row_last,
            range.col_last,
            &data_validation,
        )?;
    }

    for (n_col, width) in sheet.column_widths() {
        worksheet.set_column_width(*n_col, *width)?;
    }

    let print = sheet.print_settings();
    if print.horizontal_centered {
        worksheet.set_print_center_horizontally(true);
    }
    if print.vertical_centered {
        worksheet.set_print_center_vertically(true);
    }
    if let Some((n_first, n_last)) = print.title_rows {
        worksheet.set_repeat_rows(n_first, n_last)?;
    }
    if let Some((n_first, n_last)) = print.title_columns {
        worksheet.set_repeat_columns(n_first, n_last)?;
    }
    Ok(())
}

/// `None` for a format without any property, so the cell keeps the default style.
fn derive_cached_format(
    spec: &SpecCellFormat,
    dict_formats: &mut BTreeMap<String, Format>,
) -> Option<Format> {
    if spec.is_empty() {
        return None;
    }
    let format = dict_formats
        .entry(format!("{spec:?}"))
        .or_insert_with(|| derive_rust_xlsx_format(spec))
        .clone();
    Some(format)
}

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(val) = &spec.font_name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = spec.font_size {
        format = format.set_font_size(val as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }
    if spec.italic.unwrap_or(false) {
        format = format.set_italic();
    }
    if let Some(val) = &spec.font_color {
        format = format.set_font_color(val.as_str());
    }

    for val in [&spec.align, &spec.valign].into_iter().flatten() {
        if let Some(align) = derive_format_align(val) {
            format = format.set_align(align);
        }
    }

    if let Some(val) = &spec.num_format {
        format = format.set_num_format(val.clone());
    }
    if let Some(val) = &spec.bg_color {
        format = format.set_background_color(val.as_str());
    }
    if let Some(val) = spec.border {
        format = format.set_border(derive_format_border(val));
    }
    if spec.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        7 => FormatBorder::Hair,
        _ => FormatBorder::None,
    }
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    match align.trim().to_ascii_lowercase().as_str() {
        "general" => Some(FormatAlign::General),
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "justify" => Some(FormatAlign::Justify),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" | "vertical_center" => Some(FormatAlign::VerticalCenter),
        _ => None,
    }
}

fn cast_row_num(value: usize) -> Result<u32, BackendError> {
    crate::util::cast_row_num(value).map_err(BackendError::IndexOutOfBounds)
}

fn cast_col_num(value: usize) -> Result<u16, BackendError> {
    crate::util::cast_col_num(value).map_err(BackendError::IndexOutOfBounds)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_format_align_accepts_vertical_aliases() {
        assert!(matches!(derive_format_align(" Center "), Some(FormatAlign::Center)));
        assert!(matches!(
            derive_format_align("vertical_center"),
            Some(FormatAlign::VerticalCenter)
        ));
        assert!(derive_format_align("diagonal").is_none());
    }

    #[test]
    fn test_derive_cell_value_from_data_maps_numbers_and_errors() {
        assert_eq!(derive_cell_value_from_data(&Data::Int(3)), EnumCellValue::Number(3.0));
        assert_eq!(derive_cell_value_from_data(&Data::Empty), EnumCellValue::None);
        assert_eq!(
            derive_cell_value_from_data(&Data::Bool(true)),
            EnumCellValue::Boolean(true)
        );
    }

    #[test]
    fn test_derive_cached_format_skips_empty_and_reuses_entries() {
        let mut dict_formats = BTreeMap::new();
        assert!(derive_cached_format(&SpecCellFormat::default(), &mut dict_formats).is_none());
        assert!(dict_formats.is_empty());

        let fmt_bold = SpecCellFormat {
            bold: Some(true),
            ..Default::default()
        };
        assert!(derive_cached_format(&fmt_bold, &mut dict_formats).is_some());
        assert!(derive_cached_format(&fmt_bold, &mut dict_formats).is_some());
        assert_eq!(dict_formats.len(), 1);
    }

    #[test]
    fn test_save_then_open_keeps_cells_and_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cells.xlsx");

        let mut doc = XlsxDocument::new();
        let sheet = doc.add_sheet("Data");
        sheet.set_cell(0, 0, EnumCellValue::String("id".into()), None);
        sheet.set_cell(0, 1, EnumCellValue::String("ok".into()), None);
        sheet.set_cell(1, 0, EnumCellValue::Number(7.0), None);
        sheet.set_cell(1, 1, EnumCellValue::Boolean(false), None);
        sheet.set_table_range(
            SpecCellRange {
                row_first: 0,
                col_first: 0,
                row_last: 1,
                col_last: 1,
            },
            Some("Data".to_string()),
        );
        XlsxFileBackend.save(&doc, &path).unwrap();

        let doc_read = XlsxFileBackend.open(&path).unwrap();
        let sheet_read = doc_read.sheet("Data").unwrap();
        assert_eq!(sheet_read.value(0, 1), &EnumCellValue::String("ok".into()));
        assert_eq!(sheet_read.value(1, 0), &EnumCellValue::Number(7.0));
        assert_eq!(sheet_read.value(1, 1), &EnumCellValue::Boolean(false));
        assert_eq!(sheet_read.table_range().map(|r| r.row_last), Some(1));
    }
}
