//! In-memory spreadsheet document.
//!
//! The exporter writes into and the importer reads from [`XlsxDocument`];
//! file formats are handled by a [`crate::backend::SpreadsheetBackend`].

use std::collections::BTreeMap;

use crate::spec::{
    EnumCellValue, SpecCell, SpecCellFormat, SpecCellRange, SpecCellRef, SpecDataValidation,
    SpecPrintSettings, SpecXlsxReport,
};

/// One worksheet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XlsxSheet {
    pub name: String,
    cells: BTreeMap<(u32, u16), SpecCell>,
    /// Reported dimensions `(n_rows, n_cols)`; may exceed the stored cells.
    dimension_hint: Option<(u32, u16)>,
    table_range: Option<SpecCellRange>,
    table_name: Option<String>,
    freeze: Option<SpecCellRef>,
    data_validations: Vec<SpecDataValidation>,
    column_widths: BTreeMap<u16, f64>,
    print: SpecPrintSettings,
}

impl XlsxSheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Reported `(n_rows, n_cols)`: the larger of the stored extent and the
    /// dimension hint. Data validations never count.
    pub fn dimensions(&self) -> (u32, u16) {
        let (n_rows_stored, n_cols_stored) = self.stored_extent();
        match self.dimension_hint {
            Some((n_rows, n_cols)) => (n_rows.max(n_rows_stored), n_cols.max(n_cols_stored)),
            None => (n_rows_stored, n_cols_stored),
        }
    }

    /// `(last row + 1, last col + 1)` over stored cells, styled blanks included.
    pub fn stored_extent(&self) -> (u32, u16) {
        let n_rows = self
            .cells
            .keys()
            .next_back()
            .map_or(0, |(row, _)| row + 1);
        let n_cols = self.cells.keys().map(|(_, col)| col + 1).max().unwrap_or(0);
        (n_rows, n_cols)
    }

    /// Force reported dimensions, as files with stale dimension records do.
    pub fn set_dimension_hint(&mut self, n_rows: u32, n_cols: u16) {
        self.dimension_hint = Some((n_rows, n_cols));
    }

    pub fn cell(&self, row: u32, col: u16) -> Option<&SpecCell> {
        self.cells.get(&(row, col))
    }

    /// Value at a position; missing cells read as [`EnumCellValue::None`].
    pub fn value(&self, row: u32, col: u16) -> &EnumCellValue {
        static VALUE_NONE: EnumCellValue = EnumCellValue::None;
        self.cells.get(&(row, col)).map_or(&VALUE_NONE, |c| &c.value)
    }

    pub fn set_cell(
        &mut self,
        row: u32,
        col: u16,
        value: EnumCellValue,
        format: Option<SpecCellFormat>,
    ) {
        self.cells.insert((row, col), SpecCell { value, format });
    }

    pub fn remove_cell(&mut self, row: u32, col: u16) -> Option<SpecCell> {
        self.cells.remove(&(row, col))
    }

    /// Stored cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (SpecCellRef, &SpecCell)> {
        self.cells
            .iter()
            .map(|(&(row, col), cell)| (SpecCellRef { row, col }, cell))
    }

    /// Remove every stored cell of the rows in `row_first..=row_last`.
    pub fn clear_rows(&mut self, row_first: u32, row_last: u32) {
        self.cells
            .retain(|(row, _), _| *row < row_first || *row > row_last);
    }

    pub fn table_range(&self) -> Option<SpecCellRange> {
        self.table_range
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    /// Declare the table covering header and data rows.
    pub fn set_table_range(&mut self, range: SpecCellRange, name: Option<String>) {
        self.table_range = Some(range);
        self.table_name = name;
    }

    pub fn freeze(&self) -> Option<SpecCellRef> {
        self.freeze
    }

    pub fn set_freeze(&mut self, cell: SpecCellRef) {
        self.freeze = Some(cell);
    }

    pub fn data_validations(&self) -> &[SpecDataValidation] {
        &self.data_validations
    }

    pub fn set_data_validation(&mut self, validation: SpecDataValidation) {
        self.data_validations.push(validation);
    }

    pub fn column_widths(&self) -> &BTreeMap<u16, f64> {
        &self.column_widths
    }

    pub fn set_column_width(&mut self, col: u16, width: f64) {
        self.column_widths.insert(col, width);
    }

    pub fn print_settings(&self) -> &SpecPrintSettings {
        &self.print
    }

    pub fn set_print_settings(&mut self, print: SpecPrintSettings) {
        self.print = print;
    }
}

/// Ordered collection of sheets plus the report of the export that built it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XlsxDocument {
    pub sheets: Vec<XlsxSheet>,
    pub report: SpecXlsxReport,
}

impl XlsxDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet(&self, name: &str) -> Option<&XlsxSheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut XlsxSheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Append a sheet and return it for writing.
    pub fn add_sheet(&mut self, name: impl Into<String>) -> &mut XlsxSheet {
        self.sheets.push(XlsxSheet::new(name));
        let n_last = self.sheets.len() - 1;
        &mut self.sheets[n_last]
    }
}
