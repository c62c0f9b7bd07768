//! Document reader: recovers and validates a record graph from a document.
//!
//! Import runs in two passes. The first pass discovers the data rows of every
//! sheet and decodes each of them, collecting all field errors. The second
//! pass rebuilds collections by consuming child rows in the same pre-order
//! the writer emitted them, then hands the graph to a [`RecordValidator`].

use crate::codec::{decode, decode_count, is_absent};
use crate::composition::{EnumColumnKind, SpecColumnPlan, SpecLayoutPlan, SpecSheetPlan};
use crate::conf::N_ROW_HEADER;
use crate::document::{XlsxDocument, XlsxSheet};
use crate::error::{
    CodecError, EnumStructuralError, FieldError, ImportError, ImportErrors, RowErrors,
    ValidationErrors,
};
use crate::schema::{EnumFieldKind, SpecRecordSchema, SpecSchema};
use crate::spec::{EnumCellValue, SpecXlsxImportOptions};
use crate::value::{EnumFieldValue, SpecRecord};

////////////////////////////////////////////////////////////////////////////////
// #region Validation

/// Schema-level validation run once on the reassembled graph.
pub trait RecordValidator {
    fn validate(&self, schema: &SpecSchema, record: SpecRecord)
    -> Result<SpecRecord, ValidationErrors>;
}

impl<F> RecordValidator for F
where
    F: Fn(&SpecSchema, SpecRecord) -> Result<SpecRecord, ValidationErrors>,
{
    fn validate(
        &self,
        schema: &SpecSchema,
        record: SpecRecord,
    ) -> Result<SpecRecord, ValidationErrors> {
        self(schema, record)
    }
}

/// Validator that accepts every graph unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllValidator;

impl RecordValidator for AcceptAllValidator {
    fn validate(
        &self,
        _schema: &SpecSchema,
        record: SpecRecord,
    ) -> Result<SpecRecord, ValidationErrors> {
        Ok(record)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Import

/// Import with default options and no extra validation.
pub fn import(doc: &XlsxDocument, plan: &SpecLayoutPlan) -> Result<SpecRecord, ImportError> {
    import_with(doc, plan, &SpecXlsxImportOptions::default(), &AcceptAllValidator)
}

/// Import, then pass the graph through `validator`.
pub fn import_with(
    doc: &XlsxDocument,
    plan: &SpecLayoutPlan,
    options: &SpecXlsxImportOptions,
    validator: &dyn RecordValidator,
) -> Result<SpecRecord, ImportError> {
    let mut errors = ImportErrors::default();
    let mut l_decoded = Vec::with_capacity(plan.sheets.len());

    for sheet_plan in &plan.sheets {
        let Some(sheet) = doc.sheet(&sheet_plan.sheet_name) else {
            errors.structural.push(EnumStructuralError::MissingSheet {
                sheet: sheet_plan.sheet_name.clone(),
            });
            l_decoded.push(SpecDecodedSheet::default());
            continue;
        };
        l_decoded.push(decode_sheet(sheet, sheet_plan, options, &mut errors));
    }

    if !errors.is_empty() {
        tracing::info!(
            n_row_errors = errors.row_errors.len(),
            n_structural = errors.structural.len(),
            "import rejected before reassembly"
        );
        return Err(ImportError::Invalid(errors));
    }

    let mut reassembler = Reassembler {
        plan,
        l_sheets: l_decoded,
        l_cursors: vec![0; plan.sheets.len()],
        l_if_mismatched: vec![false; plan.sheets.len()],
        errors: Vec::new(),
    };
    let record = reassembler.reassemble_root();
    let l_structural = reassembler.finish();
    if !l_structural.is_empty() {
        return Err(ImportError::Invalid(ImportErrors {
            row_errors: Vec::new(),
            structural: l_structural,
        }));
    }

    tracing::info!(
        root = %plan.schema.root().name,
        n_sheets = plan.sheets.len(),
        "document imported"
    );
    validator
        .validate(&plan.schema, record)
        .map_err(ImportError::Validation)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RangeDiscovery

#[derive(Debug, Default)]
struct SpecDecodedRow {
    record: SpecRecord,
    /// Link counts aligned with `SpecSheetPlan::child_links`.
    l_counts: Vec<Option<usize>>,
}

#[derive(Debug, Default)]
struct SpecDecodedSheet {
    rows: Vec<SpecDecodedRow>,
    /// Data rows declared by the table range.
    n_rows_declared: Option<usize>,
}

/// Zero-based indices of the rows that hold data.
///
/// Every row inside the table range is data, even when all its cells are
/// absent. Past the table end, or without a table, rows whose planned cells
/// are all absent are skipped and the scan is bounded by the stored cells
/// even when the reported dimensions are larger.
pub fn discover_data_rows(sheet: &XlsxSheet, n_cols: usize) -> Vec<u32> {
    let (n_rows_reported, _) = sheet.dimensions();
    let (n_rows_stored, _) = sheet.stored_extent();
    let n_rows_bound = u32::min(n_rows_reported, n_rows_stored);
    if n_rows_reported > n_rows_bound {
        tracing::warn!(
            sheet = %sheet.name,
            n_rows_reported,
            n_rows_bound,
            "reported dimensions exceed stored cells; scan trimmed"
        );
    }

    let table = sheet.table_range();
    let n_row_header = table.map_or(N_ROW_HEADER, |t| t.row_first);
    let n_col_first = table.map_or(0, |t| t.col_first);

    let n_row_table_last = table.map(|t| t.row_last);
    let n_row_scan_end = n_row_table_last.map_or(n_rows_bound, |n_row_last| {
        u32::max(n_rows_bound, n_row_last.saturating_add(1))
    });

    let mut l_rows = Vec::new();
    let mut n_rows_skipped = 0usize;
    for n_row in (n_row_header + 1)..n_row_scan_end {
        if let Some(n_row_last) = n_row_table_last
            && n_row <= n_row_last
        {
            l_rows.push(n_row);
            continue;
        }
        let if_absent = (0..n_cols).all(|n_idx_col| {
            u16::try_from(n_idx_col)
                .ok()
                .and_then(|n| n_col_first.checked_add(n))
                .is_none_or(|n_col| is_absent(sheet.value(n_row, n_col)))
        });
        if if_absent {
            n_rows_skipped += 1;
        } else {
            l_rows.push(n_row);
        }
    }

    tracing::debug!(
        sheet = %sheet.name,
        n_rows_data = l_rows.len(),
        n_rows_skipped,
        if_table = table.is_some(),
        "data range discovered"
    );
    l_rows
}

fn validate_header(
    sheet: &XlsxSheet,
    sheet_plan: &SpecSheetPlan,
    options: &SpecXlsxImportOptions,
    errors: &mut ImportErrors,
) {
    let table = sheet.table_range();
    let n_row_header = table.map_or(N_ROW_HEADER, |t| t.row_first);
    let n_col_first = table.map_or(0, |t| t.col_first);

    let mut n_col_end = n_col_first;
    for (n_idx_col, column) in sheet_plan.columns.iter().enumerate() {
        let Some(n_col) = u16::try_from(n_idx_col)
            .ok()
            .and_then(|n| n_col_first.checked_add(n))
        else {
            break;
        };
        n_col_end = n_col.saturating_add(1);
        let c_found = derive_cell_text(sheet.value(n_row_header, n_col));
        if c_found.trim() != column.header {
            errors.structural.push(EnumStructuralError::HeaderMismatch {
                sheet: sheet_plan.sheet_name.clone(),
                column: n_col,
                expected: column.header.clone(),
                found: c_found,
            });
        }
    }

    if options.ignore_additional_columns {
        return;
    }
    let (_, n_cols_reported) = sheet.dimensions();
    for n_col in n_col_end..n_cols_reported {
        let cell = sheet.value(n_row_header, n_col);
        if !is_absent(cell) {
            errors.structural.push(EnumStructuralError::UnexpectedColumn {
                sheet: sheet_plan.sheet_name.clone(),
                column: n_col,
                header: derive_cell_text(cell),
            });
        }
    }
}

fn derive_cell_text(cell: &EnumCellValue) -> String {
    match cell {
        EnumCellValue::None => String::new(),
        EnumCellValue::String(c) => c.clone(),
        EnumCellValue::Number(x) | EnumCellValue::DateTime(x) => x.to_string(),
        EnumCellValue::Boolean(b) => b.to_string(),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RowDecoding

fn decode_sheet(
    sheet: &XlsxSheet,
    sheet_plan: &SpecSheetPlan,
    options: &SpecXlsxImportOptions,
    errors: &mut ImportErrors,
) -> SpecDecodedSheet {
    validate_header(sheet, sheet_plan, options, errors);

    let table = sheet.table_range();
    let n_col_first = table.map_or(0, |t| t.col_first);
    let l_rows = discover_data_rows(sheet, sheet_plan.columns.len());

    let mut decoded = SpecDecodedSheet {
        rows: Vec::with_capacity(l_rows.len()),
        n_rows_declared: table.map(|t| t.height().saturating_sub(1) as usize),
    };
    for n_row in l_rows {
        let mut decoder = RowDecoder {
            sheet,
            columns: &sheet_plan.columns,
            n_row,
            n_col_first,
            n_cursor: 0,
            l_counts: Vec::with_capacity(sheet_plan.child_links.len()),
            l_errors: Vec::new(),
        };
        let record = decoder.decode_record(&sheet_plan.record, &[]);
        if decoder.l_errors.is_empty() {
            decoded.rows.push(SpecDecodedRow {
                record,
                l_counts: decoder.l_counts,
            });
        } else {
            errors.row_errors.push(RowErrors {
                sheet: sheet_plan.sheet_name.clone(),
                row: n_row,
                errors: decoder.l_errors,
            });
        }
    }
    decoded
}

/// Walks one record schema in column order, consuming one column per leaf and
/// per collection field.
struct RowDecoder<'a> {
    sheet: &'a XlsxSheet,
    columns: &'a [SpecColumnPlan],
    n_row: u32,
    n_col_first: u16,
    n_cursor: usize,
    l_counts: Vec<Option<usize>>,
    l_errors: Vec<FieldError>,
}

impl<'a> RowDecoder<'a> {
    fn cell(&self, n_idx_col: usize) -> &'a EnumCellValue {
        static VALUE_NONE: EnumCellValue = EnumCellValue::None;
        match u16::try_from(n_idx_col)
            .ok()
            .and_then(|n| self.n_col_first.checked_add(n))
        {
            Some(n_col) => self.sheet.value(self.n_row, n_col),
            None => &VALUE_NONE,
        }
    }

    fn decode_record(&mut self, schema: &SpecRecordSchema, path_prefix: &[String]) -> SpecRecord {
        let mut record = SpecRecord::new(schema.name.clone());
        for field in &schema.fields {
            let mut l_path = path_prefix.to_vec();
            l_path.push(field.name.clone());

            let value = match &field.kind {
                EnumFieldKind::Scalar(_) | EnumFieldKind::Enumeration(_) => {
                    let result = decode(self.cell(self.n_cursor), field);
                    self.n_cursor += 1;
                    result.unwrap_or_else(|error| {
                        self.push_error(&l_path, error);
                        EnumFieldValue::Null
                    })
                }
                EnumFieldKind::NestedRecord(nested) => {
                    let columns = self.columns;
                    let n_span = columns[self.n_cursor..]
                        .iter()
                        .take_while(|c| c.path.starts_with(&l_path))
                        .count();
                    let if_all_absent = (self.n_cursor..self.n_cursor + n_span)
                        .all(|n_idx_col| is_absent(self.cell(n_idx_col)));
                    if !field.required && if_all_absent {
                        for column in &columns[self.n_cursor..self.n_cursor + n_span] {
                            if matches!(column.kind, EnumColumnKind::LinkCount { .. }) {
                                self.l_counts.push(None);
                            }
                        }
                        self.n_cursor += n_span;
                        field.default.clone().unwrap_or(EnumFieldValue::Null)
                    } else {
                        EnumFieldValue::Record(self.decode_record(nested, &l_path))
                    }
                }
                EnumFieldKind::CollectionOfRecord(_) => {
                    let cell = self.cell(self.n_cursor);
                    self.n_cursor += 1;
                    if is_absent(cell) {
                        self.l_counts.push(None);
                        if field.required {
                            self.push_error(&l_path, CodecError::MissingRequiredField);
                        }
                        field.default.clone().unwrap_or(EnumFieldValue::Null)
                    } else {
                        match decode_count(cell) {
                            Ok(n_count) => {
                                self.l_counts.push(Some(n_count));
                                EnumFieldValue::List(Vec::new())
                            }
                            Err(error) => {
                                self.l_counts.push(None);
                                self.push_error(&l_path, error);
                                EnumFieldValue::Null
                            }
                        }
                    }
                }
            };
            record.set(field.name.clone(), value);
        }
        record
    }

    fn push_error(&mut self, path: &[String], error: CodecError) {
        self.l_errors.push(FieldError {
            field: path.join("."),
            error,
        });
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Reassembly

struct Reassembler<'a> {
    plan: &'a SpecLayoutPlan,
    l_sheets: Vec<SpecDecodedSheet>,
    l_cursors: Vec<usize>,
    l_if_mismatched: Vec<bool>,
    errors: Vec<EnumStructuralError>,
}

impl Reassembler<'_> {
    fn reassemble_root(&mut self) -> SpecRecord {
        let plan = self.plan;
        let root = plan.schema.root();

        if let Some(n_sheet) = plan.root_sheet {
            return match self.take_record(n_sheet) {
                Some(record) => record,
                None => {
                    self.errors.push(EnumStructuralError::MissingRootRow {
                        sheet: plan.sheets[n_sheet].sheet_name.clone(),
                    });
                    SpecRecord::new(root.name.clone())
                }
            };
        }

        let mut record = SpecRecord::new(root.name.clone());
        for n_link in &plan.root_links {
            let link = &plan.links[*n_link];
            let decoded = &self.l_sheets[link.child_sheet];
            let n_expected = decoded.n_rows_declared.unwrap_or(decoded.rows.len());
            let l_children = self.take_children(*n_link, n_expected, &root.name);
            record.set(link.field.name.clone(), EnumFieldValue::List(l_children));
        }
        record
    }

    /// Consume the next row of `n_sheet` together with all rows it links.
    fn take_record(&mut self, n_sheet: usize) -> Option<SpecRecord> {
        let plan = self.plan;
        let n_cursor = self.l_cursors[n_sheet];
        let row = self.l_sheets[n_sheet].rows.get_mut(n_cursor)?;
        let mut record = std::mem::take(&mut row.record);
        let l_counts = std::mem::take(&mut row.l_counts);
        self.l_cursors[n_sheet] += 1;

        let sheet_plan = &plan.sheets[n_sheet];
        for (n_link, n_count) in sheet_plan.child_links.iter().zip(l_counts) {
            let Some(n_count) = n_count else {
                continue;
            };
            let l_children = self.take_children(*n_link, n_count, &sheet_plan.sheet_name);
            set_value_at_path(
                &mut record,
                &plan.links[*n_link].field_path,
                EnumFieldValue::List(l_children),
            );
        }
        Some(record)
    }

    fn take_children(&mut self, n_link: usize, n_expected: usize, parent_label: &str) -> Vec<SpecRecord> {
        let plan = self.plan;
        let link = &plan.links[n_link];
        let n_child = link.child_sheet;
        let n_available = self.l_sheets[n_child].rows.len() - self.l_cursors[n_child];

        let mut n_take = n_expected;
        if n_expected > n_available {
            self.errors.push(EnumStructuralError::LinkCountMismatch {
                parent_sheet: parent_label.to_string(),
                child_sheet: plan.sheets[n_child].sheet_name.clone(),
                field: link.field_label(),
                expected: n_expected,
                found: n_available,
            });
            self.l_if_mismatched[n_child] = true;
            n_take = n_available;
        }

        (0..n_take).filter_map(|_| self.take_record(n_child)).collect()
    }

    fn finish(mut self) -> Vec<EnumStructuralError> {
        for (n_sheet, decoded) in self.l_sheets.iter().enumerate() {
            let n_left = decoded.rows.len() - self.l_cursors[n_sheet];
            if n_left > 0 && !self.l_if_mismatched[n_sheet] {
                self.errors.push(EnumStructuralError::UnconsumedRows {
                    sheet: self.plan.sheets[n_sheet].sheet_name.clone(),
                    n_rows: n_left,
                });
            }
        }
        self.errors
    }
}

/// Store `value` at `path`, descending through nested records. Paths through a
/// null nested record are dropped.
fn set_value_at_path(record: &mut SpecRecord, path: &[String], value: EnumFieldValue) {
    let Some((c_last, l_parents)) = path.split_last() else {
        return;
    };
    let mut record_current = record;
    for c_name in l_parents {
        match record_current.fields.get_mut(c_name) {
            Some(EnumFieldValue::Record(nested)) => record_current = nested,
            _ => return,
        }
    }
    record_current.set(c_last.clone(), value);
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::composition::compose_definition;
    use crate::money::SpecCurrency;
    use crate::schema::{
        EnumTypeDefinition, SpecEnumDefinition, SpecFieldDefinition, SpecRecordDefinition,
        SpecSchemaDefinition,
    };
    use crate::spec::{SpecCellFormat, SpecCellRange, SpecXlsxDocumentConfig};
    use crate::writer::export;

    fn derive_invoice_definition() -> SpecSchemaDefinition {
        SpecSchemaDefinition::new()
            .enumeration(
                SpecEnumDefinition::new("Unit")
                    .variant("Piece", "pcs")
                    .variant("Hour", "h"),
            )
            .record(
                SpecRecordDefinition::new("Address")
                    .field(SpecFieldDefinition::new("street", EnumTypeDefinition::text()))
                    .field(SpecFieldDefinition::new(
                        "zip",
                        EnumTypeDefinition::optional(EnumTypeDefinition::integer()),
                    )),
            )
            .record(
                SpecRecordDefinition::new("Line")
                    .field(SpecFieldDefinition::new("sku", EnumTypeDefinition::text()))
                    .field(SpecFieldDefinition::new("qty", EnumTypeDefinition::integer()))
                    .field(SpecFieldDefinition::new(
                        "unit",
                        EnumTypeDefinition::enumeration("Unit"),
                    ))
                    .field(SpecFieldDefinition::new(
                        "price",
                        EnumTypeDefinition::money(SpecCurrency::euro()),
                    ))
                    .field(
                        SpecFieldDefinition::new("note", EnumTypeDefinition::text())
                            .optional()
                            .default_value(EnumFieldValue::text("-")),
                    ),
            )
            .record(
                SpecRecordDefinition::new("Invoice")
                    .field(SpecFieldDefinition::new("number", EnumTypeDefinition::text()))
                    .field(SpecFieldDefinition::new("issued", EnumTypeDefinition::date()))
                    .field(SpecFieldDefinition::new(
                        "billing",
                        EnumTypeDefinition::record("Address"),
                    ))
                    .field(SpecFieldDefinition::new(
                        "shipping",
                        EnumTypeDefinition::optional(EnumTypeDefinition::record("Address")),
                    ))
                    .field(SpecFieldDefinition::new(
                        "lines",
                        EnumTypeDefinition::list(EnumTypeDefinition::record("Line")),
                    ))
                    .field(SpecFieldDefinition::new(
                        "extras",
                        EnumTypeDefinition::optional(EnumTypeDefinition::list(
                            EnumTypeDefinition::record("Line"),
                        )),
                    )),
            )
    }

    fn create_line(sku: &str, qty: i64) -> SpecRecord {
        SpecRecord::new("Line")
            .with("sku", sku)
            .with("qty", qty)
            .with("unit", EnumFieldValue::enumeration("pcs"))
            .with("price", EnumFieldValue::Money(12_345))
            .with("note", format!("note {sku}"))
    }

    fn create_invoice() -> SpecRecord {
        SpecRecord::new("Invoice")
            .with("number", "INV-7")
            .with("issued", NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
            .with(
                "billing",
                SpecRecord::new("Address")
                    .with("street", "Main 1")
                    .with("zip", 8000_i64),
            )
            .with("shipping", EnumFieldValue::Null)
            .with(
                "lines",
                vec![create_line("A", 1), create_line("B", 2), create_line("C", 3)],
            )
            .with("extras", vec![create_line("X", 9)])
    }

    fn derive_invoice_doc() -> (SpecLayoutPlan, XlsxDocument) {
        let plan = compose_definition(&derive_invoice_definition(), "Invoice").unwrap();
        let doc = export(&create_invoice(), &plan, &SpecXlsxDocumentConfig::default()).unwrap();
        (plan, doc)
    }

    fn derive_import_errors(result: Result<SpecRecord, ImportError>) -> ImportErrors {
        match result {
            Err(ImportError::Invalid(errors)) => errors,
            other => panic!("expected invalid import, got {other:?}"),
        }
    }

    #[test]
    fn test_collection_round_trip_preserves_graph() {
        let (plan, doc) = derive_invoice_doc();
        assert_eq!(import(&doc, &plan).unwrap(), create_invoice());
    }

    #[test]
    fn test_single_model_round_trip() {
        let definition = derive_invoice_definition();
        let plan = compose_definition(&definition, "Address").unwrap();
        let record = SpecRecord::new("Address")
            .with("street", "Side 2")
            .with("zip", EnumFieldValue::Null);

        let doc = export(&record, &plan, &SpecXlsxDocumentConfig::default()).unwrap();
        assert_eq!(import(&doc, &plan).unwrap(), record);
    }

    #[test]
    fn test_root_collection_round_trip() {
        let definition = derive_invoice_definition().record(
            SpecRecordDefinition::new("LineBook").field(SpecFieldDefinition::new(
                "entries",
                EnumTypeDefinition::list(EnumTypeDefinition::record("Line")),
            )),
        );
        let plan = compose_definition(&definition, "LineBook").unwrap();
        let record = SpecRecord::new("LineBook").with(
            "entries",
            vec![create_line("P", 5), create_line("Q", 6)],
        );

        let doc = export(&record, &plan, &SpecXlsxDocumentConfig::default()).unwrap();
        assert_eq!(doc.sheet_names(), vec!["Line"]);
        assert_eq!(import(&doc, &plan).unwrap(), record);
    }

    #[test]
    fn test_inflated_dimensions_scan_only_real_rows() {
        let definition = derive_invoice_definition().record(
            SpecRecordDefinition::new("LineBook").field(SpecFieldDefinition::new(
                "entries",
                EnumTypeDefinition::list(EnumTypeDefinition::record("Line")),
            )),
        );
        let plan = compose_definition(&definition, "LineBook").unwrap();
        let record = SpecRecord::new("LineBook").with(
            "entries",
            vec![create_line("P", 5), create_line("Q", 6)],
        );
        let mut doc = export(&record, &plan, &SpecXlsxDocumentConfig::default()).unwrap();

        let sheet = doc.sheet_mut("Line").unwrap();
        sheet.set_dimension_hint(10_000, 5);
        assert_eq!(discover_data_rows(sheet, 5), vec![1, 2]);
        assert_eq!(import(&doc, &plan).unwrap(), record);
    }

    #[test]
    fn test_styled_blank_rows_without_table_are_trimmed() {
        let definition = derive_invoice_definition();
        let plan = compose_definition(&definition, "Address").unwrap();
        let record = SpecRecord::new("Address").with("street", "Side 2").with("zip", 3000_i64);
        let doc_exported = export(&record, &plan, &SpecXlsxDocumentConfig::default()).unwrap();

        // Rebuild the sheet without a table range and with formatting-only rows.
        let mut sheet = XlsxSheet::new("Address");
        for (cell_ref, cell) in doc_exported.sheet("Address").unwrap().cells() {
            sheet.set_cell(cell_ref.row, cell_ref.col, cell.value.clone(), cell.format.clone());
        }
        let fmt_stale = SpecCellFormat {
            bg_color: Some("#FFFF00".to_string()),
            ..Default::default()
        };
        for n_row in 2..10_000 {
            sheet.set_cell(n_row, 0, EnumCellValue::None, Some(fmt_stale.clone()));
        }
        sheet.set_cell(5_000, 1, EnumCellValue::String("  ".into()), None);
        let doc = XlsxDocument {
            sheets: vec![sheet],
            ..Default::default()
        };

        assert_eq!(discover_data_rows(&doc.sheets[0], 2), vec![1]);
        assert_eq!(import(&doc, &plan).unwrap(), record);
    }

    #[test]
    fn test_required_empty_cell_reports_missing_field_and_optional_uses_default() {
        let (plan, mut doc) = derive_invoice_doc();
        let sheet = doc.sheet_mut("Line").unwrap();
        sheet.remove_cell(2, 1);
        sheet.remove_cell(3, 4);

        let errors = derive_import_errors(import(&doc, &plan));
        assert_eq!(
            errors.row_errors,
            vec![RowErrors {
                sheet: "Line".to_string(),
                row: 2,
                errors: vec![FieldError {
                    field: "qty".to_string(),
                    error: CodecError::MissingRequiredField,
                }],
            }]
        );

        doc.sheet_mut("Line")
            .unwrap()
            .set_cell(2, 1, EnumCellValue::Number(2.0), None);
        let record = import(&doc, &plan).unwrap();
        let l_lines = record.get_list("lines").unwrap();
        assert_eq!(l_lines[2].get("note"), Some(&EnumFieldValue::text("-")));
    }

    #[test]
    fn test_link_order_is_preserved_and_truncation_is_structural() {
        let (plan, mut doc) = derive_invoice_doc();
        let record = import(&doc, &plan).unwrap();
        let l_skus: Vec<&str> = record
            .get_list("lines")
            .unwrap()
            .iter()
            .filter_map(|line| line.get_str("sku"))
            .collect();
        assert_eq!(l_skus, vec!["A", "B", "C"]);

        // Line sheet rows: A, B, C (lines) then X (extras). Drop the last two
        // together with their table rows.
        let sheet = doc.sheet_mut("Line").unwrap();
        sheet.clear_rows(3, 4);
        let c_table = sheet.table_name().map(str::to_string);
        let range = sheet.table_range().unwrap();
        sheet.set_table_range(
            SpecCellRange {
                row_last: 2,
                ..range
            },
            c_table,
        );

        let errors = derive_import_errors(import(&doc, &plan));
        assert!(errors.row_errors.is_empty());
        assert_eq!(
            errors.structural,
            vec![
                EnumStructuralError::LinkCountMismatch {
                    parent_sheet: "Invoice".to_string(),
                    child_sheet: "Line".to_string(),
                    field: "lines".to_string(),
                    expected: 3,
                    found: 2,
                },
                EnumStructuralError::LinkCountMismatch {
                    parent_sheet: "Invoice".to_string(),
                    child_sheet: "Line".to_string(),
                    field: "extras".to_string(),
                    expected: 1,
                    found: 0,
                },
            ]
        );
    }

    #[test]
    fn test_blank_rows_inside_table_are_decoded_not_dropped() {
        let (plan, mut doc) = derive_invoice_doc();
        let sheet = doc.sheet_mut("Line").unwrap();
        sheet.clear_rows(3, 4);
        assert_eq!(discover_data_rows(sheet, 5), vec![1, 2, 3, 4]);

        let errors = derive_import_errors(import(&doc, &plan));
        assert!(errors.structural.is_empty());
        let l_rows: Vec<u32> = errors.row_errors.iter().map(|r| r.row).collect();
        assert_eq!(l_rows, vec![3, 4]);
        assert_eq!(
            errors.row_errors[0].errors[0],
            FieldError {
                field: "sku".to_string(),
                error: CodecError::MissingRequiredField,
            }
        );
    }

    fn derive_note_definition() -> SpecSchemaDefinition {
        SpecSchemaDefinition::new()
            .record(SpecRecordDefinition::new("Note").field(SpecFieldDefinition::new(
                "text",
                EnumTypeDefinition::optional(EnumTypeDefinition::text()),
            )))
            .record(
                SpecRecordDefinition::new("Pad")
                    .field(SpecFieldDefinition::new("title", EnumTypeDefinition::text()))
                    .field(SpecFieldDefinition::new(
                        "notes",
                        EnumTypeDefinition::list(EnumTypeDefinition::record("Note")),
                    )),
            )
            .record(SpecRecordDefinition::new("NoteBook").field(SpecFieldDefinition::new(
                "notes",
                EnumTypeDefinition::list(EnumTypeDefinition::record("Note")),
            )))
    }

    fn create_note(text: impl Into<EnumFieldValue>) -> SpecRecord {
        SpecRecord::new("Note").with("text", text)
    }

    #[test]
    fn test_single_model_with_all_null_fields_round_trips() {
        let plan = compose_definition(&derive_note_definition(), "Note").unwrap();
        let record = create_note(EnumFieldValue::Null);

        let doc = export(&record, &plan, &SpecXlsxDocumentConfig::default()).unwrap();
        assert_eq!(import(&doc, &plan).unwrap(), record);
    }

    #[test]
    fn test_all_null_child_rows_keep_their_link_position() {
        let plan = compose_definition(&derive_note_definition(), "Pad").unwrap();
        let record = SpecRecord::new("Pad").with("title", "todo").with(
            "notes",
            vec![
                create_note("a"),
                create_note(EnumFieldValue::Null),
                create_note("c"),
            ],
        );

        let doc = export(&record, &plan, &SpecXlsxDocumentConfig::default()).unwrap();
        assert_eq!(import(&doc, &plan).unwrap(), record);
    }

    #[test]
    fn test_implicit_root_of_all_null_rows_round_trips() {
        let plan = compose_definition(&derive_note_definition(), "NoteBook").unwrap();
        let record = SpecRecord::new("NoteBook").with(
            "notes",
            vec![create_note(EnumFieldValue::Null), create_note(EnumFieldValue::Null)],
        );

        let doc = export(&record, &plan, &SpecXlsxDocumentConfig::default()).unwrap();
        assert_eq!(doc.sheet_names(), vec!["Note"]);
        assert_eq!(discover_data_rows(doc.sheet("Note").unwrap(), 1), vec![1, 2]);
        assert_eq!(import(&doc, &plan).unwrap(), record);
    }

    #[test]
    fn test_inverted_table_range_reads_no_rows() {
        let plan = compose_definition(&derive_note_definition(), "NoteBook").unwrap();
        let record = SpecRecord::new("NoteBook").with("notes", vec![create_note("a")]);
        let mut doc = export(&record, &plan, &SpecXlsxDocumentConfig::default()).unwrap();

        let sheet = doc.sheet_mut("Note").unwrap();
        sheet.remove_cell(1, 0);
        sheet.set_table_range(
            SpecCellRange {
                row_first: 4,
                col_first: 0,
                row_last: 2,
                col_last: 0,
            },
            None,
        );
        assert!(discover_data_rows(sheet, 1).is_empty());
    }

    #[test]
    fn test_value_outside_enum_is_unknown_variant() {
        let (plan, mut doc) = derive_invoice_doc();
        doc.sheet_mut("Line")
            .unwrap()
            .set_cell(1, 2, EnumCellValue::String("Piece".into()), None);

        let errors = derive_import_errors(import(&doc, &plan));
        assert_eq!(errors.row_errors.len(), 1);
        assert!(matches!(
            errors.row_errors[0].errors[0].error,
            CodecError::UnknownVariant { .. }
        ));
    }

    #[test]
    fn test_all_invalid_rows_are_reported_in_one_pass() {
        let (plan, mut doc) = derive_invoice_doc();
        let sheet_line = doc.sheet_mut("Line").unwrap();
        sheet_line.set_cell(1, 1, EnumCellValue::String("one".into()), None);
        sheet_line.set_cell(3, 3, EnumCellValue::Boolean(true), None);
        doc.sheet_mut("Invoice")
            .unwrap()
            .set_cell(1, 1, EnumCellValue::String("someday".into()), None);

        let errors = derive_import_errors(import(&doc, &plan));
        let l_positions: Vec<(&str, u32)> = errors
            .row_errors
            .iter()
            .map(|r| (r.sheet.as_str(), r.row))
            .collect();
        assert_eq!(l_positions, vec![("Invoice", 1), ("Line", 1), ("Line", 3)]);
    }

    #[test]
    fn test_header_mismatch_and_unexpected_column() {
        let (plan, mut doc) = derive_invoice_doc();
        let sheet = doc.sheet_mut("Line").unwrap();
        sheet.set_cell(0, 1, EnumCellValue::String("quantity".into()), None);
        sheet.set_cell(0, 7, EnumCellValue::String("comment".into()), None);

        let errors = derive_import_errors(import(&doc, &plan));
        assert_eq!(
            errors.structural,
            vec![
                EnumStructuralError::HeaderMismatch {
                    sheet: "Line".to_string(),
                    column: 1,
                    expected: "qty".to_string(),
                    found: "quantity".to_string(),
                },
                EnumStructuralError::UnexpectedColumn {
                    sheet: "Line".to_string(),
                    column: 7,
                    header: "comment".to_string(),
                },
            ]
        );

        doc.sheet_mut("Line")
            .unwrap()
            .set_cell(0, 1, EnumCellValue::String("qty".into()), None);
        let options = SpecXlsxImportOptions {
            ignore_additional_columns: true,
        };
        assert!(import_with(&doc, &plan, &options, &AcceptAllValidator).is_ok());
    }

    #[test]
    fn test_missing_sheet_is_structural() {
        let (plan, mut doc) = derive_invoice_doc();
        doc.sheets.retain(|s| s.name != "Line");

        let errors = derive_import_errors(import(&doc, &plan));
        assert_eq!(
            errors.structural,
            vec![EnumStructuralError::MissingSheet {
                sheet: "Line".to_string()
            }]
        );
    }

    #[test]
    fn test_rows_beyond_implicit_root_table_are_unconsumed() {
        let definition = derive_invoice_definition().record(
            SpecRecordDefinition::new("LineBook").field(SpecFieldDefinition::new(
                "entries",
                EnumTypeDefinition::list(EnumTypeDefinition::record("Line")),
            )),
        );
        let plan = compose_definition(&definition, "LineBook").unwrap();
        let record = SpecRecord::new("LineBook").with("entries", vec![create_line("P", 5)]);
        let mut doc = export(&record, &plan, &SpecXlsxDocumentConfig::default()).unwrap();

        let sheet = doc.sheet_mut("Line").unwrap();
        for (n_col, value) in [
            EnumCellValue::String("R".into()),
            EnumCellValue::Number(1.0),
            EnumCellValue::String("h".into()),
            EnumCellValue::Number(2.5),
        ]
        .into_iter()
        .enumerate()
        {
            sheet.set_cell(2, n_col as u16, value, None);
        }

        let errors = derive_import_errors(import(&doc, &plan));
        assert_eq!(
            errors.structural,
            vec![EnumStructuralError::UnconsumedRows {
                sheet: "Line".to_string(),
                n_rows: 1
            }]
        );
    }

    #[test]
    fn test_validator_errors_pass_through() {
        let (plan, doc) = derive_invoice_doc();
        let validator = |_schema: &SpecSchema, record: SpecRecord| {
            let n_lines = record.get_list("lines").map_or(0, <[SpecRecord]>::len);
            if n_lines > 2 {
                return Err(ValidationErrors::single("lines", "at most 2 lines allowed"));
            }
            Ok(record)
        };

        match import_with(&doc, &plan, &SpecXlsxImportOptions::default(), &validator) {
            Err(ImportError::Validation(errors)) => {
                assert_eq!(errors.issues[0].path, "lines");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
