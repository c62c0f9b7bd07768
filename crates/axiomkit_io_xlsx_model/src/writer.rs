//! Document writer: record graph plus layout plan to an [`XlsxDocument`].

use crate::codec::{derive_field_validation_values, derive_field_num_format, encode};
use crate::composition::{EnumColumnKind, SpecLayoutPlan, SpecSheetPlan};
use crate::conf::{
    C_NUM_FORMAT_LINK_COUNT, N_LEN_EXCEL_LIST_VALIDATION_MAX, N_NROWS_EXCEL_MAX, N_ROW_HEADER,
};
use crate::document::{XlsxDocument, XlsxSheet};
use crate::error::{CodecError, ExportError};
use crate::schema::{EnumFieldKind, SpecRecordSchema};
use crate::spec::{
    EnumAutofitColumnsRule, EnumCellValue, SpecAutofitCellsPolicy, SpecCellFormat,
    SpecCellRange, SpecCellRef, SpecDataValidation, SpecPrintSettings, SpecSheetSummary,
    SpecXlsxDocumentConfig, SpecXlsxReport,
};
use crate::util::{
    cast_col_num, cast_row_num, estimate_unicode_string_width, estimate_width_len, parse_a1_ref,
    parse_column_span, parse_row_span,
};
use crate::value::{EnumFieldValue, SpecRecord};

static VALUE_NULL: EnumFieldValue = EnumFieldValue::Null;

/// Write a record graph into a new document.
///
/// Pure function of its inputs. Any encoding failure aborts the whole export
/// and names the failing field path, e.g. `Invoice.lines[2].qty`.
pub fn export(
    record: &SpecRecord,
    plan: &SpecLayoutPlan,
    config: &SpecXlsxDocumentConfig,
) -> Result<XlsxDocument, ExportError> {
    validate_policy_autofit(&config.policy_autofit)?;
    let cell_freeze = derive_freeze_cell(config)?;
    let print = derive_print_settings(config, cell_freeze)?;

    let root = plan.schema.root();
    if record.type_name != root.name {
        return Err(ExportError::ShapeMismatch {
            path: record.type_name.clone(),
            expected: format!("record `{}`", root.name),
        });
    }

    let mut emitter = RowEmitter {
        plan,
        l_rows_by_sheet: vec![Vec::new(); plan.sheets.len()],
    };
    match plan.root_sheet {
        Some(n_sheet) => emitter.emit_record(n_sheet, record, &root.name)?,
        None => emitter.emit_implicit_root(record, root)?,
    }

    let mut report = SpecXlsxReport::default();
    let mut doc = XlsxDocument::new();
    for (sheet_plan, l_rows) in plan.sheets.iter().zip(&emitter.l_rows_by_sheet) {
        let sheet = doc.add_sheet(sheet_plan.sheet_name.clone());
        write_sheet(sheet, sheet_plan, l_rows, config, cell_freeze, &print, &mut report)?;
        report.sheets.push(SpecSheetSummary {
            sheet_name: sheet_plan.sheet_name.clone(),
            n_rows_data: l_rows.len(),
            n_cols: sheet_plan.columns.len(),
        });
    }

    tracing::info!(
        root = %root.name,
        n_sheets = report.sheets.len(),
        n_rows_data = report.sheets.iter().map(|s| s.n_rows_data).sum::<usize>(),
        n_warnings = report.warnings.len(),
        "document exported"
    );
    doc.report = report;
    Ok(doc)
}

////////////////////////////////////////////////////////////////////////////////
// #region RowEmission

struct RowEmitter<'a> {
    plan: &'a SpecLayoutPlan,
    l_rows_by_sheet: Vec<Vec<Vec<EnumCellValue>>>,
}

impl RowEmitter<'_> {
    /// Append `record` to its sheet, then its children link by link (pre-order).
    fn emit_record(
        &mut self,
        n_sheet: usize,
        record: &SpecRecord,
        c_path: &str,
    ) -> Result<(), ExportError> {
        let plan = self.plan;
        let sheet_plan = &plan.sheets[n_sheet];
        if record.type_name != sheet_plan.record.name {
            return Err(ExportError::ShapeMismatch {
                path: c_path.to_string(),
                expected: format!("record `{}`", sheet_plan.record.name),
            });
        }

        let mut l_row = Vec::with_capacity(sheet_plan.columns.len());
        for column in &sheet_plan.columns {
            let c_path_leaf = format!("{c_path}.{}", column.path.join("."));
            let value = resolve_field_value(record, &sheet_plan.record, &column.path, c_path)?;
            let cell = match &column.kind {
                EnumColumnKind::Value(field) => match value {
                    None => EnumCellValue::None,
                    Some(v) => encode(v, field).map_err(|source| ExportError::Field {
                        path: c_path_leaf,
                        source,
                    })?,
                },
                EnumColumnKind::LinkCount { link } => {
                    let field = &plan.links[*link].field;
                    match value {
                        None => EnumCellValue::None,
                        Some(EnumFieldValue::Null) if field.required => {
                            return Err(ExportError::Field {
                                path: c_path_leaf,
                                source: CodecError::MissingRequiredField,
                            });
                        }
                        Some(EnumFieldValue::Null) => EnumCellValue::None,
                        Some(EnumFieldValue::List(l_children)) => {
                            EnumCellValue::Number(l_children.len() as f64)
                        }
                        Some(_) => {
                            return Err(ExportError::ShapeMismatch {
                                path: c_path_leaf,
                                expected: "list of records".to_string(),
                            });
                        }
                    }
                }
            };
            l_row.push(cell);
        }
        self.push_row(n_sheet, l_row)?;

        for n_link in &sheet_plan.child_links {
            let link = &plan.links[*n_link];
            let value = resolve_field_value(record, &sheet_plan.record, &link.field_path, c_path)?;
            if let Some(EnumFieldValue::List(l_children)) = value {
                let c_label = link.field_label();
                for (n_idx, child) in l_children.iter().enumerate() {
                    self.emit_record(link.child_sheet, child, &format!("{c_path}.{c_label}[{n_idx}]"))?;
                }
            }
        }
        Ok(())
    }

    fn emit_implicit_root(
        &mut self,
        record: &SpecRecord,
        root: &SpecRecordSchema,
    ) -> Result<(), ExportError> {
        let plan = self.plan;
        for n_link in &plan.root_links {
            let link = &plan.links[*n_link];
            let c_label = link.field_label();
            let c_path_field = format!("{}.{c_label}", root.name);
            match record.get(&link.field.name).unwrap_or(&VALUE_NULL) {
                EnumFieldValue::List(l_children) => {
                    for (n_idx, child) in l_children.iter().enumerate() {
                        self.emit_record(link.child_sheet, child, &format!("{c_path_field}[{n_idx}]"))?;
                    }
                }
                EnumFieldValue::Null if link.field.required => {
                    return Err(ExportError::Field {
                        path: c_path_field,
                        source: CodecError::MissingRequiredField,
                    });
                }
                EnumFieldValue::Null => {}
                _ => {
                    return Err(ExportError::ShapeMismatch {
                        path: c_path_field,
                        expected: "list of records".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn push_row(&mut self, n_sheet: usize, l_row: Vec<EnumCellValue>) -> Result<(), ExportError> {
        let l_rows = &mut self.l_rows_by_sheet[n_sheet];
        let n_rows_total = l_rows.len() + 2;
        if n_rows_total > N_NROWS_EXCEL_MAX {
            return Err(ExportError::SheetOverflow {
                sheet: self.plan.sheets[n_sheet].sheet_name.clone(),
                n_rows: n_rows_total,
            });
        }
        l_rows.push(l_row);
        Ok(())
    }
}

/// Follow `path` through nested records.
///
/// Returns `None` when an optional nested record on the way is null, so its
/// columns are left blank. Missing fields read as null.
fn resolve_field_value<'a>(
    record: &'a SpecRecord,
    schema: &SpecRecordSchema,
    path: &[String],
    c_path: &str,
) -> Result<Option<&'a EnumFieldValue>, ExportError> {
    let mut record_current = record;
    let mut schema_current = schema;
    let mut c_path_current = c_path.to_string();

    for (n_idx, c_name) in path.iter().enumerate() {
        let value = record_current.get(c_name).unwrap_or(&VALUE_NULL);
        if n_idx + 1 == path.len() {
            return Ok(Some(value));
        }
        c_path_current = format!("{c_path_current}.{c_name}");

        let Some(field) = schema_current.field(c_name) else {
            return Err(ExportError::ShapeMismatch {
                path: c_path_current,
                expected: format!("field of `{}`", schema_current.name),
            });
        };
        let EnumFieldKind::NestedRecord(nested_schema) = &field.kind else {
            return Err(ExportError::ShapeMismatch {
                path: c_path_current,
                expected: "nested record".to_string(),
            });
        };
        match value {
            EnumFieldValue::Record(nested) if nested.type_name == nested_schema.name => {
                record_current = nested;
                schema_current = nested_schema;
            }
            EnumFieldValue::Null if field.required => {
                return Err(ExportError::Field {
                    path: c_path_current,
                    source: CodecError::MissingRequiredField,
                });
            }
            EnumFieldValue::Null => return Ok(None),
            _ => {
                return Err(ExportError::ShapeMismatch {
                    path: c_path_current,
                    expected: format!("record `{}`", nested_schema.name),
                });
            }
        }
    }
    Ok(None)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetWriting

fn write_sheet(
    sheet: &mut XlsxSheet,
    sheet_plan: &SpecSheetPlan,
    l_rows: &[Vec<EnumCellValue>],
    config: &SpecXlsxDocumentConfig,
    cell_freeze: Option<SpecCellRef>,
    print: &SpecPrintSettings,
    report: &mut SpecXlsxReport,
) -> Result<(), ExportError> {
    let n_cols = sheet_plan.columns.len();
    let fmt_header = derive_header_format(config);
    let l_fmt_by_col = plan_column_formats(sheet_plan, config);

    let mut l_width_by_col_header = vec![0usize; n_cols];
    let mut l_width_by_col_body = vec![0usize; n_cols];
    let policy_autofit = &config.policy_autofit;
    let if_autofit_columns = !matches!(policy_autofit.rule_columns, EnumAutofitColumnsRule::None);

    for (n_idx_col, column) in sheet_plan.columns.iter().enumerate() {
        let n_col = cast_col_num(n_idx_col).map_err(derive_document_error)?;
        sheet.set_cell(
            N_ROW_HEADER,
            n_col,
            EnumCellValue::String(column.header.clone()),
            Some(fmt_header.clone()),
        );
        if if_autofit_columns {
            l_width_by_col_header[n_idx_col] = estimate_unicode_string_width(&column.header);
        }
    }

    let n_rows_body_inferred_max = policy_autofit.height_body_inferred_max.unwrap_or(usize::MAX);
    for (n_idx_row, l_row) in l_rows.iter().enumerate() {
        let n_row = cast_row_num(n_idx_row + 1).map_err(derive_document_error)?;
        for (n_idx_col, value) in l_row.iter().enumerate() {
            if matches!(value, EnumCellValue::None) {
                continue;
            }
            let fmt_col = &l_fmt_by_col[n_idx_col];
            if if_autofit_columns && n_idx_row < n_rows_body_inferred_max {
                l_width_by_col_body[n_idx_col] = usize::max(
                    l_width_by_col_body[n_idx_col],
                    estimate_width_len(value, fmt_col.num_format.as_deref().unwrap_or_default()),
                );
            }
            sheet.set_cell(
                n_row,
                cast_col_num(n_idx_col).map_err(derive_document_error)?,
                value.clone(),
                Some(fmt_col.clone()),
            );
        }
    }

    if n_cols > 0 {
        let n_col_last = cast_col_num(n_cols - 1).map_err(derive_document_error)?;
        sheet.set_table_range(
            SpecCellRange {
                row_first: N_ROW_HEADER,
                col_first: 0,
                row_last: cast_row_num(l_rows.len()).map_err(derive_document_error)?,
                col_last: n_col_last,
            },
            Some(sheet_plan.table_name.clone()),
        );
    }

    if let Some(cell) = cell_freeze {
        sheet.set_freeze(cell);
    }

    for (n_idx_col, column) in sheet_plan.columns.iter().enumerate() {
        let Some(l_values) = column.value_field().and_then(derive_field_validation_values) else {
            continue;
        };
        let n_len_source = l_values.join(",").chars().count();
        if n_len_source > N_LEN_EXCEL_LIST_VALIDATION_MAX {
            tracing::warn!(
                sheet = %sheet_plan.sheet_name,
                column = %column.header,
                n_len_source,
                "enum dropdown skipped: value list exceeds the Excel limit"
            );
            report.warn(format!(
                "{}: dropdown for `{}` skipped, value list is {n_len_source} characters long.",
                sheet_plan.sheet_name, column.header
            ));
            continue;
        }
        let n_col = cast_col_num(n_idx_col).map_err(derive_document_error)?;
        sheet.set_data_validation(SpecDataValidation {
            range: SpecCellRange {
                row_first: N_ROW_HEADER + 1,
                col_first: n_col,
                row_last: cast_row_num(N_NROWS_EXCEL_MAX - 1).map_err(derive_document_error)?,
                col_last: n_col,
            },
            error_title: format!("Invalid {}", column.header),
            error_message: format!("Value must be one of: {}", l_values.join(", ")),
            prompt_title: column.header.clone(),
            prompt_message: "Select a value from the list.".to_string(),
            values: l_values,
        });
    }

    if if_autofit_columns && n_cols > 0 {
        let n_min = usize::max(1, policy_autofit.width_cell_min);
        let n_max = usize::min(255, usize::max(n_min, policy_autofit.width_cell_max));
        let n_pad = policy_autofit.width_cell_padding;

        for n_idx_col in 0..n_cols {
            let n_width_recorded = match policy_autofit.rule_columns {
                EnumAutofitColumnsRule::Header => l_width_by_col_header[n_idx_col],
                EnumAutofitColumnsRule::Body => l_width_by_col_body[n_idx_col],
                EnumAutofitColumnsRule::All | EnumAutofitColumnsRule::None => usize::max(
                    l_width_by_col_header[n_idx_col],
                    l_width_by_col_body[n_idx_col],
                ),
            };
            let n_width_final = usize::min(n_max, usize::max(n_min, n_width_recorded + n_pad));
            sheet.set_column_width(
                cast_col_num(n_idx_col).map_err(derive_document_error)?,
                n_width_final as f64,
            );
        }
    }

    sheet.set_print_settings(print.clone());
    tracing::debug!(
        sheet = %sheet_plan.sheet_name,
        n_rows_data = l_rows.len(),
        n_cols,
        "sheet written"
    );
    Ok(())
}

/// Resolve the body format of every column: font (field style over document
/// font) plus number format.
pub fn plan_column_formats(
    sheet_plan: &SpecSheetPlan,
    config: &SpecXlsxDocumentConfig,
) -> Vec<SpecCellFormat> {
    let fmt_base = config.font.clone().unwrap_or_default();
    sheet_plan
        .columns
        .iter()
        .map(|column| {
            let (c_num_format, style_override) = match &column.kind {
                EnumColumnKind::Value(field) => (
                    derive_field_num_format(
                        field,
                        config.number_formats.get(&column.format_key()).map(String::as_str),
                    ),
                    field.style_override.as_ref(),
                ),
                EnumColumnKind::LinkCount { .. } => (C_NUM_FORMAT_LINK_COUNT.to_string(), None),
            };
            let fmt_font = match style_override {
                Some(fmt_override) => fmt_base.merge(fmt_override),
                None => fmt_base.clone(),
            };
            fmt_font.with_(SpecCellFormat {
                num_format: Some(c_num_format),
                ..Default::default()
            })
        })
        .collect()
}

fn derive_header_format(config: &SpecXlsxDocumentConfig) -> SpecCellFormat {
    let fmt_header = config.header_font.clone().unwrap_or_default();
    match &config.header_alignment {
        Some(fmt_alignment) => fmt_header.with_(SpecCellFormat {
            align: fmt_alignment.align.clone(),
            valign: fmt_alignment.valign.clone(),
            ..Default::default()
        }),
        None => fmt_header,
    }
}

fn derive_freeze_cell(config: &SpecXlsxDocumentConfig) -> Result<Option<SpecCellRef>, ExportError> {
    let Some(c_freeze) = config.freeze_cell.as_deref() else {
        return Ok(None);
    };
    parse_a1_ref(c_freeze)
        .map(Some)
        .ok_or_else(|| ExportError::Document {
            message: format!("freeze cell `{c_freeze}` is not an A1 reference"),
        })
}

/// Print titles repeat the rows above and the columns left of the freeze cell
/// unless configured explicitly. An empty setting disables them.
fn derive_print_settings(
    config: &SpecXlsxDocumentConfig,
    cell_freeze: Option<SpecCellRef>,
) -> Result<SpecPrintSettings, ExportError> {
    let title_rows = match config.print_title_rows.as_deref() {
        Some("") => None,
        Some(c_span) => Some(parse_row_span(c_span).ok_or_else(|| ExportError::Document {
            message: format!("print title rows `{c_span}` are not a row span"),
        })?),
        None => cell_freeze.filter(|c| c.row > 0).map(|c| (0, c.row - 1)),
    };
    let title_columns = match config.print_title_columns.as_deref() {
        Some("") => None,
        Some(c_span) => Some(parse_column_span(c_span).ok_or_else(|| ExportError::Document {
            message: format!("print title columns `{c_span}` are not a column span"),
        })?),
        None => cell_freeze.filter(|c| c.col > 0).map(|c| (0, c.col - 1)),
    };

    Ok(SpecPrintSettings {
        horizontal_centered: config.print_horizontal_centered,
        vertical_centered: config.print_vertical_centered,
        title_rows,
        title_columns,
    })
}

fn validate_policy_autofit(policy_autofit: &SpecAutofitCellsPolicy) -> Result<(), ExportError> {
    if policy_autofit.width_cell_min == 0 {
        return Err(ExportError::Document {
            message: "policy_autofit.width_cell_min must be >= 1".to_string(),
        });
    }
    if policy_autofit.width_cell_max < policy_autofit.width_cell_min {
        return Err(ExportError::Document {
            message: "policy_autofit.width_cell_max must be >= width_cell_min".to_string(),
        });
    }
    Ok(())
}

fn derive_document_error(message: String) -> ExportError {
    ExportError::Document { message }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
