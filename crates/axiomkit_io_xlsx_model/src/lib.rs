//! `axiomkit_io_xlsx_model` v1:
//! Schema-driven mapping between typed record graphs and XLSX workbooks.
//!
//! Module layout:
//! - `conf`        : Excel limits and default presets
//! - `spec`        : formats, config, ranges, report
//! - `error`       : error taxonomy per phase
//! - `schema`      : schema definitions and resolved descriptors
//! - `money`       : currency descriptors, minor-unit amounts
//! - `value`       : record graph
//! - `document`    : in-memory sheets
//! - `codec`       : field value <-> cell value
//! - `composition` : layout plan (sheets, columns, links)
//! - `writer`      : `export`
//! - `reader`      : `import`, `import_with`
//! - `backend`     : `.xlsx` file open/save
//! - `model`       : typed-struct convenience layer
//! - `util`        : pure helper functions
pub mod backend;
pub mod codec;
pub mod composition;
pub mod conf;
pub mod document;
pub mod error;
pub mod model;
pub mod money;
pub mod reader;
pub mod schema;
pub mod spec;
pub mod util;
pub mod value;
pub mod writer;

pub use backend::{SpreadsheetBackend, XlsxFileBackend};
pub use composition::{
    EnumColumnKind, EnumComposition, SpecColumnPlan, SpecLayoutPlan, SpecLinkPlan, SpecSheetPlan,
    compose, compose_definition,
};
pub use conf::{
    N_LEN_EXCEL_SHEET_NAME_MAX, N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
};
pub use document::{XlsxDocument, XlsxSheet};
pub use error::{
    BackendError, CodecError, EnumStructuralError, ExportError, FieldError, ImportError,
    ImportErrors, RowErrors, SchemaError, SpecValidationIssue, ValidationErrors, XlsxModelError,
};
pub use model::XlsxModel;
pub use money::SpecCurrency;
pub use reader::{AcceptAllValidator, RecordValidator, import, import_with};
pub use schema::{
    EnumFieldKind, EnumScalarType, EnumTypeDefinition, SpecEnumDefinition, SpecFieldDefinition,
    SpecRecordDefinition, SpecSchema, SpecSchemaDefinition,
};
pub use spec::{
    EnumAutofitColumnsRule, EnumCellValue, SpecAutofitCellsPolicy, SpecCellFormat, SpecCellRange,
    SpecCellRef, SpecXlsxDocumentConfig, SpecXlsxImportOptions, SpecXlsxReport,
};
pub use util::sanitize_sheet_name;
pub use value::{EnumFieldValue, SpecRecord};
pub use writer::export;
