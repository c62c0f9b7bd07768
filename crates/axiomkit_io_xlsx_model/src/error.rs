//! Error types.

use std::fmt;

use thiserror::Error;

/// Schema analysis failure. Raised before any cell is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("record types form a cycle: {chain}")]
    Cycle { chain: String },

    #[error("unsupported field shape `{shape}` at `{path}`")]
    UnsupportedShape { path: String, shape: String },

    #[error("unknown type `{name}` referenced at `{path}`")]
    UnknownType { path: String, name: String },

    #[error("record type `{record}` declares no fields")]
    EmptyRecord { record: String },

    #[error("enumeration `{name}` declares no variants")]
    EmptyEnumeration { name: String },

    #[error("sheet name `{sheet}` is used by both `{first}` and `{second}`")]
    SheetNameCollision {
        sheet: String,
        first: String,
        second: String,
    },

    #[error("column header `{column}` appears twice in sheet `{sheet}`")]
    ColumnNameCollision { sheet: String, column: String },

    #[error("sheet `{sheet}` needs {n_cols} columns, exceeding the worksheet limit")]
    TooManyColumns { sheet: String, n_cols: usize },

    #[error("currency `{code}` at `{path}` has {minor_unit} minor-unit digits")]
    UnsupportedCurrency {
        path: String,
        code: String,
        minor_unit: u32,
    },
}

/// Single-cell encode/decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("`{value}` is not a variant of `{enumeration}` (allowed: {})", .allowed.join(", "))]
    UnknownVariant {
        value: String,
        enumeration: String,
        allowed: Vec<String>,
    },

    #[error("required value is missing")]
    MissingRequiredField,

    #[error("value out of range: {message}")]
    OutOfRange { message: String },
}

/// Codec failure tagged with the field it happened in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {error}")]
pub struct FieldError {
    /// Dotted field path within the row, e.g. `address.city`.
    pub field: String,
    pub error: CodecError,
}

/// Every field failure of one sheet row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowErrors {
    pub sheet: String,
    /// Zero-based row index.
    pub row: u32,
    pub errors: Vec<FieldError>,
}

impl fmt::Display for RowErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let l_msgs: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        write!(
            f,
            "sheet `{}` row {}: {}",
            self.sheet,
            self.row + 1,
            l_msgs.join("; ")
        )
    }
}

/// Failure that concerns sheet layout or record linkage rather than a cell.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnumStructuralError {
    #[error("sheet `{sheet}` is missing")]
    MissingSheet { sheet: String },

    #[error("sheet `{sheet}` column {column}: expected header `{expected}`, found `{found}`")]
    HeaderMismatch {
        sheet: String,
        column: u16,
        expected: String,
        found: String,
    },

    #[error("sheet `{sheet}` has unexpected column {column} `{header}`")]
    UnexpectedColumn {
        sheet: String,
        column: u16,
        header: String,
    },

    #[error(
        "`{parent_sheet}` links {expected} rows of `{child_sheet}` via `{field}`, but {found} remain"
    )]
    LinkCountMismatch {
        parent_sheet: String,
        child_sheet: String,
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("sheet `{sheet}` has {n_rows} rows not linked to any parent")]
    UnconsumedRows { sheet: String, n_rows: usize },

    #[error("sheet `{sheet}` holds no root row")]
    MissingRootRow { sheet: String },
}

/// Aggregated import failure: every decodable problem, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportErrors {
    pub row_errors: Vec<RowErrors>,
    pub structural: Vec<EnumStructuralError>,
}

impl ImportErrors {
    pub fn is_empty(&self) -> bool {
        self.row_errors.is_empty() && self.structural.is_empty()
    }

    /// Number of individual issues (field errors plus structural errors).
    pub fn len(&self) -> usize {
        self.row_errors.iter().map(|r| r.errors.len()).sum::<usize>() + self.structural.len()
    }
}

impl fmt::Display for ImportErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} import issue(s)", self.len())?;
        for err in &self.structural {
            write!(f, "\n  {err}")?;
        }
        for row in &self.row_errors {
            write!(f, "\n  {row}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ImportErrors {}

/// One semantic validation failure reported by a record validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecValidationIssue {
    /// Field path within the record graph, e.g. `lines[2].qty`.
    pub path: String,
    pub message: String,
}

/// Non-empty set of validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors {
    pub issues: Vec<SpecValidationIssue>,
}

impl ValidationErrors {
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![SpecValidationIssue {
                path: path.into(),
                message: message.into(),
            }],
        }
    }

    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(SpecValidationIssue {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation issue(s)", self.issues.len())?;
        for issue in &self.issues {
            write!(f, "\n  {}: {}", issue.path, issue.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Import failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("{0}")]
    Invalid(ImportErrors),

    #[error("{0}")]
    Validation(ValidationErrors),
}

/// Export failure. Always aborts the whole export.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExportError {
    #[error("cannot encode `{path}`: {source}")]
    Field {
        path: String,
        #[source]
        source: CodecError,
    },

    #[error("`{path}` does not conform to the schema: expected {expected}")]
    ShapeMismatch { path: String, expected: String },

    #[error("sheet `{sheet}` would need {n_rows} rows, exceeding the worksheet limit")]
    SheetOverflow { sheet: String, n_rows: usize },

    #[error("invalid document setting: {message}")]
    Document { message: String },
}

/// Storage backend failure.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("cannot read workbook: {0}")]
    Read(#[from] calamine::XlsxError),

    #[error("cannot write workbook: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),

    #[error("index out of bounds: {0}")]
    IndexOutOfBounds(String),
}

/// Failure of the typed model helpers.
#[derive(Debug, Error)]
pub enum XlsxModelError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("cannot convert record: {0}")]
    Conversion(String),
}
