//! Schema definitions and the type descriptors derived from them.
//!
//! A [`SpecSchemaDefinition`] is the static, name-referenced description of
//! record and enumeration types. [`SpecSchema::build`] resolves it into an
//! immutable tree of [`SpecFieldDescriptor`]s rooted at one record type,
//! rejecting cycles and every nesting shape that has no tabular mapping.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::SchemaError;
use crate::money::SpecCurrency;
use crate::spec::SpecCellFormat;
use crate::value::EnumFieldValue;

////////////////////////////////////////////////////////////////////////////////
// #region Definitions

/// Scalar cell types supported by the codec.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnumScalarType {
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit float.
    Float,
    /// Text.
    Text,
    /// Boolean.
    Boolean,
    /// Calendar date (day granularity).
    Date,
    /// Date and time (second granularity).
    DateTime,
    /// Money amount in minor units of the given currency.
    Money(SpecCurrency),
}

impl fmt::Display for EnumScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumScalarType::Integer => write!(f, "integer"),
            EnumScalarType::Float => write!(f, "float"),
            EnumScalarType::Text => write!(f, "text"),
            EnumScalarType::Boolean => write!(f, "boolean"),
            EnumScalarType::Date => write!(f, "date"),
            EnumScalarType::DateTime => write!(f, "datetime"),
            EnumScalarType::Money(currency) => write!(f, "money[{}]", currency.code),
        }
    }
}

/// Declared type of a field, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumTypeDefinition {
    /// Scalar value.
    Scalar(EnumScalarType),
    /// Enumeration, by name.
    Enum(String),
    /// Record type, by name.
    Record(String),
    /// Ordered sequence.
    List(Box<EnumTypeDefinition>),
    /// Optional value.
    Optional(Box<EnumTypeDefinition>),
}

impl EnumTypeDefinition {
    pub fn integer() -> Self {
        Self::Scalar(EnumScalarType::Integer)
    }

    pub fn float() -> Self {
        Self::Scalar(EnumScalarType::Float)
    }

    pub fn text() -> Self {
        Self::Scalar(EnumScalarType::Text)
    }

    pub fn boolean() -> Self {
        Self::Scalar(EnumScalarType::Boolean)
    }

    pub fn date() -> Self {
        Self::Scalar(EnumScalarType::Date)
    }

    pub fn datetime() -> Self {
        Self::Scalar(EnumScalarType::DateTime)
    }

    pub fn money(currency: SpecCurrency) -> Self {
        Self::Scalar(EnumScalarType::Money(currency))
    }

    pub fn enumeration(name: impl Into<String>) -> Self {
        Self::Enum(name.into())
    }

    pub fn record(name: impl Into<String>) -> Self {
        Self::Record(name.into())
    }

    pub fn list(inner: EnumTypeDefinition) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn optional(inner: EnumTypeDefinition) -> Self {
        Self::Optional(Box::new(inner))
    }
}

impl fmt::Display for EnumTypeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumTypeDefinition::Scalar(scalar) => write!(f, "{scalar}"),
            EnumTypeDefinition::Enum(name) | EnumTypeDefinition::Record(name) => {
                write!(f, "{name}")
            }
            EnumTypeDefinition::List(inner) => write!(f, "list<{inner}>"),
            EnumTypeDefinition::Optional(inner) => write!(f, "optional<{inner}>"),
        }
    }
}

/// One legal value of an enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecEnumVariant {
    /// Symbolic name (never written to cells).
    pub name: String,
    /// Declared value (written to and read from cells).
    pub value: String,
}

/// Closed set of variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecEnumDefinition {
    pub name: String,
    pub variants: Vec<SpecEnumVariant>,
}

impl SpecEnumDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
        }
    }

    /// Append a variant.
    pub fn variant(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variants.push(SpecEnumVariant {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

/// Static definition of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecFieldDefinition {
    pub name: String,
    /// Display alias (header text); defaults to `name`.
    pub alias: Option<String>,
    pub ty: EnumTypeDefinition,
    /// Forced to `false` by an `Optional` wrapper.
    pub required: bool,
    /// Value used when an optional cell is empty.
    pub default: Option<EnumFieldValue>,
    /// Per-field number format.
    pub number_format: Option<String>,
    /// Per-field style (font) applied to the whole column.
    pub style: Option<SpecCellFormat>,
}

impl SpecFieldDefinition {
    pub fn new(name: impl Into<String>, ty: EnumTypeDefinition) -> Self {
        Self {
            name: name.into(),
            alias: None,
            ty,
            required: true,
            default: None,
            number_format: None,
            style: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn default_value(mut self, value: EnumFieldValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn number_format(mut self, num_format: impl Into<String>) -> Self {
        self.number_format = Some(num_format.into());
        self
    }

    pub fn style(mut self, style: SpecCellFormat) -> Self {
        self.style = Some(style);
        self
    }
}

/// Static definition of one record type.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecRecordDefinition {
    pub name: String,
    /// Display title; used as sheet name when set.
    pub title: Option<String>,
    pub fields: Vec<SpecFieldDefinition>,
}

impl SpecRecordDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            fields: Vec::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn field(mut self, field: SpecFieldDefinition) -> Self {
        self.fields.push(field);
        self
    }
}

/// Registry of record and enumeration definitions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecSchemaDefinition {
    pub records: IndexMap<String, SpecRecordDefinition>,
    pub enums: IndexMap<String, SpecEnumDefinition>,
}

impl SpecSchemaDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record type (replaces a previous one with the same name).
    pub fn record(mut self, record: SpecRecordDefinition) -> Self {
        self.records.insert(record.name.clone(), record);
        self
    }

    /// Register an enumeration (replaces a previous one with the same name).
    pub fn enumeration(mut self, enumeration: SpecEnumDefinition) -> Self {
        self.enums.insert(enumeration.name.clone(), enumeration);
        self
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Descriptors

/// Resolved enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecEnumDescriptor {
    pub name: String,
    pub variants: Vec<SpecEnumVariant>,
}

impl SpecEnumDescriptor {
    /// Declared values in declaration order.
    pub fn values(&self) -> Vec<&str> {
        self.variants.iter().map(|v| v.value.as_str()).collect()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.variants.iter().any(|v| v.value == value)
    }
}

/// Field shape after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumFieldKind {
    Scalar(EnumScalarType),
    Enumeration(Arc<SpecEnumDescriptor>),
    NestedRecord(Arc<SpecRecordSchema>),
    CollectionOfRecord(Arc<SpecRecordSchema>),
}

/// Immutable per-field metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecFieldDescriptor {
    pub name: String,
    pub display_alias: String,
    pub kind: EnumFieldKind,
    pub required: bool,
    pub default: Option<EnumFieldValue>,
    pub format_hint: Option<String>,
    pub style_override: Option<SpecCellFormat>,
}

/// Resolved record type.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecRecordSchema {
    pub name: String,
    pub title: Option<String>,
    pub fields: Vec<SpecFieldDescriptor>,
}

impl SpecRecordSchema {
    /// Title when set, otherwise the type name.
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    pub fn field(&self, name: &str) -> Option<&SpecFieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Schema rooted at one record type.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSchema {
    root: Arc<SpecRecordSchema>,
    records: IndexMap<String, Arc<SpecRecordSchema>>,
}

impl SpecSchema {
    /// Resolve `definition` starting at record type `root`.
    pub fn build(definition: &SpecSchemaDefinition, root: &str) -> Result<Self, SchemaError> {
        let mut builder = SchemaBuilder {
            definition,
            l_stack: Vec::new(),
            dict_records: IndexMap::new(),
        };
        let root = builder.build_record(root, root)?;
        tracing::debug!(
            root = %root.name,
            n_records = builder.dict_records.len(),
            "schema built"
        );
        Ok(Self {
            root,
            records: builder.dict_records,
        })
    }

    pub fn root(&self) -> &Arc<SpecRecordSchema> {
        &self.root
    }

    /// Look up a reachable record type by name.
    pub fn record(&self, name: &str) -> Option<&Arc<SpecRecordSchema>> {
        self.records.get(name)
    }

    /// All reachable record types, in resolution order (leaves first).
    pub fn records(&self) -> impl Iterator<Item = &Arc<SpecRecordSchema>> {
        self.records.values()
    }
}

struct SchemaBuilder<'a> {
    definition: &'a SpecSchemaDefinition,
    l_stack: Vec<String>,
    dict_records: IndexMap<String, Arc<SpecRecordSchema>>,
}

impl SchemaBuilder<'_> {
    fn build_record(&mut self, name: &str, path: &str) -> Result<Arc<SpecRecordSchema>, SchemaError> {
        if let Some(n_pos) = self.l_stack.iter().position(|c_name| c_name == name) {
            let mut l_chain = self.l_stack[n_pos..].to_vec();
            l_chain.push(name.to_string());
            return Err(SchemaError::Cycle {
                chain: l_chain.join(" -> "),
            });
        }
        if let Some(record) = self.dict_records.get(name) {
            return Ok(Arc::clone(record));
        }

        let record_def = self
            .definition
            .records
            .get(name)
            .ok_or_else(|| SchemaError::UnknownType {
                path: path.to_string(),
                name: name.to_string(),
            })?;
        if record_def.fields.is_empty() {
            return Err(SchemaError::EmptyRecord {
                record: name.to_string(),
            });
        }

        self.l_stack.push(name.to_string());
        let mut l_fields = Vec::with_capacity(record_def.fields.len());
        for field_def in &record_def.fields {
            let c_path = format!("{path}.{}", field_def.name);
            let (kind, if_required) =
                self.classify(&field_def.ty, field_def.required, &c_path, &field_def.ty)?;
            l_fields.push(SpecFieldDescriptor {
                name: field_def.name.clone(),
                display_alias: field_def
                    .alias
                    .clone()
                    .unwrap_or_else(|| field_def.name.clone()),
                kind,
                required: if_required,
                default: field_def.default.clone(),
                format_hint: field_def.number_format.clone(),
                style_override: field_def.style.clone(),
            });
        }
        self.l_stack.pop();

        let record = Arc::new(SpecRecordSchema {
            name: record_def.name.clone(),
            title: record_def.title.clone(),
            fields: l_fields,
        });
        self.dict_records
            .insert(name.to_string(), Arc::clone(&record));
        Ok(record)
    }

    fn classify(
        &mut self,
        ty: &EnumTypeDefinition,
        if_required: bool,
        path: &str,
        ty_declared: &EnumTypeDefinition,
    ) -> Result<(EnumFieldKind, bool), SchemaError> {
        let unsupported = || SchemaError::UnsupportedShape {
            path: path.to_string(),
            shape: ty_declared.to_string(),
        };

        match ty {
            EnumTypeDefinition::Optional(inner) => {
                if matches!(inner.as_ref(), EnumTypeDefinition::Optional(_)) {
                    return Err(unsupported());
                }
                let (kind, _) = self.classify(inner, false, path, ty_declared)?;
                Ok((kind, false))
            }
            EnumTypeDefinition::Scalar(scalar) => {
                if let EnumScalarType::Money(currency) = scalar
                    && !currency.is_supported()
                {
                    return Err(SchemaError::UnsupportedCurrency {
                        path: path.to_string(),
                        code: currency.code.clone(),
                        minor_unit: currency.minor_unit,
                    });
                }
                Ok((EnumFieldKind::Scalar(scalar.clone()), if_required))
            }
            EnumTypeDefinition::Enum(name) => {
                let enum_def =
                    self.definition
                        .enums
                        .get(name)
                        .ok_or_else(|| SchemaError::UnknownType {
                            path: path.to_string(),
                            name: name.clone(),
                        })?;
                if enum_def.variants.is_empty() {
                    return Err(SchemaError::EmptyEnumeration { name: name.clone() });
                }
                Ok((
                    EnumFieldKind::Enumeration(Arc::new(SpecEnumDescriptor {
                        name: enum_def.name.clone(),
                        variants: enum_def.variants.clone(),
                    })),
                    if_required,
                ))
            }
            EnumTypeDefinition::Record(name) => Ok((
                EnumFieldKind::NestedRecord(self.build_record(name, path)?),
                if_required,
            )),
            EnumTypeDefinition::List(inner) => match inner.as_ref() {
                EnumTypeDefinition::Record(name) => Ok((
                    EnumFieldKind::CollectionOfRecord(self.build_record(name, path)?),
                    if_required,
                )),
                _ => Err(unsupported()),
            },
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
