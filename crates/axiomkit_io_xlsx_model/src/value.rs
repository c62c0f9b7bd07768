//! Dynamic record graph exchanged with the exporter and importer.

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;

/// Value of one field.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumFieldValue {
    /// Absent optional value.
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// Minor units of the field's currency.
    Money(i64),
    /// Declared value of an enumeration variant.
    Enum(String),
    /// Nested record.
    Record(SpecRecord),
    /// Collection of records.
    List(Vec<SpecRecord>),
}

impl EnumFieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, EnumFieldValue::Null)
    }

    pub fn text(value: impl Into<String>) -> Self {
        EnumFieldValue::Text(value.into())
    }

    pub fn enumeration(value: impl Into<String>) -> Self {
        EnumFieldValue::Enum(value.into())
    }

    /// Short type label used in error messages.
    pub fn type_label(&self) -> &'static str {
        match self {
            EnumFieldValue::Null => "null",
            EnumFieldValue::Integer(_) => "integer",
            EnumFieldValue::Float(_) => "float",
            EnumFieldValue::Text(_) => "text",
            EnumFieldValue::Boolean(_) => "boolean",
            EnumFieldValue::Date(_) => "date",
            EnumFieldValue::DateTime(_) => "datetime",
            EnumFieldValue::Money(_) => "money",
            EnumFieldValue::Enum(_) => "enum",
            EnumFieldValue::Record(_) => "record",
            EnumFieldValue::List(_) => "list",
        }
    }
}

impl From<i64> for EnumFieldValue {
    fn from(value: i64) -> Self {
        EnumFieldValue::Integer(value)
    }
}

impl From<f64> for EnumFieldValue {
    fn from(value: f64) -> Self {
        EnumFieldValue::Float(value)
    }
}

impl From<bool> for EnumFieldValue {
    fn from(value: bool) -> Self {
        EnumFieldValue::Boolean(value)
    }
}

impl From<&str> for EnumFieldValue {
    fn from(value: &str) -> Self {
        EnumFieldValue::Text(value.to_string())
    }
}

impl From<String> for EnumFieldValue {
    fn from(value: String) -> Self {
        EnumFieldValue::Text(value)
    }
}

impl From<NaiveDate> for EnumFieldValue {
    fn from(value: NaiveDate) -> Self {
        EnumFieldValue::Date(value)
    }
}

impl From<NaiveDateTime> for EnumFieldValue {
    fn from(value: NaiveDateTime) -> Self {
        EnumFieldValue::DateTime(value)
    }
}

impl From<SpecRecord> for EnumFieldValue {
    fn from(value: SpecRecord) -> Self {
        EnumFieldValue::Record(value)
    }
}

impl From<Vec<SpecRecord>> for EnumFieldValue {
    fn from(value: Vec<SpecRecord>) -> Self {
        EnumFieldValue::List(value)
    }
}

impl<T: Into<EnumFieldValue>> From<Option<T>> for EnumFieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(EnumFieldValue::Null, Into::into)
    }
}

/// Instance of a record type.
///
/// Fields keep insertion order; missing fields read as [`EnumFieldValue::Null`]
/// during export.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecRecord {
    pub type_name: String,
    pub fields: IndexMap<String, EnumFieldValue>,
}

impl SpecRecord {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Builder-style field assignment.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<EnumFieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<EnumFieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&EnumFieldValue> {
        self.fields.get(name)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.fields.get(name)? {
            EnumFieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.fields.get(name)? {
            EnumFieldValue::Text(c) | EnumFieldValue::Enum(c) => Some(c),
            _ => None,
        }
    }

    pub fn get_record(&self, name: &str) -> Option<&SpecRecord> {
        match self.fields.get(name)? {
            EnumFieldValue::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn get_list(&self, name: &str) -> Option<&[SpecRecord]> {
        match self.fields.get(name)? {
            EnumFieldValue::List(l_records) => Some(l_records),
            _ => None,
        }
    }
}
