//! Cell codec: typed field values to spreadsheet-native cells and back.
//!
//! `decode(encode(v)) == v` holds for every representable value of a scalar or
//! enumeration field. Date cells use the 1900 date system serial numbers.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::conf::{C_NUM_FORMAT_GENERAL, derive_default_num_format};
use crate::error::CodecError;
use crate::schema::{EnumFieldKind, EnumScalarType, SpecFieldDescriptor};
use crate::spec::EnumCellValue;
use crate::value::EnumFieldValue;

/// Largest integer magnitude a spreadsheet number holds exactly (2^53).
const N_INT_EXACT_MAX: i64 = 9_007_199_254_740_992;
const N_SECS_PER_DAY: i64 = 86_400;
/// Day serial of 9999-12-31, the last valid spreadsheet date.
const N_SERIAL_DAYS_MAX: f64 = 2_958_465.0;

const L_DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d.%m.%Y"];
const L_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

////////////////////////////////////////////////////////////////////////////////
// #region Encode

/// Encode one field value into a cell value.
///
/// `Null` encodes to an empty cell for optional fields and fails with
/// [`CodecError::MissingRequiredField`] for required ones.
pub fn encode(
    value: &EnumFieldValue,
    field: &SpecFieldDescriptor,
) -> Result<EnumCellValue, CodecError> {
    if value.is_null() {
        if field.required {
            return Err(CodecError::MissingRequiredField);
        }
        return Ok(EnumCellValue::None);
    }

    match &field.kind {
        EnumFieldKind::Scalar(scalar_type) => encode_scalar(value, scalar_type),
        EnumFieldKind::Enumeration(descriptor) => {
            let c_value = match value {
                EnumFieldValue::Enum(c) | EnumFieldValue::Text(c) => c,
                other => return Err(mismatch(field, other.type_label())),
            };
            if !descriptor.contains(c_value) {
                return Err(CodecError::UnknownVariant {
                    value: c_value.clone(),
                    enumeration: descriptor.name.clone(),
                    allowed: descriptor.values().into_iter().map(String::from).collect(),
                });
            }
            Ok(EnumCellValue::String(c_value.clone()))
        }
        EnumFieldKind::NestedRecord(_) | EnumFieldKind::CollectionOfRecord(_) => {
            Err(mismatch(field, value.type_label()))
        }
    }
}

fn encode_scalar(
    value: &EnumFieldValue,
    scalar_type: &EnumScalarType,
) -> Result<EnumCellValue, CodecError> {
    let mismatch_scalar = || CodecError::TypeMismatch {
        expected: scalar_type.to_string(),
        found: value.type_label().to_string(),
    };

    match (scalar_type, value) {
        (EnumScalarType::Integer, EnumFieldValue::Integer(n)) => {
            if n.unsigned_abs() > N_INT_EXACT_MAX as u64 {
                return Err(CodecError::OutOfRange {
                    message: format!("integer {n} exceeds the exact spreadsheet number range"),
                });
            }
            Ok(EnumCellValue::Number(*n as f64))
        }
        (EnumScalarType::Float, EnumFieldValue::Float(x)) => {
            if !x.is_finite() {
                return Err(CodecError::OutOfRange {
                    message: format!("float {x} is not finite"),
                });
            }
            Ok(EnumCellValue::Number(*x))
        }
        (EnumScalarType::Float, EnumFieldValue::Integer(n)) => Ok(EnumCellValue::Number(*n as f64)),
        (EnumScalarType::Text, EnumFieldValue::Text(c)) => Ok(EnumCellValue::String(c.clone())),
        (EnumScalarType::Boolean, EnumFieldValue::Boolean(b)) => Ok(EnumCellValue::Boolean(*b)),
        (EnumScalarType::Date, EnumFieldValue::Date(d)) => {
            Ok(EnumCellValue::DateTime(convert_date_to_serial(*d)?))
        }
        (EnumScalarType::DateTime, EnumFieldValue::DateTime(dt)) => {
            Ok(EnumCellValue::DateTime(convert_datetime_to_serial(*dt)?))
        }
        (EnumScalarType::DateTime, EnumFieldValue::Date(d)) => Ok(EnumCellValue::DateTime(
            convert_date_to_serial(*d)?,
        )),
        (EnumScalarType::Money(currency), EnumFieldValue::Money(n_minor)) => {
            Ok(EnumCellValue::Number(currency.to_major(*n_minor)))
        }
        _ => Err(mismatch_scalar()),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Decode

/// Whether a cell counts as absent: empty, or text that is empty after trimming.
pub fn is_absent(cell: &EnumCellValue) -> bool {
    match cell {
        EnumCellValue::None => true,
        EnumCellValue::String(c) => c.trim().is_empty(),
        _ => false,
    }
}

/// Decode one cell into a field value.
///
/// Absent cells decode to the field default (or `Null`) when the field is
/// optional and fail with [`CodecError::MissingRequiredField`] otherwise.
pub fn decode(
    cell: &EnumCellValue,
    field: &SpecFieldDescriptor,
) -> Result<EnumFieldValue, CodecError> {
    if is_absent(cell) {
        if field.required {
            return Err(CodecError::MissingRequiredField);
        }
        return Ok(field.default.clone().unwrap_or(EnumFieldValue::Null));
    }

    match &field.kind {
        EnumFieldKind::Scalar(scalar_type) => decode_scalar(cell, scalar_type),
        EnumFieldKind::Enumeration(descriptor) => {
            let c_value = match cell {
                EnumCellValue::String(c) => c.clone(),
                EnumCellValue::Number(x) => convert_number_to_text(*x),
                other => return Err(mismatch(field, &describe_cell(other))),
            };
            if descriptor.contains(&c_value) {
                Ok(EnumFieldValue::Enum(c_value))
            } else {
                Err(CodecError::UnknownVariant {
                    value: c_value,
                    enumeration: descriptor.name.clone(),
                    allowed: descriptor.values().into_iter().map(String::from).collect(),
                })
            }
        }
        EnumFieldKind::NestedRecord(_) | EnumFieldKind::CollectionOfRecord(_) => {
            Err(mismatch(field, &describe_cell(cell)))
        }
    }
}

/// Decode a link-count cell (non-negative integer).
pub fn decode_count(cell: &EnumCellValue) -> Result<usize, CodecError> {
    match decode_scalar(cell, &EnumScalarType::Integer)? {
        EnumFieldValue::Integer(n) if n >= 0 => Ok(n as usize),
        _ => Err(CodecError::TypeMismatch {
            expected: "non-negative integer".to_string(),
            found: describe_cell(cell),
        }),
    }
}

fn decode_scalar(
    cell: &EnumCellValue,
    scalar_type: &EnumScalarType,
) -> Result<EnumFieldValue, CodecError> {
    let mismatch_scalar = || CodecError::TypeMismatch {
        expected: scalar_type.to_string(),
        found: describe_cell(cell),
    };

    match scalar_type {
        EnumScalarType::Integer => match cell {
            EnumCellValue::Number(x) => convert_integral(*x)
                .map(EnumFieldValue::Integer)
                .ok_or_else(mismatch_scalar),
            EnumCellValue::String(c) => {
                let c_text = c.trim();
                if let Ok(n) = c_text.parse::<i64>() {
                    return Ok(EnumFieldValue::Integer(n));
                }
                c_text
                    .parse::<f64>()
                    .ok()
                    .and_then(convert_integral)
                    .map(EnumFieldValue::Integer)
                    .ok_or_else(mismatch_scalar)
            }
            _ => Err(mismatch_scalar()),
        },
        EnumScalarType::Float => match cell {
            EnumCellValue::Number(x) => Ok(EnumFieldValue::Float(*x)),
            EnumCellValue::String(c) => c
                .trim()
                .parse::<f64>()
                .map(EnumFieldValue::Float)
                .map_err(|_| mismatch_scalar()),
            _ => Err(mismatch_scalar()),
        },
        EnumScalarType::Text => match cell {
            EnumCellValue::String(c) => Ok(EnumFieldValue::Text(c.clone())),
            EnumCellValue::Number(x) => Ok(EnumFieldValue::Text(convert_number_to_text(*x))),
            EnumCellValue::Boolean(b) => Ok(EnumFieldValue::Text(b.to_string())),
            _ => Err(mismatch_scalar()),
        },
        EnumScalarType::Boolean => match cell {
            EnumCellValue::Boolean(b) => Ok(EnumFieldValue::Boolean(*b)),
            EnumCellValue::Number(x) if *x == 0.0 => Ok(EnumFieldValue::Boolean(false)),
            EnumCellValue::Number(x) if *x == 1.0 => Ok(EnumFieldValue::Boolean(true)),
            EnumCellValue::String(c) => match c.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(EnumFieldValue::Boolean(true)),
                "false" | "no" | "0" => Ok(EnumFieldValue::Boolean(false)),
                _ => Err(mismatch_scalar()),
            },
            _ => Err(mismatch_scalar()),
        },
        EnumScalarType::Date => match cell {
            EnumCellValue::DateTime(x) | EnumCellValue::Number(x) => {
                if x.fract() != 0.0 {
                    return Err(mismatch_scalar());
                }
                convert_serial_to_date(*x).map(EnumFieldValue::Date)
            }
            EnumCellValue::String(c) => parse_date_text(c.trim())
                .map(EnumFieldValue::Date)
                .ok_or_else(mismatch_scalar),
            _ => Err(mismatch_scalar()),
        },
        EnumScalarType::DateTime => match cell {
            EnumCellValue::DateTime(x) | EnumCellValue::Number(x) => {
                convert_serial_to_datetime(*x).map(EnumFieldValue::DateTime)
            }
            EnumCellValue::String(c) => parse_datetime_text(c.trim())
                .map(EnumFieldValue::DateTime)
                .ok_or_else(mismatch_scalar),
            _ => Err(mismatch_scalar()),
        },
        EnumScalarType::Money(currency) => {
            let n_minor = match cell {
                EnumCellValue::Number(x) => currency.to_minor(*x).ok_or_else(|| {
                    CodecError::OutOfRange {
                        message: format!("amount {x} cannot be held in minor units"),
                    }
                })?,
                EnumCellValue::String(c) => c
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(|x| currency.to_minor(x))
                    .or_else(|| currency.parse_amount(c))
                    .ok_or_else(mismatch_scalar)?,
                _ => return Err(mismatch_scalar()),
            };
            Ok(EnumFieldValue::Money(n_minor))
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Formats

/// Number format of a field's cells by priority: explicit override, field
/// format hint, type default, `General`.
pub fn derive_field_num_format(field: &SpecFieldDescriptor, override_: Option<&str>) -> String {
    if let Some(c_fmt) = override_ {
        return c_fmt.to_string();
    }
    if let Some(c_fmt) = &field.format_hint {
        return c_fmt.clone();
    }
    match &field.kind {
        EnumFieldKind::Scalar(scalar_type) => derive_default_num_format(scalar_type)
            .unwrap_or_else(|| C_NUM_FORMAT_GENERAL.to_string()),
        _ => C_NUM_FORMAT_GENERAL.to_string(),
    }
}

/// Declared values to offer as a dropdown for enumeration fields.
pub fn derive_field_validation_values(field: &SpecFieldDescriptor) -> Option<Vec<String>> {
    match &field.kind {
        EnumFieldKind::Enumeration(descriptor) => Some(
            descriptor
                .values()
                .into_iter()
                .map(String::from)
                .collect(),
        ),
        _ => None,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Helpers

fn derive_excel_epoch() -> Result<NaiveDateTime, CodecError> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| CodecError::OutOfRange {
            message: "spreadsheet epoch is not representable".to_string(),
        })
}

/// Serials must fall on a day no further from the epoch than 9999-12-31.
fn validate_serial(serial: f64) -> Result<f64, CodecError> {
    if !serial.is_finite() || serial.abs() >= N_SERIAL_DAYS_MAX + 1.0 {
        return Err(CodecError::OutOfRange {
            message: format!("serial {serial} is not a valid date"),
        });
    }
    Ok(serial)
}

/// Day serial of a date (1900 date system, epoch 1899-12-30).
pub fn convert_date_to_serial(date: NaiveDate) -> Result<f64, CodecError> {
    let dt_epoch = derive_excel_epoch()?;
    validate_serial((date - dt_epoch.date()).num_days() as f64)
}

/// Serial of a date-time, truncated to whole seconds.
pub fn convert_datetime_to_serial(datetime: NaiveDateTime) -> Result<f64, CodecError> {
    let dt_epoch = derive_excel_epoch()?;
    let datetime = datetime.with_nanosecond(0).unwrap_or(datetime);
    validate_serial((datetime - dt_epoch).num_seconds() as f64 / N_SECS_PER_DAY as f64)
}

pub fn convert_serial_to_date(serial: f64) -> Result<NaiveDate, CodecError> {
    Ok(convert_serial_to_datetime(serial.floor())?.date())
}

/// Date-time of a serial, rounded to the nearest second.
pub fn convert_serial_to_datetime(serial: f64) -> Result<NaiveDateTime, CodecError> {
    let out_of_range = || CodecError::OutOfRange {
        message: format!("serial {serial} is not a valid date"),
    };
    validate_serial(serial)?;
    let n_secs = (serial * N_SECS_PER_DAY as f64).round() as i64;
    derive_excel_epoch()?
        .checked_add_signed(Duration::try_seconds(n_secs).ok_or_else(out_of_range)?)
        .ok_or_else(out_of_range)
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    L_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn parse_datetime_text(text: &str) -> Option<NaiveDateTime> {
    L_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.with_nanosecond(0).unwrap_or(dt))
        .or_else(|| parse_date_text(text).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

fn convert_integral(x: f64) -> Option<i64> {
    if x.is_finite() && x.fract() == 0.0 && x.abs() <= N_INT_EXACT_MAX as f64 {
        Some(x as i64)
    } else {
        None
    }
}

fn convert_number_to_text(x: f64) -> String {
    match convert_integral(x) {
        Some(n) => n.to_string(),
        None => x.to_string(),
    }
}

fn describe_cell(cell: &EnumCellValue) -> String {
    match cell {
        EnumCellValue::None => "empty cell".to_string(),
        EnumCellValue::String(c) => format!("text `{c}`"),
        EnumCellValue::Number(x) => format!("number {x}"),
        EnumCellValue::Boolean(b) => format!("boolean {b}"),
        EnumCellValue::DateTime(x) => format!("date serial {x}"),
    }
}

fn mismatch(field: &SpecFieldDescriptor, found: &str) -> CodecError {
    let c_expected = match &field.kind {
        EnumFieldKind::Scalar(scalar_type) => scalar_type.to_string(),
        EnumFieldKind::Enumeration(descriptor) => format!("enum `{}`", descriptor.name),
        EnumFieldKind::NestedRecord(record) => format!("record `{}`", record.name),
        EnumFieldKind::CollectionOfRecord(record) => format!("list of `{}`", record.name),
    };
    CodecError::TypeMismatch {
        expected: c_expected,
        found: found.to_string(),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
