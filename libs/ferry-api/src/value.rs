use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use num_bigint::BigInt;

use crate::error::ColumnError;

/// Declared type of a column value. Never changes after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Bool,
    BigInt,
    Decimal,
    String,
    Bytes,
    Time,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Bool => "bool",
            ColumnType::BigInt => "bigInt",
            ColumnType::Decimal => "decimal",
            ColumnType::String => "string",
            ColumnType::Bytes => "bytes",
            ColumnType::Time => "time",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bool" => Ok(ColumnType::Bool),
            "bigint" | "long" => Ok(ColumnType::BigInt),
            "decimal" | "double" => Ok(ColumnType::Decimal),
            "string" => Ok(ColumnType::String),
            "bytes" => Ok(ColumnType::Bytes),
            "time" | "date" => Ok(ColumnType::Time),
            other => Err(format!("unknown column type: '{other}'")),
        }
    }
}

/// One scalar datum crossing a source/sink boundary.
///
/// Every variant carries `Option<T>`: `None` is the typed nil of that
/// variant, so `ColumnValue::Decimal(None)` still reports
/// [`ColumnType::Decimal`]. Values are never mutated in place; conversions
/// live in `convert.rs`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Bool(Option<bool>),
    BigInt(Option<BigInt>),
    /// Big-integer coefficient with a base-10 exponent.
    Decimal(Option<BigDecimal>),
    String(Option<String>),
    /// Raw bytes, not necessarily UTF-8.
    Bytes(Option<Vec<u8>>),
    Time(Option<DateTime<Utc>>),
}

impl ColumnValue {
    pub fn from_bool(v: bool) -> Self {
        ColumnValue::Bool(Some(v))
    }

    pub fn from_big_int(v: impl Into<BigInt>) -> Self {
        ColumnValue::BigInt(Some(v.into()))
    }

    pub fn from_decimal(v: BigDecimal) -> Self {
        ColumnValue::Decimal(Some(v))
    }

    /// Parse numeric or scientific-notation text into a decimal value.
    pub fn decimal_from_str(s: &str) -> Result<Self, ColumnError> {
        parse_decimal(s, ColumnType::String).map(Self::from_decimal)
    }

    /// Decimal from the shortest text form of `v`. Fails for NaN and infinities.
    pub fn decimal_from_f64(v: f64) -> Result<Self, ColumnError> {
        if !v.is_finite() {
            return Err(ColumnError::Parse {
                from: ColumnType::Decimal,
                to: ColumnType::Decimal.as_str(),
                value: v.to_string(),
                reason: "not a finite number".into(),
            });
        }
        Self::decimal_from_str(&v.to_string())
    }

    pub fn from_string(v: impl Into<String>) -> Self {
        ColumnValue::String(Some(v.into()))
    }

    pub fn from_bytes(v: impl Into<Vec<u8>>) -> Self {
        ColumnValue::Bytes(Some(v.into()))
    }

    pub fn from_time(v: DateTime<Utc>) -> Self {
        ColumnValue::Time(Some(v))
    }

    /// Typed nil of `column_type`.
    pub fn nil(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Bool => ColumnValue::Bool(None),
            ColumnType::BigInt => ColumnValue::BigInt(None),
            ColumnType::Decimal => ColumnValue::Decimal(None),
            ColumnType::String => ColumnValue::String(None),
            ColumnType::Bytes => ColumnValue::Bytes(None),
            ColumnType::Time => ColumnValue::Time(None),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnValue::Bool(_) => ColumnType::Bool,
            ColumnValue::BigInt(_) => ColumnType::BigInt,
            ColumnValue::Decimal(_) => ColumnType::Decimal,
            ColumnValue::String(_) => ColumnType::String,
            ColumnValue::Bytes(_) => ColumnType::Bytes,
            ColumnValue::Time(_) => ColumnType::Time,
        }
    }

    pub fn is_nil(&self) -> bool {
        match self {
            ColumnValue::Bool(v) => v.is_none(),
            ColumnValue::BigInt(v) => v.is_none(),
            ColumnValue::Decimal(v) => v.is_none(),
            ColumnValue::String(v) => v.is_none(),
            ColumnValue::Bytes(v) => v.is_none(),
            ColumnValue::Time(v) => v.is_none(),
        }
    }

    /// Compare with `right` after converting it to this value's comparable
    /// form: bool for Bool, decimal for BigInt and Decimal, text for String,
    /// raw bytes for Bytes and instant for Time.
    pub fn cmp_value(&self, right: &ColumnValue) -> Result<Ordering, ColumnError> {
        match self {
            ColumnValue::Bool(_) => Ok(self.as_bool()?.cmp(&right.as_bool()?)),
            ColumnValue::BigInt(_) | ColumnValue::Decimal(_) => {
                Ok(self.as_decimal()?.cmp(&right.as_decimal()?))
            }
            ColumnValue::String(_) => Ok(self.as_string()?.cmp(&right.as_string()?)),
            ColumnValue::Bytes(_) => Ok(self.as_bytes()?.cmp(&right.as_bytes()?)),
            ColumnValue::Time(_) => Ok(self.as_time()?.cmp(&right.as_time()?)),
        }
    }

    /// Approximate payload size in bytes.
    pub fn byte_size(&self) -> usize {
        match self {
            ColumnValue::Bool(Some(_)) => 1,
            ColumnValue::BigInt(Some(v)) => v.bits().div_ceil(8) as usize,
            ColumnValue::Decimal(Some(v)) => {
                let (coefficient, _) = v.as_bigint_and_exponent();
                coefficient.bits().div_ceil(8) as usize + 8
            }
            ColumnValue::String(Some(v)) => v.len(),
            ColumnValue::Bytes(Some(v)) => v.len(),
            ColumnValue::Time(Some(_)) => 12,
            _ => 0,
        }
    }
}

impl fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnValue::Bool(Some(v)) => write!(f, "{v}"),
            ColumnValue::BigInt(Some(v)) => write!(f, "{v}"),
            ColumnValue::Decimal(Some(v)) => f.write_str(&crate::convert::decimal_to_plain(v)),
            ColumnValue::String(Some(v)) => f.write_str(v),
            ColumnValue::Bytes(Some(v)) => f.write_str(&String::from_utf8_lossy(v)),
            ColumnValue::Time(Some(v)) => f.write_str(&crate::convert::format_time(v)),
            _ => f.write_str("<nil>"),
        }
    }
}

/// Largest decimal exponent magnitude accepted from text. Beyond it a
/// value would expand to tens of thousands of digits when rendered or
/// truncated.
pub const MAX_DECIMAL_SCALE: i64 = 16383;

pub(crate) fn parse_decimal(s: &str, from: ColumnType) -> Result<BigDecimal, ColumnError> {
    let d = BigDecimal::from_str(s.trim()).map_err(|e| ColumnError::Parse {
        from,
        to: ColumnType::Decimal.as_str(),
        value: s.to_string(),
        reason: e.to_string(),
    })?;
    let (_, scale) = d.as_bigint_and_exponent();
    if scale.unsigned_abs() > MAX_DECIMAL_SCALE.unsigned_abs() {
        return Err(ColumnError::OutOfRange {
            from,
            to: ColumnType::Decimal.as_str(),
            value: s.trim().to_string(),
        });
    }
    Ok(d)
}
