//! Cross-type conversions of [`ColumnValue`].
//!
//! Every accessor either returns a faithful result or a [`ColumnError`]
//! naming the source type, the target and the offending value. Nothing is
//! clamped. Decimal to integer truncation is the single documented lossy
//! rule and is computed on the big-integer coefficient.

use std::cmp::Ordering;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use num_bigint::{BigInt, Sign};
use num_traits::{ToPrimitive, Zero};

use crate::error::ColumnError;
use crate::value::{ColumnType, ColumnValue, MAX_DECIMAL_SCALE, parse_decimal};

/// Layouts accepted for text without an explicit offset (interpreted as UTC).
const TIME_LAYOUTS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

impl ColumnValue {
    /// Any non-zero number is `true`. Text accepts the usual spellings
    /// (`1 t T TRUE true True`, `0 f F FALSE false False`).
    pub fn as_bool(&self) -> Result<bool, ColumnError> {
        match self {
            ColumnValue::Bool(Some(v)) => Ok(*v),
            ColumnValue::BigInt(Some(v)) => Ok(!v.is_zero()),
            ColumnValue::Decimal(Some(v)) => Ok(!v.is_zero()),
            ColumnValue::String(Some(v)) => parse_bool(v, ColumnType::String),
            ColumnValue::Bytes(Some(v)) => parse_bool(self.utf8(v, "bool")?, ColumnType::Bytes),
            ColumnValue::Time(Some(_)) => Err(self.transform("bool")),
            _ => Err(self.nil_error()),
        }
    }

    /// Decimals are truncated toward zero: `123.67` becomes `123`.
    pub fn as_big_int(&self) -> Result<BigInt, ColumnError> {
        match self {
            ColumnValue::Bool(Some(v)) => Ok(BigInt::from(u8::from(*v))),
            ColumnValue::BigInt(Some(v)) => Ok(v.clone()),
            ColumnValue::Decimal(Some(v)) => self.truncated(v),
            ColumnValue::String(Some(v)) => {
                parse_decimal(v, ColumnType::String).map(|d| truncate(&d))
            }
            ColumnValue::Bytes(Some(v)) => {
                parse_decimal(self.utf8(v, "bigInt")?, ColumnType::Bytes).map(|d| truncate(&d))
            }
            ColumnValue::Time(Some(_)) => Err(self.transform(ColumnType::BigInt.as_str())),
            _ => Err(self.nil_error()),
        }
    }

    pub fn as_decimal(&self) -> Result<BigDecimal, ColumnError> {
        match self {
            ColumnValue::Bool(Some(v)) => Ok(BigDecimal::new(BigInt::from(u8::from(*v)), 0)),
            ColumnValue::BigInt(Some(v)) => Ok(BigDecimal::new(v.clone(), 0)),
            ColumnValue::Decimal(Some(v)) => Ok(v.clone()),
            ColumnValue::String(Some(v)) => parse_decimal(v, ColumnType::String),
            ColumnValue::Bytes(Some(v)) => {
                parse_decimal(self.utf8(v, "decimal")?, ColumnType::Bytes)
            }
            ColumnValue::Time(Some(_)) => Err(self.transform(ColumnType::Decimal.as_str())),
            _ => Err(self.nil_error()),
        }
    }

    /// Decimals render as plain text (`10.123`, `1e3` as `1000`), times as RFC 3339.
    pub fn as_string(&self) -> Result<String, ColumnError> {
        match self {
            ColumnValue::Bool(Some(v)) => Ok(v.to_string()),
            ColumnValue::BigInt(Some(v)) => Ok(v.to_string()),
            ColumnValue::Decimal(Some(v)) => Ok(decimal_to_plain(v)),
            ColumnValue::String(Some(v)) => Ok(v.clone()),
            ColumnValue::Bytes(Some(v)) => self.utf8(v, "string").map(str::to_owned),
            ColumnValue::Time(Some(v)) => Ok(format_time(v)),
            _ => Err(self.nil_error()),
        }
    }

    pub fn as_bytes(&self) -> Result<Vec<u8>, ColumnError> {
        match self {
            ColumnValue::Bytes(Some(v)) => Ok(v.clone()),
            _ => self.as_string().map(String::into_bytes),
        }
    }

    /// Only text and time values carry an instant.
    pub fn as_time(&self) -> Result<DateTime<Utc>, ColumnError> {
        match self {
            ColumnValue::Time(Some(v)) => Ok(*v),
            ColumnValue::String(Some(v)) => parse_time(v, ColumnType::String),
            ColumnValue::Bytes(Some(v)) => parse_time(self.utf8(v, "time")?, ColumnType::Bytes),
            ColumnValue::Bool(Some(_))
            | ColumnValue::BigInt(Some(_))
            | ColumnValue::Decimal(Some(_)) => Err(self.transform(ColumnType::Time.as_str())),
            _ => Err(self.nil_error()),
        }
    }

    pub fn as_int8(&self) -> Result<i8, ColumnError> {
        self.narrow("int8")
    }

    pub fn as_int16(&self) -> Result<i16, ColumnError> {
        self.narrow("int16")
    }

    pub fn as_int32(&self) -> Result<i32, ColumnError> {
        self.narrow("int32")
    }

    pub fn as_int64(&self) -> Result<i64, ColumnError> {
        self.narrow("int64")
    }

    /// Overflow and underflow of a non-zero value to zero are both out of range.
    pub fn as_float64(&self) -> Result<f64, ColumnError> {
        let d = self.as_decimal()?;
        match d.to_f64() {
            Some(f) if f.is_finite() && (f != 0.0 || d.is_zero()) => Ok(f),
            _ => Err(self.out_of_range("float64", &d)),
        }
    }

    pub fn as_float32(&self) -> Result<f32, ColumnError> {
        let d = self.as_decimal()?;
        match d.to_f64().map(|f| f as f32) {
            Some(f) if f.is_finite() && (f != 0.0 || d.is_zero()) => Ok(f),
            _ => Err(self.out_of_range("float32", &d)),
        }
    }

    fn narrow<T>(&self, target: &'static str) -> Result<T, ColumnError>
    where
        T: for<'a> TryFrom<&'a BigInt>,
    {
        let v = self.as_big_int()?;
        T::try_from(&v).map_err(|_| ColumnError::OutOfRange {
            from: self.column_type(),
            to: target,
            value: v.to_string(),
        })
    }

    /// Truncation of a stored decimal, refusing exponents that would
    /// expand past [`MAX_DECIMAL_SCALE`] digits.
    fn truncated(&self, d: &BigDecimal) -> Result<BigInt, ColumnError> {
        let (_, scale) = d.as_bigint_and_exponent();
        if scale < -MAX_DECIMAL_SCALE {
            return Err(self.out_of_range(ColumnType::BigInt.as_str(), d));
        }
        Ok(truncate(d))
    }

    fn utf8<'a>(&self, bytes: &'a [u8], target: &'static str) -> Result<&'a str, ColumnError> {
        std::str::from_utf8(bytes).map_err(|e| ColumnError::Parse {
            from: self.column_type(),
            to: target,
            value: String::from_utf8_lossy(bytes).into_owned(),
            reason: e.to_string(),
        })
    }

    fn nil_error(&self) -> ColumnError {
        ColumnError::Nil { column_type: self.column_type() }
    }

    fn transform(&self, target: &'static str) -> ColumnError {
        ColumnError::Transform {
            from: self.column_type(),
            to: target,
            value: self.to_string(),
        }
    }

    fn out_of_range(&self, target: &'static str, d: &BigDecimal) -> ColumnError {
        ColumnError::OutOfRange {
            from: self.column_type(),
            to: target,
            value: decimal_to_plain(d),
        }
    }
}

/// `coefficient / 10^|exp|` for negative exponents, `coefficient * 10^exp`
/// for positive ones. Integer division truncates toward zero.
pub(crate) fn truncate(d: &BigDecimal) -> BigInt {
    let (coefficient, scale) = d.as_bigint_and_exponent();
    let exp = -scale;
    match exp.cmp(&0) {
        Ordering::Equal => coefficient,
        Ordering::Less if exp.unsigned_abs() > max_digits(&coefficient) => BigInt::zero(),
        Ordering::Less => coefficient / pow10(exp.unsigned_abs()),
        Ordering::Greater => coefficient * pow10(exp.unsigned_abs()),
    }
}

/// Upper bound on the decimal digit count of `n`.
fn max_digits(n: &BigInt) -> u64 {
    (n.bits() as f64 * std::f64::consts::LOG10_2) as u64 + 1
}

fn pow10(n: u64) -> BigInt {
    num_traits::pow(BigInt::from(10u8), n as usize)
}

/// Plain positional text of a decimal, without scientific notation.
/// Exponents beyond [`MAX_DECIMAL_SCALE`] keep the scientific form.
pub(crate) fn decimal_to_plain(d: &BigDecimal) -> String {
    let (coefficient, scale) = d.as_bigint_and_exponent();
    if scale.unsigned_abs() > MAX_DECIMAL_SCALE.unsigned_abs() {
        return format!("{coefficient}e{}", -scale);
    }
    if scale <= 0 {
        let mut s = coefficient.to_string();
        if !coefficient.is_zero() {
            s.extend(std::iter::repeat_n('0', scale.unsigned_abs() as usize));
        }
        return s;
    }

    let sign = if coefficient.sign() == Sign::Minus { "-" } else { "" };
    let digits = coefficient.magnitude().to_string();
    let scale = scale as usize;
    if digits.len() > scale {
        let (int_part, frac_part) = digits.split_at(digits.len() - scale);
        format!("{sign}{int_part}.{frac_part}")
    } else {
        let zeros = "0".repeat(scale - digits.len());
        format!("{sign}0.{zeros}{digits}")
    }
}

pub(crate) fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_bool(s: &str, from: ColumnType) -> Result<bool, ColumnError> {
    match s.trim() {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(ColumnError::Parse {
            from,
            to: ColumnType::Bool.as_str(),
            value: s.to_string(),
            reason: "not a boolean".into(),
        }),
    }
}

fn parse_time(s: &str, from: ColumnType) -> Result<DateTime<Utc>, ColumnError> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    TIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(s, layout).ok())
        .map(|t| t.and_utc())
        .ok_or_else(|| ColumnError::Parse {
            from,
            to: ColumnType::Time.as_str(),
            value: s.to_string(),
            reason: "expected RFC 3339 or 'YYYY-MM-DD hh:mm:ss'".into(),
        })
}
