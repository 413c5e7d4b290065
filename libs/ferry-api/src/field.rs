//! Bridge between a driver's native column metadata/values and [`ColumnValue`].
//!
//! A dialect describes each column with a [`Field`] and a [`FieldType`].
//! Reading goes driver value → [`Scanner`] → column value; writing goes
//! column value → [`Valuer`] → driver value. Dialects that only need
//! primitive binding declare a [`GoType`] through [`ValuerGoType`] and get
//! [`GoScanner`] / [`GoValuer`] for free.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::FieldError;
use crate::value::{ColumnType, ColumnValue};

// ═══════════════════════════════════════════════════════════════
//  Go type / driver value
// ═══════════════════════════════════════════════════════════════

/// Primitive value kind a field binds as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GoType {
    #[default]
    Unknown,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Bytes,
    Time,
}

impl GoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoType::Unknown => "unknow",
            GoType::Bool => "bool",
            GoType::Int8 => "int8",
            GoType::Int16 => "int16",
            GoType::Int32 => "int32",
            GoType::Int64 => "int64",
            GoType::Float32 => "float32",
            GoType::Float64 => "float64",
            GoType::String => "string",
            GoType::Bytes => "bytes",
            GoType::Time => "time",
        }
    }

    /// Column type a scanned value of this kind is stored as.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            GoType::Unknown => None,
            GoType::Bool => Some(ColumnType::Bool),
            GoType::Int8 | GoType::Int16 | GoType::Int32 | GoType::Int64 => {
                Some(ColumnType::BigInt)
            }
            GoType::Float32 | GoType::Float64 => Some(ColumnType::Decimal),
            GoType::String => Some(ColumnType::String),
            GoType::Bytes => Some(ColumnType::Bytes),
            GoType::Time => Some(ColumnType::Time),
        }
    }
}

impl fmt::Display for GoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value as accepted or produced by a driver.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverValue {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Time(DateTime<Utc>),
}

impl DriverValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DriverValue::Null)
    }

    /// Column value of the driver's own kind. `Null` has no kind.
    fn into_column(self) -> Result<Option<ColumnValue>, FieldError> {
        let column = match self {
            DriverValue::Null => return Ok(None),
            DriverValue::Bool(v) => ColumnValue::from_bool(v),
            DriverValue::Int8(v) => ColumnValue::from_big_int(v),
            DriverValue::Int16(v) => ColumnValue::from_big_int(v),
            DriverValue::Int32(v) => ColumnValue::from_big_int(v),
            DriverValue::Int64(v) => ColumnValue::from_big_int(v),
            DriverValue::Float32(v) => ColumnValue::decimal_from_str(&v.to_string())?,
            DriverValue::Float64(v) => ColumnValue::decimal_from_f64(v)?,
            DriverValue::String(v) => ColumnValue::from_string(v),
            DriverValue::Bytes(v) => ColumnValue::from_bytes(v),
            DriverValue::Time(v) => ColumnValue::from_time(v),
        };
        Ok(Some(column))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Capability traits
// ═══════════════════════════════════════════════════════════════

/// Physical type of a column, as reported by the store.
pub trait FieldType: Send + Sync {
    fn name(&self) -> &str;
    fn scan_type(&self) -> GoType;
    fn length(&self) -> Option<i64>;
    /// `(precision, scale)`.
    fn decimal_size(&self) -> Option<(i64, i64)>;
    fn nullable(&self) -> Option<bool>;
    fn database_type_name(&self) -> &str;

    /// Optional capability used by [`GoValuer`] and [`GoScanner`].
    fn valuer_go_type(&self) -> Option<&dyn ValuerGoType> {
        None
    }
}

/// Declares which primitive kind a field binds as.
pub trait ValuerGoType {
    fn go_type(&self) -> GoType;
}

/// Static metadata of one column. Shared read-only by every row.
pub trait Field: Send + Sync {
    fn name(&self) -> &str;
    /// Name quoted for the dialect (`` `id` ``, `"id"`).
    fn quoted(&self) -> String;
    /// Placeholder for the `i`-th bound parameter, 1-based (`?`, `$1`).
    fn bind_var(&self, i: usize) -> String;
    fn field_type(&self) -> &dyn FieldType;

    /// Expression used in a select list.
    fn select(&self) -> String {
        self.quoted()
    }

    fn scanner(&self) -> Box<dyn Scanner> {
        Box::new(GoScanner::new(self.name(), self.field_type()))
    }

    fn valuer<'a>(&'a self, column: &'a ColumnValue) -> Box<dyn Valuer + 'a> {
        Box::new(GoValuer::new(self.field_type(), column))
    }
}

/// Per-row adapter from a scanned driver value to a column value.
pub trait Scanner: Send {
    fn scan(&mut self, src: DriverValue) -> Result<(), FieldError>;
    /// Take the value produced by the last `scan`, leaving the scanner empty.
    fn take_column(&mut self) -> Result<ColumnValue, FieldError>;
}

/// Adapter from a column value to a bindable driver value.
pub trait Valuer {
    fn value(&self) -> Result<DriverValue, FieldError>;
}

// ═══════════════════════════════════════════════════════════════
//  Base implementations
// ═══════════════════════════════════════════════════════════════

/// Name plus field type; embedded by dialect fields.
pub struct BaseField {
    name: String,
    field_type: Box<dyn FieldType>,
}

impl BaseField {
    pub fn new(name: impl Into<String>, field_type: impl FieldType + 'static) -> Self {
        Self {
            name: name.into(),
            field_type: Box::new(field_type),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &dyn FieldType {
        self.field_type.as_ref()
    }
}

impl fmt::Debug for BaseField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseField")
            .field("name", &self.name)
            .field("type", &self.field_type.database_type_name())
            .finish()
    }
}

impl fmt::Display for BaseField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Column metadata as a driver reports it. Dialect field types wrap it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseFieldType {
    name: String,
    database_type_name: String,
    scan_type: GoType,
    length: Option<i64>,
    decimal_size: Option<(i64, i64)>,
    nullable: Option<bool>,
}

impl BaseFieldType {
    pub fn new(name: impl Into<String>, database_type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database_type_name: database_type_name.into(),
            ..Self::default()
        }
    }

    pub fn with_scan_type(mut self, scan_type: GoType) -> Self {
        self.scan_type = scan_type;
        self
    }

    pub fn with_length(mut self, length: i64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_decimal_size(mut self, precision: i64, scale: i64) -> Self {
        self.decimal_size = Some((precision, scale));
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }
}

impl FieldType for BaseFieldType {
    fn name(&self) -> &str {
        &self.name
    }

    fn scan_type(&self) -> GoType {
        self.scan_type
    }

    fn length(&self) -> Option<i64> {
        self.length
    }

    fn decimal_size(&self) -> Option<(i64, i64)> {
        self.decimal_size
    }

    fn nullable(&self) -> Option<bool> {
        self.nullable
    }

    fn database_type_name(&self) -> &str {
        &self.database_type_name
    }
}

/// [`BaseFieldType`] that also declares its Go type.
#[derive(Debug, Clone, PartialEq)]
pub struct GoFieldType {
    base: BaseFieldType,
    go_type: GoType,
}

impl GoFieldType {
    pub fn new(base: BaseFieldType, go_type: GoType) -> Self {
        Self { base, go_type }
    }
}

impl FieldType for GoFieldType {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn scan_type(&self) -> GoType {
        match self.base.scan_type() {
            GoType::Unknown => self.go_type,
            declared => declared,
        }
    }

    fn length(&self) -> Option<i64> {
        self.base.length()
    }

    fn decimal_size(&self) -> Option<(i64, i64)> {
        self.base.decimal_size()
    }

    fn nullable(&self) -> Option<bool> {
        self.base.nullable()
    }

    fn database_type_name(&self) -> &str {
        self.base.database_type_name()
    }

    fn valuer_go_type(&self) -> Option<&dyn ValuerGoType> {
        Some(self)
    }
}

impl ValuerGoType for GoFieldType {
    fn go_type(&self) -> GoType {
        self.go_type
    }
}

/// Holds the column of the last scan; embedded by dialect scanners.
#[derive(Debug, Default)]
pub struct BaseScanner {
    column: Option<ColumnValue>,
}

impl BaseScanner {
    pub fn set_column(&mut self, column: ColumnValue) {
        self.column = Some(column);
    }

    pub fn take_column(&mut self) -> Option<ColumnValue> {
        self.column.take()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Go-typed scanner / valuer
// ═══════════════════════════════════════════════════════════════

/// Scanner driven by the field's declared [`GoType`].
///
/// The driver value is read as its own kind and then converted to the
/// column type of the Go type (`Int*` → BigInt, `Float*` → Decimal, ...).
/// A field without the Go-type capability keeps the driver's kind.
#[derive(Debug)]
pub struct GoScanner {
    name: String,
    go_type: GoType,
    base: BaseScanner,
}

impl GoScanner {
    pub fn new(name: impl Into<String>, field_type: &dyn FieldType) -> Self {
        Self {
            name: name.into(),
            go_type: field_type
                .valuer_go_type()
                .map(ValuerGoType::go_type)
                .unwrap_or_default(),
            base: BaseScanner::default(),
        }
    }
}

impl Scanner for GoScanner {
    fn scan(&mut self, src: DriverValue) -> Result<(), FieldError> {
        let target = self.go_type.column_type();
        let Some(natural) = src.into_column()? else {
            self.base
                .set_column(ColumnValue::nil(target.unwrap_or(ColumnType::Bytes)));
            return Ok(());
        };

        let column = match target {
            None => natural,
            Some(t) if t == natural.column_type() => natural,
            Some(ColumnType::Bool) => ColumnValue::from_bool(natural.as_bool()?),
            Some(ColumnType::BigInt) => ColumnValue::from_big_int(natural.as_big_int()?),
            Some(ColumnType::Decimal) => ColumnValue::from_decimal(natural.as_decimal()?),
            Some(ColumnType::String) => ColumnValue::from_string(natural.as_string()?),
            Some(ColumnType::Bytes) => ColumnValue::from_bytes(natural.as_bytes()?),
            Some(ColumnType::Time) => ColumnValue::from_time(natural.as_time()?),
        };
        self.base.set_column(column);
        Ok(())
    }

    fn take_column(&mut self) -> Result<ColumnValue, FieldError> {
        self.base
            .take_column()
            .ok_or_else(|| FieldError::NotScanned(self.name.clone()))
    }
}

/// Valuer driven by the field type's declared [`GoType`].
pub struct GoValuer<'a> {
    field_type: &'a dyn FieldType,
    column: &'a ColumnValue,
}

impl<'a> GoValuer<'a> {
    pub fn new(field_type: &'a dyn FieldType, column: &'a ColumnValue) -> Self {
        Self { field_type, column }
    }
}

impl Valuer for GoValuer<'_> {
    fn value(&self) -> Result<DriverValue, FieldError> {
        let typ = self
            .field_type
            .valuer_go_type()
            .ok_or(FieldError::NotValuerGoType)?;

        if self.column.is_nil() {
            return Ok(DriverValue::Null);
        }

        let c = self.column;
        let value = match typ.go_type() {
            GoType::Bool => DriverValue::Bool(c.as_bool()?),
            GoType::Int8 => DriverValue::Int8(c.as_int8()?),
            GoType::Int16 => DriverValue::Int16(c.as_int16()?),
            GoType::Int32 => DriverValue::Int32(c.as_int32()?),
            GoType::Int64 => DriverValue::Int64(c.as_int64()?),
            GoType::Float32 => DriverValue::Float32(c.as_float32()?),
            GoType::Float64 => DriverValue::Float64(c.as_float64()?),
            GoType::String => DriverValue::String(c.as_string()?),
            GoType::Bytes => DriverValue::Bytes(c.as_bytes()?),
            GoType::Time => DriverValue::Time(c.as_time()?),
            GoType::Unknown => {
                return Err(FieldError::UnknownGoType {
                    go_type: typ.go_type().to_string(),
                    database_type: self.field_type.database_type_name().to_string(),
                });
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;

    use super::*;
    use crate::error::ColumnError;

    fn go_type(go_type: GoType) -> GoFieldType {
        GoFieldType::new(BaseFieldType::new("c", "NUMERIC"), go_type)
    }

    const ALL_GO_TYPES: [GoType; 11] = [
        GoType::Unknown,
        GoType::Bool,
        GoType::Int8,
        GoType::Int16,
        GoType::Int32,
        GoType::Int64,
        GoType::Float32,
        GoType::Float64,
        GoType::String,
        GoType::Bytes,
        GoType::Time,
    ];

    #[test]
    fn valuer_on_nil_is_null_for_every_go_type() {
        for t in ALL_GO_TYPES {
            let ft = go_type(t);
            for ct in [ColumnType::Bool, ColumnType::Decimal, ColumnType::Time] {
                let nil = ColumnValue::nil(ct);
                assert_eq!(GoValuer::new(&ft, &nil).value(), Ok(DriverValue::Null), "{t}");
            }
        }
    }

    #[test]
    fn valuer_requires_go_type_capability() {
        let ft = BaseFieldType::new("c", "GEOMETRY");
        let v = ColumnValue::from_string("POINT(1 2)");
        assert_eq!(GoValuer::new(&ft, &v).value(), Err(FieldError::NotValuerGoType));

        let nil = ColumnValue::nil(ColumnType::String);
        assert_eq!(GoValuer::new(&ft, &nil).value(), Err(FieldError::NotValuerGoType));
    }

    #[test]
    fn valuer_dispatches_on_go_type() {
        let v = ColumnValue::decimal_from_str("42.9").unwrap();
        let cases = [
            (GoType::Bool, DriverValue::Bool(true)),
            (GoType::Int8, DriverValue::Int8(42)),
            (GoType::Int16, DriverValue::Int16(42)),
            (GoType::Int32, DriverValue::Int32(42)),
            (GoType::Int64, DriverValue::Int64(42)),
            (GoType::Float32, DriverValue::Float32(42.9)),
            (GoType::Float64, DriverValue::Float64(42.9)),
            (GoType::String, DriverValue::String("42.9".into())),
            (GoType::Bytes, DriverValue::Bytes(b"42.9".to_vec())),
        ];
        for (t, want) in cases {
            let ft = go_type(t);
            assert_eq!(GoValuer::new(&ft, &v).value().unwrap(), want, "{t}");
        }
    }

    #[test]
    fn valuer_propagates_conversion_errors() {
        let ft = go_type(GoType::Time);
        let v = ColumnValue::decimal_from_str("1.5").unwrap();
        assert!(matches!(
            GoValuer::new(&ft, &v).value(),
            Err(FieldError::Column(ColumnError::Transform { .. }))
        ));

        let ft = go_type(GoType::Int8);
        let v = ColumnValue::from_big_int(1000);
        assert!(matches!(
            GoValuer::new(&ft, &v).value(),
            Err(FieldError::Column(ColumnError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn valuer_names_unknown_go_type() {
        let ft = go_type(GoType::Unknown);
        let v = ColumnValue::from_bool(true);
        let err = GoValuer::new(&ft, &v).value().unwrap_err();
        assert_eq!(
            err,
            FieldError::UnknownGoType {
                go_type: "unknow".into(),
                database_type: "NUMERIC".into()
            }
        );
        assert_eq!(err.to_string(), "unknow type(NUMERIC)");
    }

    #[test]
    fn scanner_converts_to_declared_type() {
        let ft = go_type(GoType::Int64);
        let mut s = GoScanner::new("id", &ft);
        s.scan(DriverValue::Bytes(b"17".to_vec())).unwrap();
        assert_eq!(s.take_column().unwrap(), ColumnValue::from_big_int(BigInt::from(17)));

        let ft = go_type(GoType::Float64);
        let mut s = GoScanner::new("price", &ft);
        s.scan(DriverValue::String("10.123".into())).unwrap();
        assert_eq!(s.take_column().unwrap().as_string().unwrap(), "10.123");
    }

    #[test]
    fn scanner_produces_typed_nil() {
        let ft = go_type(GoType::Time);
        let mut s = GoScanner::new("ts", &ft);
        s.scan(DriverValue::Null).unwrap();
        assert_eq!(s.take_column().unwrap(), ColumnValue::nil(ColumnType::Time));
    }

    #[test]
    fn scanner_without_go_type_keeps_driver_kind() {
        let ft = BaseFieldType::new("c", "TEXT");
        let mut s = GoScanner::new("c", &ft);
        s.scan(DriverValue::Int32(5)).unwrap();
        assert_eq!(s.take_column().unwrap().column_type(), ColumnType::BigInt);
        assert_eq!(s.take_column(), Err(FieldError::NotScanned("c".into())));
    }

    #[test]
    fn scanner_reports_bad_input() {
        let ft = go_type(GoType::Int64);
        let mut s = GoScanner::new("id", &ft);
        assert!(s.scan(DriverValue::String("x1".into())).is_err());
    }
}
