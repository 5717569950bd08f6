//! Dynamic values and bind-parameter classification.
//!
//! [`Value`] is the closed set of values the engine can bind. It is built once at
//! the call boundary (via `From` conversions) and classified into a [`ParamKind`]
//! by [`Value::bind`]:
//!
//! | value   | kind   | bound representation      |
//! |---------|--------|---------------------------|
//! | Null    | Null   | `NULL`                    |
//! | Int     | Int    | unchanged                 |
//! | Float   | Str    | decimal text              |
//! | Decimal | Str    | exact decimal             |
//! | Bool    | Bool   | `"1"` / `"0"`             |
//! | Str     | Str    | unchanged                 |
//! | Blob    | Lob    | unchanged                 |

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::error::Error;
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type};

type BoxError = Box<dyn Error + Sync + Send>;

/// A dynamically typed SQL value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Bool(bool),
    Str(String),
    Blob(Vec<u8>),
}

/// Bind-parameter kind handed to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Null,
    Int,
    Bool,
    Str,
    Lob,
}

/// A normalized value paired with its parameter kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub value: Value,
    pub kind: ParamKind,
}

impl Value {
    /// Classify this value and normalize its representation for binding.
    pub fn bind(self) -> Bound {
        let (value, kind) = match self {
            Value::Null => (Value::Null, ParamKind::Null),
            Value::Int(i) => (Value::Int(i), ParamKind::Int),
            Value::Float(f) => (Value::Str(f.to_string()), ParamKind::Str),
            Value::Decimal(d) => (Value::Decimal(d), ParamKind::Str),
            Value::Bool(b) => (Value::Str(if b { "1" } else { "0" }.to_string()), ParamKind::Bool),
            Value::Str(s) => (Value::Str(s), ParamKind::Str),
            Value::Blob(b) => (Value::Blob(b), ParamKind::Lob),
        };
        Bound { value, kind }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Textual form used for numeric checks and text encoding. `None` for NULL and blobs.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null | Value::Blob(_) => None,
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Decimal(d) => Some(d.to_string()),
            Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Value::Str(s) => Some(s.clone()),
        }
    }

    /// Returns `true` for integers, floats and strings that parse as a number.
    pub fn is_numeric(&self) -> bool {
        match self {
            Value::Int(_) | Value::Decimal(_) => true,
            Value::Float(f) => f.is_finite(),
            Value::Str(s) => {
                let s = s.trim();
                !s.is_empty() && s.parse::<f64>().is_ok_and(f64::is_finite)
            }
            _ => false,
        }
    }
}

// ─── Conversions ────────────────────────────────────────────────────────────

macro_rules! from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Str(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Str(v.to_rfc3339())
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Value::Str(v.to_string())
    }
}

/// JSON scalars map to their natural variant; arrays and objects bind as JSON text.
///
/// Integers beyond `i64` stay exact as [`Value::Decimal`].
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => Value::Int(i),
                (None, Some(u)) => Value::Decimal(Decimal::from(u)),
                (None, None) => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            other => Value::Str(other.to_string()),
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        Value::from(v.clone())
    }
}

/// Extract a typed value from a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|i| i32::try_from(i).ok())
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.to_f64(),
            Value::Int(i) => Some(*i as f64),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Decimal(d) => Some(*d),
            Value::Int(i) => Some(Decimal::from(*i)),
            Value::Float(f) => Decimal::from_f64_retain(*f),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Str(s) => parse_bool(s),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(b.to_string()),
            other => other.as_text(),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Blob(b) => Some(b.clone()),
            Value::Str(s) => Some(s.as_bytes().to_vec()),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "y" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "n" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ─── ToSql / FromSql ────────────────────────────────────────────────────────

impl ToSql for Bound {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match (self.kind, &self.value) {
            (ParamKind::Null, _) | (_, Value::Null) => Ok(IsNull::Yes),
            (ParamKind::Lob, Value::Blob(bytes)) => encode_bytes(bytes, ty, out),
            (ParamKind::Int, Value::Int(i)) => encode_int(*i, ty, out),
            (ParamKind::Bool, value) => {
                let flag = value.as_text().as_deref() == Some("1");
                encode_bool(flag, ty, out)
            }
            (_, Value::Blob(bytes)) => encode_bytes(bytes, ty, out),
            (_, Value::Decimal(d)) => encode_decimal(*d, ty, out),
            (_, value) => {
                let text = value.as_text().unwrap_or_default();
                encode_text(&text, ty, out)
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

fn encode_int(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::INT8 => i.to_sql(ty, out),
        Type::OID => u32::try_from(i)?.to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        Type::BOOL => (i != 0).to_sql(ty, out),
        _ => encode_text(&i.to_string(), ty, out),
    }
}

fn encode_bool(flag: bool, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::BOOL => flag.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 => encode_int(i64::from(flag), ty, out),
        _ => encode_text(if flag { "1" } else { "0" }, ty, out),
    }
}

fn encode_decimal(d: Decimal, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::NUMERIC => d.to_sql(ty, out),
        _ => encode_text(&d.to_string(), ty, out),
    }
}

fn encode_bytes(bytes: &[u8], ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::BYTEA {
        return bytes.to_sql(ty, out);
    }
    Err(format!("cannot bind binary data as {ty}").into())
}

fn encode_text(text: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::BOOL => parse_bool(text)
            .ok_or_else(|| format!("invalid boolean: {text}"))?
            .to_sql(ty, out),
        Type::INT2 => text.trim().parse::<i16>()?.to_sql(ty, out),
        Type::INT4 => text.trim().parse::<i32>()?.to_sql(ty, out),
        Type::INT8 => text.trim().parse::<i64>()?.to_sql(ty, out),
        Type::FLOAT4 => text.trim().parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => text.trim().parse::<f64>()?.to_sql(ty, out),
        Type::NUMERIC => text.trim().parse::<Decimal>()?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(text)?.to_sql(ty, out),
        Type::UUID => uuid::Uuid::parse_str(text.trim())?.to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")?.to_sql(ty, out),
        Type::TIME => text.trim().parse::<NaiveTime>()?.to_sql(ty, out),
        Type::TIMESTAMP => text
            .trim()
            .replacen(' ', "T", 1)
            .parse::<NaiveDateTime>()?
            .to_sql(ty, out),
        Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(text.trim())?
            .with_timezone(&Utc)
            .to_sql(ty, out),
        Type::BYTEA => text.as_bytes().to_sql(ty, out),
        _ if <&str as ToSql>::accepts(ty) => text.to_sql(ty, out),
        _ => Err(format!("cannot bind text parameter as {ty}").into()),
    }
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => Value::Int(i64::from(i16::from_sql(ty, raw)?)),
            Type::INT4 => Value::Int(i64::from(i32::from_sql(ty, raw)?)),
            Type::INT8 => Value::Int(i64::from_sql(ty, raw)?),
            Type::OID => Value::Int(i64::from(u32::from_sql(ty, raw)?)),
            Type::FLOAT4 => Value::Float(f64::from(f32::from_sql(ty, raw)?)),
            Type::FLOAT8 => Value::Float(f64::from_sql(ty, raw)?),
            Type::NUMERIC => Value::Decimal(Decimal::from_sql(ty, raw)?),
            Type::BYTEA => Value::Blob(Vec::<u8>::from_sql(ty, raw)?),
            Type::JSON | Type::JSONB => {
                Value::Str(serde_json::Value::from_sql(ty, raw)?.to_string())
            }
            Type::UUID => Value::Str(uuid::Uuid::from_sql(ty, raw)?.to_string()),
            Type::DATE => Value::Str(NaiveDate::from_sql(ty, raw)?.to_string()),
            Type::TIME => Value::Str(NaiveTime::from_sql(ty, raw)?.to_string()),
            Type::TIMESTAMP => Value::Str(NaiveDateTime::from_sql(ty, raw)?.to_string()),
            Type::TIMESTAMPTZ => Value::Str(DateTime::<Utc>::from_sql(ty, raw)?.to_rfc3339()),
            _ if <String as FromSql>::accepts(ty) => Value::Str(String::from_sql(ty, raw)?),
            _ if matches!(ty.kind(), Kind::Enum(_)) => Value::Str(std::str::from_utf8(raw)?.to_string()),
            // Arrays, intervals, network types and the like keep their wire bytes.
            _ => Value::Blob(raw.to_vec()),
        })
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(Value::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_map_table() {
        assert_eq!(Value::Null.bind().kind, ParamKind::Null);
        assert_eq!(Value::from(7).bind(), Bound { value: Value::Int(7), kind: ParamKind::Int });
        assert_eq!(
            Value::from(1.25).bind(),
            Bound { value: Value::Str("1.25".into()), kind: ParamKind::Str }
        );
        assert_eq!(
            Value::from(true).bind(),
            Bound { value: Value::Str("1".into()), kind: ParamKind::Bool }
        );
        assert_eq!(Value::from(false).bind().value, Value::Str("0".into()));
        assert_eq!(Value::from("x").bind().kind, ParamKind::Str);
        assert_eq!(Value::from(vec![1u8, 2]).bind().kind, ParamKind::Lob);
    }

    #[test]
    fn json_objects_bind_as_text() {
        let v = Value::from(serde_json::json!({"a": 1}));
        assert_eq!(v, Value::Str(r#"{"a":1}"#.into()));
        assert_eq!(Value::from(serde_json::json!(3)), Value::Int(3));
        assert_eq!(Value::from(serde_json::json!(null)), Value::Null);
    }

    #[test]
    fn option_maps_to_null() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::Str("a".into()));
    }

    #[test]
    fn numeric_detection() {
        assert!(Value::from(10).is_numeric());
        assert!(Value::from("10").is_numeric());
        assert!(Value::from(" 2.5 ").is_numeric());
        assert!(!Value::from("abc").is_numeric());
        assert!(!Value::from("").is_numeric());
        assert!(!Value::Null.is_numeric());
        assert!(!Value::from(true).is_numeric());
    }

    #[test]
    fn from_value_conversions() {
        assert_eq!(i64::from_value(&Value::Str("42".into())), Some(42));
        assert_eq!(bool::from_value(&Value::Str("t".into())), Some(true));
        assert_eq!(Option::<i64>::from_value(&Value::Null), Some(None));
        assert_eq!(String::from_value(&Value::Int(5)), Some("5".into()));
        assert_eq!(i32::from_value(&Value::Int(i64::MAX)), None);
    }

    #[test]
    fn decimals_bind_exactly() {
        let d: Decimal = "12345.678".parse().unwrap();
        let bound = Value::from(d).bind();
        assert_eq!(bound.kind, ParamKind::Str);

        let mut ours = BytesMut::new();
        let mut theirs = BytesMut::new();
        bound.to_sql(&Type::NUMERIC, &mut ours).unwrap();
        d.to_sql(&Type::NUMERIC, &mut theirs).unwrap();
        assert_eq!(ours, theirs);
        assert_eq!(Value::from_sql(&Type::NUMERIC, &ours).unwrap(), Value::Decimal(d));
    }

    #[test]
    fn float_text_binds_into_numeric_column() {
        let mut buf = BytesMut::new();
        Value::from(2.5).bind().to_sql(&Type::NUMERIC, &mut buf).unwrap();
        let back = Decimal::from_sql(&Type::NUMERIC, &buf).unwrap();
        assert_eq!(back.to_string(), "2.5");
    }

    #[test]
    fn json_integers_beyond_i64_stay_exact() {
        let v = Value::from(serde_json::json!(18446744073709551615u64));
        assert_eq!(v, Value::Decimal(Decimal::from(u64::MAX)));
        assert_eq!(v.bind().value.as_text().as_deref(), Some("18446744073709551615"));
        assert_eq!(Value::from(serde_json::json!(-5)), Value::Int(-5));
        assert_eq!(Value::from(serde_json::json!(0.5)), Value::Float(0.5));
    }

    #[test]
    fn unlisted_types_decode_without_failing() {
        for ty in [Type::INT4_ARRAY, Type::INTERVAL, Type::INET, Type::MONEY] {
            assert!(<Value as FromSql>::accepts(&ty), "{ty}");
        }
        let raw = [0u8, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 23];
        assert_eq!(
            Value::from_sql(&Type::INT4_ARRAY, &raw).unwrap(),
            Value::Blob(raw.to_vec())
        );
        assert_eq!(
            Value::from_sql(&Type::VARCHAR, b"abc").unwrap(),
            Value::Str("abc".into())
        );
    }

    #[test]
    fn decimal_conversions() {
        let d = Value::Decimal(Decimal::new(4200, 2));
        assert_eq!(i64::from_value(&d), Some(42));
        assert_eq!(f64::from_value(&d), Some(42.0));
        assert_eq!(String::from_value(&d), Some("42.00".into()));
        assert_eq!(Decimal::from_value(&Value::Str("1.10".into())), Some(Decimal::new(110, 2)));
        assert_eq!(i64::from_value(&Value::Decimal(Decimal::new(15, 1))), None);
    }

    #[test]
    fn bound_encodes_bool_into_int_column() {
        let bound = Value::from(true).bind();
        let mut buf = BytesMut::new();
        assert!(matches!(bound.to_sql(&Type::INT4, &mut buf), Ok(IsNull::No)));
        assert_eq!(&buf[..], &1i32.to_be_bytes());
    }

    #[test]
    fn bound_null_is_null() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            Value::Null.bind().to_sql(&Type::TEXT, &mut buf),
            Ok(IsNull::Yes)
        ));
    }
}
