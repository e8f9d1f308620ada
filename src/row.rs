//! Row values and typed access
//!
//! [`Value`] is the in-memory shape of anything fetched from or bound into a
//! statement. NUMBER values keep their exact decimal text; use the typed
//! accessors to convert at the edge.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDateTime};

use crate::buffer::ReadBuffer;
use crate::constants::OracleType;
use crate::error::{Error, Result};
use crate::types::{
    decode_date, decode_number, decode_timestamp_tz, IntervalDS, IntervalYM, LobLocator, RefCursor,
};

/// A single column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Exact NUMBER decimal, canonical text form
    Number(String),
    /// BINARY_DOUBLE / BINARY_FLOAT
    Double(f64),
    /// VARCHAR2 / CHAR / LONG
    Text(String),
    /// RAW / LONG RAW
    Raw(Bytes),
    /// BOOLEAN
    Boolean(bool),
    /// DATE / TIMESTAMP (no zone)
    Timestamp(NaiveDateTime),
    /// TIMESTAMP WITH TIME ZONE
    TimestampTz(DateTime<FixedOffset>),
    /// INTERVAL YEAR TO MONTH
    IntervalYm(IntervalYM),
    /// INTERVAL DAY TO SECOND
    IntervalDs(IntervalDS),
    /// CLOB / BLOB locator; content is fetched via LOB operations
    Lob(LobLocator),
    /// REF CURSOR handle
    Cursor(RefCursor),
}

impl Value {
    /// Whether this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// View as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Number(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(s) => s.parse().ok(),
            Value::Double(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Boolean(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Convert to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(s) => s.parse().ok(),
            Value::Double(f) => Some(*f),
            _ => None,
        }
    }

    /// View as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// View as raw bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Raw(b) => Some(b),
            Value::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// View as a timestamp
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(t) => Some(*t),
            Value::TimestampTz(t) => Some(t.naive_local()),
            _ => None,
        }
    }

    /// The wire type used to bind this value
    pub fn oracle_type(&self) -> OracleType {
        match self {
            Value::Null => OracleType::Varchar,
            Value::Number(_) => OracleType::Number,
            Value::Double(_) => OracleType::BinaryDouble,
            Value::Text(_) => OracleType::Varchar,
            Value::Raw(_) => OracleType::Raw,
            Value::Boolean(_) => OracleType::Boolean,
            Value::Timestamp(_) => OracleType::Timestamp,
            Value::TimestampTz(_) => OracleType::TimestampTz,
            Value::IntervalYm(_) => OracleType::IntervalYm,
            Value::IntervalDs(_) => OracleType::IntervalDs,
            Value::Lob(l) => {
                if l.is_blob() {
                    OracleType::Blob
                } else {
                    OracleType::Clob
                }
            }
            Value::Cursor(_) => OracleType::Cursor,
        }
    }

    /// Encode this value into its raw field bytes (without length prefix)
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Value::Null => Ok(Vec::new()),
            Value::Number(s) => crate::types::encode_number(s),
            Value::Double(f) => {
                // sign-folded IEEE representation
                let mut b = f.to_be_bytes();
                if b[0] & 0x80 == 0 {
                    b[0] |= 0x80;
                } else {
                    for byte in &mut b {
                        *byte = !*byte;
                    }
                }
                Ok(b.to_vec())
            }
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            Value::Raw(b) => Ok(b.to_vec()),
            Value::Boolean(b) => Ok(vec![*b as u8]),
            Value::Timestamp(t) => Ok(crate::types::encode_timestamp(t)?.to_vec()),
            Value::TimestampTz(t) => Ok(crate::types::encode_timestamp_tz(t)?.to_vec()),
            Value::IntervalYm(i) => Ok(i.encode().to_vec()),
            Value::IntervalDs(i) => Ok(i.encode().to_vec()),
            Value::Lob(l) => Ok(l.as_bytes().to_vec()),
            Value::Cursor(_) => Err(Error::UnsupportedConversion(
                "REF CURSOR values cannot be bound as input".into(),
            )),
        }
    }

    /// Decode raw column bytes into a value of the described type
    pub fn decode(raw: &[u8], oracle_type: OracleType) -> Result<Value> {
        if raw.is_empty() {
            return Ok(Value::Null);
        }
        match oracle_type {
            OracleType::Varchar | OracleType::Char | OracleType::Long => {
                let text = String::from_utf8(raw.to_vec()).map_err(|e| {
                    Error::UnsupportedConversion(format!("non-UTF-8 string column: {}", e))
                })?;
                Ok(Value::Text(text))
            }
            OracleType::Number | OracleType::BinaryInteger => {
                Ok(Value::Number(decode_number(raw)?.text))
            }
            OracleType::BinaryDouble => {
                if raw.len() != 8 {
                    return Err(Error::UnsupportedConversion(
                        "BINARY_DOUBLE field must be 8 bytes".into(),
                    ));
                }
                // sign-folded IEEE representation
                let mut b = [raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7]];
                if b[0] & 0x80 != 0 {
                    b[0] &= 0x7f;
                } else {
                    for byte in &mut b {
                        *byte = !*byte;
                    }
                }
                Ok(Value::Double(f64::from_be_bytes(b)))
            }
            OracleType::BinaryFloat => {
                if raw.len() != 4 {
                    return Err(Error::UnsupportedConversion(
                        "BINARY_FLOAT field must be 4 bytes".into(),
                    ));
                }
                let mut b = [raw[0], raw[1], raw[2], raw[3]];
                if b[0] & 0x80 != 0 {
                    b[0] &= 0x7f;
                } else {
                    for byte in &mut b {
                        *byte = !*byte;
                    }
                }
                Ok(Value::Double(f32::from_be_bytes(b) as f64))
            }
            OracleType::Date | OracleType::Timestamp | OracleType::TimestampLtz => {
                Ok(Value::Timestamp(decode_date(raw)?))
            }
            OracleType::TimestampTz => Ok(Value::TimestampTz(decode_timestamp_tz(raw)?)),
            OracleType::IntervalYm => Ok(Value::IntervalYm(IntervalYM::decode(raw)?)),
            OracleType::IntervalDs => Ok(Value::IntervalDs(IntervalDS::decode(raw)?)),
            OracleType::Raw | OracleType::LongRaw => {
                Ok(Value::Raw(Bytes::copy_from_slice(raw)))
            }
            OracleType::Boolean => {
                // single byte tag: 0 false, anything else true; a trailing
                // length form wraps it for some server versions
                Ok(Value::Boolean(*raw.last().unwrap_or(&0) != 0))
            }
            OracleType::Clob | OracleType::Blob => {
                Ok(Value::Lob(LobLocator::from_bytes(raw.to_vec())?))
            }
            OracleType::Cursor => {
                let mut buf = ReadBuffer::from_slice(raw);
                Ok(Value::Cursor(RefCursor::new(buf.read_ub2()?)))
            }
            OracleType::Rowid => {
                let text = String::from_utf8_lossy(raw).into_owned();
                Ok(Value::Text(text))
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v.to_string())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(v.to_string())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Raw(Bytes::from(v))
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// Description of one result-set column
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column name as described by the server
    pub name: String,
    /// Wire type of the column
    pub oracle_type: OracleType,
    /// Maximum byte length for variable-width columns
    pub max_size: u32,
    /// NUMBER precision, 0 when unspecified
    pub precision: i16,
    /// NUMBER / timestamp scale
    pub scale: i16,
    /// Whether NULLs may appear
    pub nullable: bool,
}

/// One fetched row
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Build a row from decoded values
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column value by position
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// All values in column order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the row, yielding its values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encode_number;

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(42i64).as_i64(), Some(42));
        assert_eq!(Value::from(2.5f64).as_f64(), Some(2.5));
        assert_eq!(Value::from("abc").as_str(), Some("abc"));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert!(Value::from(None::<i64>).is_null());
    }

    #[test]
    fn test_decode_null() {
        assert!(Value::decode(&[], OracleType::Varchar).unwrap().is_null());
    }

    #[test]
    fn test_decode_varchar() {
        let v = Value::decode(b"hello", OracleType::Varchar).unwrap();
        assert_eq!(v.as_str(), Some("hello"));
    }

    #[test]
    fn test_decode_number_exact() {
        let raw = encode_number("12345.6789").unwrap();
        let v = Value::decode(&raw, OracleType::Number).unwrap();
        assert_eq!(v.as_str(), Some("12345.6789"));
    }

    #[test]
    fn test_decode_binary_double_roundtrip_sign_fold() {
        // 1.0 in the sign-folded wire form: IEEE bytes with sign bit toggled
        let mut wire = 1.0f64.to_be_bytes();
        wire[0] |= 0x80;
        let v = Value::decode(&wire, OracleType::BinaryDouble).unwrap();
        assert_eq!(v.as_f64(), Some(1.0));

        // negative values arrive complemented
        let mut wire = (-2.5f64).to_be_bytes();
        for b in &mut wire {
            *b = !*b;
        }
        let v = Value::decode(&wire, OracleType::BinaryDouble).unwrap();
        assert_eq!(v.as_f64(), Some(-2.5));
    }

    #[test]
    fn test_decode_boolean() {
        assert_eq!(
            Value::decode(&[1], OracleType::Boolean).unwrap().as_bool(),
            Some(true)
        );
        assert_eq!(
            Value::decode(&[0], OracleType::Boolean).unwrap().as_bool(),
            Some(false)
        );
    }

    #[test]
    fn test_decode_invalid_utf8_rejected() {
        assert!(matches!(
            Value::decode(&[0xff, 0xfe], OracleType::Varchar),
            Err(Error::UnsupportedConversion(_))
        ));
    }

    #[test]
    fn test_oracle_type_mapping() {
        assert_eq!(Value::from(1i64).oracle_type(), OracleType::Number);
        assert_eq!(Value::from("x").oracle_type(), OracleType::Varchar);
        assert_eq!(Value::from(true).oracle_type(), OracleType::Boolean);
        assert_eq!(
            Value::Raw(Bytes::from_static(b"z")).oracle_type(),
            OracleType::Raw
        );
    }

    #[test]
    fn test_row_access() {
        let row = Row::new(vec![Value::from(1i64), Value::from("a")]);
        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0).unwrap().as_i64(), Some(1));
        assert_eq!(row.get(1).unwrap().as_str(), Some("a"));
        assert!(row.get(2).is_none());
    }
}
