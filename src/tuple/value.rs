use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::DataType;

/// Size of a value in the fixed-width encoding used by sort pages:
/// one type tag, one null flag, eight payload bytes.
pub const FIXED_VALUE_SIZE: usize = 10;

/// Represents a typed value that can be stored in a tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value - can be any type
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    /// String value (used for both Char and VarChar)
    String(String),
    /// Microseconds since the Unix epoch
    Timestamp(i64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// A NULL typed as `data_type` (NULLs are untyped in memory, so this
    /// mirrors the factory interface only).
    pub fn null_of(_data_type: DataType) -> Value {
        Value::Null
    }

    /// The zero of the given type; used by aggregates over empty input.
    pub fn zero_of(data_type: DataType) -> Value {
        match data_type {
            DataType::Boolean => Value::Boolean(false),
            DataType::TinyInt => Value::TinyInt(0),
            DataType::SmallInt => Value::SmallInt(0),
            DataType::Integer => Value::Integer(0),
            DataType::BigInt => Value::BigInt(0),
            DataType::Float => Value::Float(0.0),
            DataType::Double => Value::Double(0.0),
            DataType::Timestamp => Value::Timestamp(0),
            DataType::Char(_) | DataType::VarChar(_) => Value::String(String::new()),
        }
    }

    /// Reads the value as a boolean predicate result. NULL is None.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Null => None,
            other => Some(!matches!(other.compare(&Value::Integer(0)), Some(Ordering::Equal))),
        }
    }

    /// Widens integer values to i64 for index keys and arithmetic.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(*v as i64),
            Value::SmallInt(v) => Some(*v as i64),
            Value::Integer(v) => Some(*v as i64),
            Value::BigInt(v) => Some(*v),
            Value::Timestamp(v) => Some(*v),
            Value::Boolean(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Serializes a value to bytes according to the given DataType.
    /// NULLs serialize as zeroed bytes of the type's width so column
    /// offsets stay computable; the tuple's null bitmap is authoritative.
    pub fn serialize(&self, data_type: &DataType) -> Option<Vec<u8>> {
        if self.is_null() {
            return Some(match data_type {
                DataType::VarChar(_) => 0u16.to_le_bytes().to_vec(),
                fixed => vec![0u8; fixed.fixed_size().unwrap()],
            });
        }

        match (self, data_type) {
            (Value::Boolean(b), DataType::Boolean) => Some(vec![u8::from(*b)]),
            (Value::TinyInt(v), DataType::TinyInt) => Some(v.to_le_bytes().to_vec()),
            (Value::SmallInt(v), DataType::SmallInt) => Some(v.to_le_bytes().to_vec()),
            (Value::Integer(v), DataType::Integer) => Some(v.to_le_bytes().to_vec()),
            (Value::BigInt(v), DataType::BigInt) => Some(v.to_le_bytes().to_vec()),
            (Value::Float(v), DataType::Float) => Some(v.to_le_bytes().to_vec()),
            (Value::Double(v), DataType::Double) => Some(v.to_le_bytes().to_vec()),
            (Value::Timestamp(v), DataType::Timestamp) => Some(v.to_le_bytes().to_vec()),

            (Value::String(s), DataType::Char(n)) => {
                let n = *n as usize;
                let bytes = s.as_bytes();
                if bytes.len() > n {
                    return None;
                }
                let mut result = bytes.to_vec();
                result.resize(n, b' ');
                Some(result)
            }

            (Value::String(s), DataType::VarChar(max_len)) => {
                let bytes = s.as_bytes();
                if bytes.len() > *max_len as usize {
                    return None;
                }
                let mut result = (bytes.len() as u16).to_le_bytes().to_vec();
                result.extend_from_slice(bytes);
                Some(result)
            }

            // Integer widening on write
            (Value::TinyInt(v), DataType::SmallInt) => Some((*v as i16).to_le_bytes().to_vec()),
            (Value::TinyInt(v), DataType::Integer) => Some((*v as i32).to_le_bytes().to_vec()),
            (Value::TinyInt(v), DataType::BigInt) => Some((*v as i64).to_le_bytes().to_vec()),
            (Value::SmallInt(v), DataType::Integer) => Some((*v as i32).to_le_bytes().to_vec()),
            (Value::SmallInt(v), DataType::BigInt) => Some((*v as i64).to_le_bytes().to_vec()),
            (Value::Integer(v), DataType::BigInt) => Some((*v as i64).to_le_bytes().to_vec()),
            (Value::Float(v), DataType::Double) => Some((*v as f64).to_le_bytes().to_vec()),

            _ => None,
        }
    }

    /// Deserializes a value from bytes according to the given DataType.
    /// Returns the value and number of bytes consumed.
    pub fn deserialize(data: &[u8], data_type: &DataType) -> Option<(Self, usize)> {
        match data_type {
            DataType::Boolean => Some((Value::Boolean(*data.first()? != 0), 1)),
            DataType::TinyInt => Some((Value::TinyInt(*data.first()? as i8), 1)),
            DataType::SmallInt => {
                let v = i16::from_le_bytes(data.get(..2)?.try_into().ok()?);
                Some((Value::SmallInt(v), 2))
            }
            DataType::Integer => {
                let v = i32::from_le_bytes(data.get(..4)?.try_into().ok()?);
                Some((Value::Integer(v), 4))
            }
            DataType::BigInt => {
                let v = i64::from_le_bytes(data.get(..8)?.try_into().ok()?);
                Some((Value::BigInt(v), 8))
            }
            DataType::Float => {
                let v = f32::from_le_bytes(data.get(..4)?.try_into().ok()?);
                Some((Value::Float(v), 4))
            }
            DataType::Double => {
                let v = f64::from_le_bytes(data.get(..8)?.try_into().ok()?);
                Some((Value::Double(v), 8))
            }
            DataType::Timestamp => {
                let v = i64::from_le_bytes(data.get(..8)?.try_into().ok()?);
                Some((Value::Timestamp(v), 8))
            }
            DataType::Char(n) => {
                let n = *n as usize;
                let s = String::from_utf8_lossy(data.get(..n)?).trim_end().to_string();
                Some((Value::String(s), n))
            }
            DataType::VarChar(_) => {
                let len = u16::from_le_bytes(data.get(..2)?.try_into().ok()?) as usize;
                let s = String::from_utf8_lossy(data.get(2..2 + len)?).to_string();
                Some((Value::String(s), 2 + len))
            }
        }
    }

    /// Fixed ten-byte encoding for sort keys. Strings are not supported;
    /// sort keys must be fixed-width values.
    pub fn encode_fixed(&self) -> [u8; FIXED_VALUE_SIZE] {
        let mut out = [0u8; FIXED_VALUE_SIZE];
        let (tag, payload): (u8, u64) = match self {
            Value::Null => (0, 0),
            Value::Boolean(b) => (DataType::Boolean.tag(), *b as u64),
            Value::TinyInt(v) => (DataType::TinyInt.tag(), *v as i64 as u64),
            Value::SmallInt(v) => (DataType::SmallInt.tag(), *v as i64 as u64),
            Value::Integer(v) => (DataType::Integer.tag(), *v as i64 as u64),
            Value::BigInt(v) => (DataType::BigInt.tag(), *v as u64),
            Value::Float(v) => (DataType::Float.tag(), v.to_bits() as u64),
            Value::Double(v) => (DataType::Double.tag(), v.to_bits()),
            Value::Timestamp(v) => (DataType::Timestamp.tag(), *v as u64),
            Value::String(_) => panic!("strings have no fixed-width encoding"),
        };
        out[0] = tag;
        out[1] = u8::from(self.is_null());
        out[2..].copy_from_slice(&payload.to_le_bytes());
        out
    }

    pub fn decode_fixed(data: &[u8]) -> Value {
        assert!(data.len() >= FIXED_VALUE_SIZE);
        if data[1] != 0 || data[0] == 0 {
            return Value::Null;
        }
        let payload = u64::from_le_bytes(data[2..10].try_into().unwrap());
        match data[0] {
            1 => Value::Boolean(payload != 0),
            2 => Value::TinyInt(payload as i8),
            3 => Value::SmallInt(payload as i16),
            4 => Value::Integer(payload as i32),
            5 => Value::BigInt(payload as i64),
            6 => Value::Float(f32::from_bits(payload as u32)),
            7 => Value::Double(f64::from_bits(payload)),
            8 => Value::Timestamp(payload as i64),
            tag => panic!("unknown value tag {tag}"),
        }
    }

    /// Compares two values for ordering.
    /// Returns None if the values are not comparable (NULL involved or
    /// mismatched types).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,

            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Float(b)) => a.partial_cmp(&(*b as f64)),

            // Integer family compares through i64
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => None,
            },
        }
    }

    pub fn compare_equals(&self, other: &Value) -> bool {
        matches!(self.compare(other), Some(Ordering::Equal))
    }
}

// Group-by and join keys need Values as hash-map keys. Floats hash by bit
// pattern, which matches the derived equality.
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::TinyInt(v) => v.hash(state),
            Value::SmallInt(v) => v.hash(state),
            Value::Integer(v) => v.hash(state),
            Value::BigInt(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Timestamp(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "<NULL>"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::TinyInt(v) => write!(f, "{}", v),
            Value::SmallInt(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "'{}'", s),
            Value::Timestamp(v) => write!(f, "TIMESTAMP({})", v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
