use std::fmt;

/// Column data types. Char and VarChar carry their declared maximum
/// length in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    Timestamp,
    Char(u16),
    VarChar(u16),
}

impl DataType {
    /// Returns the on-page size for fixed-length types, None for VarChar.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            DataType::Boolean | DataType::TinyInt => Some(1),
            DataType::SmallInt => Some(2),
            DataType::Integer | DataType::Float => Some(4),
            DataType::BigInt | DataType::Double | DataType::Timestamp => Some(8),
            DataType::Char(n) => Some(*n as usize),
            DataType::VarChar(_) => None,
        }
    }

    /// Returns the maximum size this type can occupy in a tuple.
    pub fn max_size(&self) -> usize {
        match self {
            DataType::VarChar(n) => *n as usize + 2,
            other => other.fixed_size().unwrap(),
        }
    }

    /// One-byte tag used by fixed-width value encodings.
    pub fn tag(&self) -> u8 {
        match self {
            DataType::Boolean => 1,
            DataType::TinyInt => 2,
            DataType::SmallInt => 3,
            DataType::Integer => 4,
            DataType::BigInt => 5,
            DataType::Float => 6,
            DataType::Double => 7,
            DataType::Timestamp => 8,
            DataType::Char(_) => 9,
            DataType::VarChar(_) => 10,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Char(n) => write!(f, "CHAR({})", n),
            DataType::VarChar(n) => write!(f, "VARCHAR({})", n),
            other => write!(f, "{}", format!("{:?}", other).to_uppercase()),
        }
    }
}
