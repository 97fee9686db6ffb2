//! Value and type vocabulary shared by the record codec, B+tree key encoding, and catalog.

use std::fmt;

/// The five field kinds a record column can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DataType {
    Int64,
    Bool,
    Float64,
    Text,
    Blob,
}

impl DataType {
    pub fn tag(self) -> u8 {
        match self {
            DataType::Int64 => 1,
            DataType::Bool => 2,
            DataType::Float64 => 3,
            DataType::Text => 4,
            DataType::Blob => 5,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(DataType::Int64),
            2 => Some(DataType::Bool),
            3 => Some(DataType::Float64),
            4 => Some(DataType::Text),
            5 => Some(DataType::Blob),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int64 => write!(f, "INT64"),
            DataType::Bool => write!(f, "BOOL"),
            DataType::Float64 => write!(f, "FLOAT64"),
            DataType::Text => write!(f, "TEXT"),
            DataType::Blob => write!(f, "BLOB"),
        }
    }
}

/// A runtime value. `Null` is not a `DataType` variant; it is a value that any
/// nullable column may hold regardless of its declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int64(i64),
    Bool(bool),
    Float64(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Int64(_) => Some(DataType::Int64),
            Value::Bool(_) => Some(DataType::Bool),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Text(_) => Some(DataType::Text),
            Value::Blob(_) => Some(DataType::Blob),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Byte length of the payload this value would contribute to an encoded record,
    /// before any overflow decision. Used to decide whether a field must spill.
    pub fn payload_len(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Int64(_) => 8,
            Value::Bool(_) => 1,
            Value::Float64(_) => 8,
            Value::Text(s) => s.len(),
            Value::Blob(b) => b.len(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Blob(v) => write!(f, "<binary {} bytes>", v.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_tag_roundtrip() {
        for dt in [
            DataType::Int64,
            DataType::Bool,
            DataType::Float64,
            DataType::Text,
            DataType::Blob,
        ] {
            assert_eq!(DataType::from_tag(dt.tag()), Some(dt));
        }
    }

    #[test]
    fn value_data_type() {
        assert_eq!(Value::Int64(1).data_type(), Some(DataType::Int64));
        assert_eq!(Value::Null.data_type(), None);
        assert!(Value::Null.is_null());
    }
}
