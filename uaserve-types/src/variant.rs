//! Variant values and the timestamped DataValue wrapper.

use crate::node_id::NodeId;
use crate::status::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A dynamically typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Variant {
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
    ByteString(Vec<u8>),
    NodeId(NodeId),
    StatusCode(StatusCode),
}

impl Variant {
    /// Returns the value as an f64 when it is numeric.
    ///
    /// Deadband evaluation only applies to numeric values; everything else
    /// returns `None` and the filter treats the change as always reportable.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::SByte(v) => Some(f64::from(*v)),
            Variant::Byte(v) => Some(f64::from(*v)),
            Variant::Int16(v) => Some(f64::from(*v)),
            Variant::UInt16(v) => Some(f64::from(*v)),
            Variant::Int32(v) => Some(f64::from(*v)),
            Variant::UInt32(v) => Some(f64::from(*v)),
            Variant::Int64(v) => Some(*v as f64),
            Variant::UInt64(v) => Some(*v as f64),
            Variant::Float(v) => Some(f64::from(*v)),
            Variant::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the variant type name, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Boolean(_) => "Boolean",
            Variant::SByte(_) => "SByte",
            Variant::Byte(_) => "Byte",
            Variant::Int16(_) => "Int16",
            Variant::UInt16(_) => "UInt16",
            Variant::Int32(_) => "Int32",
            Variant::UInt32(_) => "UInt32",
            Variant::Int64(_) => "Int64",
            Variant::UInt64(_) => "UInt64",
            Variant::Float(_) => "Float",
            Variant::Double(_) => "Double",
            Variant::String(_) => "String",
            Variant::DateTime(_) => "DateTime",
            Variant::ByteString(_) => "ByteString",
            Variant::NodeId(_) => "NodeId",
            Variant::StatusCode(_) => "StatusCode",
        }
    }
}

/// An attribute value together with its quality and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    pub value: Option<Variant>,
    pub status: StatusCode,
    pub source_timestamp: Option<DateTime<Utc>>,
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// A Good-quality value stamped with the current time.
    pub fn new(value: Variant) -> Self {
        let now = Utc::now();
        Self {
            value: Some(value),
            status: StatusCode::Good,
            source_timestamp: Some(now),
            server_timestamp: Some(now),
        }
    }

    /// A value-less data value carrying only a status code.
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            value: None,
            status,
            source_timestamp: None,
            server_timestamp: Some(Utc::now()),
        }
    }

    /// Returns the numeric payload, if any.
    pub fn as_f64(&self) -> Option<f64> {
        self.value.as_ref().and_then(Variant::as_f64)
    }
}

impl Default for DataValue {
    fn default() -> Self {
        Self {
            value: None,
            status: StatusCode::Good,
            source_timestamp: None,
            server_timestamp: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(Variant::Int32(42).as_f64(), Some(42.0));
        assert_eq!(Variant::Double(1.5).as_f64(), Some(1.5));
        assert_eq!(Variant::Byte(200).as_f64(), Some(200.0));
        assert_eq!(Variant::String("42".into()).as_f64(), None);
        assert_eq!(Variant::Boolean(true).as_f64(), None);
    }

    #[test]
    fn test_new_data_value_is_good_and_stamped() {
        let dv = DataValue::new(Variant::Double(3.25));
        assert_eq!(dv.status, StatusCode::Good);
        assert!(dv.source_timestamp.is_some());
        assert!(dv.server_timestamp.is_some());
        assert_eq!(dv.as_f64(), Some(3.25));
    }

    #[test]
    fn test_status_only_value() {
        let dv = DataValue::from_status(StatusCode::BadNodeIdUnknown);
        assert!(dv.value.is_none());
        assert!(dv.status.is_bad());
        assert!(dv.source_timestamp.is_none());
    }
}
