//! SNMP value model shared by the wire codec, profiles and simulators

use std::fmt;

use serde::{Deserialize, Serialize};

use super::oid::Oid;

/// A typed SNMP value as carried inside a varbind.
///
/// The three exception markers are values in SNMPv2c; the PDU handler maps
/// them to error-status codes when answering a v1 request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    ObjectIdentifier(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Counter64(u64),
    Opaque(Vec<u8>),
    Null,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

/// Declared type of a profile entry, used for assignment-compatibility
/// checks and for formatting simulated values back onto the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Integer,
    OctetString,
    ObjectIdentifier,
    IpAddress,
    Counter32,
    Gauge32,
    TimeTicks,
    Counter64,
    Opaque,
    Null,
}

impl SnmpValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            SnmpValue::Integer(_) => ValueType::Integer,
            SnmpValue::OctetString(_) => ValueType::OctetString,
            SnmpValue::ObjectIdentifier(_) => ValueType::ObjectIdentifier,
            SnmpValue::IpAddress(_) => ValueType::IpAddress,
            SnmpValue::Counter32(_) => ValueType::Counter32,
            SnmpValue::Gauge32(_) => ValueType::Gauge32,
            SnmpValue::TimeTicks(_) => ValueType::TimeTicks,
            SnmpValue::Counter64(_) => ValueType::Counter64,
            SnmpValue::Opaque(_) => ValueType::Opaque,
            SnmpValue::Null
            | SnmpValue::NoSuchObject
            | SnmpValue::NoSuchInstance
            | SnmpValue::EndOfMibView => ValueType::Null,
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            SnmpValue::NoSuchObject | SnmpValue::NoSuchInstance | SnmpValue::EndOfMibView
        )
    }

    /// Numeric view of the value, used as the simulator baseline.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            SnmpValue::Integer(v) => Some(*v as f64),
            SnmpValue::Counter32(v) | SnmpValue::Gauge32(v) | SnmpValue::TimeTicks(v) => {
                Some(*v as f64)
            }
            SnmpValue::Counter64(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Upper-bound wire size estimate for bulk truncation (value part only).
    pub fn estimated_size(&self) -> usize {
        match self {
            SnmpValue::Counter32(_)
            | SnmpValue::Gauge32(_)
            | SnmpValue::TimeTicks(_)
            | SnmpValue::IpAddress(_) => 8,
            SnmpValue::Counter64(_) => 12,
            SnmpValue::OctetString(bytes) | SnmpValue::Opaque(bytes) => bytes.len() + 4,
            SnmpValue::Integer(_) => 8,
            SnmpValue::ObjectIdentifier(oid) => oid.to_string().len() + 4,
            SnmpValue::NoSuchObject | SnmpValue::NoSuchInstance | SnmpValue::EndOfMibView => 4,
            SnmpValue::Null => 4,
        }
    }
}

impl ValueType {
    /// True when `value` may be stored in a profile entry declared as `self`.
    pub fn accepts(&self, value: &SnmpValue) -> bool {
        if value.is_exception() {
            return false;
        }
        match self {
            ValueType::Null => matches!(value, SnmpValue::Null),
            other => value.value_type() == *other,
        }
    }
}

/// Octet strings render as text only when every byte is printable ASCII
/// without quoting hazards; anything else goes out as hex, the way
/// `snmpwalk` prints it.
fn printable(bytes: &[u8]) -> Option<&str> {
    let ok = bytes
        .iter()
        .all(|b| (b.is_ascii_graphic() || *b == b' ') && *b != b'"' && *b != b'\\');
    if ok {
        std::str::from_utf8(bytes).ok()
    } else {
        None
    }
}

impl fmt::Display for SnmpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnmpValue::Integer(v) => write!(f, "INTEGER: {v}"),
            SnmpValue::OctetString(bytes) => match printable(bytes) {
                Some(s) => write!(f, "STRING: \"{s}\""),
                None => write!(f, "Hex-STRING: {}", hex::encode_upper(bytes)),
            },
            SnmpValue::ObjectIdentifier(oid) => write!(f, "OID: {oid}"),
            SnmpValue::IpAddress(octets) => write!(
                f,
                "IpAddress: {}.{}.{}.{}",
                octets[0], octets[1], octets[2], octets[3]
            ),
            SnmpValue::Counter32(v) => write!(f, "Counter32: {v}"),
            SnmpValue::Gauge32(v) => write!(f, "Gauge32: {v}"),
            SnmpValue::TimeTicks(v) => write!(f, "Timeticks: ({v})"),
            SnmpValue::Counter64(v) => write!(f, "Counter64: {v}"),
            SnmpValue::Opaque(bytes) => write!(f, "Opaque: {}", hex::encode_upper(bytes)),
            SnmpValue::Null => write!(f, "NULL"),
            SnmpValue::NoSuchObject => write!(f, "No Such Object available on this agent at this OID"),
            SnmpValue::NoSuchInstance => write!(f, "No Such Instance currently exists at this OID"),
            SnmpValue::EndOfMibView => write!(f, "No more variables left in this MIB View"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_compatibility() {
        assert!(ValueType::Counter32.accepts(&SnmpValue::Counter32(7)));
        assert!(!ValueType::Counter32.accepts(&SnmpValue::Gauge32(7)));
        assert!(ValueType::OctetString.accepts(&SnmpValue::OctetString(b"x".to_vec())));
        assert!(!ValueType::Integer.accepts(&SnmpValue::EndOfMibView));
        assert!(ValueType::Null.accepts(&SnmpValue::Null));
    }

    #[test]
    fn test_size_estimates() {
        assert_eq!(SnmpValue::Counter32(1).estimated_size(), 8);
        assert_eq!(SnmpValue::Counter64(1).estimated_size(), 12);
        assert_eq!(SnmpValue::OctetString(vec![0; 10]).estimated_size(), 14);
        assert_eq!(SnmpValue::EndOfMibView.estimated_size(), 4);
    }

    #[test]
    fn test_numeric_view() {
        assert_eq!(SnmpValue::Integer(-3).as_number(), Some(-3.0));
        assert_eq!(SnmpValue::Gauge32(42).as_number(), Some(42.0));
        assert_eq!(SnmpValue::OctetString(vec![]).as_number(), None);
    }
}
