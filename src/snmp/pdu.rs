//! SNMP message and PDU model
//!
//! This is the internal shape of a decoded SNMP message. The wire codec in
//! [`super::codec`] converts between this model and BER bytes; nothing else
//! in the crate touches the encoding.

use serde::{Deserialize, Serialize};

use super::oid::Oid;
use super::value::SnmpValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnmpVersion {
    V1,
    V2c,
}

impl SnmpVersion {
    pub fn wire_value(&self) -> i64 {
        match self {
            SnmpVersion::V1 => 0,
            SnmpVersion::V2c => 1,
        }
    }
}

/// SNMP error-status values used in response PDUs.
///
/// The v2c-specific statuses (`WrongType` and up) are never sent to a v1
/// manager; [`ErrorStatus::for_version`] folds them to the closest v1 code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorStatus {
    NoError,
    TooBig,
    NoSuchName,
    BadValue,
    ReadOnly,
    GenErr,
    WrongType,
    WrongLength,
    WrongValue,
    NotWritable,
}

impl ErrorStatus {
    pub fn code(&self) -> u32 {
        match self {
            ErrorStatus::NoError => 0,
            ErrorStatus::TooBig => 1,
            ErrorStatus::NoSuchName => 2,
            ErrorStatus::BadValue => 3,
            ErrorStatus::ReadOnly => 4,
            ErrorStatus::GenErr => 5,
            ErrorStatus::WrongType => 7,
            ErrorStatus::WrongLength => 8,
            ErrorStatus::WrongValue => 10,
            ErrorStatus::NotWritable => 17,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(ErrorStatus::NoError),
            1 => Some(ErrorStatus::TooBig),
            2 => Some(ErrorStatus::NoSuchName),
            3 => Some(ErrorStatus::BadValue),
            4 => Some(ErrorStatus::ReadOnly),
            5 => Some(ErrorStatus::GenErr),
            7 => Some(ErrorStatus::WrongType),
            8 => Some(ErrorStatus::WrongLength),
            10 => Some(ErrorStatus::WrongValue),
            17 => Some(ErrorStatus::NotWritable),
            _ => None,
        }
    }

    /// Fold v2c-only statuses onto the nearest v1 equivalent.
    pub fn for_version(&self, version: SnmpVersion) -> Self {
        match (version, self) {
            (SnmpVersion::V1, ErrorStatus::WrongType)
            | (SnmpVersion::V1, ErrorStatus::WrongLength)
            | (SnmpVersion::V1, ErrorStatus::WrongValue) => ErrorStatus::BadValue,
            (SnmpVersion::V1, ErrorStatus::NotWritable) => ErrorStatus::NoSuchName,
            _ => *self,
        }
    }
}

/// A variable binding: OID plus value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarBind {
    pub oid: Oid,
    pub value: SnmpValue,
}

impl VarBind {
    pub fn new(oid: Oid, value: SnmpValue) -> Self {
        Self { oid, value }
    }

    pub fn null(oid: Oid) -> Self {
        Self {
            oid,
            value: SnmpValue::Null,
        }
    }
}

/// The typed request/response payload of an SNMP message.
#[derive(Debug, Clone, PartialEq)]
pub enum Pdu {
    GetRequest {
        request_id: i32,
        bindings: Vec<VarBind>,
    },
    GetNextRequest {
        request_id: i32,
        bindings: Vec<VarBind>,
    },
    GetBulkRequest {
        request_id: i32,
        non_repeaters: u32,
        max_repetitions: u32,
        bindings: Vec<VarBind>,
    },
    SetRequest {
        request_id: i32,
        bindings: Vec<VarBind>,
    },
    Response {
        request_id: i32,
        error_status: ErrorStatus,
        error_index: u32,
        bindings: Vec<VarBind>,
    },
}

impl Pdu {
    pub fn request_id(&self) -> i32 {
        match self {
            Pdu::GetRequest { request_id, .. }
            | Pdu::GetNextRequest { request_id, .. }
            | Pdu::GetBulkRequest { request_id, .. }
            | Pdu::SetRequest { request_id, .. }
            | Pdu::Response { request_id, .. } => *request_id,
        }
    }

    pub fn bindings(&self) -> &[VarBind] {
        match self {
            Pdu::GetRequest { bindings, .. }
            | Pdu::GetNextRequest { bindings, .. }
            | Pdu::GetBulkRequest { bindings, .. }
            | Pdu::SetRequest { bindings, .. }
            | Pdu::Response { bindings, .. } => bindings,
        }
    }
}

/// A complete SNMP message as seen by the device pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SnmpMessage {
    pub version: SnmpVersion,
    pub community: String,
    pub pdu: Pdu,
}

impl SnmpMessage {
    /// Build the response shell for a request, echoing version, community
    /// and request-id.
    pub fn response_to(request: &SnmpMessage, bindings: Vec<VarBind>) -> Self {
        Self {
            version: request.version,
            community: request.community.clone(),
            pdu: Pdu::Response {
                request_id: request.pdu.request_id(),
                error_status: ErrorStatus::NoError,
                error_index: 0,
                bindings,
            },
        }
    }

    /// Build an error response echoing the request's varbinds untouched.
    pub fn error_response(request: &SnmpMessage, status: ErrorStatus, index: u32) -> Self {
        Self {
            version: request.version,
            community: request.community.clone(),
            pdu: Pdu::Response {
                request_id: request.pdu.request_id(),
                error_status: status.for_version(request.version),
                error_index: index,
                bindings: request.pdu.bindings().to_vec(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ErrorStatus::NoError.code(), 0);
        assert_eq!(ErrorStatus::TooBig.code(), 1);
        assert_eq!(ErrorStatus::GenErr.code(), 5);
        assert_eq!(ErrorStatus::NotWritable.code(), 17);
        assert_eq!(ErrorStatus::from_code(10), Some(ErrorStatus::WrongValue));
        assert_eq!(ErrorStatus::from_code(99), None);
    }

    #[test]
    fn test_v1_error_folding() {
        assert_eq!(
            ErrorStatus::WrongLength.for_version(SnmpVersion::V1),
            ErrorStatus::BadValue
        );
        assert_eq!(
            ErrorStatus::NotWritable.for_version(SnmpVersion::V1),
            ErrorStatus::NoSuchName
        );
        assert_eq!(
            ErrorStatus::WrongValue.for_version(SnmpVersion::V2c),
            ErrorStatus::WrongValue
        );
    }

    #[test]
    fn test_error_response_echoes_request() {
        let request = SnmpMessage {
            version: SnmpVersion::V1,
            community: "public".to_string(),
            pdu: Pdu::GetRequest {
                request_id: 9917,
                bindings: vec![VarBind::null("1.3.6.1.2.1.1.1.0".parse().unwrap())],
            },
        };
        let response = SnmpMessage::error_response(&request, ErrorStatus::NoSuchName, 1);
        match response.pdu {
            Pdu::Response {
                request_id,
                error_status,
                error_index,
                ref bindings,
            } => {
                assert_eq!(request_id, 9917);
                assert_eq!(error_status, ErrorStatus::NoSuchName);
                assert_eq!(error_index, 1);
                assert_eq!(bindings.len(), 1);
            }
            _ => panic!("expected response PDU"),
        }
    }
}
