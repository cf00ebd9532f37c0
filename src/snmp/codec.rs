//! Wire codec: BER bytes to and from the internal message model
//!
//! Decoding is delegated to the `snmp-parser` crate; this module owns the
//! conversion into the crate's owned [`SnmpMessage`] model so that parser
//! types never leak past it. Encoding lives in [`super::ber`].

use snmp_parser::{parse_snmp_generic_message, NetworkAddress, ObjectSyntax, PduType,
    SnmpGenericMessage, SnmpPdu, VarBindValue};

use crate::{Error, Result};

use super::ber;
use super::oid::Oid;
use super::pdu::{ErrorStatus, Pdu, SnmpMessage, SnmpVersion, VarBind};
use super::value::SnmpValue;

/// Decode one UDP datagram into a message.
///
/// SNMPv3 frames and v1 traps are rejected; per-varbind values the parser
/// does not recognize degrade to `Null` rather than failing the frame.
pub fn decode_message(data: &[u8]) -> Result<SnmpMessage> {
    let message = match parse_snmp_generic_message(data) {
        Ok((_rest, SnmpGenericMessage::V1(msg))) | Ok((_rest, SnmpGenericMessage::V2(msg))) => msg,
        Ok((_rest, SnmpGenericMessage::V3(_))) => {
            return Err(Error::decode("SNMPv3 is not supported"));
        }
        Err(e) => {
            return Err(Error::decode(format!("malformed SNMP frame: {e:?}")));
        }
    };

    let version = match message.version {
        0 => SnmpVersion::V1,
        1 => SnmpVersion::V2c,
        other => {
            return Err(Error::decode(format!("unsupported SNMP version {other}")));
        }
    };

    let bindings = convert_bindings(message.pdu.vars_iter())?;
    let pdu = match &message.pdu {
        SnmpPdu::Generic(pdu) => {
            let request_id = pdu.req_id as i32;
            if pdu.pdu_type == PduType::GetRequest {
                Pdu::GetRequest {
                    request_id,
                    bindings,
                }
            } else if pdu.pdu_type == PduType::GetNextRequest {
                Pdu::GetNextRequest {
                    request_id,
                    bindings,
                }
            } else if pdu.pdu_type == PduType::SetRequest {
                Pdu::SetRequest {
                    request_id,
                    bindings,
                }
            } else if pdu.pdu_type == PduType::Response {
                Pdu::Response {
                    request_id,
                    error_status: ErrorStatus::from_code(pdu.err.0).unwrap_or(ErrorStatus::GenErr),
                    error_index: pdu.err_index,
                    bindings,
                }
            } else {
                return Err(Error::decode(format!(
                    "unsupported PDU type {:?}",
                    pdu.pdu_type
                )));
            }
        }
        SnmpPdu::Bulk(pdu) => Pdu::GetBulkRequest {
            request_id: pdu.req_id as i32,
            non_repeaters: pdu.non_repeaters,
            max_repetitions: pdu.max_repetitions,
            bindings,
        },
        SnmpPdu::TrapV1(_) => {
            return Err(Error::decode("v1 trap PDUs are not accepted"));
        }
    };

    Ok(SnmpMessage {
        version,
        community: message.community.clone(),
        pdu,
    })
}

/// Encode a message for transmission.
pub fn encode_message(message: &SnmpMessage) -> Vec<u8> {
    ber::encode_message(message)
}

fn convert_bindings<'a, 'b: 'a>(
    vars: impl Iterator<Item = &'a snmp_parser::SnmpVariable<'b>>,
) -> Result<Vec<VarBind>> {
    vars.map(|var| {
        Ok(VarBind {
            oid: convert_oid(&var.oid)?,
            value: convert_value(&var.val),
        })
    })
    .collect()
}

fn convert_oid(oid: &asn1_rs::Oid) -> Result<Oid> {
    let components = oid
        .iter()
        .ok_or_else(|| Error::decode(format!("OID with oversized arc: {oid}")))?
        .map(|c| u32::try_from(c).map_err(|_| Error::decode(format!("OID arc out of range: {oid}"))))
        .collect::<Result<Vec<u32>>>()?;
    Ok(Oid::new(components))
}

fn convert_value(value: &VarBindValue) -> SnmpValue {
    match value {
        VarBindValue::Value(syntax) => convert_object_syntax(syntax),
        VarBindValue::Unspecified => SnmpValue::Null,
        VarBindValue::NoSuchObject => SnmpValue::NoSuchObject,
        VarBindValue::NoSuchInstance => SnmpValue::NoSuchInstance,
        VarBindValue::EndOfMibView => SnmpValue::EndOfMibView,
    }
}

fn convert_object_syntax(value: &ObjectSyntax) -> SnmpValue {
    match value {
        ObjectSyntax::Number(n) => SnmpValue::Integer(*n as i64),
        ObjectSyntax::String(s) => SnmpValue::OctetString(s.to_vec()),
        ObjectSyntax::Object(oid) => match convert_oid(oid) {
            Ok(converted) => SnmpValue::ObjectIdentifier(converted),
            Err(_) => SnmpValue::Null,
        },
        ObjectSyntax::Empty => SnmpValue::Null,
        ObjectSyntax::IpAddress(NetworkAddress::IPv4(addr)) => SnmpValue::IpAddress(addr.octets()),
        ObjectSyntax::Counter32(v) => SnmpValue::Counter32(*v),
        ObjectSyntax::Gauge32(v) => SnmpValue::Gauge32(*v),
        ObjectSyntax::TimeTicks(v) => SnmpValue::TimeTicks(*v),
        ObjectSyntax::Opaque(bytes) => SnmpValue::Opaque(bytes.to_vec()),
        ObjectSyntax::Counter64(v) => SnmpValue::Counter64(*v),
        ObjectSyntax::UInteger32(v) => SnmpValue::Gauge32(*v),
        _ => SnmpValue::Null,
    }
}

/// Big-endian two's-complement integer content octets.
fn decode_integer(bytes: &[u8]) -> i64 {
    let mut value: i64 = if bytes.first().map_or(false, |b| b & 0x80 != 0) {
        -1
    } else {
        0
    };
    for b in bytes.iter().take(8) {
        value = (value << 8) | (*b as i64);
    }
    value
}
