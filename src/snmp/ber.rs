//! BER writer for SNMP messages
//!
//! Only the forms SNMP actually uses are implemented: definite lengths,
//! primitive INTEGER/OCTET STRING/NULL/OBJECT IDENTIFIER, the SMI
//! application types, the v2c exception markers and the context-constructed
//! PDU wrappers. Decoding rides on the `snmp-parser` crate in
//! [`super::codec`].

use super::oid::Oid;
use super::pdu::{Pdu, SnmpMessage, VarBind};
use super::value::SnmpValue;

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_OPAQUE: u8 = 0x44;
const TAG_COUNTER64: u8 = 0x46;
const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;

const TAG_GET_REQUEST: u8 = 0xa0;
const TAG_GET_NEXT_REQUEST: u8 = 0xa1;
const TAG_RESPONSE: u8 = 0xa2;
const TAG_SET_REQUEST: u8 = 0xa3;
const TAG_GET_BULK_REQUEST: u8 = 0xa5;

/// Encode a complete message to BER bytes.
pub fn encode_message(message: &SnmpMessage) -> Vec<u8> {
    let mut body = Vec::with_capacity(64);
    write_integer(&mut body, message.version.wire_value());
    write_tlv(&mut body, TAG_OCTET_STRING, message.community.as_bytes());
    write_pdu(&mut body, &message.pdu);

    let mut out = Vec::with_capacity(body.len() + 4);
    write_tl(&mut out, TAG_SEQUENCE, body.len());
    out.extend_from_slice(&body);
    out
}

fn write_pdu(out: &mut Vec<u8>, pdu: &Pdu) {
    let (tag, request_id, field1, field2, bindings) = match pdu {
        Pdu::GetRequest {
            request_id,
            bindings,
        } => (TAG_GET_REQUEST, *request_id, 0i64, 0i64, bindings),
        Pdu::GetNextRequest {
            request_id,
            bindings,
        } => (TAG_GET_NEXT_REQUEST, *request_id, 0, 0, bindings),
        Pdu::GetBulkRequest {
            request_id,
            non_repeaters,
            max_repetitions,
            bindings,
        } => (
            TAG_GET_BULK_REQUEST,
            *request_id,
            *non_repeaters as i64,
            *max_repetitions as i64,
            bindings,
        ),
        Pdu::SetRequest {
            request_id,
            bindings,
        } => (TAG_SET_REQUEST, *request_id, 0, 0, bindings),
        Pdu::Response {
            request_id,
            error_status,
            error_index,
            bindings,
        } => (
            TAG_RESPONSE,
            *request_id,
            error_status.code() as i64,
            *error_index as i64,
            bindings,
        ),
    };

    let mut body = Vec::with_capacity(32);
    write_integer(&mut body, request_id as i64);
    write_integer(&mut body, field1);
    write_integer(&mut body, field2);
    write_bindings(&mut body, bindings);

    write_tl(out, tag, body.len());
    out.extend_from_slice(&body);
}

fn write_bindings(out: &mut Vec<u8>, bindings: &[VarBind]) {
    let mut list = Vec::with_capacity(bindings.len() * 16);
    for binding in bindings {
        let mut entry = Vec::with_capacity(16);
        write_oid(&mut entry, &binding.oid);
        write_value(&mut entry, &binding.value);
        write_tl(&mut list, TAG_SEQUENCE, entry.len());
        list.extend_from_slice(&entry);
    }
    write_tl(out, TAG_SEQUENCE, list.len());
    out.extend_from_slice(&list);
}

fn write_value(out: &mut Vec<u8>, value: &SnmpValue) {
    match value {
        SnmpValue::Integer(v) => write_integer(out, *v),
        SnmpValue::OctetString(bytes) => write_tlv(out, TAG_OCTET_STRING, bytes),
        SnmpValue::ObjectIdentifier(oid) => write_oid(out, oid),
        SnmpValue::IpAddress(octets) => write_tlv(out, TAG_IP_ADDRESS, octets),
        SnmpValue::Counter32(v) => write_unsigned(out, TAG_COUNTER32, *v as u64),
        SnmpValue::Gauge32(v) => write_unsigned(out, TAG_GAUGE32, *v as u64),
        SnmpValue::TimeTicks(v) => write_unsigned(out, TAG_TIMETICKS, *v as u64),
        SnmpValue::Counter64(v) => write_unsigned(out, TAG_COUNTER64, *v),
        SnmpValue::Opaque(bytes) => write_tlv(out, TAG_OPAQUE, bytes),
        SnmpValue::Null => write_tlv(out, TAG_NULL, &[]),
        SnmpValue::NoSuchObject => write_tlv(out, TAG_NO_SUCH_OBJECT, &[]),
        SnmpValue::NoSuchInstance => write_tlv(out, TAG_NO_SUCH_INSTANCE, &[]),
        SnmpValue::EndOfMibView => write_tlv(out, TAG_END_OF_MIB_VIEW, &[]),
    }
}

fn write_oid(out: &mut Vec<u8>, oid: &Oid) {
    let components = oid.components();
    let mut body = Vec::with_capacity(components.len() + 1);
    match components {
        [] => body.push(0),
        [first] => body.push((first * 40) as u8),
        [first, second, rest @ ..] => {
            write_base128(&mut body, (*first as u64) * 40 + *second as u64);
            for c in rest {
                write_base128(&mut body, *c as u64);
            }
        }
    }
    write_tl(out, TAG_OID, body.len());
    out.extend_from_slice(&body);
}

fn write_base128(out: &mut Vec<u8>, mut value: u64) {
    let mut stack = [0u8; 10];
    let mut n = 0;
    loop {
        stack[n] = (value & 0x7f) as u8;
        value >>= 7;
        n += 1;
        if value == 0 {
            break;
        }
    }
    while n > 1 {
        n -= 1;
        out.push(stack[n] | 0x80);
    }
    out.push(stack[0]);
}

/// Two's-complement INTEGER with minimal content octets.
fn write_integer(out: &mut Vec<u8>, value: i64) {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let first = bytes[start];
        let next = bytes[start + 1];
        let redundant_zero = first == 0x00 && next & 0x80 == 0;
        let redundant_ff = first == 0xff && next & 0x80 != 0;
        if redundant_zero || redundant_ff {
            start += 1;
        } else {
            break;
        }
    }
    write_tlv(out, TAG_INTEGER, &bytes[start..]);
}

/// Unsigned application-tagged integer: minimal octets, leading zero byte
/// added when the high bit would read as a sign.
fn write_unsigned(out: &mut Vec<u8>, tag: u8, value: u64) {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 && bytes[start] == 0 {
        start += 1;
    }
    let mut body = Vec::with_capacity(9);
    if bytes[start] & 0x80 != 0 {
        body.push(0);
    }
    body.extend_from_slice(&bytes[start..]);
    write_tl(out, tag, body.len());
    out.extend_from_slice(&body);
}

fn write_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    write_tl(out, tag, content.len());
    out.extend_from_slice(content);
}

fn write_tl(out: &mut Vec<u8>, tag: u8, len: usize) {
    out.push(tag);
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = (len as u64).to_be_bytes();
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(7);
        out.push(0x80 | (8 - start) as u8);
        out.extend_from_slice(&bytes[start..]);
    }
}

#[cfg(test)]
mod tests {
    use super::super::pdu::{ErrorStatus, SnmpVersion};
    use super::*;

    fn encode_value(value: &SnmpValue) -> Vec<u8> {
        let mut out = Vec::new();
        write_value(&mut out, value);
        out
    }

    #[test]
    fn test_integer_minimal_encoding() {
        assert_eq!(encode_value(&SnmpValue::Integer(0)), vec![0x02, 0x01, 0x00]);
        assert_eq!(encode_value(&SnmpValue::Integer(127)), vec![0x02, 0x01, 0x7f]);
        assert_eq!(
            encode_value(&SnmpValue::Integer(128)),
            vec![0x02, 0x02, 0x00, 0x80]
        );
        assert_eq!(encode_value(&SnmpValue::Integer(-1)), vec![0x02, 0x01, 0xff]);
        assert_eq!(
            encode_value(&SnmpValue::Integer(-129)),
            vec![0x02, 0x02, 0xff, 0x7f]
        );
    }

    #[test]
    fn test_unsigned_high_bit_padding() {
        assert_eq!(
            encode_value(&SnmpValue::Counter32(0xffff_ffff)),
            vec![0x41, 0x05, 0x00, 0xff, 0xff, 0xff, 0xff]
        );
        assert_eq!(encode_value(&SnmpValue::Gauge32(5)), vec![0x42, 0x01, 0x05]);
        assert_eq!(encode_value(&SnmpValue::TimeTicks(0)), vec![0x43, 0x01, 0x00]);
    }

    #[test]
    fn test_oid_encoding() {
        // 1.3.6.1.2.1.1.1.0 -> 2b 06 01 02 01 01 01 00
        let oid: Oid = "1.3.6.1.2.1.1.1.0".parse().unwrap();
        let mut out = Vec::new();
        write_oid(&mut out, &oid);
        assert_eq!(
            out,
            vec![0x06, 0x08, 0x2b, 0x06, 0x01, 0x02, 0x01, 0x01, 0x01, 0x00]
        );

        // Multi-byte arc: 1.3.6.1.4.1.4115 -> ...a0 13
        let oid: Oid = "1.3.6.1.4.1.4115".parse().unwrap();
        let mut out = Vec::new();
        write_oid(&mut out, &oid);
        assert_eq!(
            out,
            vec![0x06, 0x07, 0x2b, 0x06, 0x01, 0x04, 0x01, 0xa0, 0x13]
        );
    }

    #[test]
    fn test_long_length_form() {
        let mut out = Vec::new();
        write_tl(&mut out, TAG_OCTET_STRING, 200);
        assert_eq!(out, vec![0x04, 0x81, 0xc8]);

        let mut out = Vec::new();
        write_tl(&mut out, TAG_SEQUENCE, 0x1234);
        assert_eq!(out, vec![0x30, 0x82, 0x12, 0x34]);
    }

    #[test]
    fn test_exception_markers_are_empty_context_tags() {
        assert_eq!(encode_value(&SnmpValue::NoSuchObject), vec![0x80, 0x00]);
        assert_eq!(encode_value(&SnmpValue::NoSuchInstance), vec![0x81, 0x00]);
        assert_eq!(encode_value(&SnmpValue::EndOfMibView), vec![0x82, 0x00]);
    }

    #[test]
    fn test_whole_message_shape() {
        let message = SnmpMessage {
            version: SnmpVersion::V2c,
            community: "public".to_string(),
            pdu: Pdu::Response {
                request_id: 1,
                error_status: ErrorStatus::NoError,
                error_index: 0,
                bindings: vec![VarBind::new(
                    "1.3.6.1.2.1.1.3.0".parse().unwrap(),
                    SnmpValue::TimeTicks(1234),
                )],
            },
        };
        let bytes = encode_message(&message);
        assert_eq!(bytes[0], TAG_SEQUENCE);
        assert_eq!(bytes[1] as usize, bytes.len() - 2);
        // version INTEGER 1
        assert_eq!(&bytes[2..5], &[0x02, 0x01, 0x01]);
        // community OCTET STRING "public"
        assert_eq!(&bytes[5..13], b"\x04\x06public");
        // response PDU follows
        assert_eq!(bytes[13], TAG_RESPONSE);
    }
}
