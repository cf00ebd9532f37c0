//! snmpwalk text parser
//!
//! Accepts the two line shapes `net-snmp` tools emit, intermixed:
//!
//! ```text
//! IF-MIB::ifInOctets.3 = Counter32: 875421
//! .1.3.6.1.2.1.1.1.0 = STRING: "Motorola SB6183"
//! ```
//!
//! The parser is pure and tolerant: comment and blank lines are skipped,
//! unparseable lines are dropped (counted, not fatal), unknown value types
//! are retained as opaque strings. Only file-level I/O errors surface.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::snmp::{Oid, SnmpValue};

use super::mib;

#[derive(Debug, Clone, PartialEq)]
pub struct WalkEntry {
    pub value: SnmpValue,
    pub mib_name: Option<String>,
}

/// Result of parsing one walk capture.
#[derive(Debug, Default)]
pub struct WalkData {
    pub entries: BTreeMap<Oid, WalkEntry>,
    pub skipped_lines: usize,
}

impl WalkData {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static QUALIFIED_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9-]*)::([A-Za-z][A-Za-z0-9]*)((?:\.\d+)*)\s*=\s*(.*)$")
        .expect("qualified line regex")
});

static NUMERIC_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\.?\d+(?:\.\d+)+)\s*=\s*(.*)$").expect("numeric line regex"));

static TYPED_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9-]*(?:\s+[A-Za-z]+)?):\s*(.*)$").expect("typed value regex"));

static INTEGER_ENUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*\((-?\d+)\)$").expect("integer enum regex"));

static TIMETICKS_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\((\d+)\)").expect("timeticks regex"));

/// Parse a whole walk capture.
pub fn parse_walk_text(input: &str) -> WalkData {
    let mut data = WalkData::default();
    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Some((oid, entry)) => {
                data.entries.insert(oid, entry);
            }
            None => data.skipped_lines += 1,
        }
    }
    data
}

fn parse_line(line: &str) -> Option<(Oid, WalkEntry)> {
    if let Some(caps) = QUALIFIED_LINE.captures(line) {
        let module = caps.get(1)?.as_str();
        let name = caps.get(2)?.as_str();
        let suffix = caps.get(3)?.as_str();
        let base = mib::resolve_object(module, name)?;
        let oid = base.extend(&parse_suffix(suffix)?);
        let value = parse_value(caps.get(4)?.as_str())?;
        return Some((
            oid,
            WalkEntry {
                value,
                mib_name: Some(name.to_string()),
            },
        ));
    }

    if let Some(caps) = NUMERIC_LINE.captures(line) {
        let oid: Oid = caps.get(1)?.as_str().parse().ok()?;
        let value = parse_value(caps.get(2)?.as_str())?;
        let mib_name = mib::object_name(&oid).map(str::to_string);
        return Some((oid, WalkEntry { value, mib_name }));
    }

    None
}

fn parse_suffix(suffix: &str) -> Option<Vec<u32>> {
    if suffix.is_empty() {
        return Some(Vec::new());
    }
    suffix
        .trim_start_matches('.')
        .split('.')
        .map(|part| part.parse::<u32>().ok())
        .collect()
}

fn parse_value(raw: &str) -> Option<SnmpValue> {
    let raw = raw.trim();

    // `= ""` — a bare quoted string without a type token.
    if raw.starts_with('"') {
        return Some(SnmpValue::OctetString(unquote(raw).into_bytes()));
    }
    if raw.is_empty() {
        return Some(SnmpValue::OctetString(Vec::new()));
    }

    let caps = TYPED_VALUE.captures(raw)?;
    let type_token = caps.get(1)?.as_str();
    let body = caps.get(2)?.as_str().trim();

    match type_token.to_ascii_uppercase().as_str() {
        "INTEGER" => parse_integer(body).map(SnmpValue::Integer),
        "COUNTER32" => parse_unsigned(body).map(|v| SnmpValue::Counter32(v as u32)),
        "COUNTER64" => parse_unsigned(body).map(SnmpValue::Counter64),
        "GAUGE32" | "GAUGE" | "UNSIGNED32" => {
            parse_unsigned(body).map(|v| SnmpValue::Gauge32(v as u32))
        }
        "TIMETICKS" => {
            let caps = TIMETICKS_VALUE.captures(body)?;
            let ticks = caps.get(1)?.as_str().parse::<u64>().ok()?;
            Some(SnmpValue::TimeTicks(ticks as u32))
        }
        "STRING" | "OCTET" | "OCTET STRING" => {
            Some(SnmpValue::OctetString(unquote(body).into_bytes()))
        }
        "HEX-STRING" => {
            let stripped: String = body
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_uppercase();
            hex::decode(&stripped).ok().map(SnmpValue::OctetString)
        }
        "OID" => parse_oid_value(body).map(SnmpValue::ObjectIdentifier),
        "IPADDRESS" | "NETWORK ADDRESS" => {
            let mut octets = [0u8; 4];
            let mut parts = body.split('.');
            for slot in octets.iter_mut() {
                *slot = parts.next()?.trim().parse().ok()?;
            }
            if parts.next().is_some() {
                return None;
            }
            Some(SnmpValue::IpAddress(octets))
        }
        "NULL" => Some(SnmpValue::Null),
        // Unknown type tokens keep the raw text as an opaque string.
        _ => Some(SnmpValue::Opaque(raw.as_bytes().to_vec())),
    }
}

fn parse_integer(body: &str) -> Option<i64> {
    if let Some(caps) = INTEGER_ENUM.captures(body) {
        return caps.get(1)?.as_str().parse().ok();
    }
    body.parse().ok()
}

fn parse_unsigned(body: &str) -> Option<u64> {
    body.parse().ok()
}

fn parse_oid_value(body: &str) -> Option<Oid> {
    if let Some(rest) = body.strip_prefix("SNMPv2-SMI::enterprises.") {
        let mut components = mib::ENTERPRISES.to_vec();
        components.extend(parse_suffix(rest)?);
        return Some(Oid::new(components));
    }
    if body.starts_with('.') || body.chars().next().map_or(false, |c| c.is_ascii_digit()) {
        return body.parse().ok();
    }
    // MODULE::name.suffix spelled symbolically.
    let (module, rest) = body.split_once("::")?;
    let (name, suffix) = match rest.split_once('.') {
        Some((name, suffix)) => (name, Some(suffix)),
        None => (rest, None),
    };
    let mut oid = mib::resolve_object(module, name)?;
    if let Some(suffix) = suffix {
        oid = oid.extend(&parse_suffix(suffix)?);
    }
    Some(oid)
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    const SAMPLE: &str = r#"
# Captured from a lab cable modem
SNMPv2-MIB::sysDescr.0 = STRING: "Motorola SB6183"
SNMPv2-MIB::sysUpTime.0 = Timeticks: (8675309) 1 day, 0:05:53.09
SNMPv2-MIB::sysObjectID.0 = OID: SNMPv2-SMI::enterprises.4115.1.20.1.1
IF-MIB::ifInOctets.3 = Counter32: 875421
IF-MIB::ifHCInOctets.3 = Counter64: 90871234567
IF-MIB::ifOperStatus.3 = INTEGER: up(1)
IF-MIB::ifPhysAddress.3 = Hex-STRING: 00 1A 2B 3C 4D 5E
.1.3.6.1.2.1.10.127.1.1.4.1.5.3 = INTEGER: 320
.1.3.6.1.2.1.4.20.1.1.192.168.100.1 = IpAddress: 192.168.100.1
garbage line that matches nothing
IF-MIB::ifSpeed.3 = Gauge32: 1000000000
"#;

    #[test]
    fn test_sample_walk_parses() {
        let data = parse_walk_text(SAMPLE);
        assert_eq!(data.len(), 10);
        assert_eq!(data.skipped_lines, 1);
    }

    #[test]
    fn test_string_value() {
        let data = parse_walk_text(SAMPLE);
        let entry = &data.entries[&oid("1.3.6.1.2.1.1.1.0")];
        assert_eq!(
            entry.value,
            SnmpValue::OctetString(b"Motorola SB6183".to_vec())
        );
        assert_eq!(entry.mib_name.as_deref(), Some("sysDescr"));
    }

    #[test]
    fn test_timeticks_and_enum_integer() {
        let data = parse_walk_text(SAMPLE);
        assert_eq!(
            data.entries[&oid("1.3.6.1.2.1.1.3.0")].value,
            SnmpValue::TimeTicks(8675309)
        );
        assert_eq!(
            data.entries[&oid("1.3.6.1.2.1.2.2.1.8.3")].value,
            SnmpValue::Integer(1)
        );
    }

    #[test]
    fn test_enterprise_oid_expansion() {
        let data = parse_walk_text(SAMPLE);
        assert_eq!(
            data.entries[&oid("1.3.6.1.2.1.1.2.0")].value,
            SnmpValue::ObjectIdentifier(oid("1.3.6.1.4.1.4115.1.20.1.1"))
        );
    }

    #[test]
    fn test_hex_string() {
        let data = parse_walk_text(SAMPLE);
        assert_eq!(
            data.entries[&oid("1.3.6.1.2.1.2.2.1.6.3")].value,
            SnmpValue::OctetString(vec![0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e])
        );
    }

    #[test]
    fn test_numeric_line_gets_reverse_name() {
        let data = parse_walk_text(SAMPLE);
        let entry = &data.entries[&oid("1.3.6.1.2.1.10.127.1.1.4.1.5.3")];
        assert_eq!(entry.value, SnmpValue::Integer(320));
        assert_eq!(entry.mib_name.as_deref(), Some("docsIfSigQSignalNoise"));
    }

    #[test]
    fn test_ip_address_value() {
        let data = parse_walk_text(SAMPLE);
        assert_eq!(
            data.entries[&oid("1.3.6.1.2.1.4.20.1.1.192.168.100.1")].value,
            SnmpValue::IpAddress([192, 168, 100, 1])
        );
    }

    #[test]
    fn test_counters() {
        let data = parse_walk_text(SAMPLE);
        assert_eq!(
            data.entries[&oid("1.3.6.1.2.1.2.2.1.10.3")].value,
            SnmpValue::Counter32(875421)
        );
        assert_eq!(
            data.entries[&oid("1.3.6.1.2.1.31.1.1.1.6.3")].value,
            SnmpValue::Counter64(90871234567)
        );
        assert_eq!(
            data.entries[&oid("1.3.6.1.2.1.2.2.1.5.3")].value,
            SnmpValue::Gauge32(1_000_000_000)
        );
    }

    #[test]
    fn test_unknown_type_is_opaque() {
        let data = parse_walk_text(".1.3.6.1.4.1.99.1 = Frobnitz: whatever 17\n");
        assert_eq!(
            data.entries[&oid("1.3.6.1.4.1.99.1")].value,
            SnmpValue::Opaque(b"Frobnitz: whatever 17".to_vec())
        );
    }

    #[test]
    fn test_unknown_symbolic_name_is_skipped() {
        let data = parse_walk_text("WEIRD-MIB::noSuchObject.0 = INTEGER: 4\n");
        assert!(data.is_empty());
        assert_eq!(data.skipped_lines, 1);
    }

    #[test]
    fn test_comments_and_blanks_not_counted_as_skipped() {
        let data = parse_walk_text("# comment\n\n\n# another\n");
        assert!(data.is_empty());
        assert_eq!(data.skipped_lines, 0);
    }

    #[test]
    fn test_rendered_entries_reparse_identically() {
        // The recognized subset survives a print/parse cycle in numeric
        // line form.
        let data = parse_walk_text(SAMPLE);
        let rendered: String = data
            .entries
            .iter()
            .map(|(oid, entry)| format!(".{oid} = {}\n", entry.value))
            .collect();
        let reparsed = parse_walk_text(&rendered);
        assert_eq!(reparsed.skipped_lines, 0);
        for (oid, entry) in &data.entries {
            assert_eq!(reparsed.entries[oid].value, entry.value, "mismatch at {oid}");
        }
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let data = parse_walk_text(SAMPLE);
        let oids: Vec<&Oid> = data.entries.keys().collect();
        let mut sorted = oids.clone();
        sorted.sort();
        assert_eq!(oids, sorted);
    }
}
