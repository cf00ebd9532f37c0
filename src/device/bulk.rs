//! GETBULK engine
//!
//! Non-repeaters first, then up to `max_repetitions` successors per
//! repeating varbind, concatenated per varbind (not interleaved by row —
//! this matches the traversal pollers in the field see from us). The
//! estimated wire size is bounded by the UDP cap: trailing repeater
//! results are dropped first, and a response whose mandatory part already
//! exceeds the cap is answered with `tooBig`.

use crate::profile::{OidTree, ProfileEntry};
use crate::snmp::{Oid, SnmpValue, VarBind};

/// Fixed per-message overhead assumed by the size estimator.
const MESSAGE_OVERHEAD: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BulkError {
    #[error("invalid non-repeaters value {0}")]
    InvalidNonRepeaters(i64),
    #[error("invalid max-repetitions value {0}")]
    InvalidMaxRepetitions(i64),
    #[error("non-repeaters {non_repeaters} exceeds varbind count {varbinds}")]
    NonRepeatersExceedsVarbinds { non_repeaters: i64, varbinds: usize },
    #[error("response does not fit in the UDP size cap")]
    TooBig,
}

fn estimated_varbind_size(oid: &Oid, value: &SnmpValue) -> usize {
    oid.to_string().len() + 10 + value.estimated_size() + 8
}

/// Run a GETBULK against `tree`, resolving current values through
/// `resolve` (the caller plugs in the value simulator).
pub fn process_bulk<F>(
    tree: &OidTree,
    non_repeaters: i64,
    max_repetitions: i64,
    bindings: &[VarBind],
    max_response_bytes: usize,
    mut resolve: F,
) -> Result<Vec<VarBind>, BulkError>
where
    F: FnMut(&Oid, &ProfileEntry) -> SnmpValue,
{
    if non_repeaters < 0 {
        return Err(BulkError::InvalidNonRepeaters(non_repeaters));
    }
    if max_repetitions < 0 {
        return Err(BulkError::InvalidMaxRepetitions(max_repetitions));
    }
    if non_repeaters as usize > bindings.len() {
        return Err(BulkError::NonRepeatersExceedsVarbinds {
            non_repeaters,
            varbinds: bindings.len(),
        });
    }

    let split = non_repeaters as usize;
    let mut results = Vec::new();

    for binding in &bindings[..split] {
        match tree.bulk_walk(&binding.oid, 1).first() {
            Some((next, entry)) => {
                let value = resolve(next, entry);
                results.push(VarBind::new((*next).clone(), value));
            }
            None => {
                results.push(VarBind::new(binding.oid.clone(), SnmpValue::EndOfMibView));
            }
        }
    }
    let mandatory = results.len();

    for binding in &bindings[split..] {
        for (next, entry) in tree.bulk_walk(&binding.oid, max_repetitions as usize) {
            let value = resolve(next, entry);
            results.push(VarBind::new(next.clone(), value));
        }
    }

    // Size-bound the result, never at the expense of non-repeaters.
    let mut total = MESSAGE_OVERHEAD;
    let mut fitted = results.len();
    for (i, binding) in results.iter().enumerate() {
        total += estimated_varbind_size(&binding.oid, &binding.value);
        if total > max_response_bytes {
            fitted = i;
            break;
        }
    }

    if fitted < mandatory || (fitted == 0 && !results.is_empty()) {
        return Err(BulkError::TooBig);
    }
    results.truncate(fitted);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileEntry;

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    fn echo(_oid: &Oid, entry: &ProfileEntry) -> SnmpValue {
        entry.base_value.clone()
    }

    /// sysDescr, sysUpTime and ifIndex.1..3, as in the bulk scenarios.
    fn sample_tree() -> OidTree {
        OidTree::from_entries([
            (
                oid("1.3.6.1.2.1.1.1.0"),
                ProfileEntry::fixed(SnmpValue::OctetString(b"Motorola SB6183".to_vec())),
            ),
            (
                oid("1.3.6.1.2.1.1.3.0"),
                ProfileEntry::fixed(SnmpValue::TimeTicks(12345)),
            ),
            (
                oid("1.3.6.1.2.1.2.2.1.1.1"),
                ProfileEntry::fixed(SnmpValue::Integer(1)),
            ),
            (
                oid("1.3.6.1.2.1.2.2.1.1.2"),
                ProfileEntry::fixed(SnmpValue::Integer(2)),
            ),
            (
                oid("1.3.6.1.2.1.2.2.1.1.3"),
                ProfileEntry::fixed(SnmpValue::Integer(3)),
            ),
        ])
    }

    #[test]
    fn test_non_repeater_plus_repetitions() {
        let tree = sample_tree();
        let bindings = vec![
            VarBind::null(oid("1.3.6.1.2.1.1.1.0")),
            VarBind::null(oid("1.3.6.1.2.1.2.2.1.1")),
        ];
        let results = process_bulk(&tree, 1, 3, &bindings, 1400, echo).unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].oid, oid("1.3.6.1.2.1.1.3.0"));
        assert_eq!(results[0].value, SnmpValue::TimeTicks(12345));
        assert_eq!(results[1].value, SnmpValue::Integer(1));
        assert_eq!(results[2].value, SnmpValue::Integer(2));
        assert_eq!(results[3].value, SnmpValue::Integer(3));
    }

    #[test]
    fn test_walk_past_end_is_empty() {
        let tree = sample_tree();
        let bindings = vec![VarBind::null(oid("1.3.6.1.9.9.9"))];
        let results = process_bulk(&tree, 0, 5, &bindings, 1400, echo).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_non_repeater_past_end_gets_marker() {
        let tree = sample_tree();
        let bindings = vec![VarBind::null(oid("1.3.6.1.9.9.9"))];
        let results = process_bulk(&tree, 1, 0, &bindings, 1400, echo).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].oid, oid("1.3.6.1.9.9.9"));
        assert_eq!(results[0].value, SnmpValue::EndOfMibView);
    }

    #[test]
    fn test_result_count_bound() {
        // At most N + (|V| - N) * M varbinds.
        let tree = sample_tree();
        let bindings = vec![
            VarBind::null(oid("1.3.6.1.2.1.1.1.0")),
            VarBind::null(oid("1.3.6.1.2.1.1.1.0")),
            VarBind::null(oid("1.3.6.1")),
        ];
        let results = process_bulk(&tree, 1, 2, &bindings, 1400, echo).unwrap();
        assert!(results.len() <= 1 + 2 * 2);
    }

    #[test]
    fn test_validation_errors() {
        let tree = sample_tree();
        let bindings = vec![VarBind::null(oid("1.3.6"))];

        assert_eq!(
            process_bulk(&tree, -1, 5, &bindings, 1400, echo),
            Err(BulkError::InvalidNonRepeaters(-1))
        );
        assert_eq!(
            process_bulk(&tree, 0, -3, &bindings, 1400, echo),
            Err(BulkError::InvalidMaxRepetitions(-3))
        );
        assert_eq!(
            process_bulk(&tree, 2, 0, &bindings, 1400, echo),
            Err(BulkError::NonRepeatersExceedsVarbinds {
                non_repeaters: 2,
                varbinds: 1
            })
        );
    }

    #[test]
    fn test_truncation_drops_trailing_repeaters() {
        let mut tree = OidTree::new();
        for i in 0..100u32 {
            tree.insert(
                oid("1.3.6.1.4.1.99.1").child(i),
                ProfileEntry::fixed(SnmpValue::OctetString(vec![b'x'; 64])),
            );
        }
        let bindings = vec![VarBind::null(oid("1.3.6.1.4.1.99.1"))];
        let results = process_bulk(&tree, 0, 100, &bindings, 1400, echo).unwrap();

        assert!(!results.is_empty());
        assert!(results.len() < 100, "expected truncation, got {}", results.len());

        let estimated: usize = MESSAGE_OVERHEAD
            + results
                .iter()
                .map(|b| estimated_varbind_size(&b.oid, &b.value))
                .sum::<usize>();
        assert!(estimated <= 1400);
    }

    #[test]
    fn test_oversized_first_result_is_too_big() {
        let mut tree = OidTree::new();
        tree.insert(
            oid("1.3.6.1.4.1.99.1.1"),
            ProfileEntry::fixed(SnmpValue::OctetString(vec![b'x'; 2000])),
        );
        let bindings = vec![VarBind::null(oid("1.3.6.1.4.1.99.1"))];
        assert_eq!(
            process_bulk(&tree, 0, 1, &bindings, 1400, echo),
            Err(BulkError::TooBig)
        );
    }

    #[test]
    fn test_non_repeaters_never_truncated() {
        let mut tree = OidTree::new();
        for i in 0..4u32 {
            tree.insert(
                oid("1.3.6.1.4.1.99.1").child(i),
                ProfileEntry::fixed(SnmpValue::OctetString(vec![b'x'; 300])),
            );
        }
        // Two mandatory results of ~340 bytes each fit an 800-byte cap, but
        // leave no room for repeaters.
        let bindings = vec![
            VarBind::null(oid("1.3.6.1.4.1.99.1.0")),
            VarBind::null(oid("1.3.6.1.4.1.99.1.1")),
            VarBind::null(oid("1.3.6.1.4.1.99.1.2")),
        ];
        let results = process_bulk(&tree, 2, 10, &bindings, 800, echo).unwrap();
        assert_eq!(results.len(), 2);

        // A cap too small even for the mandatory part is an error.
        assert_eq!(
            process_bulk(&tree, 2, 10, &bindings, 400, echo),
            Err(BulkError::TooBig)
        );
    }
}
