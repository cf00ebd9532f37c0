//! Ordered OID -> profile-entry store
//!
//! Point lookups go through a hash map; GETNEXT and bulk walks binary-search
//! a sorted index over the same keys. The index is rebuilt once at profile
//! load; published trees live behind an `Arc` and are never mutated, so
//! readers always see a consistent snapshot.

use std::collections::HashMap;

use crate::snmp::Oid;

use super::behavior::ProfileEntry;

#[derive(Debug, Clone, Default)]
pub struct OidTree {
    map: HashMap<Oid, ProfileEntry>,
    index: Vec<Oid>,
}

/// Outcome of a strict-successor lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum NextOid {
    Next(Oid),
    EndOfMib,
}

impl OidTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Oid, ProfileEntry)>) -> Self {
        let map: HashMap<Oid, ProfileEntry> = entries.into_iter().collect();
        let mut index: Vec<Oid> = map.keys().cloned().collect();
        index.sort();
        Self { map, index }
    }

    /// Insert or overwrite one entry, keeping the index sorted.
    pub fn insert(&mut self, oid: Oid, entry: ProfileEntry) {
        if self.map.insert(oid.clone(), entry).is_none() {
            let pos = self.index.partition_point(|existing| *existing < oid);
            self.index.insert(pos, oid);
        }
    }

    pub fn get(&self, oid: &Oid) -> Option<&ProfileEntry> {
        self.map.get(oid)
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.map.contains_key(oid)
    }

    /// Least OID strictly greater than `oid`, in componentwise order.
    pub fn get_next(&self, oid: &Oid) -> NextOid {
        let pos = self.index.partition_point(|existing| existing <= oid);
        match self.index.get(pos) {
            Some(next) => NextOid::Next(next.clone()),
            None => NextOid::EndOfMib,
        }
    }

    /// Up to `max` successive entries strictly past `start`, in order.
    pub fn bulk_walk(&self, start: &Oid, max: usize) -> Vec<(&Oid, &ProfileEntry)> {
        let pos = self.index.partition_point(|existing| existing <= start);
        self.index[pos..]
            .iter()
            .take(max)
            .map(|oid| (oid, &self.map[oid]))
            .collect()
    }

    /// True when some entry lives strictly below `prefix`.
    pub fn has_children(&self, prefix: &Oid) -> bool {
        let pos = self.index.partition_point(|existing| existing <= prefix);
        self.index
            .get(pos)
            .map_or(false, |next| next.is_child_of(prefix))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn oids(&self) -> &[Oid] {
        &self.index
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Oid, &ProfileEntry)> {
        self.index.iter().map(move |oid| (oid, &self.map[oid]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snmp::SnmpValue;

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    fn entry(n: i64) -> ProfileEntry {
        ProfileEntry::fixed(SnmpValue::Integer(n))
    }

    fn sample_tree() -> OidTree {
        OidTree::from_entries([
            (oid("1.3.6.1.2.1.1.1.0"), entry(1)),
            (oid("1.3.6.1.2.1.1.3.0"), entry(2)),
            (oid("1.3.6.1.2.1.2.2.1.1.1"), entry(3)),
            (oid("1.3.6.1.2.1.2.2.1.1.2"), entry(4)),
            (oid("1.3.6.1.2.1.2.2.1.1.3"), entry(5)),
        ])
    }

    #[test]
    fn test_index_is_sorted_key_set() {
        let tree = sample_tree();
        assert_eq!(tree.len(), 5);
        let oids = tree.oids();
        for pair in oids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        for o in oids {
            assert!(tree.contains(o));
        }
    }

    #[test]
    fn test_get_next_returns_least_greater() {
        let tree = sample_tree();
        assert_eq!(
            tree.get_next(&oid("1.3.6.1.2.1.1.1.0")),
            NextOid::Next(oid("1.3.6.1.2.1.1.3.0"))
        );
        // Input need not be present in the tree.
        assert_eq!(
            tree.get_next(&oid("1.3.6.1.2.1.1.2")),
            NextOid::Next(oid("1.3.6.1.2.1.1.3.0"))
        );
        // A bare prefix steps to the first entry under it.
        assert_eq!(
            tree.get_next(&oid("1.3.6.1.2.1.2")),
            NextOid::Next(oid("1.3.6.1.2.1.2.2.1.1.1"))
        );
        assert_eq!(tree.get_next(&oid("1.3.6.1.2.1.2.2.1.1.3")), NextOid::EndOfMib);
        assert_eq!(tree.get_next(&oid("1.3.6.1.9.9.9")), NextOid::EndOfMib);
    }

    #[test]
    fn test_bulk_walk_bounds() {
        let tree = sample_tree();
        let walked = tree.bulk_walk(&oid("1.3.6.1.2.1.2.2.1.1"), 2);
        assert_eq!(walked.len(), 2);
        assert_eq!(walked[0].0, &oid("1.3.6.1.2.1.2.2.1.1.1"));
        assert_eq!(walked[1].0, &oid("1.3.6.1.2.1.2.2.1.1.2"));

        // Early termination at the end of the tree.
        let walked = tree.bulk_walk(&oid("1.3.6.1.2.1.2.2.1.1.2"), 10);
        assert_eq!(walked.len(), 1);

        assert!(tree.bulk_walk(&oid("1.3.6.1.9.9.9"), 5).is_empty());
    }

    #[test]
    fn test_insert_overwrites_without_duplicating_index() {
        let mut tree = sample_tree();
        tree.insert(oid("1.3.6.1.2.1.1.1.0"), entry(99));
        assert_eq!(tree.len(), 5);
        assert_eq!(
            tree.get(&oid("1.3.6.1.2.1.1.1.0")).unwrap().base_value,
            SnmpValue::Integer(99)
        );

        tree.insert(oid("1.3.6.1.2.1.1.2.0"), entry(7));
        assert_eq!(tree.len(), 6);
        assert_eq!(
            tree.get_next(&oid("1.3.6.1.2.1.1.1.0")),
            NextOid::Next(oid("1.3.6.1.2.1.1.2.0"))
        );
    }

    #[test]
    fn test_has_children() {
        let tree = sample_tree();
        assert!(tree.has_children(&oid("1.3.6.1.2.1.2.2.1.1")));
        assert!(!tree.has_children(&oid("1.3.6.1.2.1.3")));
        // An exact leaf has no children.
        assert!(!tree.has_children(&oid("1.3.6.1.2.1.1.1.0")));
    }
}
