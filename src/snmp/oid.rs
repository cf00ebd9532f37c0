//! Object identifiers in canonical integer-sequence form
//!
//! OIDs are compared componentwise on their integer form; a shorter OID
//! sorts before any longer OID it prefixes. String forms are only produced
//! and accepted at the wire and file-format boundaries.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Oid {
    components: Vec<u32>,
}

impl Oid {
    pub fn new(components: Vec<u32>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &[u32] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns a new OID with `component` appended.
    pub fn child(&self, component: u32) -> Self {
        let mut components = self.components.clone();
        components.push(component);
        Self { components }
    }

    /// Returns a new OID with `suffix` appended.
    pub fn extend(&self, suffix: &[u32]) -> Self {
        let mut components = self.components.clone();
        components.extend_from_slice(suffix);
        Self { components }
    }

    /// The OID without its final sub-identifier, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.components.len() < 2 {
            return None;
        }
        Some(Self {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    pub fn last(&self) -> Option<u32> {
        self.components.last().copied()
    }

    /// True if `self` is equal to `prefix` or lies below it in the tree.
    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.components.len() >= prefix.components.len()
            && self.components[..prefix.components.len()] == prefix.components[..]
    }

    /// True if `self` is strictly below `parent`.
    pub fn is_child_of(&self, parent: &Oid) -> bool {
        self.components.len() > parent.components.len() && self.starts_with(parent)
    }

    /// The components of `self` past `prefix`, if `self` lies below it.
    pub fn suffix_of(&self, prefix: &Oid) -> Option<&[u32]> {
        if self.starts_with(prefix) {
            Some(&self.components[prefix.components.len()..])
        } else {
            None
        }
    }
}

impl Ord for Oid {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.components.iter().zip(other.components.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        self.components.len().cmp(&other.components.len())
    }
}

impl PartialOrd for Oid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Oid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_start_matches('.');
        if trimmed.is_empty() {
            return Err(Error::parse(format!("empty OID: {s:?}")));
        }
        let components = trimmed
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| Error::parse(format!("invalid OID component {part:?} in {s:?}")))
            })
            .collect::<Result<Vec<u32>>>()?;
        Ok(Self { components })
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for c in &self.components {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{c}")?;
            first = false;
        }
        Ok(())
    }
}

impl From<&[u32]> for Oid {
    fn from(components: &[u32]) -> Self {
        Self::new(components.to_vec())
    }
}

impl<const N: usize> From<[u32; N]> for Oid {
    fn from(components: [u32; N]) -> Self {
        Self::new(components.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let parsed = oid("1.3.6.1.2.1.1.1.0");
        assert_eq!(parsed.components(), &[1, 3, 6, 1, 2, 1, 1, 1, 0]);
        assert_eq!(parsed.to_string(), "1.3.6.1.2.1.1.1.0");

        // Leading dot form is accepted at boundaries.
        assert_eq!(oid(".1.3.6.1"), oid("1.3.6.1"));
        assert!("".parse::<Oid>().is_err());
        assert!("1.3.x.1".parse::<Oid>().is_err());
    }

    #[test]
    fn test_componentwise_ordering() {
        assert!(oid("1.3.6.1.2.1.1.1.0") < oid("1.3.6.1.2.1.1.2.0"));
        assert!(oid("1.3.6.1.2.1.2.2.1.1.1") < oid("1.3.6.1.2.1.2.2.1.2.1"));
        // A prefix sorts strictly before any extension of itself.
        assert!(oid("1.3.6.1.2.1.1") < oid("1.3.6.1.2.1.1.1"));
        // Numeric, not textual: 10 > 9.
        assert!(oid("1.3.6.1.2.1.9") < oid("1.3.6.1.2.1.10"));
        assert_eq!(oid("1.3.6").cmp(&oid("1.3.6")), Ordering::Equal);
    }

    #[test]
    fn test_prefix_relations() {
        let table = oid("1.3.6.1.2.1.2.2.1.10");
        let instance = oid("1.3.6.1.2.1.2.2.1.10.3");
        assert!(instance.starts_with(&table));
        assert!(instance.is_child_of(&table));
        assert!(!table.is_child_of(&table));
        assert_eq!(instance.suffix_of(&table), Some(&[3u32][..]));
        assert_eq!(table.suffix_of(&instance), None);
    }

    #[test]
    fn test_child_and_parent() {
        let base = oid("1.3.6.1.2.1.1");
        assert_eq!(base.child(5), oid("1.3.6.1.2.1.1.5"));
        assert_eq!(base.child(5).parent(), Some(base.clone()));
        assert_eq!(base.extend(&[3, 0]), oid("1.3.6.1.2.1.1.3.0"));
    }
}
