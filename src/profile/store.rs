//! Process-wide registry of loaded device profiles
//!
//! One immutable [`Profile`] per device type, shared by every simulated
//! device of that type. Reloading swaps the published `Arc`, so readers
//! either see the old profile or the new one, never a half-built state; a
//! failed load leaves the previous profile installed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;

use crate::config::DeviceType;
use crate::snmp::Oid;
use crate::{Error, Result};

use super::behavior::{self, classify, octets_sibling, Behavior, ProfileEntry};
use super::tree::{NextOid, OidTree};
use super::walk::{parse_walk_text, WalkData};

#[derive(Debug, Clone)]
pub struct ProfileMetadata {
    pub source: Option<PathBuf>,
    pub loaded_at: DateTime<Utc>,
    pub entry_count: usize,
    pub skipped_lines: usize,
}

/// Immutable per-device-type OID map with behavior annotations.
#[derive(Debug)]
pub struct Profile {
    pub device_type: DeviceType,
    tree: OidTree,
    pub metadata: ProfileMetadata,
}

impl Profile {
    /// Build a profile from parsed walk data, running the behavior analyzer
    /// over every entry.
    pub fn from_walk(device_type: DeviceType, walk: WalkData, source: Option<PathBuf>) -> Self {
        Self::from_walk_tagged(device_type, walk, source, &[])
    }

    /// Like [`Profile::from_walk`], with group-level behavior tags applied
    /// on top of the analyzer defaults.
    pub fn from_walk_tagged(
        device_type: DeviceType,
        walk: WalkData,
        source: Option<PathBuf>,
        tags: &[String],
    ) -> Self {
        let entries: Vec<(Oid, ProfileEntry)> = walk
            .entries
            .iter()
            .map(|(oid, raw)| {
                let sibling = octets_sibling(oid, raw.mib_name.as_deref())
                    .filter(|octets| walk.entries.contains_key(octets));
                let behavior = behavior::apply_tags(
                    classify(
                        oid,
                        raw.value.value_type(),
                        &raw.value,
                        raw.mib_name.as_deref(),
                        sibling,
                    ),
                    tags,
                );
                (
                    oid.clone(),
                    ProfileEntry {
                        value_type: raw.value.value_type(),
                        base_value: raw.value.clone(),
                        behavior,
                        mib_name: raw.mib_name.clone(),
                    },
                )
            })
            .collect();

        let entry_count = entries.len();
        Self {
            device_type,
            tree: OidTree::from_entries(entries),
            metadata: ProfileMetadata {
                source,
                loaded_at: Utc::now(),
                entry_count,
                skipped_lines: walk.skipped_lines,
            },
        }
    }

    /// Minimal built-in profile for device groups without a walk capture:
    /// system group plus one interface row, enough to answer pollers.
    pub fn baseline(device_type: DeviceType) -> Self {
        let descr = match device_type {
            DeviceType::CableModem => "Generic DOCSIS 3.0 Cable Modem",
            DeviceType::Mta => "Generic PacketCable MTA",
            DeviceType::Switch => "Generic L2 Access Switch",
            DeviceType::Router => "Generic Edge Router",
            DeviceType::Cmts => "Generic CMTS",
            DeviceType::Server => "Generic Linux Server",
            DeviceType::Generic => "SNMP Device",
        };
        let text = format!(
            concat!(
                "SNMPv2-MIB::sysDescr.0 = STRING: \"{descr}\"\n",
                "SNMPv2-MIB::sysObjectID.0 = OID: SNMPv2-SMI::enterprises.8072.3.2.10\n",
                "SNMPv2-MIB::sysUpTime.0 = Timeticks: (0) 0:00:00.00\n",
                "SNMPv2-MIB::sysName.0 = STRING: \"{name}\"\n",
                "IF-MIB::ifNumber.0 = INTEGER: 1\n",
                "IF-MIB::ifIndex.1 = INTEGER: 1\n",
                "IF-MIB::ifDescr.1 = STRING: \"eth0\"\n",
                "IF-MIB::ifSpeed.1 = Gauge32: 1000000000\n",
                "IF-MIB::ifAdminStatus.1 = INTEGER: up(1)\n",
                "IF-MIB::ifOperStatus.1 = INTEGER: up(1)\n",
                "IF-MIB::ifInOctets.1 = Counter32: 0\n",
                "IF-MIB::ifOutOctets.1 = Counter32: 0\n",
                "IF-MIB::ifInUcastPkts.1 = Counter32: 0\n",
                "IF-MIB::ifOutUcastPkts.1 = Counter32: 0\n",
                "IF-MIB::ifInErrors.1 = Counter32: 0\n",
            ),
            descr = descr,
            name = device_type,
        );
        Self::from_walk(device_type, parse_walk_text(&text), None)
    }

    pub fn tree(&self) -> &OidTree {
        &self.tree
    }

    pub fn get(&self, oid: &Oid) -> Option<&ProfileEntry> {
        self.tree.get(oid)
    }

    pub fn get_next(&self, oid: &Oid) -> NextOid {
        self.tree.get_next(oid)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// True when the profile has a non-static entry, i.e. real walk data
    /// drives value synthesis.
    pub fn has_dynamic_entries(&self) -> bool {
        self.tree
            .iter()
            .any(|(_, entry)| entry.behavior != Behavior::StaticValue)
    }
}

/// Registry of loaded profiles keyed by device type.
#[derive(Default)]
pub struct ProfileStore {
    profiles: RwLock<HashMap<DeviceType, Arc<Profile>>>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a walk capture and install it as the profile for `device_type`.
    /// All-or-nothing: on error the previous profile stays published.
    pub async fn load_walk_profile<P: AsRef<Path>>(
        &self,
        device_type: DeviceType,
        path: P,
    ) -> Result<Arc<Profile>> {
        self.load_walk_profile_tagged(device_type, path, &[]).await
    }

    /// Load a walk capture with group behavior tags applied.
    pub async fn load_walk_profile_tagged<P: AsRef<Path>>(
        &self,
        device_type: DeviceType,
        path: P,
        tags: &[String],
    ) -> Result<Arc<Profile>> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::FileRead {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let walk = parse_walk_text(&text);
        if walk.is_empty() {
            return Err(Error::UnsupportedSource(format!(
                "{} contains no parseable walk lines",
                path.display()
            )));
        }

        let profile = Arc::new(Profile::from_walk_tagged(
            device_type,
            walk,
            Some(path.to_path_buf()),
            tags,
        ));
        info!(
            device_type = %device_type,
            path = %path.display(),
            entries = profile.metadata.entry_count,
            skipped = profile.metadata.skipped_lines,
            "loaded walk profile"
        );

        self.install(profile.clone());
        Ok(profile)
    }

    /// Publish a prebuilt profile (walk-derived or baseline).
    pub fn install(&self, profile: Arc<Profile>) {
        self.profiles.write().insert(profile.device_type, profile);
    }

    /// Install the built-in baseline unless a profile is already published.
    pub fn ensure_baseline(&self, device_type: DeviceType) -> Arc<Profile> {
        let mut profiles = self.profiles.write();
        profiles
            .entry(device_type)
            .or_insert_with(|| Arc::new(Profile::baseline(device_type)))
            .clone()
    }

    pub fn list_profiles(&self) -> Vec<DeviceType> {
        let mut types: Vec<DeviceType> = self.profiles.read().keys().copied().collect();
        types.sort_by_key(|t| t.to_string());
        types
    }

    /// Snapshot of the current profile for a device type.
    pub fn profile(&self, device_type: DeviceType) -> Option<Arc<Profile>> {
        self.profiles.read().get(&device_type).cloned()
    }

    pub fn get_oid_value(&self, device_type: DeviceType, oid: &Oid) -> Option<ProfileEntry> {
        self.profile(device_type)?.get(oid).cloned()
    }

    pub fn get_next_oid(&self, device_type: DeviceType, oid: &Oid) -> NextOid {
        match self.profile(device_type) {
            Some(profile) => profile.get_next(oid),
            None => NextOid::EndOfMib,
        }
    }

    pub fn bulk_walk(
        &self,
        device_type: DeviceType,
        start: &Oid,
        max: usize,
    ) -> Vec<(Oid, ProfileEntry)> {
        match self.profile(device_type) {
            Some(profile) => profile
                .tree()
                .bulk_walk(start, max)
                .into_iter()
                .map(|(oid, entry)| (oid.clone(), entry.clone()))
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snmp::SnmpValue;
    use std::io::Write;

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    #[test]
    fn test_baseline_profiles_have_system_group() {
        for device_type in [DeviceType::CableModem, DeviceType::Switch, DeviceType::Server] {
            let profile = Profile::baseline(device_type);
            assert!(profile.get(&oid("1.3.6.1.2.1.1.1.0")).is_some());
            assert!(profile.get(&oid("1.3.6.1.2.1.1.3.0")).is_some());
            assert!(profile.has_dynamic_entries());
        }
    }

    #[test]
    fn test_analyzer_runs_on_walk_entries() {
        let walk = parse_walk_text(
            "IF-MIB::ifInOctets.1 = Counter32: 10\nIF-MIB::ifInUcastPkts.1 = Counter32: 5\n",
        );
        let profile = Profile::from_walk(DeviceType::Router, walk, None);

        let octets = profile.get(&oid("1.3.6.1.2.1.2.2.1.10.1")).unwrap();
        assert!(matches!(octets.behavior, Behavior::TrafficCounter { .. }));

        let pkts = profile.get(&oid("1.3.6.1.2.1.2.2.1.11.1")).unwrap();
        match &pkts.behavior {
            Behavior::PacketCounter { octets_oid, .. } => {
                assert_eq!(octets_oid.as_ref(), Some(&oid("1.3.6.1.2.1.2.2.1.10.1")));
            }
            other => panic!("unexpected behavior {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_from_file_and_reload() {
        let store = ProfileStore::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "SNMPv2-MIB::sysDescr.0 = STRING: \"Motorola SB6183\"").unwrap();
        file.flush().unwrap();

        store
            .load_walk_profile(DeviceType::CableModem, file.path())
            .await
            .unwrap();
        assert_eq!(store.list_profiles(), vec![DeviceType::CableModem]);

        let entry = store
            .get_oid_value(DeviceType::CableModem, &oid("1.3.6.1.2.1.1.1.0"))
            .unwrap();
        assert_eq!(
            entry.base_value,
            SnmpValue::OctetString(b"Motorola SB6183".to_vec())
        );

        // Failed reload leaves the old profile in place.
        let result = store
            .load_walk_profile(DeviceType::CableModem, "/nonexistent/walk.txt")
            .await;
        assert!(result.is_err());
        assert!(store
            .get_oid_value(DeviceType::CableModem, &oid("1.3.6.1.2.1.1.1.0"))
            .is_some());
    }

    #[tokio::test]
    async fn test_empty_walk_rejected() {
        let store = ProfileStore::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# nothing but comments").unwrap();
        file.flush().unwrap();

        let result = store.load_walk_profile(DeviceType::Mta, file.path()).await;
        assert!(matches!(result, Err(Error::UnsupportedSource(_))));
        assert!(store.profile(DeviceType::Mta).is_none());
    }

    #[test]
    fn test_store_delegates() {
        let store = ProfileStore::new();
        store.ensure_baseline(DeviceType::Switch);

        match store.get_next_oid(DeviceType::Switch, &oid("1.3.6.1.2.1.1.1.0")) {
            NextOid::Next(next) => assert_eq!(next, oid("1.3.6.1.2.1.1.2.0")),
            NextOid::EndOfMib => panic!("expected a successor"),
        }
        assert_eq!(
            store.get_next_oid(DeviceType::Cmts, &oid("1.3.6.1")),
            NextOid::EndOfMib
        );

        let walked = store.bulk_walk(DeviceType::Switch, &oid("1.3.6.1.2.1.1"), 3);
        assert_eq!(walked.len(), 3);
    }
}
