//! Built-in MIB name dictionary
//!
//! A deliberately small table: the modules and objects that show up in
//! captured walks of the supported device families. It resolves
//! `MODULE::name` tokens from walk files to numeric OIDs and, in reverse,
//! names simulated objects for the behavior analyzer. This is not a MIB
//! compiler.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::snmp::Oid;

/// `SNMPv2-SMI::enterprises` — walk files spell enterprise OID values with
/// this prefix.
pub const ENTERPRISES: [u32; 6] = [1, 3, 6, 1, 4, 1];

struct MibModule {
    name: &'static str,
    base: &'static [u32],
    objects: &'static [(&'static str, &'static [u32])],
}

// Object suffixes are relative to the module base.
static MODULES: &[MibModule] = &[
    MibModule {
        name: "SNMPv2-MIB",
        base: &[1, 3, 6, 1, 2, 1],
        objects: &[
            ("sysDescr", &[1, 1]),
            ("sysObjectID", &[1, 2]),
            ("sysUpTime", &[1, 3]),
            ("sysContact", &[1, 4]),
            ("sysName", &[1, 5]),
            ("sysLocation", &[1, 6]),
            ("sysServices", &[1, 7]),
            ("snmpInPkts", &[11, 1]),
            ("snmpOutPkts", &[11, 2]),
            ("snmpInBadCommunityNames", &[11, 4]),
        ],
    },
    MibModule {
        name: "IF-MIB",
        base: &[1, 3, 6, 1, 2, 1],
        objects: &[
            ("ifNumber", &[2, 1]),
            ("ifIndex", &[2, 2, 1, 1]),
            ("ifDescr", &[2, 2, 1, 2]),
            ("ifType", &[2, 2, 1, 3]),
            ("ifMtu", &[2, 2, 1, 4]),
            ("ifSpeed", &[2, 2, 1, 5]),
            ("ifPhysAddress", &[2, 2, 1, 6]),
            ("ifAdminStatus", &[2, 2, 1, 7]),
            ("ifOperStatus", &[2, 2, 1, 8]),
            ("ifLastChange", &[2, 2, 1, 9]),
            ("ifInOctets", &[2, 2, 1, 10]),
            ("ifInUcastPkts", &[2, 2, 1, 11]),
            ("ifInDiscards", &[2, 2, 1, 13]),
            ("ifInErrors", &[2, 2, 1, 14]),
            ("ifOutOctets", &[2, 2, 1, 16]),
            ("ifOutUcastPkts", &[2, 2, 1, 17]),
            ("ifOutDiscards", &[2, 2, 1, 19]),
            ("ifOutErrors", &[2, 2, 1, 20]),
            ("ifName", &[31, 1, 1, 1, 1]),
            ("ifHCInOctets", &[31, 1, 1, 1, 6]),
            ("ifHCInUcastPkts", &[31, 1, 1, 1, 7]),
            ("ifHCOutOctets", &[31, 1, 1, 1, 10]),
            ("ifHCOutUcastPkts", &[31, 1, 1, 1, 11]),
            ("ifHighSpeed", &[31, 1, 1, 1, 15]),
            ("ifAlias", &[31, 1, 1, 1, 18]),
        ],
    },
    MibModule {
        name: "IP-MIB",
        base: &[1, 3, 6, 1, 2, 1],
        objects: &[
            ("ipForwarding", &[4, 1]),
            ("ipDefaultTTL", &[4, 2]),
            ("ipInReceives", &[4, 3]),
            ("ipInDiscards", &[4, 8]),
            ("ipInDelivers", &[4, 9]),
            ("ipOutRequests", &[4, 10]),
            ("ipOutDiscards", &[4, 11]),
        ],
    },
    MibModule {
        name: "TCP-MIB",
        base: &[1, 3, 6, 1, 2, 1, 6],
        objects: &[
            ("tcpActiveOpens", &[5]),
            ("tcpPassiveOpens", &[6]),
            ("tcpCurrEstab", &[9]),
            ("tcpInSegs", &[10]),
            ("tcpOutSegs", &[11]),
            ("tcpRetransSegs", &[12]),
            ("tcpInErrs", &[14]),
        ],
    },
    MibModule {
        name: "UDP-MIB",
        base: &[1, 3, 6, 1, 2, 1, 7],
        objects: &[
            ("udpInDatagrams", &[1]),
            ("udpNoPorts", &[2]),
            ("udpInErrors", &[3]),
            ("udpOutDatagrams", &[4]),
        ],
    },
    MibModule {
        name: "HOST-RESOURCES-MIB",
        base: &[1, 3, 6, 1, 2, 1, 25],
        objects: &[
            ("hrSystemUptime", &[1, 1]),
            ("hrSystemNumUsers", &[1, 5]),
            ("hrSystemProcesses", &[1, 6]),
            ("hrMemorySize", &[2, 2]),
            ("hrStorageSize", &[2, 3, 1, 5]),
            ("hrStorageUsed", &[2, 3, 1, 6]),
            ("hrProcessorLoad", &[3, 3, 1, 2]),
            ("hrDeviceStatus", &[3, 2, 1, 5]),
        ],
    },
    MibModule {
        name: "BRIDGE-MIB",
        base: &[1, 3, 6, 1, 2, 1, 17],
        objects: &[
            ("dot1dBaseNumPorts", &[1, 2]),
            ("dot1dBaseType", &[1, 3]),
            ("dot1dStpTopChanges", &[2, 4]),
            ("dot1dTpLearnedEntryDiscards", &[4, 1]),
            ("dot1dTpPortInFrames", &[4, 4, 1, 3]),
            ("dot1dTpPortOutFrames", &[4, 4, 1, 4]),
        ],
    },
    MibModule {
        name: "ENTITY-MIB",
        base: &[1, 3, 6, 1, 2, 1, 47],
        objects: &[
            ("entPhysicalDescr", &[1, 1, 1, 1, 2]),
            ("entPhysicalName", &[1, 1, 1, 1, 7]),
            ("entPhysicalHardwareRev", &[1, 1, 1, 1, 8]),
            ("entPhysicalSerialNum", &[1, 1, 1, 1, 11]),
            ("entPhysicalMfgName", &[1, 1, 1, 1, 12]),
        ],
    },
    MibModule {
        name: "DOCS-CABLE-DEVICE-MIB",
        base: &[1, 3, 6, 1, 2, 1, 69],
        objects: &[
            ("docsDevSwServer", &[1, 3, 1]),
            ("docsDevSwFilename", &[1, 3, 2]),
            ("docsDevSwAdminStatus", &[1, 3, 3]),
            ("docsDevSwOperStatus", &[1, 3, 4]),
            ("docsDevSwCurrentVers", &[1, 3, 5]),
            ("docsDevServerBootState", &[1, 4, 1]),
            ("docsDevEvLevel", &[1, 5, 8, 1, 6]),
        ],
    },
    MibModule {
        name: "DOCS-IF-MIB",
        base: &[1, 3, 6, 1, 2, 1, 10, 127],
        objects: &[
            ("docsIfDownChannelFrequency", &[1, 1, 1, 1, 2]),
            ("docsIfDownChannelPower", &[1, 1, 1, 1, 6]),
            ("docsIfUpChannelFrequency", &[1, 1, 2, 1, 2]),
            ("docsIfSigQUnerroreds", &[1, 1, 4, 1, 2]),
            ("docsIfSigQCorrecteds", &[1, 1, 4, 1, 3]),
            ("docsIfSigQUncorrectables", &[1, 1, 4, 1, 4]),
            ("docsIfSigQSignalNoise", &[1, 1, 4, 1, 5]),
            ("docsIfSigQMicroreflections", &[1, 1, 4, 1, 6]),
            ("docsIfCmStatusValue", &[1, 2, 1, 1, 1]),
            ("docsIfCmStatusTxPower", &[1, 2, 1, 1, 3]),
            ("docsIfCmStatusResets", &[1, 2, 1, 1, 4]),
            ("docsIfCmStatusLostSyncs", &[1, 2, 1, 1, 5]),
        ],
    },
];

static NAME_INDEX: Lazy<HashMap<(&'static str, &'static str), Oid>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for module in MODULES {
        for (name, suffix) in module.objects {
            let mut components = module.base.to_vec();
            components.extend_from_slice(suffix);
            map.insert((module.name, *name), Oid::new(components));
        }
    }
    map
});

static REVERSE_INDEX: Lazy<Vec<(Oid, &'static str)>> = Lazy::new(|| {
    let mut entries: Vec<(Oid, &'static str)> = NAME_INDEX
        .iter()
        .map(|((_, name), oid)| (oid.clone(), *name))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
});

/// Base prefix of a known module, if any.
pub fn module_base(module: &str) -> Option<Oid> {
    MODULES
        .iter()
        .find(|m| m.name == module)
        .map(|m| Oid::new(m.base.to_vec()))
}

/// Resolve `MODULE::name` to its numeric object OID (without instance).
pub fn resolve_object(module: &str, name: &str) -> Option<Oid> {
    NAME_INDEX.get(&(module, name)).cloned()
}

/// Longest-prefix reverse lookup: the object name an instance OID lives
/// under. Used by the behavior analyzer to classify walk entries.
pub fn object_name(oid: &Oid) -> Option<&'static str> {
    let mut best: Option<(&Oid, &'static str)> = None;
    for (prefix, name) in REVERSE_INDEX.iter() {
        if oid.starts_with(prefix) {
            match best {
                Some((current, _)) if current.len() >= prefix.len() => {}
                _ => best = Some((prefix, name)),
            }
        }
    }
    best.map(|(_, name)| name)
}
