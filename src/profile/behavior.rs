//! Behavior classification for profile entries
//!
//! Every OID loaded from a walk gets a behavior describing how its value
//! evolves at runtime. The analyzer assigns defaults from the object's
//! resolved name and declared type; group-level behavior tags can override
//! individual classes later.

use serde::{Deserialize, Serialize};

use crate::snmp::{Oid, SnmpValue, ValueType};

use super::mib;

/// Variance applied to counter rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceMode {
    Uniform,
    Gaussian,
    Burst { probability: f64, magnitude: f64 },
    TimeCorrelated,
    DeviceSpecific,
}

/// How a profile entry's value is synthesized at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Behavior {
    TrafficCounter {
        rate_min: f64,
        rate_max: f64,
        variance: VarianceMode,
    },
    PacketCounter {
        /// Octets column on the same interface, when the walk has one;
        /// packet rates then track it instead of a free-running rate.
        octets_oid: Option<Oid>,
        rate_min: f64,
        rate_max: f64,
    },
    ErrorCounter {
        /// Errors per hour at idle utilization.
        base_rate: f64,
        burst_probability: f64,
    },
    UtilizationGauge {
        bias: f64,
    },
    CpuGauge {
        spike_probability: f64,
    },
    PowerGauge {
        min: f64,
        max: f64,
    },
    SnrGauge {
        min: f64,
        max: f64,
    },
    SignalGauge {
        min: f64,
        max: f64,
    },
    TemperatureGauge {
        base: f64,
    },
    UptimeCounter,
    StatusEnum {
        up: i64,
        degraded: i64,
        down: i64,
    },
    StaticValue,
}

impl Behavior {
    /// Metric name used for jitter-matrix lookups.
    pub fn metric_name(&self) -> &'static str {
        match self {
            Behavior::TrafficCounter { .. } => "traffic",
            Behavior::PacketCounter { .. } => "packets",
            Behavior::ErrorCounter { .. } => "errors",
            Behavior::UtilizationGauge { .. } => "utilization",
            Behavior::CpuGauge { .. } => "cpu",
            Behavior::PowerGauge { .. } => "power",
            Behavior::SnrGauge { .. } => "snr",
            Behavior::SignalGauge { .. } => "signal",
            Behavior::TemperatureGauge { .. } => "temperature",
            Behavior::UptimeCounter => "uptime",
            Behavior::StatusEnum { .. } => "status",
            Behavior::StaticValue => "static",
        }
    }
}

/// One OID's worth of profile data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub value_type: ValueType,
    pub base_value: SnmpValue,
    pub behavior: Behavior,
    pub mib_name: Option<String>,
}

impl ProfileEntry {
    pub fn fixed(value: SnmpValue) -> Self {
        Self {
            value_type: value.value_type(),
            base_value: value,
            behavior: Behavior::StaticValue,
            mib_name: None,
        }
    }
}

const DOCSIS_SIGNAL_QUALITY: [u32; 11] = [1, 3, 6, 1, 2, 1, 10, 127, 1, 1, 4];
const DOCSIS_DOWNSTREAM_POWER: [u32; 13] = [1, 3, 6, 1, 2, 1, 10, 127, 1, 1, 1, 1, 6];
const DOCSIS_TX_POWER: [u32; 13] = [1, 3, 6, 1, 2, 1, 10, 127, 1, 2, 1, 1, 3];

/// Assign the default behavior for a walk entry.
///
/// `sibling_octets` is the octets column next to a packet counter on the
/// same interface row, resolved by the caller against the full walk map.
pub fn classify(
    oid: &Oid,
    value_type: ValueType,
    base_value: &SnmpValue,
    mib_name: Option<&str>,
    sibling_octets: Option<Oid>,
) -> Behavior {
    let name = mib_name
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let is_counter = matches!(value_type, ValueType::Counter32 | ValueType::Counter64);
    let is_gaugeish = matches!(value_type, ValueType::Gauge32 | ValueType::Integer);

    if name == "sysuptime" || name == "hrsystemuptime" || value_type == ValueType::TimeTicks {
        return Behavior::UptimeCounter;
    }

    if is_counter && name.contains("octets") {
        return Behavior::TrafficCounter {
            rate_min: 1_000.0,
            rate_max: 125_000_000.0,
            variance: VarianceMode::TimeCorrelated,
        };
    }

    if is_counter && (name.contains("pkts") || name.contains("packets") || name.contains("frames"))
    {
        return Behavior::PacketCounter {
            octets_oid: sibling_octets,
            rate_min: 10.0,
            rate_max: 150_000.0,
        };
    }

    if is_counter
        && (name.contains("error")
            || name.contains("discard")
            || name.contains("drop")
            || name.contains("uncorrectable")
            || name.contains("retrans"))
    {
        return Behavior::ErrorCounter {
            base_rate: 1.0,
            burst_probability: 0.02,
        };
    }

    if is_gaugeish && oid.starts_with(&Oid::from(DOCSIS_SIGNAL_QUALITY)) {
        return Behavior::SnrGauge {
            min: 10.0,
            max: 40.0,
        };
    }

    if is_gaugeish
        && (oid.starts_with(&Oid::from(DOCSIS_DOWNSTREAM_POWER))
            || oid.starts_with(&Oid::from(DOCSIS_TX_POWER)))
    {
        return Behavior::PowerGauge {
            min: -15.0,
            max: 15.0,
        };
    }

    if is_gaugeish && (name.contains("temperature") || name.contains("temp")) {
        let base = base_value.as_number().unwrap_or(35.0);
        return Behavior::TemperatureGauge { base };
    }

    if is_gaugeish && (name.contains("cpu") || name.contains("processorload")) {
        return Behavior::CpuGauge {
            spike_probability: 0.05,
        };
    }

    if is_gaugeish && name.contains("util") {
        return Behavior::UtilizationGauge { bias: 1.0 };
    }

    if value_type == ValueType::Integer
        && (name.contains("operstatus") || name.contains("adminstatus") || name.ends_with("status"))
    {
        return Behavior::StatusEnum {
            up: 1,
            degraded: 5,
            down: 2,
        };
    }

    if is_counter {
        return Behavior::TrafficCounter {
            rate_min: 1.0,
            rate_max: 1_000.0,
            variance: VarianceMode::Uniform,
        };
    }

    Behavior::StaticValue
}

/// Apply group-level behavior tags on top of the analyzer defaults.
/// Unknown tags are ignored.
pub fn apply_tags(behavior: Behavior, tags: &[String]) -> Behavior {
    let mut behavior = behavior;
    for tag in tags {
        behavior = match (tag.as_str(), behavior) {
            // Freeze every value at its walk baseline.
            ("static_only", _) => Behavior::StaticValue,
            // Bursty traffic shaping for load tests.
            (
                "high_variance",
                Behavior::TrafficCounter {
                    rate_min, rate_max, ..
                },
            ) => Behavior::TrafficCounter {
                rate_min,
                rate_max,
                variance: VarianceMode::Burst {
                    probability: 0.1,
                    magnitude: 4.0,
                },
            },
            (_, unchanged) => unchanged,
        };
    }
    behavior
}

/// Locate the octets column matching a packet counter on the same
/// interface row (e.g. `ifInUcastPkts.3` -> `ifInOctets.3`).
pub fn octets_sibling(oid: &Oid, mib_name: Option<&str>) -> Option<Oid> {
    let name = mib_name?;
    let octets_column = match name {
        "ifInUcastPkts" | "ifInNUcastPkts" => "ifInOctets",
        "ifOutUcastPkts" | "ifOutNUcastPkts" => "ifOutOctets",
        "ifHCInUcastPkts" => "ifHCInOctets",
        "ifHCOutUcastPkts" => "ifHCOutOctets",
        _ => return None,
    };
    let packet_column = mib::resolve_object("IF-MIB", name)?;
    let index = oid.suffix_of(&packet_column)?;
    Some(mib::resolve_object("IF-MIB", octets_column)?.extend(index))
}
