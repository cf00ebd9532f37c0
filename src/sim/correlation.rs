//! Inter-metric correlation engine
//!
//! When a simulator updates a primary metric, the listed correlations pull
//! the dependent metrics along: utilization drags error rates up, heat
//! erodes signal quality, CPU load feeds power draw. The engine only ever
//! writes secondary metrics; callers own the primary update, which keeps
//! the no-matching-correlation case a strict no-op.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::DeviceType;

use super::clock;

/// Logical metrics tracked per device, independent of any concrete OID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    ErrorRate,
    CpuUsage,
    InterfaceUtilization,
    SignalQuality,
    Temperature,
    PowerConsumption,
    Throughput,
}

impl Metric {
    /// Starting point used before any simulator touched the metric.
    pub fn default_value(&self) -> f64 {
        match self {
            Metric::ErrorRate => 0.001,
            Metric::CpuUsage => 20.0,
            Metric::InterfaceUtilization => 10.0,
            Metric::SignalQuality => 80.0,
            Metric::Temperature => 35.0,
            Metric::PowerConsumption => 10.0,
            Metric::Throughput => 1_000_000.0,
        }
    }

    /// Clamp bounds applied after every correlated update.
    fn bounds(&self) -> (f64, f64) {
        match self {
            Metric::ErrorRate => (0.0, 1.0),
            Metric::CpuUsage | Metric::InterfaceUtilization | Metric::SignalQuality => (0.0, 100.0),
            Metric::Temperature => (-10.0, 100.0),
            Metric::PowerConsumption | Metric::Throughput => (0.0, f64::INFINITY),
        }
    }

    fn is_utilization_family(&self) -> bool {
        matches!(
            self,
            Metric::InterfaceUtilization | Metric::CpuUsage | Metric::Throughput
        )
    }

    /// Map a raw metric value onto `0..100`.
    fn normalize(&self, value: f64) -> f64 {
        let normalized = match self {
            // Already a percentage.
            Metric::CpuUsage | Metric::InterfaceUtilization | Metric::SignalQuality => value,
            // Fractions become percentages.
            Metric::ErrorRate => value * 100.0,
            // Degrees Celsius pass through.
            Metric::Temperature => value,
            // Watts, scaled for a small network element.
            Metric::PowerConsumption => value,
            // Share of a gigabit link.
            Metric::Throughput => value / 1_250_000.0,
        };
        normalized.clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorrelationKind {
    Positive,
    Negative,
    /// Step change once the normalized primary passes `threshold`.
    Threshold { threshold: f64, step: f64 },
    Exponential,
    Logarithmic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub primary: Metric,
    pub secondary: Metric,
    pub kind: CorrelationKind,
    pub strength: f64,
}

impl Correlation {
    pub const fn new(primary: Metric, secondary: Metric, kind: CorrelationKind, strength: f64) -> Self {
        Self {
            primary,
            secondary,
            kind,
            strength,
        }
    }
}

/// Apply every correlation whose primary is `primary` to the metric map.
pub fn apply<R: Rng + ?Sized>(
    primary: Metric,
    primary_value: f64,
    metrics: &mut HashMap<Metric, f64>,
    correlations: &[Correlation],
    now: NaiveDateTime,
    rng: &mut R,
) {
    let norm = primary.normalize(primary_value);
    let fraction = norm / 100.0;

    for correlation in correlations.iter().filter(|c| c.primary == primary) {
        let strength = correlation.strength.clamp(0.0, 1.0);
        let current = *metrics
            .entry(correlation.secondary)
            .or_insert_with(|| correlation.secondary.default_value());

        let mut updated = match correlation.kind {
            CorrelationKind::Positive => current * (1.0 + (fraction - 0.5) * 0.2 * strength),
            CorrelationKind::Negative => current * (1.0 - (fraction - 0.5) * 0.2 * strength),
            CorrelationKind::Threshold { threshold, step } => {
                if norm >= threshold {
                    current * (1.0 + step * strength)
                } else {
                    current
                }
            }
            CorrelationKind::Exponential => {
                // Utilization driving errors amplifies quadratically.
                if correlation.primary == Metric::InterfaceUtilization
                    && correlation.secondary == Metric::ErrorRate
                {
                    current * (1.0 + fraction * fraction * 5.0 * strength)
                } else {
                    current * (1.0 + fraction * fraction * strength)
                }
            }
            CorrelationKind::Logarithmic => {
                let scaled = norm.max(1.0).ln() / 100f64.ln();
                current * (1.0 + strength * scaled)
            }
        };

        if correlation.secondary.is_utilization_family() {
            updated *= clock::daily_utilization(&now);
        }

        updated *= 1.0 + rng.gen_range(-0.02..0.02);

        let (lo, hi) = correlation.secondary.bounds();
        metrics.insert(correlation.secondary, updated.clamp(lo, hi));
    }
}

/// Stock correlation lists per device family.
pub fn defaults_for(device_type: DeviceType) -> &'static [Correlation] {
    use CorrelationKind::*;
    use Metric::*;

    const CABLE_MODEM: [Correlation; 3] = [
        Correlation::new(SignalQuality, Throughput, Positive, 0.8),
        Correlation::new(InterfaceUtilization, ErrorRate, Exponential, 0.6),
        Correlation::new(Temperature, SignalQuality, Negative, 0.4),
    ];
    const MTA: [Correlation; 2] = [
        Correlation::new(SignalQuality, Throughput, Positive, 0.6),
        Correlation::new(InterfaceUtilization, ErrorRate, Exponential, 0.4),
    ];
    const SWITCH: [Correlation; 3] = [
        Correlation::new(InterfaceUtilization, CpuUsage, Positive, 0.7),
        Correlation::new(
            InterfaceUtilization,
            ErrorRate,
            Threshold {
                threshold: 85.0,
                step: 0.5,
            },
            0.8,
        ),
        Correlation::new(CpuUsage, Temperature, Positive, 0.5),
    ];
    const ROUTER: [Correlation; 3] = [
        Correlation::new(InterfaceUtilization, CpuUsage, Positive, 0.8),
        Correlation::new(CpuUsage, Temperature, Positive, 0.6),
        Correlation::new(InterfaceUtilization, ErrorRate, Exponential, 0.5),
    ];
    const CMTS: [Correlation; 4] = [
        Correlation::new(InterfaceUtilization, CpuUsage, Positive, 0.9),
        Correlation::new(InterfaceUtilization, ErrorRate, Exponential, 0.7),
        Correlation::new(Temperature, SignalQuality, Negative, 0.5),
        Correlation::new(CpuUsage, PowerConsumption, Positive, 0.6),
    ];
    const SERVER: [Correlation; 3] = [
        Correlation::new(CpuUsage, Temperature, Positive, 0.8),
        Correlation::new(CpuUsage, PowerConsumption, Positive, 0.7),
        Correlation::new(InterfaceUtilization, Throughput, Positive, 0.9),
    ];
    const GENERIC: [Correlation; 1] = [Correlation::new(
        InterfaceUtilization,
        ErrorRate,
        Exponential,
        0.3,
    )];

    match device_type {
        DeviceType::CableModem => &CABLE_MODEM,
        DeviceType::Mta => &MTA,
        DeviceType::Switch => &SWITCH,
        DeviceType::Router => &ROUTER,
        DeviceType::Cmts => &CMTS,
        DeviceType::Server => &SERVER,
        DeviceType::Generic => &GENERIC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 11)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_identity_when_primary_unmentioned() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut metrics: HashMap<Metric, f64> =
            [(Metric::ErrorRate, 0.01), (Metric::CpuUsage, 33.0)].into();
        let before = metrics.clone();

        let correlations = [Correlation::new(
            Metric::CpuUsage,
            Metric::Temperature,
            CorrelationKind::Positive,
            0.5,
        )];
        apply(
            Metric::SignalQuality,
            25.0,
            &mut metrics,
            &correlations,
            noon(),
            &mut rng,
        );
        assert_eq!(metrics, before);
    }

    #[test]
    fn test_exponential_utilization_to_errors() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut metrics: HashMap<Metric, f64> = [(Metric::ErrorRate, 0.01)].into();
        let correlations = [Correlation::new(
            Metric::InterfaceUtilization,
            Metric::ErrorRate,
            CorrelationKind::Exponential,
            1.0,
        )];

        apply(
            Metric::InterfaceUtilization,
            90.0,
            &mut metrics,
            &correlations,
            noon(),
            &mut rng,
        );
        let error_rate = metrics[&Metric::ErrorRate];
        // 0.01 * (1 + 0.81 * 5) ~ 0.0505, within the 2% noise band.
        assert!(error_rate > 0.045 && error_rate < 0.056, "{error_rate}");
    }

    #[test]
    fn test_negative_correlation_direction() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut metrics: HashMap<Metric, f64> = [(Metric::SignalQuality, 80.0)].into();
        let correlations = [Correlation::new(
            Metric::Temperature,
            Metric::SignalQuality,
            CorrelationKind::Negative,
            1.0,
        )];

        // Hot device: normalized temperature well above 0.5.
        apply(
            Metric::Temperature,
            90.0,
            &mut metrics,
            &correlations,
            noon(),
            &mut rng,
        );
        assert!(metrics[&Metric::SignalQuality] < 80.0);
    }

    #[test]
    fn test_threshold_step() {
        let mut rng = StdRng::seed_from_u64(4);
        let correlations = [Correlation::new(
            Metric::InterfaceUtilization,
            Metric::ErrorRate,
            CorrelationKind::Threshold {
                threshold: 85.0,
                step: 0.5,
            },
            1.0,
        )];

        let mut below: HashMap<Metric, f64> = [(Metric::ErrorRate, 0.02)].into();
        apply(
            Metric::InterfaceUtilization,
            50.0,
            &mut below,
            &correlations,
            noon(),
            &mut rng,
        );
        assert!((below[&Metric::ErrorRate] - 0.02).abs() < 0.001);

        let mut above: HashMap<Metric, f64> = [(Metric::ErrorRate, 0.02)].into();
        apply(
            Metric::InterfaceUtilization,
            95.0,
            &mut above,
            &correlations,
            noon(),
            &mut rng,
        );
        assert!(above[&Metric::ErrorRate] > 0.028);
    }

    #[test]
    fn test_bounds_clamped() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut metrics: HashMap<Metric, f64> = [(Metric::ErrorRate, 0.9)].into();
        let correlations = [Correlation::new(
            Metric::InterfaceUtilization,
            Metric::ErrorRate,
            CorrelationKind::Exponential,
            1.0,
        )];
        for _ in 0..10 {
            apply(
                Metric::InterfaceUtilization,
                100.0,
                &mut metrics,
                &correlations,
                noon(),
                &mut rng,
            );
        }
        assert!(metrics[&Metric::ErrorRate] <= 1.0);
    }

    #[test]
    fn test_every_family_has_defaults() {
        for device_type in [
            DeviceType::CableModem,
            DeviceType::Mta,
            DeviceType::Switch,
            DeviceType::Router,
            DeviceType::Cmts,
            DeviceType::Server,
            DeviceType::Generic,
        ] {
            assert!(!defaults_for(device_type).is_empty());
        }
    }
}
