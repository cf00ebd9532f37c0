//! Value synthesis engine
//!
//! `simulate` turns a profile entry plus the device's mutable state into
//! the value a poller sees right now. Counters accumulate monotonically
//! from smoothed rates and wrap with 32/64-bit semantics; gauges follow the
//! clock patterns, the device's logical metrics and the configured jitter.

use std::f64::consts::PI;

use chrono::{NaiveDateTime, Timelike};
use rand::Rng;

use crate::config::{DeviceType, JitterConfig, JitterSpec};
use crate::device::state::{CounterProgress, DeviceState};
use crate::profile::{Behavior, ProfileEntry, VarianceMode};
use crate::snmp::{Oid, SnmpValue, ValueType};

use super::clock;
use super::correlation::{self, Metric};

const COUNTER32_MODULUS: f64 = 4_294_967_296.0;
/// Assumed mean frame size when deriving packet rates from octet rates.
const MEAN_PACKET_BYTES: f64 = 512.0;

/// Per-request simulation context supplied by the device actor.
pub struct SimContext<'a> {
    pub now: NaiveDateTime,
    pub jitter: &'a JitterConfig,
}

/// Compute the current value for one profile entry.
pub fn simulate(
    entry: &ProfileEntry,
    oid: &Oid,
    state: &mut DeviceState,
    ctx: &SimContext<'_>,
) -> SnmpValue {
    match &entry.behavior {
        Behavior::TrafficCounter {
            rate_min,
            rate_max,
            variance,
        } => {
            let rate = traffic_rate(state, ctx, *rate_min, *rate_max, *variance);
            counter_value(entry, oid, state, rate)
        }
        Behavior::PacketCounter {
            octets_oid,
            rate_min,
            rate_max,
        } => {
            let rate = packet_rate(state, ctx, octets_oid.as_ref(), *rate_min, *rate_max);
            counter_value(entry, oid, state, rate)
        }
        Behavior::ErrorCounter {
            base_rate,
            burst_probability,
        } => {
            let rate = error_rate(state, *base_rate, *burst_probability);
            counter_value(entry, oid, state, rate)
        }
        Behavior::UtilizationGauge { bias } => {
            let value = utilization_gauge(entry, oid, state, ctx, *bias);
            format_gauge(entry.value_type, value)
        }
        Behavior::CpuGauge { spike_probability } => {
            let value = cpu_gauge(entry, oid, state, ctx, *spike_probability);
            format_gauge(entry.value_type, value)
        }
        Behavior::PowerGauge { min, max } => {
            let value = power_gauge(entry, oid, state, ctx, *min, *max);
            format_gauge(entry.value_type, value)
        }
        Behavior::SnrGauge { min, max } => {
            let value = snr_gauge(entry, oid, state, ctx, *min, *max);
            format_gauge(entry.value_type, value)
        }
        Behavior::SignalGauge { min, max } => {
            let value = signal_gauge(entry, oid, state, ctx, *min, *max);
            format_gauge(entry.value_type, value)
        }
        Behavior::TemperatureGauge { base } => {
            let value = temperature_gauge(oid, state, ctx, *base);
            format_gauge(entry.value_type, value)
        }
        Behavior::UptimeCounter => SnmpValue::TimeTicks(state.uptime_ticks()),
        Behavior::StatusEnum { up, degraded, down } => {
            SnmpValue::Integer(status_value(state, *up, *degraded, *down))
        }
        Behavior::StaticValue => static_value(entry, oid, state),
    }
}

/// Box-Muller standard normal draw.
fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Stable per-device multiplier derived from the MAC address.
fn device_factor(state: &DeviceState) -> f64 {
    0.8 + state.mac_address[5] as f64 / 255.0 * 0.4
}

fn family_pattern(device_type: DeviceType) -> f64 {
    match device_type {
        DeviceType::CableModem => 1.0,
        DeviceType::Mta => 0.3,
        DeviceType::Switch => 2.0,
        DeviceType::Router => 3.0,
        DeviceType::Cmts => 5.0,
        DeviceType::Server => 1.5,
        DeviceType::Generic => 1.0,
    }
}

fn traffic_rate(
    state: &mut DeviceState,
    ctx: &SimContext<'_>,
    rate_min: f64,
    rate_max: f64,
    variance: VarianceMode,
) -> f64 {
    let utilization = state.metric(Metric::InterfaceUtilization) / 100.0;
    let base = rate_min + (rate_max - rate_min) * utilization.clamp(0.0, 1.0);

    let variance_factor = match variance {
        VarianceMode::Uniform => state.rng.gen_range(0.9..1.1),
        VarianceMode::Gaussian => (1.0 + 0.1 * gaussian(&mut state.rng)).max(0.1),
        VarianceMode::Burst {
            probability,
            magnitude,
        } => {
            if state.rng.gen_bool(probability.clamp(0.0, 1.0)) {
                magnitude.max(1.0)
            } else {
                1.0
            }
        }
        VarianceMode::TimeCorrelated => {
            let daily = clock::daily_utilization(&ctx.now);
            (1.0 + 0.15 * (daily - 1.0)) * state.rng.gen_range(0.97..1.03)
        }
        VarianceMode::DeviceSpecific => device_factor(state),
    };

    base * clock::daily_utilization(&ctx.now)
        * clock::weekly_pattern(&ctx.now)
        * family_pattern(state.device_type)
        * variance_factor
}

fn packet_rate(
    state: &mut DeviceState,
    ctx: &SimContext<'_>,
    octets_oid: Option<&Oid>,
    rate_min: f64,
    rate_max: f64,
) -> f64 {
    let correlated = octets_oid
        .and_then(|oid| state.previous_rate.get(oid))
        .map(|octets_rate| octets_rate / MEAN_PACKET_BYTES);

    let rate = match correlated {
        Some(rate) => rate.clamp(rate_min, rate_max),
        None => {
            let utilization = state.metric(Metric::InterfaceUtilization) / 100.0;
            (rate_min + (rate_max - rate_min) * utilization) * clock::daily_utilization(&ctx.now)
        }
    };

    // Packet burst variance.
    rate * state.rng.gen_range(0.92..1.08)
}

fn error_rate(state: &mut DeviceState, base_rate: f64, burst_probability: f64) -> f64 {
    let utilization = state.metric(Metric::InterfaceUtilization) / 100.0;
    let quality = state.metric(Metric::SignalQuality) / 100.0;
    let mut per_hour = base_rate * (1.0 + 4.0 * utilization) * (1.0 + 2.0 * (1.0 - quality));
    if state.rng.gen_bool(burst_probability.clamp(0.0, 1.0)) {
        per_hour *= 10.0;
    }
    per_hour / 3600.0
}

/// Advance the monotone accumulator for a counter OID and format the
/// wrapped value. Operator-forced counter values act as the base.
fn counter_value(
    entry: &ProfileEntry,
    oid: &Oid,
    state: &mut DeviceState,
    rate: f64,
) -> SnmpValue {
    let rate = rate.max(0.0);
    let smoothed = match state.previous_rate.get(oid) {
        Some(previous) => previous * 0.7 + rate * 0.3,
        None => rate,
    };
    state.previous_rate.insert(oid.clone(), smoothed);

    let uptime = state.uptime().as_secs_f64();
    let progress = state
        .counter_progress
        .entry(oid.clone())
        .or_insert_with(CounterProgress::default);
    let elapsed = (uptime - progress.last_uptime_secs).max(0.0);
    progress.accumulated += smoothed * elapsed;
    progress.last_uptime_secs = uptime;

    let base = state
        .counters
        .get(oid)
        .copied()
        .or_else(|| entry.base_value.as_number().map(|v| v.max(0.0) as u64))
        .unwrap_or(0);

    let accumulated = progress.accumulated;
    let wraps_before = progress.wraps;

    match entry.value_type {
        ValueType::Counter64 => {
            let total = (base as u128 + accumulated as u128) % (u64::MAX as u128 + 1);
            progress.wraps = ((base as f64 + accumulated) / (u64::MAX as f64 + 1.0)) as u64;
            let mut value = total as u64;
            if progress.wraps > wraps_before && wrap_quirks(state.device_type) {
                value = value.wrapping_add(state.rng.gen_range(0..=5));
            }
            SnmpValue::Counter64(value)
        }
        _ => {
            let total = base as f64 + accumulated;
            let new_wraps = (total / COUNTER32_MODULUS) as u64;
            let mut value = (total % COUNTER32_MODULUS) as u64 as u32;
            progress.wraps = new_wraps;
            if new_wraps > wraps_before && wrap_quirks(state.device_type) {
                value = ((value as u64 + state.rng.gen_range(0..=50)) % (1 << 32)) as u32;
            }
            SnmpValue::Counter32(value)
        }
    }
}

/// Post-wrap jitter quirks are a property of the heavier iron.
fn wrap_quirks(device_type: DeviceType) -> bool {
    matches!(device_type, DeviceType::Switch | DeviceType::Router | DeviceType::Cmts)
}

fn utilization_gauge(
    entry: &ProfileEntry,
    oid: &Oid,
    state: &mut DeviceState,
    ctx: &SimContext<'_>,
    bias: f64,
) -> f64 {
    let base = gauge_base(entry, oid, state, 25.0);
    let target =
        base * clock::daily_utilization(&ctx.now) * clock::weekly_pattern(&ctx.now) * bias;

    let smoothed = match state.previous_rate.get(oid) {
        Some(previous) => previous * 0.6 + target * 0.4,
        None => target,
    };
    state.previous_rate.insert(oid.clone(), smoothed);

    let value = apply_jitter(smoothed.clamp(0.0, 100.0), "utilization", state, ctx)
        .clamp(0.0, 100.0);
    update_metric(state, ctx, Metric::InterfaceUtilization, value);
    value
}

fn cpu_gauge(
    entry: &ProfileEntry,
    oid: &Oid,
    state: &mut DeviceState,
    ctx: &SimContext<'_>,
    spike_probability: f64,
) -> f64 {
    let base = gauge_base(entry, oid, state, 20.0);
    let network = state.metric(Metric::InterfaceUtilization);
    let daily = clock::daily_utilization(&ctx.now);

    let mut value = 0.4 * base + 0.4 * network + 0.2 * (daily / 1.8 * 100.0);
    if state.rng.gen_bool(spike_probability.clamp(0.0, 1.0)) {
        value *= 2.0;
    }
    let value = apply_jitter(value, "cpu", state, ctx).clamp(0.0, 100.0);
    update_metric(state, ctx, Metric::CpuUsage, value);
    value
}

fn power_gauge(
    entry: &ProfileEntry,
    oid: &Oid,
    state: &mut DeviceState,
    ctx: &SimContext<'_>,
    min: f64,
    max: f64,
) -> f64 {
    let base = gauge_base(entry, oid, state, (min + max) / 2.0);
    let (scaled_base, scale) = descale(base, max);

    let temperature = state.metric(Metric::Temperature);
    let quality = state.metric(Metric::SignalQuality) / 100.0;
    let temperature_factor = 1.0 + (temperature - 35.0) / 200.0;
    let quality_factor = 0.9 + 0.1 * quality;
    let weather = clock::weather_variation(&ctx.now, &mut state.rng);

    let value = (scaled_base * temperature_factor * quality_factor * weather).clamp(min, max);
    apply_jitter(value, "power", state, ctx).clamp(min, max) * scale
}

fn snr_gauge(
    entry: &ProfileEntry,
    oid: &Oid,
    state: &mut DeviceState,
    ctx: &SimContext<'_>,
    min: f64,
    max: f64,
) -> f64 {
    let base = gauge_base(entry, oid, state, 32.0);
    let (scaled_base, scale) = descale(base, max);

    let utilization = state.metric(Metric::InterfaceUtilization) / 100.0;
    let environment = clock::weather_variation(&ctx.now, &mut state.rng);
    let noise = state.rng.gen_range(0.98..1.02);

    let value = (scaled_base * (1.0 - 0.2 * utilization) * environment * noise).clamp(min, max);
    let value = apply_jitter(value, "snr", state, ctx).clamp(min, max);
    update_metric(state, ctx, Metric::SignalQuality, value / max * 100.0);
    value * scale
}

fn signal_gauge(
    entry: &ProfileEntry,
    oid: &Oid,
    state: &mut DeviceState,
    ctx: &SimContext<'_>,
    min: f64,
    max: f64,
) -> f64 {
    let base = gauge_base(entry, oid, state, (min + max) / 2.0);
    let (scaled_base, scale) = descale(base, max);
    let weather = clock::weather_variation(&ctx.now, &mut state.rng);
    let distance = 0.85 + device_factor(state) / 1.2 * 0.15;

    let value = (scaled_base * weather * distance).clamp(min, max);
    apply_jitter(value, "signal", state, ctx).clamp(min, max) * scale
}

fn temperature_gauge(
    oid: &Oid,
    state: &mut DeviceState,
    ctx: &SimContext<'_>,
    base: f64,
) -> f64 {
    let base = state.gauges.get(oid).copied().unwrap_or(base);
    let cpu = state.metric(Metric::CpuUsage) / 100.0;
    let value = (base
        + clock::daily_temperature_offset(&ctx.now)
        + clock::seasonal_temperature_offset(&ctx.now))
        * (1.0 + 0.1 * cpu);
    let value = apply_jitter(value, "temperature", state, ctx).clamp(-10.0, 85.0);
    update_metric(state, ctx, Metric::Temperature, value);
    value
}

fn status_value(state: &mut DeviceState, up: i64, degraded: i64, down: i64) -> i64 {
    if state.status_vars.get("oper_status").copied() == Some(2) {
        return down;
    }
    let error_rate = state.metric(Metric::ErrorRate);
    let quality = state.metric(Metric::SignalQuality);
    if error_rate > 0.2 || quality < 20.0 {
        down
    } else if error_rate > 0.05 || quality < 40.0 {
        degraded
    } else {
        up
    }
}

fn static_value(entry: &ProfileEntry, oid: &Oid, state: &DeviceState) -> SnmpValue {
    if let Some(forced) = state.counters.get(oid) {
        return format_number(entry.value_type, *forced as f64);
    }
    if let Some(forced) = state.gauges.get(oid) {
        return format_number(entry.value_type, *forced);
    }
    entry.base_value.clone()
}

/// Numeric baseline for a gauge: operator override, then profile value,
/// then the behavior default.
fn gauge_base(entry: &ProfileEntry, oid: &Oid, state: &DeviceState, fallback: f64) -> f64 {
    state
        .gauges
        .get(oid)
        .copied()
        .or_else(|| entry.base_value.as_number())
        .filter(|v| *v != 0.0)
        .unwrap_or(fallback)
}

/// DOCSIS walks carry dB quantities in tenths. Detect the scale from the
/// baseline so clamps operate in natural units.
fn descale(base: f64, natural_max: f64) -> (f64, f64) {
    if base.abs() > natural_max * 2.0 {
        (base / 10.0, 10.0)
    } else {
        (base, 1.0)
    }
}

fn update_metric(state: &mut DeviceState, ctx: &SimContext<'_>, metric: Metric, value: f64) {
    state.metrics.insert(metric, value);
    correlation::apply(
        metric,
        value,
        &mut state.metrics,
        state.correlations,
        ctx.now,
        &mut state.rng,
    );
}

fn apply_jitter(value: f64, metric: &str, state: &mut DeviceState, ctx: &SimContext<'_>) -> f64 {
    match *ctx.jitter.spec_for(metric, state.device_type) {
        JitterSpec::None => value,
        JitterSpec::Uniform { amplitude } => {
            let amplitude = amplitude.abs();
            value * (1.0 + state.rng.gen_range(-amplitude..=amplitude))
        }
        JitterSpec::Gaussian { sigma } => value * (1.0 + sigma * gaussian(&mut state.rng)),
        JitterSpec::Periodic {
            amplitude,
            period_secs,
        } => {
            let seconds = ctx.now.num_seconds_from_midnight() as f64;
            value * (1.0 + amplitude * (2.0 * PI * seconds / period_secs.max(1.0)).sin())
        }
        JitterSpec::Burst {
            probability,
            magnitude,
        } => {
            if state.rng.gen_bool(probability.clamp(0.0, 1.0)) {
                value * (1.0 + magnitude)
            } else {
                value
            }
        }
        JitterSpec::Correlated { factor } => {
            value * (1.0 + factor * (clock::daily_utilization(&ctx.now) - 1.0))
        }
    }
}

fn format_gauge(value_type: ValueType, value: f64) -> SnmpValue {
    format_number(value_type, value)
}

fn format_number(value_type: ValueType, value: f64) -> SnmpValue {
    match value_type {
        ValueType::Integer => SnmpValue::Integer(value.round() as i64),
        ValueType::Gauge32 => SnmpValue::Gauge32(value.max(0.0).round() as u32),
        ValueType::Counter32 => SnmpValue::Counter32((value.max(0.0) % COUNTER32_MODULUS) as u32),
        ValueType::Counter64 => SnmpValue::Counter64(value.max(0.0) as u64),
        ValueType::TimeTicks => SnmpValue::TimeTicks(value.max(0.0) as u32),
        _ => SnmpValue::Integer(value.round() as i64),
    }
}
