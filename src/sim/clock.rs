//! Daily, weekly, seasonal and weather factors
//!
//! `daily_utilization` and `weekly_pattern` are pure functions of the
//! timestamp so that runs are reproducible; only `weather_variation` draws
//! randomness, and then only from the caller's seeded generator.

use chrono::{Datelike, Timelike, Weekday};
use rand::Rng;

use std::f64::consts::PI;

/// Fractional hour of day in `[0, 24)`.
fn hour_fraction<T: Timelike>(t: &T) -> f64 {
    t.hour() as f64 + t.minute() as f64 / 60.0 + t.second() as f64 / 3600.0
}

fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Time-of-day traffic factor in roughly `[0.2, 1.8]`.
///
/// Night trough, morning ramp, business plateau with a lunch dip, an
/// early-evening transition into the residential peak, then decline. The
/// evening "burst" ripple is a deterministic function of the minute so the
/// curve stays reproducible.
pub fn daily_utilization<T: Timelike>(t: &T) -> f64 {
    let h = hour_fraction(t);

    let value = if h < 5.0 {
        0.22 + 0.04 * (PI * h / 5.0).sin()
    } else if h < 9.0 {
        let low = 0.24;
        let business = 1.2;
        low + (business - low) * smoothstep(5.0, 9.0, h)
    } else if h < 17.0 {
        let lunch_dip = 0.25 * (-((h - 12.5) * (h - 12.5)) / 0.8).exp();
        1.2 - lunch_dip + 0.03 * (2.0 * PI * h / 4.0).sin()
    } else if h < 18.0 {
        1.2 + 0.3 * smoothstep(17.0, 18.0, h)
    } else if h < 21.0 {
        let ripple = 0.02 * (2.0 * PI * (h * 60.0) / 10.0).sin();
        1.5 + 0.28 * (PI * (h - 18.0) / 3.0).sin() + ripple
    } else {
        1.5 - (1.5 - 0.22) * smoothstep(21.0, 24.0, h)
    };

    value.clamp(0.2, 1.8)
}

/// Day-of-week traffic factor. Weekdays are fixed constants; weekend
/// factors sweep a band over the day.
pub fn weekly_pattern<T: Datelike + Timelike>(t: &T) -> f64 {
    let h = hour_fraction(t);
    match t.weekday() {
        Weekday::Mon => 0.95,
        Weekday::Tue => 1.05,
        Weekday::Wed => 1.05,
        Weekday::Thu => 1.00,
        Weekday::Fri => 0.90,
        Weekday::Sat => 0.65 + 0.15 * (PI * (h - 12.0) / 12.0).sin(),
        Weekday::Sun => 0.45 + 0.15 * (PI * (h - 12.0) / 12.0).sin(),
    }
}

/// Seasonal temperature swing, degrees Celsius. Peaks around July 1.
pub fn seasonal_temperature_offset<T: Datelike>(t: &T) -> f64 {
    let day = t.ordinal() as f64;
    15.0 * (2.0 * PI * (day - 182.0) / 365.25).cos()
}

/// Intra-day temperature swing, degrees Celsius: minimum at 06:00,
/// maximum at 15:00.
pub fn daily_temperature_offset<T: Timelike>(t: &T) -> f64 {
    let h = hour_fraction(t);
    if (6.0..=15.0).contains(&h) {
        -5.0 * (PI * (h - 6.0) / 9.0).cos()
    } else {
        let h = if h < 6.0 { h + 24.0 } else { h };
        5.0 * (PI * (h - 15.0) / 15.0).cos()
    }
}

/// Stochastic weather factor in `[0.70, 1.05]`. Degradation is more likely
/// in winter and in the mid-afternoon convective window.
pub fn weather_variation<T: Datelike + Timelike, R: Rng + ?Sized>(t: &T, rng: &mut R) -> f64 {
    let winter = (-seasonal_temperature_offset(t) / 15.0).max(0.0);
    let h = hour_fraction(t);
    let afternoon = (-((h - 15.0) * (h - 15.0)) / 18.0).exp();
    let degraded_probability = 0.08 + 0.06 * winter + 0.04 * afternoon;

    let factor: f64 = if rng.gen_bool(degraded_probability.clamp(0.0, 1.0)) {
        rng.gen_range(0.70..0.95)
    } else {
        rng.gen_range(0.95..1.05)
    };
    factor.clamp(0.70, 1.05)
}
