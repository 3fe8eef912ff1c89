//! Physical plausibility envelope for raw sensor readings
//!
//! Bus corruption and sensor glitches show up as zero or wildly out-of-range
//! values. Such readings must never reach the trend filter.

use core::fmt;
use core::ops::RangeInclusive;

use super::Co2Readings;

pub const CO2_PLAUSIBLE_PPM: RangeInclusive<f32> = 280.0..=40_000.0;
pub const TEMPERATURE_PLAUSIBLE_C: RangeInclusive<f32> = -10.0..=100.0;
pub const HUMIDITY_PLAUSIBLE_PCT: RangeInclusive<f32> = 0.0..=100.0;

/// Which part of a reading fell outside the envelope
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Implausible {
    Co2(f32),
    Temperature(f32),
    Humidity(f32),
}

impl fmt::Display for Implausible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Co2(v) => write!(f, "implausible CO2 {} ppm", v),
            Self::Temperature(v) => write!(f, "implausible temperature {} °C", v),
            Self::Humidity(v) => write!(f, "implausible humidity {} %RH", v),
        }
    }
}

/// Check a reading against the plausibility envelope.
///
/// A CO2 value of exactly 0 ppm is the SCD4x's "invalid sample" marker and is
/// rejected along with NaN and anything outside the ranges above.
pub fn check_plausible(readings: &Co2Readings) -> Result<(), Implausible> {
    let co2 = readings.co2_ppm;
    if co2 == 0.0 || !CO2_PLAUSIBLE_PPM.contains(&co2) {
        return Err(Implausible::Co2(co2));
    }
    if !TEMPERATURE_PLAUSIBLE_C.contains(&readings.temperature_c) {
        return Err(Implausible::Temperature(readings.temperature_c));
    }
    if !HUMIDITY_PLAUSIBLE_PCT.contains(&readings.humidity_pct) {
        return Err(Implausible::Humidity(readings.humidity_pct));
    }
    Ok(())
}
