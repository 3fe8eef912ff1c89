//! CO2 and illuminance mapping for the LED bar
//!
//! The bar has `PIXEL_COUNT * 255` discrete positions. CO2 between
//! [`CO2_MIN_PPM`] and [`CO2_MAX_PPM`] is spread linearly across them; anything
//! at or above the maximum is reported as out of range so the renderer can
//! switch to the warning flash.

use crate::config::{
    CO2_MAX_PPM, CO2_MIN_PPM, HUE_GREEN, HUE_RED, LUX_BRIGHT, LUX_DARK, MAX_BRIGHTNESS,
    MAX_POSITION, MIN_BRIGHTNESS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalePosition {
    InRange(u16),
    OutOfRange,
}

impl ScalePosition {
    pub fn is_out_of_range(self) -> bool {
        matches!(self, Self::OutOfRange)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleHue {
    InRange(u8),
    OutOfRange,
}

/// Fraction of the CO2 scale covered by `co2`, or `None` when out of range.
fn scale_fraction(co2: f32) -> Option<f32> {
    if co2 >= CO2_MAX_PPM {
        return None;
    }
    if co2 <= CO2_MIN_PPM || co2.is_nan() {
        return Some(0.0);
    }
    Some((co2 - CO2_MIN_PPM) / (CO2_MAX_PPM - CO2_MIN_PPM))
}

pub fn map_co2_to_position(co2: f32) -> ScalePosition {
    match scale_fraction(co2) {
        Some(fraction) => {
            let position = libm::floorf(fraction * MAX_POSITION as f32) as u16;
            ScalePosition::InRange(position.min(MAX_POSITION))
        }
        None => ScalePosition::OutOfRange,
    }
}

pub fn map_co2_to_hue(co2: f32) -> ScaleHue {
    match scale_fraction(co2) {
        Some(fraction) => ScaleHue::InRange(lerp_hue(fraction)),
        None => ScaleHue::OutOfRange,
    }
}

/// Hue of a point along the bar, `position` in `0..=MAX_POSITION`.
pub fn position_to_hue(position: u16) -> u8 {
    lerp_hue(position.min(MAX_POSITION) as f32 / MAX_POSITION as f32)
}

fn lerp_hue(fraction: f32) -> u8 {
    let span = HUE_GREEN as f32 - HUE_RED as f32;
    libm::roundf(HUE_GREEN as f32 - fraction.clamp(0.0, 1.0) * span) as u8
}

/// Target brightness for an ambient illuminance reading.
pub fn map_lux_to_brightness(lux: f32) -> u8 {
    if lux.is_nan() || lux <= LUX_DARK {
        return MIN_BRIGHTNESS;
    }
    if lux >= LUX_BRIGHT {
        return MAX_BRIGHTNESS;
    }
    let fraction = (lux - LUX_DARK) / (LUX_BRIGHT - LUX_DARK);
    let span = (MAX_BRIGHTNESS - MIN_BRIGHTNESS) as f32;
    libm::roundf(MIN_BRIGHTNESS as f32 + fraction * span) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_is_zero_at_and_below_min() {
        assert_eq!(map_co2_to_position(300.0), ScalePosition::InRange(0));
        assert_eq!(map_co2_to_position(CO2_MIN_PPM), ScalePosition::InRange(0));
    }

    #[test]
    fn test_position_is_out_of_range_at_max() {
        assert_eq!(map_co2_to_position(CO2_MAX_PPM), ScalePosition::OutOfRange);
        assert_eq!(map_co2_to_position(2500.0), ScalePosition::OutOfRange);
        assert!(map_co2_to_position(2100.0).is_out_of_range());
    }

    #[test]
    fn test_position_midpoint() {
        let mid = (CO2_MIN_PPM + CO2_MAX_PPM) / 2.0;
        let ScalePosition::InRange(position) = map_co2_to_position(mid) else {
            panic!("midpoint should be in range");
        };
        let half = MAX_POSITION / 2;
        assert!(position.abs_diff(half) <= 1, "{position} vs {half}");
    }

    #[test]
    fn test_position_is_monotonic() {
        let mut last = 0u16;
        let mut co2 = 400.0f32;
        while co2 < CO2_MAX_PPM {
            if let ScalePosition::InRange(position) = map_co2_to_position(co2) {
                assert!(position >= last, "{co2} ppm went backwards");
                assert!(position <= MAX_POSITION);
                last = position;
            }
            co2 += 7.5;
        }
    }

    #[test]
    fn test_hue_runs_green_to_red() {
        assert_eq!(map_co2_to_hue(CO2_MIN_PPM), ScaleHue::InRange(HUE_GREEN));
        assert_eq!(map_co2_to_hue(CO2_MAX_PPM), ScaleHue::OutOfRange);
        let ScaleHue::InRange(high) = map_co2_to_hue(1990.0) else {
            panic!("just below max should be in range");
        };
        assert!(high <= 1);
        assert_eq!(position_to_hue(0), HUE_GREEN);
        assert_eq!(position_to_hue(MAX_POSITION), HUE_RED);
    }

    #[test]
    fn test_lux_to_brightness_clamps() {
        assert_eq!(map_lux_to_brightness(0.0), MIN_BRIGHTNESS);
        assert_eq!(map_lux_to_brightness(LUX_DARK), MIN_BRIGHTNESS);
        assert_eq!(map_lux_to_brightness(10_000.0), MAX_BRIGHTNESS);
        let mid = map_lux_to_brightness(250.0);
        assert!(mid > MIN_BRIGHTNESS && mid < MAX_BRIGHTNESS);
    }
}
