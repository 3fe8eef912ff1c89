//! Frame generation for the LED bar
//!
//! All functions here are pure: they turn a bar position or an animation phase
//! into an array of colours. Gamma and brightness are applied last by
//! [`finish`].

use smart_leds::hsv::{Hsv, hsv2rgb};
use smart_leds::{RGB8, brightness, gamma};

use crate::config::{FLASH_PERIOD_MS, POSITION_PER_PIXEL, PULSE_DURATION_MS, SELF_TEST_STEP_MS};
use crate::scale::position_to_hue;

use super::{BarStyle, PulseKind};

pub const BLACK: RGB8 = RGB8::new(0, 0, 0);
pub const WARNING_RED: RGB8 = RGB8::new(255, 0, 0);
pub const ERROR_ORANGE: RGB8 = RGB8::new(255, 80, 0);

const SELF_TEST_COLORS: [RGB8; 3] = [
    RGB8::new(255, 0, 0),
    RGB8::new(0, 255, 0),
    RGB8::new(0, 0, 255),
];

impl PulseKind {
    pub fn color(self) -> RGB8 {
        match self {
            Self::ClientConnected => RGB8::new(128, 0, 255),
            Self::TimeSynced => RGB8::new(0, 255, 0),
        }
    }
}

fn hue_color(hue: u8) -> RGB8 {
    hsv2rgb(Hsv {
        hue,
        sat: 255,
        val: 255,
    })
}

/// Scale `color` by `level / 255`.
pub fn blend(color: RGB8, level: u8) -> RGB8 {
    let scale = |c: u8| ((c as u16 * level as u16) / 255) as u8;
    RGB8::new(scale(color.r), scale(color.g), scale(color.b))
}

/// Draw the CO2 bar for `position` (`0..=N * 255`).
///
/// `Bar` fills `position / 255` pixels with the green to red gradient and
/// fades in the next pixel by `position % 255`. `Hue` paints the whole strip
/// with the colour of the current position.
pub fn render_scale<const N: usize>(position: u16, style: BarStyle) -> [RGB8; N] {
    match style {
        BarStyle::Hue => [hue_color(position_to_hue(position)); N],
        BarStyle::Bar => {
            let full = (position / POSITION_PER_PIXEL) as usize;
            let partial = (position % POSITION_PER_PIXEL) as u8;
            let mut frame = [BLACK; N];
            for (index, pixel) in frame.iter_mut().enumerate() {
                let color = hue_color(position_to_hue(index as u16 * POSITION_PER_PIXEL));
                *pixel = if index < full {
                    color
                } else if index == full {
                    blend(color, partial)
                } else {
                    BLACK
                };
            }
            frame
        }
    }
}

/// Red/black warning flash, one full cycle per `FLASH_PERIOD_MS`.
pub fn render_flash<const N: usize>(now_ms: u64) -> [RGB8; N] {
    if (now_ms / (FLASH_PERIOD_MS / 2)) % 2 == 0 {
        [WARNING_RED; N]
    } else {
        [BLACK; N]
    }
}

/// Triangle fade in and out over `PULSE_DURATION_MS`.
pub fn render_pulse<const N: usize>(kind: PulseKind, elapsed_ms: u64) -> [RGB8; N] {
    let half = PULSE_DURATION_MS / 2;
    let elapsed = elapsed_ms.min(PULSE_DURATION_MS);
    let ramp = if elapsed < half {
        elapsed
    } else {
        PULSE_DURATION_MS - elapsed
    };
    let level = ((ramp * 255) / half).min(255) as u8;
    [blend(kind.color(), level); N]
}

/// Single lit pixel running along the strip, cycling red, green, blue.
pub fn render_self_test<const N: usize>(elapsed_ms: u64) -> [RGB8; N] {
    let mut frame = [BLACK; N];
    if N == 0 {
        return frame;
    }
    let step = (elapsed_ms / SELF_TEST_STEP_MS) as usize;
    let color = SELF_TEST_COLORS[(step / N) % SELF_TEST_COLORS.len()];
    frame[step % N] = color;
    frame
}

pub fn render_error<const N: usize>() -> [RGB8; N] {
    [ERROR_ORANGE; N]
}

/// Gamma-correct then scale a frame to `level`.
pub fn finish<const N: usize>(frame: &[RGB8; N], level: u8) -> [RGB8; N] {
    let mut out = [BLACK; N];
    for (dst, src) in out
        .iter_mut()
        .zip(brightness(gamma(frame.iter().copied()), level))
    {
        *dst = src;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: usize = 9;

    fn lit(frame: &[RGB8; N]) -> usize {
        frame.iter().filter(|p| **p != BLACK).count()
    }

    #[test]
    fn test_empty_bar_is_dark() {
        let frame: [RGB8; N] = render_scale(0, BarStyle::Bar);
        assert_eq!(lit(&frame), 0);
    }

    #[test]
    fn test_bar_fills_whole_pixels_and_mixes_one() {
        let frame: [RGB8; N] = render_scale(3 * 255 + 128, BarStyle::Bar);
        assert_eq!(lit(&frame), 4);
        let full = hue_color(position_to_hue(3 * 255));
        assert_eq!(frame[3], blend(full, 128));
        assert_ne!(frame[3], full);
        assert_eq!(frame[4], BLACK);
    }

    #[test]
    fn test_full_bar_lights_every_pixel() {
        let frame: [RGB8; N] = render_scale(N as u16 * 255, BarStyle::Bar);
        assert_eq!(lit(&frame), N);
    }

    #[test]
    fn test_hue_style_is_uniform() {
        let frame: [RGB8; N] = render_scale(1000, BarStyle::Hue);
        assert!(frame.iter().all(|p| *p == frame[0]));
        assert_ne!(frame[0], BLACK);
    }

    #[test]
    fn test_flash_alternates_every_half_period() {
        let on: [RGB8; N] = render_flash(0);
        let off: [RGB8; N] = render_flash(FLASH_PERIOD_MS / 2);
        let on_again: [RGB8; N] = render_flash(FLASH_PERIOD_MS);
        assert_eq!(on, [WARNING_RED; N]);
        assert_eq!(off, [BLACK; N]);
        assert_eq!(on_again, on);
    }

    #[test]
    fn test_pulse_peaks_in_the_middle() {
        let start: [RGB8; N] = render_pulse(PulseKind::TimeSynced, 0);
        let peak: [RGB8; N] = render_pulse(PulseKind::TimeSynced, PULSE_DURATION_MS / 2);
        let end: [RGB8; N] = render_pulse(PulseKind::TimeSynced, PULSE_DURATION_MS);
        assert_eq!(start[0], BLACK);
        assert_eq!(peak[0], PulseKind::TimeSynced.color());
        assert_eq!(end[0], BLACK);
    }

    #[test]
    fn test_self_test_chases_one_pixel() {
        let first: [RGB8; N] = render_self_test(0);
        assert_eq!(lit(&first), 1);
        assert_eq!(first[0], SELF_TEST_COLORS[0]);

        let second: [RGB8; N] = render_self_test(SELF_TEST_STEP_MS);
        assert_eq!(second[1], SELF_TEST_COLORS[0]);

        let next_lap: [RGB8; N] = render_self_test(SELF_TEST_STEP_MS * N as u64);
        assert_eq!(next_lap[0], SELF_TEST_COLORS[1]);
    }

    #[test]
    fn test_finish_scales_brightness() {
        let frame = [RGB8::new(255, 255, 255); N];
        assert_eq!(finish(&frame, 0), [BLACK; N]);
        let dim = finish(&frame, 64);
        assert!(dim[0].r > 0 && dim[0].r < 255);
    }
}
