//! LED bar renderer
//!
//! The renderer owns the animation state of the strip. Each frame it eases the
//! displayed position and brightness toward the latest target published by the
//! sensor manager, or plays one of the special animations (warning flash,
//! event pulse, self-test, error).
//!
//! ## Mode transitions
//!
//! ```text
//!            target            converged
//!   Idle ─────────────► ScaleDisplay ───────► Idle
//!                        │      ▲
//!       out of range     ▼      │ back in range
//!                     FlashWarning
//!
//!   Pulse    timed detour, returns to ScaleDisplay / FlashWarning
//!   SelfTest, Error, Off    entered on request, left only by restart
//! ```

pub mod frame;
mod manager;
mod requests;

pub use manager::{LightBarManager, blackout};
pub use requests::ModeRequests;

use log::{debug, info};
use smart_leds::RGB8;

use crate::config::{
    DEFAULT_BRIGHTNESS, ERROR_BRIGHTNESS, FLASH_MIN_BRIGHTNESS, POSITION_STEP_DIVISOR,
    PULSE_DURATION_MS,
};
use crate::scale::ScalePosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightBarMode {
    Idle,
    ScaleDisplay,
    FlashWarning,
    Pulse,
    SelfTest,
    Error,
    Off,
}

impl LightBarMode {
    /// Modes that ignore new targets and can only be left by a restart.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::SelfTest | Self::Error | Self::Off)
    }

    fn terminal_rank(self) -> u8 {
        match self {
            Self::SelfTest => 1,
            Self::Error => 2,
            Self::Off => 3,
            _ => 0,
        }
    }
}

/// Event that triggers a pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseKind {
    /// A browser opened the index page (purple)
    ClientConnected,
    /// The clock was set from network time (green)
    TimeSynced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeRequest {
    Pulse(PulseKind),
    SelfTest,
    Error,
    Off,
}

impl ModeRequest {
    /// Mode the bar stays in after this request, `None` for a pulse.
    pub fn final_mode(self) -> Option<LightBarMode> {
        match self {
            Self::Pulse(_) => None,
            Self::SelfTest => Some(LightBarMode::SelfTest),
            Self::Error => Some(LightBarMode::Error),
            Self::Off => Some(LightBarMode::Off),
        }
    }

    fn rank(self) -> u8 {
        self.final_mode().map_or(0, LightBarMode::terminal_rank)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarStyle {
    /// Positional fill with a green to red gradient along the strip
    #[default]
    Bar,
    /// Whole strip in one colour taken from the CO2 hue map
    Hue,
}

/// Where the bar should be heading, published once per sensor cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightTarget {
    pub position: ScalePosition,
    pub brightness: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightBarState {
    pub target_position: u16,
    pub current_position: u16,
    pub target_brightness: u8,
    pub current_brightness: u8,
    pub mode: LightBarMode,
}

impl Default for LightBarState {
    fn default() -> Self {
        Self {
            target_position: 0,
            current_position: 0,
            target_brightness: DEFAULT_BRIGHTNESS,
            current_brightness: DEFAULT_BRIGHTNESS,
            mode: LightBarMode::Idle,
        }
    }
}

/// One easing step: `max(1, |target - current| / 32)`, never past the target.
pub fn step_position(current: u16, target: u16) -> u16 {
    let diff = current.abs_diff(target);
    let step = (diff / POSITION_STEP_DIVISOR).max(1).min(diff);
    if current < target {
        current + step
    } else {
        current - step
    }
}

fn step_brightness(current: u8, target: u8) -> u8 {
    match current.cmp(&target) {
        core::cmp::Ordering::Less => current + 1,
        core::cmp::Ordering::Greater => current - 1,
        core::cmp::Ordering::Equal => current,
    }
}

pub struct LightBarRenderer<const N: usize> {
    state: LightBarState,
    style: BarStyle,
    out_of_range: bool,
    needs_redraw: bool,
    pulse: Option<(PulseKind, u64)>,
    mode_started_ms: u64,
    frame: [RGB8; N],
}

impl<const N: usize> Default for LightBarRenderer<N> {
    fn default() -> Self {
        Self::new(BarStyle::default())
    }
}

impl<const N: usize> LightBarRenderer<N> {
    pub fn new(style: BarStyle) -> Self {
        Self {
            state: LightBarState::default(),
            style,
            out_of_range: false,
            needs_redraw: true,
            pulse: None,
            mode_started_ms: 0,
            frame: [frame::BLACK; N],
        }
    }

    pub fn state(&self) -> &LightBarState {
        &self.state
    }

    pub fn mode(&self) -> LightBarMode {
        self.state.mode
    }

    fn set_mode(&mut self, mode: LightBarMode) {
        if self.state.mode != mode {
            debug!("Light bar mode {:?} -> {:?}", self.state.mode, mode);
            self.state.mode = mode;
        }
    }

    /// Mode to fall back to once nothing special is playing.
    fn scale_mode(&self) -> LightBarMode {
        if self.out_of_range {
            LightBarMode::FlashWarning
        } else {
            LightBarMode::ScaleDisplay
        }
    }

    pub fn apply_target(&mut self, target: LightTarget) {
        if self.state.mode.is_terminal() {
            return;
        }

        self.state.target_brightness = target.brightness;
        match target.position {
            ScalePosition::InRange(position) => {
                self.state.target_position = position;
                self.out_of_range = false;
            }
            ScalePosition::OutOfRange => self.out_of_range = true,
        }

        self.needs_redraw = true;
        if self.out_of_range {
            self.pulse = None;
        }
        if self.pulse.is_none() {
            self.set_mode(self.scale_mode());
        }
    }

    pub fn apply_request(&mut self, request: ModeRequest, now_ms: u64) {
        let current = self.state.mode;
        match request.final_mode() {
            None => {
                // The warning flash stays up while CO2 is out of range.
                if current.is_terminal() || self.out_of_range {
                    return;
                }
                if let ModeRequest::Pulse(kind) = request {
                    self.pulse = Some((kind, now_ms));
                    self.set_mode(LightBarMode::Pulse);
                }
            }
            Some(mode) => {
                if mode.terminal_rank() < current.terminal_rank() {
                    return;
                }
                info!("Light bar entering {:?}", mode);
                self.pulse = None;
                self.mode_started_ms = now_ms;
                self.needs_redraw = true;
                self.set_mode(mode);
            }
        }
    }

    /// Advance one frame. Returns the frame to push, or `None` if the strip
    /// already shows the right thing.
    pub fn tick(&mut self, now_ms: u64) -> Option<&[RGB8; N]> {
        let brightness_changed = self.state.current_brightness != self.state.target_brightness;
        self.state.current_brightness =
            step_brightness(self.state.current_brightness, self.state.target_brightness);

        let frame = match self.state.mode {
            LightBarMode::Off => return None,
            LightBarMode::Error => {
                if !self.needs_redraw {
                    return None;
                }
                frame::finish(&frame::render_error(), ERROR_BRIGHTNESS)
            }
            LightBarMode::SelfTest => frame::finish(
                &frame::render_self_test(now_ms.saturating_sub(self.mode_started_ms)),
                self.flash_brightness(),
            ),
            LightBarMode::Pulse => match self.pulse {
                Some((kind, started)) if now_ms.saturating_sub(started) < PULSE_DURATION_MS => {
                    frame::finish(
                        &frame::render_pulse(kind, now_ms - started),
                        self.flash_brightness(),
                    )
                }
                _ => {
                    self.pulse = None;
                    self.needs_redraw = true;
                    self.set_mode(self.scale_mode());
                    return self.tick_scale(now_ms, true);
                }
            },
            LightBarMode::FlashWarning => {
                frame::finish(&frame::render_flash(now_ms), self.flash_brightness())
            }
            LightBarMode::Idle | LightBarMode::ScaleDisplay => {
                return self.tick_scale(now_ms, brightness_changed);
            }
        };

        self.needs_redraw = false;
        self.frame = frame;
        Some(&self.frame)
    }

    fn tick_scale(&mut self, now_ms: u64, brightness_changed: bool) -> Option<&[RGB8; N]> {
        if self.state.mode == LightBarMode::FlashWarning {
            self.needs_redraw = false;
            self.frame = frame::finish(&frame::render_flash(now_ms), self.flash_brightness());
            return Some(&self.frame);
        }

        let position_changed = self.state.current_position != self.state.target_position;
        self.state.current_position =
            step_position(self.state.current_position, self.state.target_position);

        if !(brightness_changed || position_changed || self.needs_redraw) {
            self.set_mode(LightBarMode::Idle);
            return None;
        }

        self.set_mode(LightBarMode::ScaleDisplay);
        self.needs_redraw = false;
        self.frame = frame::finish(
            &frame::render_scale(self.state.current_position, self.style),
            self.state.current_brightness,
        );
        Some(&self.frame)
    }

    fn flash_brightness(&self) -> u8 {
        self.state.current_brightness.max(FLASH_MIN_BRIGHTNESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FRAME_PERIOD, MAX_POSITION, PIXEL_COUNT};

    type Renderer = LightBarRenderer<PIXEL_COUNT>;

    fn target(position: u16, brightness: u8) -> LightTarget {
        LightTarget {
            position: ScalePosition::InRange(position),
            brightness,
        }
    }

    fn run_until_idle(renderer: &mut Renderer, max_frames: u32) -> u32 {
        let frame_ms = FRAME_PERIOD.as_millis();
        for frame in 0..max_frames {
            renderer.tick(frame as u64 * frame_ms);
            if renderer.mode() == LightBarMode::Idle {
                return frame;
            }
        }
        max_frames
    }

    #[test]
    fn test_step_position_never_overshoots() {
        assert_eq!(step_position(0, 0), 0);
        assert_eq!(step_position(0, 1), 1);
        assert_eq!(step_position(10, 0), 9);
        assert_eq!(step_position(0, 3200), 100);
        assert_eq!(step_position(3200, 0), 3100);
    }

    #[test]
    fn test_position_converges_within_bound() {
        let mut renderer = Renderer::default();
        renderer.apply_target(target(MAX_POSITION, DEFAULT_BRIGHTNESS));
        assert_eq!(renderer.mode(), LightBarMode::ScaleDisplay);

        let mut last = 0;
        for frame in 0..300u64 {
            renderer.tick(frame * 30);
            let position = renderer.state().current_position;
            assert!(position >= last && position <= MAX_POSITION);
            last = position;
        }
        assert_eq!(renderer.state().current_position, MAX_POSITION);
    }

    #[test]
    fn test_brightness_steps_by_one() {
        let mut renderer = Renderer::default();
        renderer.apply_target(target(0, DEFAULT_BRIGHTNESS + 5));
        renderer.tick(0);
        assert_eq!(renderer.state().current_brightness, DEFAULT_BRIGHTNESS + 1);
        renderer.tick(30);
        assert_eq!(renderer.state().current_brightness, DEFAULT_BRIGHTNESS + 2);
    }

    #[test]
    fn test_settles_to_idle() {
        let mut renderer = Renderer::default();
        renderer.apply_target(target(300, DEFAULT_BRIGHTNESS));
        let frames = run_until_idle(&mut renderer, 400);
        assert!(frames < 400);
        assert_eq!(renderer.state().current_position, 300);
        assert!(renderer.tick(100_000).is_none());
    }

    #[test]
    fn test_out_of_range_flashes_and_recovers() {
        let mut renderer = Renderer::default();
        renderer.apply_target(target(500, DEFAULT_BRIGHTNESS));
        renderer.apply_target(LightTarget {
            position: ScalePosition::OutOfRange,
            brightness: DEFAULT_BRIGHTNESS,
        });
        assert_eq!(renderer.mode(), LightBarMode::FlashWarning);
        let lit = *renderer.tick(0).unwrap();
        let dark = *renderer.tick(500).unwrap();
        assert_ne!(lit, dark);
        assert_eq!(dark, [frame::BLACK; PIXEL_COUNT]);

        renderer.apply_target(target(500, DEFAULT_BRIGHTNESS));
        assert_eq!(renderer.mode(), LightBarMode::ScaleDisplay);
    }

    #[test]
    fn test_pulse_returns_to_scale_display() {
        let mut renderer = Renderer::default();
        renderer.apply_target(target(200, DEFAULT_BRIGHTNESS));
        renderer.apply_request(ModeRequest::Pulse(PulseKind::ClientConnected), 1_000);
        assert_eq!(renderer.mode(), LightBarMode::Pulse);

        // A target during the pulse is remembered but does not cut it short.
        renderer.apply_target(target(400, DEFAULT_BRIGHTNESS));
        renderer.tick(1_500);
        assert_eq!(renderer.mode(), LightBarMode::Pulse);

        renderer.tick(1_000 + PULSE_DURATION_MS);
        assert_eq!(renderer.mode(), LightBarMode::ScaleDisplay);
        assert_eq!(renderer.state().target_position, 400);
    }

    #[test]
    fn test_pulse_does_not_hide_warning_flash() {
        let out_of_range = LightTarget {
            position: ScalePosition::OutOfRange,
            brightness: DEFAULT_BRIGHTNESS,
        };
        let mut renderer = Renderer::default();
        renderer.apply_target(out_of_range);
        renderer.apply_request(ModeRequest::Pulse(PulseKind::ClientConnected), 0);
        assert_eq!(renderer.mode(), LightBarMode::FlashWarning);

        // Going out of range mid-pulse cuts the pulse short.
        renderer.apply_target(target(300, DEFAULT_BRIGHTNESS));
        renderer.apply_request(ModeRequest::Pulse(PulseKind::TimeSynced), 1_000);
        assert_eq!(renderer.mode(), LightBarMode::Pulse);
        renderer.apply_target(out_of_range);
        assert_eq!(renderer.mode(), LightBarMode::FlashWarning);
        renderer.tick(1_000 + PULSE_DURATION_MS);
        assert_eq!(renderer.mode(), LightBarMode::FlashWarning);
    }

    #[test]
    fn test_terminal_modes_ignore_targets() {
        let mut renderer = Renderer::default();
        renderer.apply_request(ModeRequest::SelfTest, 0);
        renderer.apply_target(target(900, 200));
        assert_eq!(renderer.mode(), LightBarMode::SelfTest);
        assert_eq!(renderer.state().target_position, 0);

        renderer.apply_request(ModeRequest::Pulse(PulseKind::TimeSynced), 10);
        assert_eq!(renderer.mode(), LightBarMode::SelfTest);

        renderer.apply_request(ModeRequest::Off, 20);
        assert_eq!(renderer.mode(), LightBarMode::Off);
        renderer.apply_request(ModeRequest::Error, 30);
        assert_eq!(renderer.mode(), LightBarMode::Off);
        assert!(renderer.tick(40).is_none());
    }

    #[test]
    fn test_error_frame_is_drawn_once() {
        let mut renderer = Renderer::default();
        renderer.apply_request(ModeRequest::Error, 0);
        assert!(renderer.tick(0).is_some());
        assert!(renderer.tick(30).is_none());
    }

    #[test]
    fn test_mode_request_wins_over_stale_target() {
        let mut renderer = Renderer::default();
        renderer.apply_target(target(100, DEFAULT_BRIGHTNESS));
        renderer.apply_request(ModeRequest::Error, 0);
        assert_eq!(renderer.mode(), LightBarMode::Error);
    }
}
