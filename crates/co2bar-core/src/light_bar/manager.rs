//! Light bar task: owns the strip and drives the renderer at the frame rate

use core::fmt::Debug;

use embassy_time::{Instant, Timer};
use log::{error, info, warn};
use smart_leds::{RGB8, SmartLedsWrite};

use crate::config::FRAME_PERIOD;
use crate::latest::LatestValue;

use super::{BarStyle, LightBarMode, LightBarRenderer, LightTarget, ModeRequest, ModeRequests};

/// Light bar manager that owns the LED strip
pub struct LightBarManager<'a, D, const N: usize> {
    strip: D,
    renderer: LightBarRenderer<N>,
    targets: &'a LatestValue<LightTarget>,
    requests: &'a ModeRequests,
    write_error_logged: bool,
}

impl<'a, D, const N: usize> LightBarManager<'a, D, N>
where
    D: SmartLedsWrite<Color = RGB8>,
    D::Error: Debug,
{
    pub fn new(
        strip: D,
        style: BarStyle,
        targets: &'a LatestValue<LightTarget>,
        requests: &'a ModeRequests,
    ) -> Self {
        Self {
            strip,
            renderer: LightBarRenderer::new(style),
            targets,
            requests,
            write_error_logged: false,
        }
    }

    /// Drain pending notifications and advance one frame.
    ///
    /// Returns `false` once the bar is switched off.
    pub fn frame(&mut self, now_ms: u64) -> bool {
        // Target, then pulse, then final mode, so the last one applied wins.
        if let Some(target) = self.targets.take() {
            self.renderer.apply_target(target);
        }
        if let Some(kind) = self.requests.take_pulse() {
            self.renderer.apply_request(ModeRequest::Pulse(kind), now_ms);
        }
        if let Some(request) = self.requests.take_final() {
            self.renderer.apply_request(request, now_ms);
        }

        if self.renderer.mode() == LightBarMode::Off {
            return false;
        }

        if let Some(frame) = self.renderer.tick(now_ms) {
            let pixels = *frame;
            self.push(&pixels);
        }
        true
    }

    /// Push a frame, logging the first failure and the recovery.
    fn push(&mut self, pixels: &[RGB8; N]) {
        match self.strip.write(pixels.iter().copied()) {
            Err(e) if !self.write_error_logged => {
                warn!("LED write error: {:?}", e);
                self.write_error_logged = true;
            }
            Ok(()) if self.write_error_logged => {
                info!("LED write recovered");
                self.write_error_logged = false;
            }
            _ => {}
        }
    }

    pub fn mode(&self) -> LightBarMode {
        self.renderer.mode()
    }

    /// Run the light bar task until it is switched off, then hand the strip
    /// back to the caller.
    pub async fn run(mut self) -> D {
        info!("Light bar task started");
        let started = Instant::now();

        while self.frame(started.elapsed().as_millis()) {
            Timer::after(FRAME_PERIOD).await;
        }

        info!("Light bar switched off");
        self.strip
    }
}

/// Write one all-black frame.
pub fn blackout<D, const N: usize>(strip: &mut D) -> Result<(), D::Error>
where
    D: SmartLedsWrite<Color = RGB8>,
    D::Error: Debug,
{
    strip.write([RGB8::default(); N].into_iter()).inspect_err(|e| {
        error!("LED blackout failed: {:?}", e);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PIXEL_COUNT;
    use crate::light_bar::PulseKind;
    use crate::scale::ScalePosition;
    use alloc::vec::Vec;

    #[derive(Default)]
    struct RecordingStrip {
        frames: Vec<[RGB8; PIXEL_COUNT]>,
        fail: bool,
    }

    impl SmartLedsWrite for RecordingStrip {
        type Error = ();
        type Color = RGB8;

        fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
        where
            T: IntoIterator<Item = I>,
            I: Into<Self::Color>,
        {
            if self.fail {
                return Err(());
            }
            let mut frame = [RGB8::default(); PIXEL_COUNT];
            for (dst, src) in frame.iter_mut().zip(iterator) {
                *dst = src.into();
            }
            self.frames.push(frame);
            Ok(())
        }
    }

    #[test]
    fn test_frame_pushes_until_converged() {
        let targets = LatestValue::new();
        let requests = ModeRequests::new();
        let mut manager: LightBarManager<'_, _, PIXEL_COUNT> =
            LightBarManager::new(RecordingStrip::default(), BarStyle::Bar, &targets, &requests);

        targets.publish(LightTarget {
            position: ScalePosition::InRange(40),
            brightness: 64,
        });
        for frame in 0..100u64 {
            assert!(manager.frame(frame * 30));
        }
        assert_eq!(manager.mode(), LightBarMode::Idle);

        let pushed = manager.strip.frames.len();
        assert!(pushed > 1 && pushed < 100);
    }

    #[test]
    fn test_off_request_stops_the_loop() {
        let targets = LatestValue::new();
        let requests = ModeRequests::new();
        let mut manager: LightBarManager<'_, _, PIXEL_COUNT> =
            LightBarManager::new(RecordingStrip::default(), BarStyle::Bar, &targets, &requests);

        requests.publish(ModeRequest::Pulse(PulseKind::ClientConnected));
        assert!(manager.frame(0));
        requests.publish(ModeRequest::Off);
        assert!(!manager.frame(30));

        let mut strip = embassy_futures::block_on(manager.run());
        blackout::<_, PIXEL_COUNT>(&mut strip).unwrap();
        assert_eq!(strip.frames.last(), Some(&[RGB8::default(); PIXEL_COUNT]));
    }

    #[test]
    fn test_off_survives_a_later_pulse() {
        let targets = LatestValue::new();
        let requests = ModeRequests::new();
        let mut manager: LightBarManager<'_, _, PIXEL_COUNT> =
            LightBarManager::new(RecordingStrip::default(), BarStyle::Bar, &targets, &requests);

        // /lightoff redirects to /, which requests a pulse before the next frame.
        requests.publish(ModeRequest::Off);
        requests.publish(ModeRequest::Pulse(PulseKind::ClientConnected));
        assert!(!manager.frame(0));
        assert_eq!(manager.mode(), LightBarMode::Off);
    }

    #[test]
    fn test_error_survives_a_later_pulse_and_target() {
        let targets = LatestValue::new();
        let requests = ModeRequests::new();
        let mut manager: LightBarManager<'_, _, PIXEL_COUNT> =
            LightBarManager::new(RecordingStrip::default(), BarStyle::Bar, &targets, &requests);

        requests.publish(ModeRequest::Error);
        requests.publish(ModeRequest::Pulse(PulseKind::TimeSynced));
        targets.publish(LightTarget {
            position: ScalePosition::InRange(40),
            brightness: 64,
        });
        assert!(manager.frame(0));
        assert_eq!(manager.mode(), LightBarMode::Error);
    }

    #[test]
    fn test_write_errors_do_not_stop_rendering() {
        let targets = LatestValue::new();
        let requests = ModeRequests::new();
        let strip = RecordingStrip {
            fail: true,
            ..Default::default()
        };
        let mut manager: LightBarManager<'_, _, PIXEL_COUNT> =
            LightBarManager::new(strip, BarStyle::Bar, &targets, &requests);

        targets.publish(LightTarget {
            position: ScalePosition::InRange(600),
            brightness: 64,
        });
        assert!(manager.frame(0));
        assert!(manager.write_error_logged);

        manager.strip.fail = false;
        assert!(manager.frame(30));
        assert!(!manager.write_error_logged);
    }
}
