//! RTC-backed wall clock
//!
//! The low-power RTC keeps counting across soft resets, so once a client has
//! set the time the timestamps stay real until the board loses power.

use esp_hal::rtc_cntl::Rtc;
use log::info;

use co2bar_core::app_state::AppRunState;
use co2bar_core::clock::Clock;
use co2bar_core::latest::LatestValue;

pub struct DeviceClock {
    rtc: Rtc<'static>,
    network: &'static LatestValue<u64>,
}

impl DeviceClock {
    pub fn new(rtc: Rtc<'static>, network: &'static LatestValue<u64>) -> Self {
        Self { rtc, network }
    }
}

impl Clock for DeviceClock {
    fn now_epoch_secs(&self) -> u64 {
        self.rtc.current_time_us() / 1_000_000
    }

    fn network_time(&mut self) -> Option<u64> {
        self.network.take()
    }

    fn set_backup_clock(&mut self, epoch_secs: u64) {
        self.rtc.set_current_time_us(epoch_secs.saturating_mul(1_000_000));
        info!("RTC set to {} (epoch seconds)", epoch_secs);
        crate::app_state::set_run_state(AppRunState::TimeKnown);
    }
}
