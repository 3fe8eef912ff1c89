//! Firmware-specific application state extensions
//!
//! Re-exports the hardware-independent app state from `co2bar_core` and adds
//! ESP32-S3 hardware bring-up and the concrete sensor adapters.

mod hardware;
mod sensors_state;

pub use hardware::*;
pub use sensors_state::*;

pub use co2bar_core::app_state::*;

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::info;

static RUN_STATE: Mutex<CriticalSectionRawMutex, Cell<AppRunState>> =
    Mutex::new(Cell::new(AppRunState::Uninitialized));

pub fn run_state() -> AppRunState {
    RUN_STATE.lock(|state| state.get())
}

pub fn set_run_state(next: AppRunState) {
    let previous = RUN_STATE.lock(|state| state.replace(next));
    if previous != next {
        info!("Run state {:?} -> {:?}", previous, next);
    }
}
